#![no_std]

//! Hardware-independent core of the supply firmware.
//!
//! Everything that can run on a host lives here: the power-control math,
//! the operating modes with their screens, settings persistence, and the
//! wire command dispatch. The firmware binary provides the [`Hal`]
//! implementation and the main loop; interrupt handlers feed bytes and
//! events in through [`Device::push_rx`] and [`Device::push_event`], and
//! [`Device::poll`] does the rest.

#[cfg(test)]
extern crate std;

pub mod calib;
pub mod device;
pub mod event;
pub mod func;
pub mod hal;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod model;
pub mod pwrctl;
mod remote;
pub mod ring;
pub mod settings;
pub mod uui;

pub use calib::Calibration;
pub use device::{Device, TICK_INTERVAL_MS};
pub use event::Event;
pub use func::gen::{Waveform, WaveformProgram};
pub use func::{Func, FuncCtx};
pub use hal::{AdcReading, Hal};
pub use model::{ModelConfig, DPS5005, DPS5015};
pub use pwrctl::PowerControl;
pub use ring::Ring;
pub use settings::{SettingsStore, StoreError};
