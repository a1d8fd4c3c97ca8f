//! Operating modes.
//!
//! Each mode pairs a screen of editable items with the logic that drives
//! the power-control layer: constant voltage, constant current, current
//! limit and the function generator. [`Func`] closes the set so the device
//! can own any mode by value.

pub mod cc;
pub mod cl;
pub mod cv;
pub mod gen;

pub use cc::CcFunc;
pub use cl::ClFunc;
pub use cv::CvFunc;
pub use gen::GenFunc;

use crate::hal::Hal;
use crate::model::ModelConfig;
use crate::pwrctl::PowerControl;
use crate::settings::SettingsStore;
use crate::uui::{Item, Screen, SetParamStatus};
use heapless::String;

/// Everything a mode may touch, threaded through every hook call.
pub struct FuncCtx<'a> {
    pub pwrctl: &'a mut PowerControl,
    pub store: &'a mut dyn SettingsStore,
    pub hw: &'a mut dyn Hal,
    pub model: &'a ModelConfig,
}

/// The closed set of modes a device can run.
pub enum Func {
    Cv(CvFunc),
    Cc(CcFunc),
    Cl(ClFunc),
    Gen(GenFunc),
}

impl Func {
    fn inner(&mut self) -> &mut dyn Screen {
        match self {
            Func::Cv(f) => f,
            Func::Cc(f) => f,
            Func::Cl(f) => f,
            Func::Gen(f) => f,
        }
    }

    fn inner_ref(&self) -> &dyn Screen {
        match self {
            Func::Cv(f) => f,
            Func::Cc(f) => f,
            Func::Cl(f) => f,
            Func::Gen(f) => f,
        }
    }
}

impl Screen for Func {
    fn name(&self) -> &'static str {
        self.inner_ref().name()
    }

    fn items(&mut self) -> &mut [Item] {
        self.inner().items()
    }

    fn activated(&mut self, ctx: &mut FuncCtx<'_>) {
        self.inner().activated(ctx)
    }

    fn deactivated(&mut self, ctx: &mut FuncCtx<'_>) {
        self.inner().deactivated(ctx)
    }

    fn enable(&mut self, ctx: &mut FuncCtx<'_>, on: bool) {
        self.inner().enable(ctx, on)
    }

    fn tick(&mut self, ctx: &mut FuncCtx<'_>) -> Option<crate::event::Event> {
        self.inner().tick(ctx)
    }

    fn save_settings(
        &mut self,
        store: &mut dyn SettingsStore,
    ) -> Result<(), crate::settings::StoreError> {
        self.inner().save_settings(store)
    }

    fn restore_settings(&mut self, store: &mut dyn SettingsStore) {
        self.inner().restore_settings(store)
    }

    fn value_changed(&mut self, ctx: &mut FuncCtx<'_>, item: usize) {
        self.inner().value_changed(ctx, item)
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        self.inner_ref().parameter_names()
    }

    fn set_parameter(&mut self, ctx: &mut FuncCtx<'_>, name: &str, value: &str) -> SetParamStatus {
        self.inner().set_parameter(ctx, name, value)
    }

    fn get_parameter(&self, name: &str, out: &mut String<16>) -> bool {
        self.inner_ref().get_parameter(name, out)
    }
}

/// Appends a decimal integer without the formatting machinery.
pub(crate) fn write_u32(out: &mut String<16>, value: u32) {
    let mut digits = [0u8; 10];
    let mut n = 0;
    let mut v = value;
    loop {
        digits[n] = b'0' + (v % 10) as u8;
        v /= 10;
        n += 1;
        if v == 0 {
            break;
        }
    }
    while n > 0 {
        n -= 1;
        let _ = out.push(digits[n] as char);
    }
}

/// Parses the wire form of a numeric parameter value.
pub(crate) fn parse_u32(value: &str) -> Option<u32> {
    value.parse().ok()
}
