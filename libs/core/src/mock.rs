//! Host-side test doubles for the hardware seam and the settings store.

use crate::func::gen::WaveformProgram;
use crate::hal::{AdcReading, Hal};
use crate::settings::{SettingsStore, StoreError};
use crate::uui::Item;
use heapless::Vec;
use powerlynx_protocol::FrameBuf;

/// One observable hardware side effect, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    VoutDac(u16),
    IoutDac(u16),
    Output(bool),
    Brightness(u8),
    WaveformStart,
    WaveformStop,
    Upgrade(u16, u16),
}

pub struct MockHal {
    pub adc: AdcReading,
    pub now_ms: u32,
    pub actions: Vec<Action, 64>,
    pub draws: Vec<(&'static str, usize), 32>,
    pub sent: Vec<FrameBuf, 8>,
    pub waveform: Option<WaveformProgram>,
    pub upgrade: Option<(u16, u16)>,
}

impl MockHal {
    pub fn new() -> Self {
        MockHal {
            adc: AdcReading::default(),
            now_ms: 0,
            actions: Vec::new(),
            draws: Vec::new(),
            sent: Vec::new(),
            waveform: None,
            upgrade: None,
        }
    }

    fn record(&mut self, action: Action) {
        let _ = self.actions.push(action);
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for MockHal {
    fn read_adc(&mut self) -> AdcReading {
        self.adc
    }

    fn set_vout_dac(&mut self, code: u16) {
        self.record(Action::VoutDac(code));
    }

    fn set_iout_dac(&mut self, code: u16) {
        self.record(Action::IoutDac(code));
    }

    fn set_output(&mut self, on: bool) {
        self.record(Action::Output(on));
    }

    fn set_brightness(&mut self, percent: u8) {
        self.record(Action::Brightness(percent));
    }

    fn start_waveform(&mut self, program: WaveformProgram) {
        self.waveform = Some(program);
        self.record(Action::WaveformStart);
    }

    fn stop_waveform(&mut self) {
        self.waveform = None;
        self.record(Action::WaveformStop);
    }

    fn stage_upgrade(&mut self, chunk_size: u16, crc: u16) {
        self.upgrade = Some((chunk_size, crc));
        self.record(Action::Upgrade(chunk_size, crc));
    }

    fn millis(&mut self) -> u32 {
        self.now_ms
    }

    fn tx(&mut self, frame: &[u8]) {
        let mut buf = FrameBuf::new();
        let _ = buf.extend_from_slice(frame);
        let _ = self.sent.push(buf);
    }

    fn draw_item(&mut self, screen: &'static str, index: usize, _item: &Item) {
        let _ = self.draws.push((screen, index));
    }
}

/// In-memory settings store with an injectable save failure.
pub struct MockStore {
    units: Vec<(u32, Vec<u8, 32>), 32>,
    pub fail_saves: bool,
}

impl MockStore {
    pub fn new() -> Self {
        MockStore {
            units: Vec::new(),
            fail_saves: false,
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore for MockStore {
    fn load(&mut self, id: u32, out: &mut [u8]) -> Option<usize> {
        let (_, data) = self.units.iter().find(|(unit, _)| *unit == id)?;
        if out.len() < data.len() {
            return None;
        }
        out[..data.len()].copy_from_slice(data);
        Some(data.len())
    }

    fn save(&mut self, id: u32, data: &[u8]) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Io);
        }
        let mut copy = Vec::new();
        copy.extend_from_slice(data).map_err(|_| StoreError::Full)?;
        if let Some(slot) = self.units.iter_mut().find(|(unit, _)| *unit == id) {
            slot.1 = copy;
        } else {
            self.units.push((id, copy)).map_err(|_| StoreError::Full)?;
        }
        Ok(())
    }

    fn remove(&mut self, id: u32) -> Result<(), StoreError> {
        self.units.retain(|(unit, _)| *unit != id);
        Ok(())
    }
}
