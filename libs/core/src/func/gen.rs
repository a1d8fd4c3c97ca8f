//! Waveform generator mode.
//!
//! Compiles the selected shape into a 256-entry DAC code table and hands
//! it to the platform, which replays it from a timer interrupt at the
//! fixed sample rate. Phase accumulates in 8.24 fixed point so any
//! frequency maps onto the table without recomputation.

use crate::event::Event;
use crate::func::{parse_u32, write_u32, FuncCtx};
use crate::model::ModelConfig;
use crate::pwrctl::PowerControl;
use crate::settings::{unit, SettingsStore, StoreError};
use crate::uui::{IconWidget, Item, NumberWidget, Screen, SetParamStatus, SiPrefix, Unit, Widget};
use heapless::String;

const WAVEFORM: usize = 0;
const FREQUENCY: usize = 1;
const AMPLITUDE: usize = 2;
const OFFSET: usize = 3;
const DUTY: usize = 4;

const LEVEL_CEILING_MV: i32 = 0xffff;
pub const MAX_FREQUENCY_HZ: u32 = 5000;

pub const TABLE_LEN: usize = 256;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine = 0,
    Square = 1,
    Sawtooth = 2,
    Triangle = 3,
}

impl Waveform {
    pub const LABELS: [&'static str; 4] = ["sine", "square", "sawtooth", "triangle"];

    pub fn from_u8(value: u8) -> Option<Waveform> {
        match value {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::Square),
            2 => Some(Waveform::Sawtooth),
            3 => Some(Waveform::Triangle),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        Self::LABELS[*self as usize]
    }

    pub fn from_label(label: &str) -> Option<Waveform> {
        match label {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" => Some(Waveform::Sawtooth),
            "triangle" => Some(Waveform::Triangle),
            _ => None,
        }
    }
}

/// A compiled waveform, ready for interrupt-context playback.
///
/// `next_sample` is the only method the timer handler needs; it does no
/// float work and never blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformProgram {
    table: [u16; TABLE_LEN],
    phase: u32,
    step: u32,
}

impl WaveformProgram {
    pub const SAMPLE_RATE_HZ: u32 = 20_000;

    pub fn next_sample(&mut self) -> u16 {
        let sample = self.table[(self.phase >> 24) as usize];
        self.phase = self.phase.wrapping_add(self.step);
        sample
    }
}

pub struct GenFunc {
    items: [Item; 5],
    waveform: Waveform,
    freq_hz: u32,
    amplitude_mv: u32,
    offset_mv: u32,
    duty_pct: u8,
}

impl GenFunc {
    pub fn new(_model: &ModelConfig) -> Self {
        let shape = IconWidget::new(&Waveform::LABELS);
        let frequency = NumberWidget::new(Unit::Hertz, SiPrefix::None, 4, 0)
            .with_range(1, MAX_FREQUENCY_HZ as i32)
            .with_value(100);
        let amplitude = NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2)
            .with_range(0, LEVEL_CEILING_MV)
            .with_value(1000);
        let offset = NumberWidget::new(Unit::Volt, SiPrefix::Milli, 2, 2)
            .with_range(0, LEVEL_CEILING_MV)
            .with_value(1000);
        let duty = NumberWidget::new(Unit::Percent, SiPrefix::None, 3, 0)
            .with_range(0, 100)
            .with_value(50);
        GenFunc {
            items: [
                Item::icon(shape),
                Item::number(frequency),
                Item::number(amplitude),
                Item::number(offset),
                Item::number(duty),
            ],
            waveform: Waveform::Sine,
            freq_hz: 100,
            amplitude_mv: 1000,
            offset_mv: 1000,
            duty_pct: 50,
        }
    }

    fn sync_items(&mut self) {
        if let Widget::Icon(w) = &mut self.items[WAVEFORM].widget {
            w.set_index(self.waveform as u8);
        }
        if let Widget::Number(w) = &mut self.items[FREQUENCY].widget {
            w.set_value(self.freq_hz as i32);
            self.freq_hz = w.value as u32;
        }
        if let Widget::Number(w) = &mut self.items[AMPLITUDE].widget {
            w.set_value(self.amplitude_mv as i32);
            self.amplitude_mv = w.value as u32;
        }
        if let Widget::Number(w) = &mut self.items[OFFSET].widget {
            w.set_value(self.offset_mv as i32);
            self.offset_mv = w.value as u32;
        }
        if let Widget::Number(w) = &mut self.items[DUTY].widget {
            w.set_value(self.duty_pct as i32);
            self.duty_pct = w.value as u8;
        }
        for it in &mut self.items {
            it.dirty = true;
        }
    }

    /// Renders one cycle of the shape into DAC codes. Sample levels below
    /// ground clamp to zero; the DAC ceiling is applied by the code
    /// conversion itself.
    fn compile(&self, pwrctl: &PowerControl) -> WaveformProgram {
        let mut table = [0u16; TABLE_LEN];
        let high = TABLE_LEN as u32 * self.duty_pct as u32 / 100;
        for (n, slot) in table.iter_mut().enumerate() {
            let x = match self.waveform {
                Waveform::Sine => {
                    libm::sinf(core::f32::consts::TAU * n as f32 / TABLE_LEN as f32)
                }
                Waveform::Square => {
                    if (n as u32) < high {
                        1.0
                    } else {
                        -1.0
                    }
                }
                Waveform::Sawtooth => n as f32 / (TABLE_LEN - 1) as f32 * 2.0 - 1.0,
                Waveform::Triangle => {
                    if n < TABLE_LEN / 2 {
                        n as f32 / (TABLE_LEN / 4) as f32 - 1.0
                    } else {
                        3.0 - n as f32 / (TABLE_LEN / 4) as f32
                    }
                }
            };
            let mv = self.offset_mv as f32 + x * self.amplitude_mv as f32 / 2.0;
            let mv = if mv < 0.0 { 0.0 } else { mv };
            *slot = pwrctl.calc_vout_dac(mv as u32);
        }
        let step = ((self.freq_hz as u64) << 32) / WaveformProgram::SAMPLE_RATE_HZ as u64;
        WaveformProgram {
            table,
            phase: 0,
            step: step as u32,
        }
    }

    fn restart_if_running(&mut self, ctx: &mut FuncCtx<'_>) {
        if ctx.pwrctl.vout_enabled() {
            ctx.hw.stop_waveform();
            let program = self.compile(ctx.pwrctl);
            ctx.hw.start_waveform(program);
        }
    }
}

impl Screen for GenFunc {
    fn name(&self) -> &'static str {
        "gen"
    }

    fn items(&mut self) -> &mut [Item] {
        &mut self.items
    }

    fn activated(&mut self, _ctx: &mut FuncCtx<'_>) {
        self.sync_items();
    }

    fn deactivated(&mut self, ctx: &mut FuncCtx<'_>) {
        self.enable(ctx, false);
    }

    fn enable(&mut self, ctx: &mut FuncCtx<'_>, on: bool) {
        if on {
            // Park the output at the offset level until the first timer
            // tick takes over.
            if !ctx.pwrctl.set_vout(ctx.hw, self.offset_mv) {
                return;
            }
            let program = self.compile(ctx.pwrctl);
            ctx.pwrctl.set_iout(ctx.hw, ctx.model.max_current_ma);
            ctx.pwrctl.set_ilimit(ctx.model.max_current_ma);
            ctx.pwrctl.enable_vout(ctx.hw, true);
            ctx.hw.start_waveform(program);
        } else {
            ctx.pwrctl.enable_vout(ctx.hw, false);
            ctx.hw.stop_waveform();
            self.sync_items();
        }
    }

    fn tick(&mut self, _ctx: &mut FuncCtx<'_>) -> Option<Event> {
        None
    }

    fn save_settings(&mut self, store: &mut dyn SettingsStore) -> Result<(), StoreError> {
        let mut buf = [0u8; 10];
        buf[0] = self.waveform as u8;
        buf[1] = self.duty_pct;
        buf[2..6].copy_from_slice(&self.freq_hz.to_le_bytes());
        buf[6..8].copy_from_slice(&(self.amplitude_mv as u16).to_le_bytes());
        buf[8..10].copy_from_slice(&(self.offset_mv as u16).to_le_bytes());
        store.save(unit::GEN_SETTINGS, &buf)
    }

    fn restore_settings(&mut self, store: &mut dyn SettingsStore) {
        let mut buf = [0u8; 10];
        if store.load(unit::GEN_SETTINGS, &mut buf) == Some(buf.len()) {
            if let Some(wf) = Waveform::from_u8(buf[0]) {
                self.waveform = wf;
            }
            self.duty_pct = buf[1].min(100);
            self.freq_hz = u32::from_le_bytes([buf[2], buf[3], buf[4], buf[5]]);
            self.amplitude_mv = u16::from_le_bytes([buf[6], buf[7]]) as u32;
            self.offset_mv = u16::from_le_bytes([buf[8], buf[9]]) as u32;
        }
        self.sync_items();
    }

    fn value_changed(&mut self, ctx: &mut FuncCtx<'_>, item: usize) {
        match item {
            WAVEFORM => {
                if let Widget::Icon(w) = &self.items[WAVEFORM].widget {
                    if let Some(wf) = Waveform::from_u8(w.index) {
                        self.waveform = wf;
                    }
                }
            }
            FREQUENCY => self.freq_hz = self.items[FREQUENCY].number_value() as u32,
            AMPLITUDE => self.amplitude_mv = self.items[AMPLITUDE].number_value() as u32,
            OFFSET => self.offset_mv = self.items[OFFSET].number_value() as u32,
            DUTY => self.duty_pct = self.items[DUTY].number_value() as u8,
            _ => {}
        }
        self.restart_if_running(ctx);
    }

    fn parameter_names(&self) -> &'static [&'static str] {
        &["waveform", "frequency", "amplitude", "offset", "duty"]
    }

    fn set_parameter(&mut self, ctx: &mut FuncCtx<'_>, name: &str, value: &str) -> SetParamStatus {
        match name {
            "waveform" => {
                let Some(wf) = Waveform::from_label(value) else {
                    return SetParamStatus::RangeError;
                };
                self.waveform = wf;
            }
            "frequency" => {
                let Some(f) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if f < 1 || f > MAX_FREQUENCY_HZ {
                    return SetParamStatus::RangeError;
                }
                self.freq_hz = f;
            }
            "amplitude" => {
                let Some(a) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if a > LEVEL_CEILING_MV as u32 {
                    return SetParamStatus::RangeError;
                }
                self.amplitude_mv = a;
            }
            "offset" => {
                let Some(o) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if o > LEVEL_CEILING_MV as u32 {
                    return SetParamStatus::RangeError;
                }
                self.offset_mv = o;
            }
            "duty" => {
                let Some(d) = parse_u32(value) else {
                    return SetParamStatus::RangeError;
                };
                if d > 100 {
                    return SetParamStatus::RangeError;
                }
                self.duty_pct = d as u8;
            }
            _ => return SetParamStatus::UnknownName,
        }
        self.sync_items();
        self.restart_if_running(ctx);
        match self.save_settings(ctx.store) {
            Ok(()) => SetParamStatus::Ok,
            Err(_) => SetParamStatus::FlashError,
        }
    }

    fn get_parameter(&self, name: &str, out: &mut String<16>) -> bool {
        match name {
            "waveform" => {
                let _ = out.push_str(self.waveform.label());
            }
            "frequency" => write_u32(out, self.freq_hz),
            "amplitude" => write_u32(out, self.amplitude_mv),
            "offset" => write_u32(out, self.offset_mv),
            "duty" => write_u32(out, self.duty_pct as u32),
            _ => return false,
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calib::Calibration;
    use crate::hal::AdcReading;
    use crate::mock::{Action, MockHal, MockStore};
    use crate::model;
    use crate::pwrctl::PowerControl;

    // Voltage DAC coefficients of 1/0 make table entries equal the sample
    // level in millivolts, so shapes can be checked exactly.
    fn flat_cal() -> Calibration {
        let mut cal = model::DPS5005.cal;
        cal.v_dac_k = 1.0;
        cal.v_dac_c = 0.0;
        cal
    }

    struct Rig {
        pwrctl: PowerControl,
        store: MockStore,
        hw: MockHal,
    }

    impl Rig {
        fn new() -> Self {
            let mut hw = MockHal::new();
            hw.adc = AdcReading {
                vin: 713,
                vout: 0,
                iout: 0,
            };
            Rig {
                pwrctl: PowerControl::new(&model::DPS5005, flat_cal()),
                store: MockStore::new(),
                hw,
            }
        }

        fn ctx(&mut self) -> FuncCtx<'_> {
            FuncCtx {
                pwrctl: &mut self.pwrctl,
                store: &mut self.store,
                hw: &mut self.hw,
                model: &model::DPS5005,
            }
        }
    }

    // 1250 Hz at 20 kHz is exactly 16 samples per cycle, so the phase
    // accumulator lands on table entries 0, 16, 32, ...
    fn sixteen_sample_gen(waveform: &str) -> GenFunc {
        let mut gen = GenFunc::new(&model::DPS5005);
        gen.waveform = Waveform::from_label(waveform).unwrap();
        gen.freq_hz = 1250;
        gen.amplitude_mv = 1000;
        gen.offset_mv = 2000;
        gen.sync_items();
        gen
    }

    fn samples(program: &mut WaveformProgram, count: usize) -> std::vec::Vec<u16> {
        (0..count).map(|_| program.next_sample()).collect()
    }

    #[test]
    fn program_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WaveformProgram>();
    }

    #[test]
    fn sine_peaks_at_offset_plus_half_amplitude() {
        let rig = Rig::new();
        let gen = sixteen_sample_gen("sine");
        let mut program = gen.compile(&rig.pwrctl);
        let s = samples(&mut program, 32);
        assert_eq!(s[0], 2000);
        assert_eq!(s[4], 2500);
        assert_eq!(s[12], 1500);
        // Second cycle repeats the first.
        assert_eq!(&s[..16], &s[16..]);
    }

    #[test]
    fn square_duty_cycle_splits_the_period() {
        let mut gen = sixteen_sample_gen("square");
        gen.duty_pct = 25;
        let rig = Rig::new();
        let mut program = gen.compile(&rig.pwrctl);
        let s = samples(&mut program, 16);
        let high = s.iter().filter(|&&v| v == 2500).count();
        let low = s.iter().filter(|&&v| v == 1500).count();
        assert_eq!((high, low), (4, 12));
    }

    #[test]
    fn sawtooth_ramps_within_each_cycle() {
        let rig = Rig::new();
        let gen = sixteen_sample_gen("sawtooth");
        let mut program = gen.compile(&rig.pwrctl);
        let s = samples(&mut program, 16);
        assert!(s.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(s[0], 1500);
        // Last sample sits at table entry 240, one stride short of the top.
        assert_eq!(s[15], 2441);
    }

    #[test]
    fn levels_below_ground_clamp_to_zero() {
        let rig = Rig::new();
        let mut gen = sixteen_sample_gen("sine");
        gen.offset_mv = 200;
        let mut program = gen.compile(&rig.pwrctl);
        let s = samples(&mut program, 16);
        assert_eq!(s[12], 0);
        assert_eq!(s[4], 700);
    }

    #[test]
    fn enable_parks_output_then_starts_playback() {
        let mut rig = Rig::new();
        let mut gen = GenFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        gen.enable(&mut ctx, true);
        // Default offset 1000 mV; flat cal makes the park code 1000.
        assert_eq!(
            rig.hw.actions.as_slice(),
            &[
                Action::VoutDac(1000),
                Action::IoutDac(rig.pwrctl.calc_iout_dac(5000)),
                Action::Output(true),
                Action::WaveformStart,
            ]
        );
        assert!(rig.hw.waveform.is_some());
    }

    #[test]
    fn disable_kills_output_before_stopping_playback() {
        let mut rig = Rig::new();
        let mut gen = GenFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        gen.enable(&mut ctx, true);
        rig.hw.actions.clear();

        let mut ctx = rig.ctx();
        gen.enable(&mut ctx, false);
        assert_eq!(
            rig.hw.actions.as_slice(),
            &[
                Action::Output(false),
                Action::VoutDac(0),
                Action::IoutDac(0),
                Action::WaveformStop,
            ]
        );
        assert!(rig.hw.waveform.is_none());
    }

    #[test]
    fn edits_while_running_swap_the_program() {
        let mut rig = Rig::new();
        let mut gen = GenFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        assert_eq!(gen.set_parameter(&mut ctx, "frequency", "2500"), SetParamStatus::Ok);
        assert!(!rig.hw.actions.contains(&Action::WaveformStart));

        let mut ctx = rig.ctx();
        gen.enable(&mut ctx, true);
        rig.hw.actions.clear();

        let mut ctx = rig.ctx();
        assert_eq!(gen.set_parameter(&mut ctx, "frequency", "500"), SetParamStatus::Ok);
        assert_eq!(
            rig.hw.actions.as_slice(),
            &[Action::WaveformStop, Action::WaveformStart]
        );
        let program = rig.hw.waveform.as_ref().unwrap();
        assert_eq!(program.step, ((500u64 << 32) / 20_000) as u32);
    }

    #[test]
    fn settings_serialize_to_ten_bytes() {
        let mut rig = Rig::new();
        let mut gen = GenFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        gen.set_parameter(&mut ctx, "waveform", "square");
        gen.set_parameter(&mut ctx, "duty", "30");
        gen.set_parameter(&mut ctx, "frequency", "750");
        gen.set_parameter(&mut ctx, "amplitude", "1200");
        gen.set_parameter(&mut ctx, "offset", "800");

        let mut buf = [0u8; 16];
        assert_eq!(rig.store.load(unit::GEN_SETTINGS, &mut buf), Some(10));
        assert_eq!(&buf[..2], &[1, 30]);
        assert_eq!(&buf[2..6], &750u32.to_le_bytes());
        assert_eq!(&buf[6..8], &1200u16.to_le_bytes());
        assert_eq!(&buf[8..10], &800u16.to_le_bytes());

        let mut other = GenFunc::new(&model::DPS5005);
        other.restore_settings(&mut rig.store);
        assert_eq!(other.waveform, Waveform::Square);
        assert_eq!(other.duty_pct, 30);
        assert_eq!(other.freq_hz, 750);
        assert_eq!(other.amplitude_mv, 1200);
        assert_eq!(other.offset_mv, 800);
        if let Widget::Icon(w) = &other.items[WAVEFORM].widget {
            assert_eq!(w.current(), "square");
        } else {
            panic!("waveform item is not an icon");
        }
    }

    #[test]
    fn hostile_parameters_are_rejected() {
        let mut rig = Rig::new();
        let mut gen = GenFunc::new(&model::DPS5005);
        let mut ctx = rig.ctx();
        assert_eq!(
            gen.set_parameter(&mut ctx, "waveform", "noise"),
            SetParamStatus::RangeError
        );
        assert_eq!(
            gen.set_parameter(&mut ctx, "frequency", "0"),
            SetParamStatus::RangeError
        );
        assert_eq!(
            gen.set_parameter(&mut ctx, "frequency", "6000"),
            SetParamStatus::RangeError
        );
        assert_eq!(
            gen.set_parameter(&mut ctx, "duty", "101"),
            SetParamStatus::RangeError
        );
        assert_eq!(
            gen.set_parameter(&mut ctx, "ripple", "1"),
            SetParamStatus::UnknownName
        );
    }
}
