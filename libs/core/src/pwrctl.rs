//! Power control layer.
//!
//! Owns the output state of the supply: setpoints, protection limits and
//! the enable flag, plus the calibrated conversions between physical
//! units (mV/mA) and raw 12-bit converter codes. Measurement channels map
//! `physical = K_adc * raw + C_adc`; drive channels map
//! `raw = K_dac * physical + C_dac`. Conversions truncate toward zero.
//!
//! Frozen rule: [`PowerControl::enable_vout`] is the single authoritative
//! output switch. On enable the DACs are programmed before the output
//! stage closes; on disable the output stage opens before the DACs are
//! zeroed. Disabling is idempotent and always re-asserts the off state.
//!
//! The layer performs no I/O of its own; the hardware sink is passed into
//! the calls that drive it.

use crate::calib::Calibration;
use crate::hal::Hal;
use crate::model::ModelConfig;

/// Full scale of the 12-bit converters.
pub const DAC_MAX: u16 = 0xfff;

/// Sentinel compare value when a raw limit is disabled; a 12-bit ADC can
/// never reach it.
const LIMIT_OFF_RAW: u16 = u16::MAX;

pub struct PowerControl {
    cal: Calibration,
    max_current_ma: u32,
    v_out_mv: u32,
    i_out_ma: u32,
    i_limit_ma: u32,
    v_limit_mv: u32,
    /// Raw ADC threshold for the interrupt-context OCP compare.
    i_limit_raw: u16,
    /// Raw ADC threshold for the interrupt-context OVP compare.
    v_limit_raw: u16,
    /// Last programmed DAC codes, for the calibration report.
    vout_dac: u16,
    iout_dac: u16,
    enabled: bool,
}

fn physical(k: f32, c: f32, raw: u16) -> u32 {
    let v = k * raw as f32 + c;
    if v < 0.0 {
        0
    } else {
        v as u32
    }
}

fn dac_code(k: f32, c: f32, value: f32) -> u16 {
    let v = k * value + c;
    if v < 0.0 {
        0
    } else if v > DAC_MAX as f32 {
        DAC_MAX
    } else {
        v as u16
    }
}

/// Inverse of a measurement map: the raw code where the physical value
/// crosses `value`.
fn raw_threshold(k: f32, c: f32, value: f32) -> u16 {
    let v = (value - c) / k;
    if v < 0.0 {
        0
    } else {
        v as u16
    }
}

impl PowerControl {
    pub fn new(model: &ModelConfig, cal: Calibration) -> Self {
        let mut ctl = PowerControl {
            cal,
            max_current_ma: model.max_current_ma,
            v_out_mv: 0,
            i_out_ma: 0,
            i_limit_ma: model.max_current_ma,
            v_limit_mv: 0,
            i_limit_raw: 0,
            v_limit_raw: LIMIT_OFF_RAW,
            vout_dac: 0,
            iout_dac: 0,
            enabled: false,
        };
        ctl.recompute_limits();
        ctl
    }

    // ---- Conversions ----------------------------------------------------

    pub fn calc_vin(&self, raw: u16) -> u32 {
        physical(self.cal.vin_adc_k, self.cal.vin_adc_c, raw)
    }

    pub fn calc_vout(&self, raw: u16) -> u32 {
        physical(self.cal.v_adc_k, self.cal.v_adc_c, raw)
    }

    pub fn calc_iout(&self, raw: u16) -> u32 {
        physical(self.cal.a_adc_k, self.cal.a_adc_c, raw)
    }

    pub fn calc_vout_dac(&self, v_mv: u32) -> u16 {
        dac_code(self.cal.v_dac_k, self.cal.v_dac_c, v_mv as f32)
    }

    pub fn calc_iout_dac(&self, i_ma: u32) -> u16 {
        dac_code(self.cal.a_dac_k, self.cal.a_dac_c, i_ma as f32)
    }

    pub fn calc_ilimit_adc(&self, i_ma: u32) -> u16 {
        raw_threshold(self.cal.a_adc_k, self.cal.a_adc_c, i_ma as f32)
    }

    pub fn calc_vlimit_adc(&self, v_mv: u32) -> u16 {
        raw_threshold(self.cal.v_adc_k, self.cal.v_adc_c, v_mv as f32)
    }

    // ---- Setpoints and limits -------------------------------------------

    /// Sets the voltage setpoint; rejects values the DAC cannot reach.
    /// Reprograms the DAC immediately when the output is live.
    pub fn set_vout(&mut self, hw: &mut dyn Hal, v_mv: u32) -> bool {
        let target = self.cal.v_dac_k * v_mv as f32 + self.cal.v_dac_c;
        if target > DAC_MAX as f32 {
            return false;
        }
        self.v_out_mv = v_mv;
        if self.enabled {
            self.vout_dac = self.calc_vout_dac(v_mv);
            hw.set_vout_dac(self.vout_dac);
        }
        true
    }

    /// Sets the current drive setpoint (the value behind the current DAC).
    pub fn set_iout(&mut self, hw: &mut dyn Hal, i_ma: u32) -> bool {
        if i_ma > self.max_current_ma {
            return false;
        }
        self.i_out_ma = i_ma;
        if self.enabled {
            self.iout_dac = self.calc_iout_dac(i_ma);
            hw.set_iout_dac(self.iout_dac);
        }
        true
    }

    /// Sets the over-current trip threshold and its raw compare value.
    pub fn set_ilimit(&mut self, i_ma: u32) -> bool {
        if i_ma > self.max_current_ma {
            return false;
        }
        self.i_limit_ma = i_ma;
        self.i_limit_raw = self.calc_ilimit_adc(i_ma);
        true
    }

    /// Sets the over-voltage trip threshold; 0 disables the compare.
    /// Rejects thresholds beyond the ADC's reach.
    pub fn set_vlimit(&mut self, v_mv: u32) -> bool {
        if v_mv == 0 {
            self.v_limit_mv = 0;
            self.v_limit_raw = LIMIT_OFF_RAW;
            return true;
        }
        let raw = self.calc_vlimit_adc(v_mv);
        if raw > DAC_MAX {
            return false;
        }
        self.v_limit_mv = v_mv;
        self.v_limit_raw = raw;
        true
    }

    // ---- Output switch --------------------------------------------------

    pub fn enable_vout(&mut self, hw: &mut dyn Hal, enable: bool) {
        if enable {
            self.vout_dac = self.calc_vout_dac(self.v_out_mv);
            self.iout_dac = self.calc_iout_dac(self.i_out_ma);
            hw.set_vout_dac(self.vout_dac);
            hw.set_iout_dac(self.iout_dac);
            hw.set_output(true);
            self.enabled = true;
        } else {
            hw.set_output(false);
            self.vout_dac = 0;
            self.iout_dac = 0;
            hw.set_vout_dac(0);
            hw.set_iout_dac(0);
            self.enabled = false;
        }
    }

    // ---- State ----------------------------------------------------------

    pub fn vout_enabled(&self) -> bool {
        self.enabled
    }

    pub fn v_out_mv(&self) -> u32 {
        self.v_out_mv
    }

    pub fn i_out_ma(&self) -> u32 {
        self.i_out_ma
    }

    pub fn i_limit_ma(&self) -> u32 {
        self.i_limit_ma
    }

    pub fn v_limit_mv(&self) -> u32 {
        self.v_limit_mv
    }

    pub fn i_limit_raw(&self) -> u16 {
        self.i_limit_raw
    }

    pub fn v_limit_raw(&self) -> u16 {
        self.v_limit_raw
    }

    pub fn vout_dac(&self) -> u16 {
        self.vout_dac
    }

    pub fn iout_dac(&self) -> u16 {
        self.iout_dac
    }

    pub fn max_current_ma(&self) -> u32 {
        self.max_current_ma
    }

    pub fn calibration(&self) -> &Calibration {
        &self.cal
    }

    /// Swaps in a new coefficient set and refreshes the raw thresholds.
    pub fn set_calibration(&mut self, cal: Calibration) {
        self.cal = cal;
        self.recompute_limits();
    }

    fn recompute_limits(&mut self) {
        self.i_limit_raw = self.calc_ilimit_adc(self.i_limit_ma);
        if self.v_limit_mv != 0 {
            self.v_limit_raw = self.calc_vlimit_adc(self.v_limit_mv);
        }
    }
}
