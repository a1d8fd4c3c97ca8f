//! Compiled per-model hardware description.
//!
//! One [`ModelConfig`] per supported supply, selected by the firmware
//! binary at build time. The calibration coefficients here are factory
//! defaults; field calibration stored in settings overrides them at boot.

use crate::calib::Calibration;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
    pub name: &'static str,
    /// Hard output current ceiling in mA.
    pub max_current_ma: u32,
    /// Integer digits of the current display.
    pub current_digits: u8,
    /// Decimal digits of the current display.
    pub current_decimals: u8,
    /// Current ADC reading at zero output current.
    pub iout_golden_adc: u16,
    /// Margin subtracted from V_in when deriving the settable voltage
    /// ceiling; the buck stage cannot regulate closer to its input.
    pub vout_dropout_mv: u32,
    pub cal: Calibration,
}

impl ModelConfig {
    /// Highest settable output voltage for the given input voltage.
    pub fn max_vout_mv(&self, v_in_mv: u32) -> u32 {
        v_in_mv.saturating_sub(self.vout_dropout_mv)
    }
}

pub const DPS5005: ModelConfig = ModelConfig {
    name: "DPS5005",
    max_current_ma: 5000,
    current_digits: 1,
    current_decimals: 3,
    iout_golden_adc: 0x45,
    vout_dropout_mv: 1500,
    cal: Calibration {
        a_adc_k: 1.713,
        a_adc_c: -118.51,
        a_dac_k: 0.652,
        a_dac_c: 288.611,
        v_adc_k: 13.164,
        v_adc_c: -100.751,
        v_dac_k: 0.072,
        v_dac_c: 1.85,
        vin_adc_k: 16.746,
        vin_adc_c: 64.112,
    },
};

pub const DPS5015: ModelConfig = ModelConfig {
    name: "DPS5015",
    max_current_ma: 15000,
    current_digits: 2,
    current_decimals: 2,
    iout_golden_adc: 59,
    vout_dropout_mv: 1500,
    cal: Calibration {
        a_adc_k: 6.8403,
        a_adc_c: -394.06,
        a_dac_k: 0.166666,
        a_dac_c: 261.6666,
        v_adc_k: 13.012,
        v_adc_c: -125.732,
        v_dac_k: 0.072266,
        v_dac_c: 4.444777,
        vin_adc_k: 16.746,
        vin_adc_c: 64.112,
    },
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vout_ceiling_tracks_the_input() {
        assert_eq!(DPS5005.max_vout_mv(12_000), 10_500);
        assert_eq!(DPS5005.max_vout_mv(1_000), 0);
    }
}
