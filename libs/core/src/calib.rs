//! Calibration coefficient set.
//!
//! Ten K/C pairs describe the linear mapping between raw converter codes
//! and physical units: `physical = K_adc * raw + C_adc` on the measurement
//! side, `raw = K_dac * physical + C_dac` on the drive side. Values are
//! seeded from the model table, overridden by anything found in the
//! settings store at boot, and rewritten one coefficient at a time from
//! the remote calibration commands.
//!
//! Each coefficient lives in its own settings unit so a partial
//! calibration (say, current only) never disturbs the rest.

use crate::settings::{unit, SettingsStore, StoreError};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub a_adc_k: f32,
    pub a_adc_c: f32,
    pub a_dac_k: f32,
    pub a_dac_c: f32,
    pub v_adc_k: f32,
    pub v_adc_c: f32,
    pub v_dac_k: f32,
    pub v_dac_c: f32,
    pub vin_adc_k: f32,
    pub vin_adc_c: f32,
}

/// Coefficient names accepted over the wire, in report order.
pub const NAMES: [&str; 10] = [
    "A_ADC_K", "A_ADC_C", "A_DAC_K", "A_DAC_C", "V_ADC_K", "V_ADC_C", "V_DAC_K", "V_DAC_C",
    "VIN_ADC_K", "VIN_ADC_C",
];

/// Settings unit holding the named coefficient.
///
/// The unit order is historical and interleaves DAC before ADC for the
/// voltage pair; it does not match [`NAMES`].
fn unit_id(name: &str) -> Option<u32> {
    let offset = match name {
        "A_ADC_K" => 0,
        "A_ADC_C" => 1,
        "A_DAC_K" => 2,
        "A_DAC_C" => 3,
        "V_DAC_K" => 4,
        "V_DAC_C" => 5,
        "V_ADC_K" => 6,
        "V_ADC_C" => 7,
        "VIN_ADC_K" => 8,
        "VIN_ADC_C" => 9,
        _ => return None,
    };
    Some(unit::CAL_FIRST + offset)
}

/// Slopes must stay nonzero or the inverse conversions collapse.
fn acceptable(name: &str, value: f32) -> bool {
    if !value.is_finite() {
        return false;
    }
    !(name.ends_with("_K") && value == 0.0)
}

impl Calibration {
    /// Returns `defaults` with every coefficient found in `store` applied
    /// on top.
    pub fn load(defaults: &Calibration, store: &mut dyn SettingsStore) -> Calibration {
        let mut cal = *defaults;
        let fields: [(u32, &mut f32); 10] = [
            (unit::CAL_FIRST, &mut cal.a_adc_k),
            (unit::CAL_FIRST + 1, &mut cal.a_adc_c),
            (unit::CAL_FIRST + 2, &mut cal.a_dac_k),
            (unit::CAL_FIRST + 3, &mut cal.a_dac_c),
            (unit::CAL_FIRST + 4, &mut cal.v_dac_k),
            (unit::CAL_FIRST + 5, &mut cal.v_dac_c),
            (unit::CAL_FIRST + 6, &mut cal.v_adc_k),
            (unit::CAL_FIRST + 7, &mut cal.v_adc_c),
            (unit::CAL_FIRST + 8, &mut cal.vin_adc_k),
            (unit::CAL_FIRST + 9, &mut cal.vin_adc_c),
        ];
        for (id, field) in fields {
            if let Some(v) = store.load_f32(id) {
                *field = v;
            }
        }
        cal
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        let v = match name {
            "A_ADC_K" => self.a_adc_k,
            "A_ADC_C" => self.a_adc_c,
            "A_DAC_K" => self.a_dac_k,
            "A_DAC_C" => self.a_dac_c,
            "V_ADC_K" => self.v_adc_k,
            "V_ADC_C" => self.v_adc_c,
            "V_DAC_K" => self.v_dac_k,
            "V_DAC_C" => self.v_dac_c,
            "VIN_ADC_K" => self.vin_adc_k,
            "VIN_ADC_C" => self.vin_adc_c,
            _ => return None,
        };
        Some(v)
    }

    /// Applies one named coefficient, rejecting unknown names and values
    /// that would break the conversions.
    pub fn set(&mut self, name: &str, value: f32) -> bool {
        if !acceptable(name, value) {
            return false;
        }
        let field = match name {
            "A_ADC_K" => &mut self.a_adc_k,
            "A_ADC_C" => &mut self.a_adc_c,
            "A_DAC_K" => &mut self.a_dac_k,
            "A_DAC_C" => &mut self.a_dac_c,
            "V_ADC_K" => &mut self.v_adc_k,
            "V_ADC_C" => &mut self.v_adc_c,
            "V_DAC_K" => &mut self.v_dac_k,
            "V_DAC_C" => &mut self.v_dac_c,
            "VIN_ADC_K" => &mut self.vin_adc_k,
            "VIN_ADC_C" => &mut self.vin_adc_c,
            _ => return false,
        };
        *field = value;
        true
    }

    /// Persists one named coefficient to its settings unit.
    pub fn persist(store: &mut dyn SettingsStore, name: &str, value: f32) -> Result<(), StoreError> {
        match unit_id(name) {
            Some(id) => store.save_f32(id, value),
            None => Ok(()),
        }
    }

    /// Drops every stored coefficient so the model defaults apply again.
    pub fn clear(store: &mut dyn SettingsStore) -> Result<(), StoreError> {
        for id in unit::CAL_FIRST..=unit::CAL_LAST {
            store.remove(id)?;
        }
        Ok(())
    }
}
