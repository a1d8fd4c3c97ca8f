//! Settings persistence seam.
//!
//! Everything the core keeps across power cycles goes through
//! [`SettingsStore`], a dyn-safe facade over the wear-leveled unit store.
//! The production implementation is [`powerlynx_past::Past`]; host tests
//! swap in the RAM-backed flash mock behind the same trait.
//!
//! Missing units are routine (first boot, cleared calibration) and load as
//! `None`; callers fall back to compiled defaults rather than fail.

use embedded_storage::nor_flash::NorFlash;
use powerlynx_past as past;

/// Unit ids baked into the on-flash format. Never renumber.
pub mod unit {
    /// Packed `I_limit << 16 | V_out` saved by the constant-voltage mode.
    pub const POWER: u32 = 1;
    /// Display inversion flag, owned by the display layer.
    pub const TFT_INVERSION: u32 = 2;
    /// Git hash of the bootloader build, written by the bootloader.
    pub const BOOT_GIT_HASH: u32 = 3;
    /// Git hash of the running firmware, rewritten at boot when it changes.
    pub const APP_GIT_HASH: u32 = 4;
    /// First of ten consecutive f32 calibration coefficient units.
    ///
    /// Order: A_ADC_K, A_ADC_C, A_DAC_K, A_DAC_C, V_DAC_K, V_DAC_C,
    /// V_ADC_K, V_ADC_C, VIN_ADC_K, VIN_ADC_C.
    pub const CAL_FIRST: u32 = 5;
    /// Last calibration coefficient unit.
    pub const CAL_LAST: u32 = 14;
    /// Backlight percentage as u32.
    pub const TFT_BRIGHTNESS: u32 = 15;
    /// Packed `V_limit << 16 | I_out` saved by the constant-current mode.
    pub const CC_SETTINGS: u32 = 16;
    /// Packed `I_limit << 16 | V_out` saved by the current-limit mode.
    pub const CL_SETTINGS: u32 = 17;
    /// Waveform, duty, frequency, amplitude and offset of the generator.
    pub const GEN_SETTINGS: u32 = 18;
    /// Marker left behind while a firmware upgrade is in flight.
    pub const UPGRADE_STARTED: u32 = 0xff;
}

/// Write-side failure of the settings store.
///
/// Reads have no error surface: anything that prevents a load reads as
/// "not present" and the caller's default applies.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not fit, even after collection.
    Full,
    /// The underlying flash failed to erase or program.
    Io,
}

/// Dyn-safe persistence facade handed to screens and modes.
pub trait SettingsStore {
    /// Copies the unit into `out`, returning its length, or `None` when the
    /// unit is absent, larger than `out`, or unreadable.
    fn load(&mut self, id: u32, out: &mut [u8]) -> Option<usize>;

    /// Writes (or overwrites) the unit.
    fn save(&mut self, id: u32, data: &[u8]) -> Result<(), StoreError>;

    /// Drops the unit. Removing an absent unit succeeds.
    fn remove(&mut self, id: u32) -> Result<(), StoreError>;

    fn load_u32(&mut self, id: u32) -> Option<u32> {
        let mut buf = [0u8; 4];
        match self.load(id, &mut buf) {
            Some(4) => Some(u32::from_le_bytes(buf)),
            _ => None,
        }
    }

    fn save_u32(&mut self, id: u32, value: u32) -> Result<(), StoreError> {
        self.save(id, &value.to_le_bytes())
    }

    fn load_f32(&mut self, id: u32) -> Option<f32> {
        self.load_u32(id).map(f32::from_bits)
    }

    fn save_f32(&mut self, id: u32, value: f32) -> Result<(), StoreError> {
        self.save_u32(id, value.to_bits())
    }
}

impl<F: NorFlash> SettingsStore for past::Past<F> {
    fn load(&mut self, id: u32, out: &mut [u8]) -> Option<usize> {
        self.read_unit(id, out).ok()
    }

    fn save(&mut self, id: u32, data: &[u8]) -> Result<(), StoreError> {
        self.write_unit(id, data).map_err(|e| match e {
            past::Error::Full => StoreError::Full,
            _ => StoreError::Io,
        })
    }

    fn remove(&mut self, id: u32) -> Result<(), StoreError> {
        match self.erase_unit(id) {
            Ok(()) | Err(past::Error::NotFound) => Ok(()),
            Err(past::Error::Full) => Err(StoreError::Full),
            Err(_) => Err(StoreError::Io),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerlynx_past::mock::MemFlash;
    use powerlynx_past::Past;

    fn store() -> Past<MemFlash<4096>> {
        let mut past = Past::new(MemFlash::new());
        past.init().unwrap();
        past
    }

    #[test]
    fn u32_units_survive_a_roundtrip() {
        let mut store = store();
        store.save_u32(unit::TFT_BRIGHTNESS, 85).unwrap();
        assert_eq!(store.load_u32(unit::TFT_BRIGHTNESS), Some(85));
    }

    #[test]
    fn f32_units_are_bit_exact() {
        let mut store = store();
        store.save_f32(unit::CAL_FIRST, 1.713).unwrap();
        assert_eq!(store.load_f32(unit::CAL_FIRST), Some(1.713));
    }

    #[test]
    fn missing_units_load_as_none() {
        let mut store = store();
        assert_eq!(store.load_u32(unit::POWER), None);
        let mut buf = [0u8; 16];
        assert_eq!(SettingsStore::load(&mut store, unit::POWER, &mut buf), None);
    }

    #[test]
    fn wrong_sized_unit_does_not_parse_as_u32() {
        let mut store = store();
        store.save(unit::POWER, &[1, 2]).unwrap();
        assert_eq!(store.load_u32(unit::POWER), None);
    }

    #[test]
    fn removing_an_absent_unit_is_fine() {
        let mut store = store();
        assert_eq!(store.remove(unit::GEN_SETTINGS), Ok(()));
        store.save_u32(unit::GEN_SETTINGS, 7).unwrap();
        assert_eq!(store.remove(unit::GEN_SETTINGS), Ok(()));
        assert_eq!(store.load_u32(unit::GEN_SETTINGS), None);
    }
}
