//! Hardware collaborator seam.
//!
//! The core never touches registers; everything with a pin or a peripheral
//! behind it goes through [`Hal`], implemented by the firmware binary and
//! by [`crate::mock::MockHal`] on the host.

use crate::func::gen::WaveformProgram;
use crate::uui::Item;

/// One simultaneous sample of the three measurement channels, raw 12-bit
/// codes straight from the converter.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AdcReading {
    pub vin: u16,
    pub vout: u16,
    pub iout: u16,
}

pub trait Hal {
    /// Latest averaged ADC sample.
    fn read_adc(&mut self) -> AdcReading;

    /// Programs the output voltage DAC.
    fn set_vout_dac(&mut self, code: u16);

    /// Programs the output current DAC.
    fn set_iout_dac(&mut self, code: u16);

    /// Switches the output stage.
    fn set_output(&mut self, on: bool);

    /// Sets the display backlight, 0..=100 percent.
    fn set_brightness(&mut self, percent: u8);

    /// Hands a compiled waveform to the sample-rate interrupt.
    fn start_waveform(&mut self, program: WaveformProgram);

    /// Stops waveform playback and releases the program.
    fn stop_waveform(&mut self);

    /// Writes the boot handoff area and restarts into the bootloader.
    /// Does not return on real hardware.
    fn stage_upgrade(&mut self, chunk_size: u16, crc: u16);

    /// Monotonic millisecond clock, wrapping.
    fn millis(&mut self) -> u32;

    /// Queues a complete wire frame for transmission to the host.
    fn tx(&mut self, frame: &[u8]);

    /// Renders one UI item of the named screen.
    fn draw_item(&mut self, screen: &'static str, index: usize, item: &Item);
}
