//! RAM-backed flash double with NOR programming rules.
//!
//! Programming may only clear bits and erasing works on whole sectors, so
//! storage code that forgets an erase fails here the same way it would on
//! the real part. A mutation budget simulates power loss: once spent, every
//! further programmed or erased byte fails, leaving earlier bytes applied.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFlashError {
    Bounds,
    Unaligned,
    /// Programming would set a bit on a byte that is not erased.
    NotErased,
    /// The mutation budget ran out mid-operation.
    PowerLoss,
}

impl NorFlashError for MockFlashError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            MockFlashError::Bounds => NorFlashErrorKind::OutOfBounds,
            MockFlashError::Unaligned => NorFlashErrorKind::NotAligned,
            MockFlashError::NotErased | MockFlashError::PowerLoss => NorFlashErrorKind::Other,
        }
    }
}

#[derive(Clone)]
pub struct MemFlash<const SIZE: usize> {
    mem: [u8; SIZE],
    budget: Option<usize>,
}

impl<const SIZE: usize> MemFlash<SIZE> {
    pub const fn new() -> Self {
        MemFlash {
            mem: [0xFF; SIZE],
            budget: None,
        }
    }

    /// Allow `bytes` more mutated bytes, then fail every mutation.
    pub fn power_cut_after(&mut self, bytes: usize) {
        self.budget = Some(bytes);
    }

    pub fn clear_power_cut(&mut self) {
        self.budget = None;
    }

    pub fn raw(&self) -> &[u8] {
        &self.mem
    }

    fn spend(&mut self) -> Result<(), MockFlashError> {
        match &mut self.budget {
            Some(0) => Err(MockFlashError::PowerLoss),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<const SIZE: usize> Default for MemFlash<SIZE> {
    fn default() -> Self {
        MemFlash::new()
    }
}

impl<const SIZE: usize> ErrorType for MemFlash<SIZE> {
    type Error = MockFlashError;
}

impl<const SIZE: usize> ReadNorFlash for MemFlash<SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        let end = offset.checked_add(bytes.len()).ok_or(MockFlashError::Bounds)?;
        if end > SIZE {
            return Err(MockFlashError::Bounds);
        }
        bytes.copy_from_slice(&self.mem[offset..end]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> NorFlash for MemFlash<SIZE> {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = 512;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        let (from, to) = (from as usize, to as usize);
        if from % Self::ERASE_SIZE != 0 || to % Self::ERASE_SIZE != 0 {
            return Err(MockFlashError::Unaligned);
        }
        if from > to || to > SIZE {
            return Err(MockFlashError::Bounds);
        }
        for i in from..to {
            self.spend()?;
            self.mem[i] = 0xFF;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let offset = offset as usize;
        if offset % Self::WRITE_SIZE != 0 || bytes.len() % Self::WRITE_SIZE != 0 {
            return Err(MockFlashError::Unaligned);
        }
        let end = offset.checked_add(bytes.len()).ok_or(MockFlashError::Bounds)?;
        if end > SIZE {
            return Err(MockFlashError::Bounds);
        }
        for (i, &b) in bytes.iter().enumerate() {
            let old = self.mem[offset + i];
            if b & !old != 0 {
                return Err(MockFlashError::NotErased);
            }
            self.spend()?;
            self.mem[offset + i] = b;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programming_can_only_clear_bits() {
        let mut flash: MemFlash<1024> = MemFlash::new();
        flash.write(0, &[0x0F, 0x00, 0xAA, 0xFF]).unwrap();
        // Same value again is a no-op program.
        flash.write(0, &[0x0F, 0x00, 0xAA, 0xFF]).unwrap();
        // Clearing more bits is allowed.
        flash.write(0, &[0x0E, 0x00, 0xAA, 0xFF]).unwrap();
        // Setting a bit back requires an erase.
        assert_eq!(
            flash.write(0, &[0x0F, 0x00, 0xAA, 0xFF]),
            Err(MockFlashError::NotErased)
        );
        flash.erase(0, 512).unwrap();
        flash.write(0, &[0x0F, 0x00, 0xAA, 0xFF]).unwrap();
    }

    #[test]
    fn alignment_is_enforced() {
        let mut flash: MemFlash<1024> = MemFlash::new();
        assert_eq!(flash.write(2, &[0; 4]), Err(MockFlashError::Unaligned));
        assert_eq!(flash.write(0, &[0; 3]), Err(MockFlashError::Unaligned));
        assert_eq!(flash.erase(0, 100), Err(MockFlashError::Unaligned));
    }

    #[test]
    fn bounds_are_enforced() {
        let mut flash: MemFlash<1024> = MemFlash::new();
        assert_eq!(flash.write(1024, &[0; 4]), Err(MockFlashError::Bounds));
        assert_eq!(flash.read(1022, &mut [0; 4]), Err(MockFlashError::Bounds));
        assert_eq!(flash.erase(512, 1536), Err(MockFlashError::Bounds));
    }

    #[test]
    fn power_cut_applies_a_prefix_of_the_write() {
        let mut flash: MemFlash<1024> = MemFlash::new();
        flash.power_cut_after(3);
        assert_eq!(
            flash.write(0, &[0, 0, 0, 0, 0, 0, 0, 0]),
            Err(MockFlashError::PowerLoss)
        );
        assert_eq!(&flash.raw()[..8], &[0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        // Reads do not consume budget.
        flash.read(0, &mut [0u8; 8]).unwrap();
        flash.clear_power_cut();
        flash.write(4, &[0, 0, 0, 0]).unwrap();
    }
}
