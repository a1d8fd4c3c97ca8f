#![no_std]

//! Wear-leveled parameter storage over two raw flash blocks.
//!
//! The backing region is split into two equal blocks used in a ping-pong
//! arrangement. Each block starts with an 8-byte header:
//!
//! ```text
//! +----------+-------------+
//! | magic u32| counter u32 |
//! +----------+-------------+
//! ```
//!
//! Unit records follow, appended at 4-byte alignment:
//!
//! ```text
//! +--------+---------+---------+---------+
//! | id u32 | len u32 | data... | pad 0xFF|
//! +--------+---------+---------+---------+
//! ```
//!
//! Updates append a new copy; the highest-offset record for an id is the
//! live one. A zero-length record is a tombstone. When a write does not
//! fit, live records are copied into the other block, its header is
//! written last (the commit point) and the old block is erased. Mount
//! picks the block whose header carries the circularly greater counter,
//! so a power cut at any byte leaves either the old or the new state.

#[cfg(test)]
extern crate std;

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// "Past" in ASCII, little-endian on flash.
const MAGIC: u32 = 0x5061_7374;
const HEADER_SIZE: u32 = 8;
const RECORD_HEADER: u32 = 8;
/// Erased-flash sentinel; also a reserved unit id.
const ERASED: u32 = 0xFFFF_FFFF;
/// Free space below this triggers collection in [`Past::gc_check`].
const GC_LOW_WATER: u32 = 32;
const COPY_CHUNK: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No live unit with the requested id.
    NotFound,
    /// Ids 0 and 0xFFFFFFFF are reserved sentinels.
    InvalidId,
    /// Caller buffer cannot hold the unit data.
    BufferTooSmall,
    /// The record does not fit, even after collection.
    Full,
    /// Operation on a store that is not mounted.
    NotMounted,
    /// Underlying flash erase/program failure.
    Flash(NorFlashErrorKind),
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::NotFound => defmt::write!(f, "NotFound"),
            Error::InvalidId => defmt::write!(f, "InvalidId"),
            Error::BufferTooSmall => defmt::write!(f, "BufferTooSmall"),
            Error::Full => defmt::write!(f, "Full"),
            Error::NotMounted => defmt::write!(f, "NotMounted"),
            Error::Flash(kind) => defmt::write!(f, "Flash({})", defmt::Debug2Format(kind)),
        }
    }
}

fn flash_err<E: NorFlashError>(e: E) -> Error {
    Error::Flash(e.kind())
}

const fn align4(n: u32) -> u32 {
    (n + 3) & !3
}

/// Persistent application storage over a dedicated flash region.
///
/// The store owns the whole region handed to it; the lower half is block 0
/// and the upper half block 1. Call [`Past::init`] before anything else.
pub struct Past<F> {
    flash: F,
    block_len: u32,
    active: u32,
    counter: u32,
    /// Absolute offset of the next free byte in the active block.
    cursor: u32,
    valid: bool,
}

impl<F: NorFlash> Past<F> {
    pub fn new(flash: F) -> Self {
        let block_len = (flash.capacity() / 2) as u32;
        debug_assert!(block_len as usize % F::ERASE_SIZE == 0);
        debug_assert!(F::WRITE_SIZE <= 4);
        Past {
            flash,
            block_len,
            active: 0,
            counter: 0,
            cursor: 0,
            valid: false,
        }
    }

    /// Mount the store. Scans both block headers, recovers from an
    /// interrupted collection, and formats the region when neither block
    /// is valid. Returns whether prior data was found.
    pub fn init(&mut self) -> Result<bool, Error> {
        self.valid = false;
        let a = self.header(0)?;
        let b = self.header(1)?;
        let (active, counter) = match (a, b) {
            (None, None) => {
                self.format()?;
                return Ok(false);
            }
            (Some(ca), None) => (0, ca),
            (None, Some(cb)) => (1, cb),
            (Some(ca), Some(cb)) => {
                // Both valid only after an interrupted collection. Circular
                // compare, then drop the stale side.
                if ca.wrapping_sub(cb) as i32 > 0 {
                    self.erase_block(1)?;
                    (0, ca)
                } else {
                    self.erase_block(0)?;
                    (1, cb)
                }
            }
        };
        self.active = active;
        self.counter = counter;
        self.cursor = self.scan_end(active)?;
        self.valid = true;
        Ok(true)
    }

    /// Copy the live data for `id` into `out`, returning its length.
    pub fn read_unit(&mut self, id: u32, out: &mut [u8]) -> Result<usize, Error> {
        if !self.valid {
            return Err(Error::NotMounted);
        }
        match self.find_live(id)? {
            None | Some((_, 0)) => Err(Error::NotFound),
            Some((data_off, len)) => {
                let len = len as usize;
                if out.len() < len {
                    return Err(Error::BufferTooSmall);
                }
                self.flash.read(data_off, &mut out[..len]).map_err(flash_err)?;
                Ok(len)
            }
        }
    }

    /// Append a new copy of `id`, superseding any earlier one. Collects
    /// the block first when the record does not fit.
    pub fn write_unit(&mut self, id: u32, data: &[u8]) -> Result<(), Error> {
        if !self.valid {
            return Err(Error::NotMounted);
        }
        if id == 0 || id == ERASED {
            return Err(Error::InvalidId);
        }
        let needed = RECORD_HEADER + align4(data.len() as u32);
        self.make_room(needed)?;
        let at = self.cursor;
        self.program_record(at, id, data)?;
        self.cursor += needed;
        Ok(())
    }

    /// Tombstone `id` so reads fail and the next collection drops it.
    /// Fails with [`Error::NotFound`] if `id` is not live.
    pub fn erase_unit(&mut self, id: u32) -> Result<(), Error> {
        if !self.valid {
            return Err(Error::NotMounted);
        }
        if id == 0 || id == ERASED {
            return Err(Error::InvalidId);
        }
        match self.find_live(id)? {
            None | Some((_, 0)) => Err(Error::NotFound),
            Some(_) => {
                self.make_room(RECORD_HEADER)?;
                let at = self.cursor;
                self.program_record(at, id, &[])?;
                self.cursor += RECORD_HEADER;
                Ok(())
            }
        }
    }

    /// Collect when free space is running low. Returns whether a
    /// collection ran.
    pub fn gc_check(&mut self) -> Result<bool, Error> {
        if !self.valid {
            return Err(Error::NotMounted);
        }
        if self.free_space() as u32 >= GC_LOW_WATER {
            return Ok(false);
        }
        self.gc()?;
        Ok(true)
    }

    /// Copy live records into the other block and switch to it. The new
    /// header is written only after every record landed, so an interrupted
    /// pass is recovered by [`Past::init`] as either the old or the new
    /// state, never a mix.
    pub fn gc(&mut self) -> Result<(), Error> {
        if !self.valid {
            return Err(Error::NotMounted);
        }
        let src = self.active;
        let dst = src ^ 1;
        let src_base = self.block_base(src);
        self.erase_block(dst)?;

        let mut dst_off = self.block_base(dst) + HEADER_SIZE;
        let mut off = src_base + HEADER_SIZE;
        while off < self.cursor {
            let id = self.read_u32_at(off)?;
            let len = self.read_u32_at(off + 4)?;
            let size = RECORD_HEADER + align4(len);
            if len > 0 && !self.superseded(id, off + size)? {
                self.copy_record(off, dst_off, id, len)?;
                dst_off += size;
            }
            off += size;
        }

        let counter = self.counter.wrapping_add(1);
        self.write_header(dst, counter)?;
        // Commit point: from here a remount picks the new block.
        self.active = dst;
        self.counter = counter;
        self.cursor = dst_off;
        self.erase_block(src)?;
        Ok(())
    }

    /// Erase both blocks and start over empty. Destroys all stored data.
    pub fn format(&mut self) -> Result<(), Error> {
        self.valid = false;
        self.erase_block(0)?;
        self.erase_block(1)?;
        self.write_header(0, 1)?;
        self.active = 0;
        self.counter = 1;
        self.cursor = HEADER_SIZE;
        self.valid = true;
        Ok(())
    }

    /// Bytes still appendable in the active block.
    pub fn free_space(&self) -> usize {
        (self.block_base(self.active) + self.block_len - self.cursor) as usize
    }

    /// Collection generation of the active block.
    pub fn generation(&self) -> u32 {
        self.counter
    }

    /// Give the flash back, e.g. to hand it to another boot stage.
    pub fn release(self) -> F {
        self.flash
    }

    fn block_base(&self, block: u32) -> u32 {
        block * self.block_len
    }

    fn header(&mut self, block: u32) -> Result<Option<u32>, Error> {
        let mut buf = [0u8; 8];
        self.flash
            .read(self.block_base(block), &mut buf)
            .map_err(flash_err)?;
        let magic = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if magic != MAGIC {
            return Ok(None);
        }
        Ok(Some(u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]])))
    }

    /// Walk records from the block start until erased flash or a record
    /// that cannot be right (id 0, length past the block end). The store
    /// is truncated at the first such record; a later write over non-erased
    /// bytes then fails and the caller reformats.
    fn scan_end(&mut self, block: u32) -> Result<u32, Error> {
        let base = self.block_base(block);
        let end = base + self.block_len;
        let mut off = base + HEADER_SIZE;
        while off + RECORD_HEADER <= end {
            let id = self.read_u32_at(off)?;
            if id == ERASED || id == 0 {
                break;
            }
            let len = self.read_u32_at(off + 4)?;
            if len > self.block_len || off + RECORD_HEADER + align4(len) > end {
                break;
            }
            off += RECORD_HEADER + align4(len);
        }
        Ok(off)
    }

    /// Highest-offset record for `id`, as `(data offset, length)`.
    fn find_live(&mut self, id: u32) -> Result<Option<(u32, u32)>, Error> {
        let mut off = self.block_base(self.active) + HEADER_SIZE;
        let mut found = None;
        while off < self.cursor {
            let rid = self.read_u32_at(off)?;
            let len = self.read_u32_at(off + 4)?;
            if rid == id {
                found = Some((off + RECORD_HEADER, len));
            }
            off += RECORD_HEADER + align4(len);
        }
        Ok(found)
    }

    /// Whether any record at or past `from` carries the same id.
    fn superseded(&mut self, id: u32, from: u32) -> Result<bool, Error> {
        let mut off = from;
        while off < self.cursor {
            let rid = self.read_u32_at(off)?;
            let len = self.read_u32_at(off + 4)?;
            if rid == id {
                return Ok(true);
            }
            off += RECORD_HEADER + align4(len);
        }
        Ok(false)
    }

    fn make_room(&mut self, needed: u32) -> Result<(), Error> {
        if needed > self.block_len - HEADER_SIZE {
            return Err(Error::Full);
        }
        let end = self.block_base(self.active) + self.block_len;
        if self.cursor + needed <= end {
            return Ok(());
        }
        self.gc()?;
        let end = self.block_base(self.active) + self.block_len;
        if self.cursor + needed > end {
            return Err(Error::Full);
        }
        Ok(())
    }

    fn program_record(&mut self, at: u32, id: u32, data: &[u8]) -> Result<(), Error> {
        let mut hdr = [0u8; 8];
        hdr[..4].copy_from_slice(&id.to_le_bytes());
        hdr[4..].copy_from_slice(&(data.len() as u32).to_le_bytes());
        self.flash.write(at, &hdr).map_err(flash_err)?;

        let full = data.len() & !3;
        if full > 0 {
            self.flash
                .write(at + RECORD_HEADER, &data[..full])
                .map_err(flash_err)?;
        }
        let tail = &data[full..];
        if !tail.is_empty() {
            let mut word = [0xFFu8; 4];
            word[..tail.len()].copy_from_slice(tail);
            self.flash
                .write(at + RECORD_HEADER + full as u32, &word)
                .map_err(flash_err)?;
        }
        Ok(())
    }

    fn copy_record(&mut self, src_off: u32, dst_off: u32, id: u32, len: u32) -> Result<(), Error> {
        let mut hdr = [0u8; 8];
        hdr[..4].copy_from_slice(&id.to_le_bytes());
        hdr[4..].copy_from_slice(&len.to_le_bytes());
        self.flash.write(dst_off, &hdr).map_err(flash_err)?;

        let mut remaining = len;
        let mut s = src_off + RECORD_HEADER;
        let mut d = dst_off + RECORD_HEADER;
        let mut buf = [0xFFu8; COPY_CHUNK];
        while remaining > 0 {
            let n = (remaining as usize).min(COPY_CHUNK);
            self.flash.read(s, &mut buf[..n]).map_err(flash_err)?;
            let m = align4(n as u32) as usize;
            for b in &mut buf[n..m] {
                *b = 0xFF;
            }
            self.flash.write(d, &buf[..m]).map_err(flash_err)?;
            s += n as u32;
            d += m as u32;
            remaining -= n as u32;
        }
        Ok(())
    }

    fn write_header(&mut self, block: u32, counter: u32) -> Result<(), Error> {
        let mut hdr = [0u8; 8];
        hdr[..4].copy_from_slice(&MAGIC.to_le_bytes());
        hdr[4..].copy_from_slice(&counter.to_le_bytes());
        self.flash
            .write(self.block_base(block), &hdr)
            .map_err(flash_err)
    }

    fn erase_block(&mut self, block: u32) -> Result<(), Error> {
        let base = self.block_base(block);
        self.flash
            .erase(base, base + self.block_len)
            .map_err(flash_err)
    }

    fn read_u32_at(&mut self, at: u32) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.flash.read(at, &mut buf).map_err(flash_err)?;
        Ok(u32::from_le_bytes(buf))
    }
}
