use crate::storage::consts::PAGE_SIZE;
use crate::{Error, Result};

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian};
use crc::{Crc, CRC_32_ISCSI};

/// Every page on disk, GIN or otherwise, starts with this fixed-layout header.
/// Everything past `HEADER_SIZE` is interpreted by the access method.
pub const HEADER_SIZE: usize = 24;

const OFF_CHECKSUM: usize = 0;
const OFF_FLAGS: usize = 4;
const OFF_LEVEL: usize = 6;
const OFF_RIGHTLINK: usize = 8;
const OFF_LOWER: usize = 12;
const OFF_UPPER: usize = 14;

bitflags! {
    pub struct PageFlags: u16 {
        const LEAF       = 0x01;
        const DELETED    = 0x02;
        const DATA       = 0x04;
        const COMPRESSED = 0x08;
        const RIGHTMOST  = 0x10;
    }
}

static CASTAGNOLI: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// A read-only view over one page's header fields. The access-method layer
/// builds its own readers on top of this for the bytes past `HEADER_SIZE`.
pub struct GenericPageReader<'a> {
    buffer: &'a [u8; PAGE_SIZE],
}

impl<'a> GenericPageReader<'a> {
    pub fn new(buffer: &'a [u8; PAGE_SIZE]) -> Self {
        Self { buffer }
    }

    pub fn checksum(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[OFF_CHECKSUM..])
    }

    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(LittleEndian::read_u16(&self.buffer[OFF_FLAGS..]))
    }

    pub fn level(&self) -> u16 {
        LittleEndian::read_u16(&self.buffer[OFF_LEVEL..])
    }

    pub fn rightlink(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[OFF_RIGHTLINK..])
    }

    pub fn lower(&self) -> u16 {
        LittleEndian::read_u16(&self.buffer[OFF_LOWER..])
    }

    pub fn upper(&self) -> u16 {
        LittleEndian::read_u16(&self.buffer[OFF_UPPER..])
    }

    pub fn body(&self) -> &'a [u8] {
        &self.buffer[HEADER_SIZE..]
    }

    pub fn computed_checksum(&self) -> u32 {
        CASTAGNOLI.checksum(&self.buffer[OFF_FLAGS..])
    }

    /// Verify the page's stored checksum against its contents. A page that
    /// was never written (all zero) is left to the caller to classify; this
    /// only reports a mismatch between what's stored and what's there.
    pub fn verify_checksum(&self, relation: &str, block: u32) -> Result<()> {
        if self.checksum() != self.computed_checksum() {
            return Err(Error::structural_corruption(
                relation,
                block,
                Some(OFF_CHECKSUM),
                "page checksum does not match its contents",
            ));
        }
        Ok(())
    }
}

pub struct GenericPageWriter<'a> {
    buffer: &'a mut [u8; PAGE_SIZE],
}

impl<'a> GenericPageWriter<'a> {
    pub fn new(buffer: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { buffer }
    }

    pub fn set_flags(&mut self, flags: PageFlags) -> &mut Self {
        LittleEndian::write_u16(&mut self.buffer[OFF_FLAGS..], flags.bits());
        self
    }

    pub fn set_level(&mut self, level: u16) -> &mut Self {
        LittleEndian::write_u16(&mut self.buffer[OFF_LEVEL..], level);
        self
    }

    pub fn set_rightlink(&mut self, rightlink: u32) -> &mut Self {
        LittleEndian::write_u32(&mut self.buffer[OFF_RIGHTLINK..], rightlink);
        self
    }

    pub fn set_lower(&mut self, lower: u16) -> &mut Self {
        LittleEndian::write_u16(&mut self.buffer[OFF_LOWER..], lower);
        self
    }

    pub fn set_upper(&mut self, upper: u16) -> &mut Self {
        LittleEndian::write_u16(&mut self.buffer[OFF_UPPER..], upper);
        self
    }

    pub fn body_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[HEADER_SIZE..]
    }

    /// Recompute and store the checksum; call last, once the rest of the
    /// page has been filled in.
    pub fn finish_checksum(&mut self) {
        let checksum = CASTAGNOLI.checksum(&self.buffer[OFF_FLAGS..]);
        LittleEndian::write_u32(&mut self.buffer[OFF_CHECKSUM..], checksum);
    }
}
