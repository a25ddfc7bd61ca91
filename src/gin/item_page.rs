use crate::storage::{disk_page::HEADER_SIZE, PAGE_SIZE};
use crate::{Error, Result};

use byteorder::{ByteOrder, LittleEndian};

/// Size in bytes of one line-pointer slot: (offset, length), both `u16`.
const ITEM_ID_SIZE: usize = 4;

/// A read view over an entry-tree page's line-pointer array and tuple data,
/// generalizing the same slotted-page idiom the teacher uses for heap pages:
/// fixed-size pointers grow up from the header, variable-length tuples grow
/// down from the end of the page, and `lower`/`upper` mark where each region
/// currently ends.
pub struct ItemPageReader<'a> {
    buffer: &'a [u8; PAGE_SIZE],
    lower: usize,
    upper: usize,
}

impl<'a> ItemPageReader<'a> {
    pub fn new(buffer: &'a [u8; PAGE_SIZE], lower: u16, upper: u16) -> Self {
        Self {
            buffer,
            lower: lower as usize,
            upper: upper as usize,
        }
    }

    pub fn num_items(&self) -> usize {
        (self.lower.saturating_sub(HEADER_SIZE)) / ITEM_ID_SIZE
    }

    fn item_id(&self, index: usize) -> (usize, usize) {
        let slot = HEADER_SIZE + index * ITEM_ID_SIZE;
        let offset = LittleEndian::read_u16(&self.buffer[slot..]) as usize;
        let length = LittleEndian::read_u16(&self.buffer[slot + 2..]) as usize;
        (offset, length)
    }

    /// The raw bytes for the tuple at `index`, or a corruption error if the
    /// line pointer does not describe a slice that fits inside the page's
    /// declared data region.
    pub fn item(&self, relation: &str, block: u32, index: usize) -> Result<&'a [u8]> {
        if index >= self.num_items() {
            return Err(Error::structural_corruption(
                relation,
                block,
                None,
                "item index out of range",
            ));
        }
        let (offset, length) = self.item_id(index);
        if offset < self.upper || offset + length > PAGE_SIZE || offset < HEADER_SIZE {
            return Err(Error::structural_corruption(
                relation,
                block,
                Some(HEADER_SIZE + index * ITEM_ID_SIZE),
                "line pointer does not describe a valid slice of the page",
            ));
        }
        Ok(&self.buffer[offset..offset + length])
    }

    pub fn lower(&self) -> usize {
        self.lower
    }

    pub fn upper(&self) -> usize {
        self.upper
    }
}

/// A write view used only by the test harness to build synthetic pages.
pub struct ItemPageWriter<'a> {
    buffer: &'a mut [u8; PAGE_SIZE],
    lower: usize,
    upper: usize,
}

impl<'a> ItemPageWriter<'a> {
    pub fn new(buffer: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self {
            buffer,
            lower: HEADER_SIZE,
            upper: PAGE_SIZE,
        }
    }

    /// Append one tuple, writing its line pointer and copying its bytes into
    /// the data region. Returns the new `(lower, upper)` for the caller to
    /// store in the page header.
    pub fn add_item(&mut self, data: &[u8]) -> (u16, u16) {
        self.upper -= data.len();
        self.buffer[self.upper..self.upper + data.len()].copy_from_slice(data);

        let slot = self.lower;
        LittleEndian::write_u16(&mut self.buffer[slot..], self.upper as u16);
        LittleEndian::write_u16(&mut self.buffer[slot + 2..], data.len() as u16);
        self.lower += ITEM_ID_SIZE;

        (self.lower as u16, self.upper as u16)
    }
}
