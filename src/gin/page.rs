use crate::gin::{GIN_META_BLKNO, INVALID_BLOCK_NUMBER};
use crate::storage::{disk_page::HEADER_SIZE, GenericPageReader, PageFlags, PAGE_SIZE};
use crate::{Error, Result};

use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Meta,
    EntryInternal,
    EntryLeaf,
    DataInternal,
    DataLeaf,
    Deleted,
}

impl PageKind {
    pub fn is_leaf(self) -> bool {
        matches!(self, PageKind::EntryLeaf | PageKind::DataLeaf)
    }

    pub fn is_data(self) -> bool {
        matches!(self, PageKind::DataInternal | PageKind::DataLeaf)
    }
}

/// Run the generic page check (checksum) and decide what kind of page this
/// is from its flags, rejecting any flag combination that cannot occur on a
/// well-formed GIN page.
pub fn classify_page(buffer: &[u8; PAGE_SIZE], relation: &str, block: u32) -> Result<PageKind> {
    if block == GIN_META_BLKNO {
        return Ok(PageKind::Meta);
    }

    let reader = GenericPageReader::new(buffer);
    reader.verify_checksum(relation, block)?;

    let flags = reader.flags();
    if flags.contains(PageFlags::DELETED) {
        if !flags.contains(PageFlags::LEAF) {
            return Err(Error::structural_corruption(
                relation,
                block,
                None,
                "a deleted page must be a leaf page",
            ));
        }
        if flags.intersects(PageFlags::DATA | PageFlags::COMPRESSED) {
            return Err(Error::structural_corruption(
                relation,
                block,
                None,
                "a deleted page must not carry data or compressed flags",
            ));
        }
        return Ok(PageKind::Deleted);
    }

    let is_leaf = flags.contains(PageFlags::LEAF);
    let is_data = flags.contains(PageFlags::DATA);

    Ok(match (is_data, is_leaf) {
        (false, false) => PageKind::EntryInternal,
        (false, true) => PageKind::EntryLeaf,
        (true, false) => PageKind::DataInternal,
        (true, true) => PageKind::DataLeaf,
    })
}

pub struct MetaPageReader<'a> {
    buffer: &'a [u8; PAGE_SIZE],
}

const OFF_PENDING_HEAD: usize = HEADER_SIZE;
const OFF_PENDING_TAIL: usize = HEADER_SIZE + 4;
const OFF_N_PENDING_PAGES: usize = HEADER_SIZE + 8;

impl<'a> MetaPageReader<'a> {
    pub fn new(buffer: &'a [u8; PAGE_SIZE]) -> Self {
        Self { buffer }
    }

    pub fn pending_head(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[OFF_PENDING_HEAD..])
    }

    pub fn pending_tail(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[OFF_PENDING_TAIL..])
    }

    pub fn n_pending_pages(&self) -> u32 {
        LittleEndian::read_u32(&self.buffer[OFF_N_PENDING_PAGES..])
    }

    pub fn has_pending_list(&self) -> bool {
        self.pending_head() != INVALID_BLOCK_NUMBER
    }
}

pub struct MetaPageWriter<'a> {
    buffer: &'a mut [u8; PAGE_SIZE],
}

impl<'a> MetaPageWriter<'a> {
    pub fn new(buffer: &'a mut [u8; PAGE_SIZE]) -> Self {
        Self { buffer }
    }

    pub fn set_pending_list(&mut self, head: u32, tail: u32, n_pages: u32) -> &mut Self {
        LittleEndian::write_u32(&mut self.buffer[OFF_PENDING_HEAD..], head);
        LittleEndian::write_u32(&mut self.buffer[OFF_PENDING_TAIL..], tail);
        LittleEndian::write_u32(&mut self.buffer[OFF_N_PENDING_PAGES..], n_pages);
        self
    }
}
