#![cfg(test)]

use crate::gin::item_page::ItemPageWriter;
use crate::gin::tuple::{encode_entry_tuple, EntryTuple};
use crate::gin::{GIN_ROOT_BLKNO, INVALID_BLOCK_NUMBER};
use crate::storage::disk_page::{GenericPageWriter, PageFlags};
use crate::storage::{PageBuffer, StorageManager, PAGE_SIZE};

use std::fs::OpenOptions;
use std::io::Write;
use tempfile::TempDir;

pub fn get_temp_smgr() -> (StorageManager, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let smgr = StorageManager::new(dir.path());
    (smgr, dir)
}

pub struct FakeIndexBuilder {
    dir: TempDir,
    pages: Vec<PageBuffer>,
}

impl FakeIndexBuilder {
    /// Start a new index image with the metapage and an empty leaf root
    /// already in place, as `GinNewIndex` would leave it.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = Self {
            dir,
            pages: vec![empty_meta_page(), [0u8; PAGE_SIZE]],
        };

        let mut root = [0u8; PAGE_SIZE];
        {
            let mut writer = GenericPageWriter::new(&mut root);
            writer
                .set_flags(PageFlags::LEAF | PageFlags::RIGHTMOST)
                .set_level(0)
                .set_rightlink(INVALID_BLOCK_NUMBER)
                .set_lower(crate::storage::HEADER_SIZE as u16)
                .set_upper(PAGE_SIZE as u16);
            writer.finish_checksum();
        }
        builder.pages[GIN_ROOT_BLKNO as usize] = root;
        builder
    }

    pub fn block_count(&self) -> usize {
        self.pages.len()
    }

    pub fn push_page(&mut self, page: PageBuffer) -> u32 {
        self.pages.push(page);
        (self.pages.len() - 1) as u32
    }

    pub fn set_page(&mut self, block: u32, page: PageBuffer) {
        self.pages[block as usize] = page;
    }

    /// Replace the root leaf page with one holding the given entry tuples,
    /// in order.
    pub fn set_root_leaf_entries(&mut self, entries: &[EntryTuple]) {
        let page = build_leaf_page(entries, INVALID_BLOCK_NUMBER, true);
        self.pages[GIN_ROOT_BLKNO as usize] = page;
    }

    pub fn finish(self, name: &str) -> (StorageManager, TempDir) {
        let smgr = StorageManager::new(self.dir.path());
        smgr.ensure_dir().unwrap();

        let path = self.dir.path().join(name);
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path).unwrap();
        for page in &self.pages {
            file.write_all(page).unwrap();
        }

        (smgr, self.dir)
    }
}

/// Build a standalone leaf page from a list of already-constructed entry
/// tuples, for tests that only need one page rather than a whole index.
pub fn build_leaf_page(entries: &[EntryTuple], rightlink: u32, rightmost: bool) -> PageBuffer {
    let mut page = [0u8; PAGE_SIZE];
    let (lower, upper) = {
        let mut items = ItemPageWriter::new(&mut page);
        let mut last = (0u16, 0u16);
        for entry in entries {
            last = items.add_item(&encode_entry_tuple(entry));
        }
        last
    };

    let mut flags = PageFlags::LEAF;
    if rightmost {
        flags |= PageFlags::RIGHTMOST;
    }

    let mut writer = GenericPageWriter::new(&mut page);
    writer.set_flags(flags).set_level(0).set_rightlink(rightlink).set_lower(lower).set_upper(upper);
    writer.finish_checksum();
    page
}

/// Build a standalone internal entry-tree page from downlink tuples.
pub fn build_internal_page(entries: &[EntryTuple], rightlink: u32, rightmost: bool, level: u16) -> PageBuffer {
    let mut page = [0u8; PAGE_SIZE];
    let (lower, upper) = {
        let mut items = ItemPageWriter::new(&mut page);
        let mut last = (0u16, 0u16);
        for entry in entries {
            last = items.add_item(&encode_entry_tuple(entry));
        }
        last
    };

    let mut flags = PageFlags::empty();
    if rightmost {
        flags |= PageFlags::RIGHTMOST;
    }

    let mut writer = GenericPageWriter::new(&mut page);
    writer.set_flags(flags).set_level(level).set_rightlink(rightlink).set_lower(lower).set_upper(upper);
    writer.finish_checksum();
    page
}

/// Build a posting-tree leaf page from an already-sorted list of heap
/// pointers, flat-encoded with no line-pointer table.
pub fn build_posting_leaf_page(items: &[crate::gin::tuple::ItemPointer], rightmost: bool) -> PageBuffer {
    use crate::gin::tuple::encode_posting_list;
    use crate::storage::disk_page::HEADER_SIZE;

    let mut page = [0u8; PAGE_SIZE];
    let encoded = encode_posting_list(items);
    page[HEADER_SIZE..HEADER_SIZE + encoded.len()].copy_from_slice(&encoded);

    let mut flags = PageFlags::LEAF | PageFlags::DATA;
    if rightmost {
        flags |= PageFlags::RIGHTMOST;
    }

    let mut writer = GenericPageWriter::new(&mut page);
    writer
        .set_flags(flags)
        .set_level(0)
        .set_rightlink(INVALID_BLOCK_NUMBER)
        .set_lower((HEADER_SIZE + encoded.len()) as u16)
        .set_upper(PAGE_SIZE as u16);
    writer.finish_checksum();
    page
}

/// An empty, zeroed metapage: no pending list, as `GinNewIndex` would leave it.
pub fn empty_meta_page() -> PageBuffer {
    let mut page = [0u8; PAGE_SIZE];
    LittleEndianFill::fill_invalid_block(&mut page);
    page
}

struct LittleEndianFill;
impl LittleEndianFill {
    fn fill_invalid_block(page: &mut PageBuffer) {
        use byteorder::{ByteOrder, LittleEndian};
        use crate::storage::disk_page::HEADER_SIZE;
        LittleEndian::write_u32(&mut page[HEADER_SIZE..], INVALID_BLOCK_NUMBER);
        LittleEndian::write_u32(&mut page[HEADER_SIZE + 4..], INVALID_BLOCK_NUMBER);
    }
}
