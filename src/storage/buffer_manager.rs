use crate::storage::{
    consts::PAGE_SIZE,
    page_cache::{PageCache, PagePtr},
    storage_manager::{PageBuffer, StorageHandle, StorageManager},
};
use crate::Result;

use std::sync::Mutex;

/// A shared, read-locked view of one on-disk page.
///
/// Acquiring one pins the backing slot in the page cache so it cannot be
/// recycled out from under the caller; the pin is released on `Drop`. The
/// walkers never hold two of these across a descent into a child page — the
/// parent's guard is dropped before the child's is fetched.
pub struct PinnedPage {
    buffer: Box<PageBuffer>,
    block: usize,
    page_ptr: PagePtr,
}

impl PinnedPage {
    pub fn block(&self) -> usize {
        self.block
    }

    pub fn buffer(&self) -> &PageBuffer {
        &self.buffer
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        self.page_ptr.write().unwrap().unpin();
    }
}

/// The checker's single point of contact with the page cache and storage
/// manager: every block read during a traversal passes through `read_shared`.
pub struct BufferManager<'s> {
    storage: &'s StorageManager,
    shandle: StorageHandle,
    cache: Mutex<PageCache>,
}

impl<'s> BufferManager<'s> {
    pub fn new(storage: &'s StorageManager, shandle: StorageHandle, cache_capacity: usize) -> Self {
        Self {
            storage,
            shandle,
            cache: Mutex::new(PageCache::new(cache_capacity)),
        }
    }

    pub fn read_shared(&self, block: usize) -> Result<PinnedPage> {
        let mut cache = self.cache.lock().unwrap();
        let page_ptr = cache.fetch_page(self.storage, &self.shandle, block)?;
        page_ptr.write().unwrap().pin();

        let buffer = {
            let page = page_ptr.read().unwrap();
            Box::new(*page.buffer())
        };

        Ok(PinnedPage {
            buffer,
            block,
            page_ptr,
        })
    }

    pub fn num_blocks(&self) -> Result<usize> {
        self.storage.file_size_in_page(&self.shandle)
    }

    pub fn relation_name(&self) -> &str {
        self.shandle.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::get_temp_smgr;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn reads_are_reflected_and_released_on_drop() {
        let (smgr, dir) = get_temp_smgr();
        smgr.ensure_dir().unwrap();

        let path = dir.path().join("rel");
        let mut f = File::create(&path).unwrap();
        let mut page0 = [0u8; PAGE_SIZE];
        page0[0] = 0xAB;
        f.write_all(&page0).unwrap();
        f.write_all(&[0u8; PAGE_SIZE]).unwrap();
        drop(f);

        let shandle = smgr.open("rel").unwrap();
        let bufmgr = BufferManager::new(&smgr, shandle, 8);

        {
            let pinned = bufmgr.read_shared(0).unwrap();
            assert_eq!(pinned.buffer()[0], 0xAB);
        }

        let pinned = bufmgr.read_shared(1).unwrap();
        assert_eq!(pinned.buffer()[0], 0);
        assert_eq!(bufmgr.num_blocks().unwrap(), 2);
    }
}
