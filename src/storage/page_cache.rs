use crate::storage::{consts::PAGE_SIZE, storage_manager::*};
use crate::Result;

use lru::LruCache;
use std::{
    collections::HashMap,
    ops::Deref,
    sync::{Arc, RwLock},
};

pub struct Page {
    block: usize,
    buffer: PageBuffer,
    pin_count: i32,
    slot: usize,
}

impl Page {
    pub fn buffer(&self) -> &PageBuffer {
        &self.buffer
    }

    pub fn block(&self) -> usize {
        self.block
    }

    pub fn pin(&mut self) -> i32 {
        self.pin_count += 1;
        self.pin_count
    }

    pub fn unpin(&mut self) -> i32 {
        self.pin_count -= 1;
        self.pin_count
    }
}

#[derive(Clone)]
pub struct PagePtr(Arc<RwLock<Page>>);

impl Deref for PagePtr {
    type Target = RwLock<Page>;

    fn deref(&self) -> &RwLock<Page> {
        &self.0
    }
}

#[derive(Clone, Copy, Hash, PartialEq, Eq)]
struct PageTag(usize);

/// An LRU-backed pool of page slots, shared across every block the checker
/// visits so that hot pages (the root, a posting tree shared by many keys)
/// are not re-read from disk on every visit.
pub struct PageCache {
    lru: LruCache<PageTag, usize>,
    page_hash: HashMap<PageTag, usize>,
    page_pool: Vec<PagePtr>,
    cache_capacity: usize,
}

impl PageCache {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            lru: LruCache::new(cache_capacity),
            page_hash: HashMap::new(),
            page_pool: Vec::new(),
            cache_capacity,
        }
    }

    fn alloc_page(&mut self, block: usize) -> Result<PagePtr> {
        let tag = PageTag(block);

        if self.page_pool.len() < self.cache_capacity {
            let slot = self.page_pool.len();
            let page_ptr = PagePtr(Arc::new(RwLock::new(Page {
                block,
                buffer: [0u8; PAGE_SIZE],
                pin_count: 0,
                slot,
            })));
            self.page_pool.push(page_ptr.clone());
            self.page_hash.insert(tag, slot);
            Ok(page_ptr)
        } else {
            let victim = self.evict()?;
            let page_ptr = self.page_pool[victim].clone();
            page_ptr.write().unwrap().block = block;
            self.page_hash.insert(tag, victim);
            Ok(page_ptr)
        }
    }

    fn evict(&mut self) -> Result<usize> {
        loop {
            match self.lru.pop_lru() {
                Some((tag, slot)) => {
                    let pinned = self.page_pool[slot].read().unwrap().pin_count > 0;
                    if !pinned {
                        self.page_hash.remove(&tag);
                        return Ok(slot);
                    }
                    // still pinned by an in-flight visit elsewhere; try the next victim
                }
                None => {
                    // nothing evictable: grow past the configured capacity rather
                    // than deadlock a single-threaded, strictly-nested traversal
                    let slot = self.page_pool.len();
                    self.page_pool.push(PagePtr(Arc::new(RwLock::new(Page {
                        block: 0,
                        buffer: [0u8; PAGE_SIZE],
                        pin_count: 0,
                        slot,
                    }))));
                    return Ok(slot);
                }
            }
        }
    }

    pub fn fetch_page(&mut self, smgr: &StorageManager, shandle: &StorageHandle, block: usize) -> Result<PagePtr> {
        let tag = PageTag(block);

        if let Some(&slot) = self.page_hash.get(&tag) {
            let page_ptr = self.page_pool[slot].clone();
            if page_ptr.read().unwrap().block() == block {
                self.lru.put(tag, slot);
                return Ok(page_ptr);
            }
        }

        let page_ptr = self.alloc_page(block)?;
        {
            let mut page = page_ptr.write().unwrap();
            smgr.read(shandle, block, &mut page.buffer)?;
        }
        self.lru.put(tag, page_ptr.read().unwrap().slot);

        Ok(page_ptr)
    }
}
