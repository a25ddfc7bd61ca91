use crate::{storage::consts::PAGE_SIZE, Error, Result};

use std::{
    collections::HashMap,
    fs::{DirBuilder, File, OpenOptions},
    io::{self, prelude::*, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ForkType {
    Main = 0,
}

pub type PageBuffer = [u8; PAGE_SIZE];

struct StorageHandleInner {
    name: String,
    file: Mutex<File>,
}

/// A handle on one relation's main fork, opened read-only.
///
/// The checker never writes through this handle; `Table`/`Index` insert paths
/// the teacher builds on top of the equivalent handle are out of scope here.
#[derive(Clone)]
pub struct StorageHandle(Arc<StorageHandleInner>);

impl StorageHandle {
    pub fn name(&self) -> &str {
        &self.0.name
    }
}

pub struct StorageManager {
    base_path: PathBuf,
    dir_builder: Mutex<DirBuilder>,
    shandles: Mutex<HashMap<String, StorageHandle>>,
}

impl StorageManager {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        let dir_builder = Mutex::new(DirBuilder::new());
        dir_builder.lock().unwrap().recursive(true);

        Self {
            base_path: base_path.as_ref().to_path_buf(),
            dir_builder,
            shandles: Mutex::new(HashMap::new()),
        }
    }

    /// Open the relation's main fork for read access.
    pub fn open(&self, name: &str) -> Result<StorageHandle> {
        let mut guard = self.shandles.lock().unwrap();
        if let Some(handle) = guard.get(name) {
            return Ok(handle.clone());
        }

        let rel_path = self.rel_path(name);
        let file = OpenOptions::new().read(true).open(&rel_path)?;

        let handle = StorageHandle(Arc::new(StorageHandleInner {
            name: name.to_owned(),
            file: Mutex::new(file),
        }));
        guard.insert(name.to_owned(), handle.clone());
        Ok(handle)
    }

    pub fn read(&self, shandle: &StorageHandle, block: usize, buffer: &mut PageBuffer) -> Result<()> {
        let mut file = shandle.0.file.lock().unwrap();
        file.seek(SeekFrom::Start(block as u64 * PAGE_SIZE as u64))?;
        match file.read_exact(buffer) {
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(Error::structural_corruption(
                shandle.name(),
                block as u32,
                None,
                "block is past end of fork",
            )),
            Err(e) => Err(Error::Io(e)),
            Ok(()) => Ok(()),
        }
    }

    pub fn file_size_in_page(&self, shandle: &StorageHandle) -> Result<usize> {
        let file = shandle.0.file.lock().unwrap();
        let metadata = file.metadata()?;
        Ok(metadata.len() as usize / PAGE_SIZE)
    }

    fn rel_path(&self, name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(name);
        path
    }

    #[cfg(test)]
    pub(crate) fn ensure_dir(&self) -> Result<()> {
        let guard = self.dir_builder.lock().unwrap();
        if !self.base_path.is_dir() {
            guard.create(&self.base_path)?;
        }
        Ok(())
    }
}
