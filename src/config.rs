use std::path::{Path, PathBuf};

const DEFAULT_ROOT_PATH: &str = "gincheck";

/// How to treat an index whose pending list (fast-update buffer) is non-empty.
///
/// Verifying the pending list itself is out of scope; this only controls
/// whether the caller's failure to flush it beforehand is fatal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingListPolicy {
    /// Log a warning and continue walking the entry/posting trees.
    Advisory,
    /// Treat a non-empty pending list as `Error::UnsupportedTarget`.
    Reject,
}

pub struct CheckConfig {
    pub cache_capacity: usize,
    pub max_tuples_per_page: usize,
    pub on_nonempty_pending_list: PendingListPolicy,
    pub root_path: PathBuf,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            max_tuples_per_page: 2048,
            on_nonempty_pending_list: PendingListPolicy::Advisory,
            root_path: PathBuf::from(DEFAULT_ROOT_PATH),
        }
    }
}

impl CheckConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root_path<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.root_path = p.as_ref().to_path_buf();
        self
    }

    pub fn cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn max_tuples_per_page(mut self, max_tuples_per_page: usize) -> Self {
        self.max_tuples_per_page = max_tuples_per_page;
        self
    }

    pub fn on_nonempty_pending_list(mut self, policy: PendingListPolicy) -> Self {
        self.on_nonempty_pending_list = policy;
        self
    }
}
