pub mod cancellation;
pub mod config;
pub mod gin;
pub mod relation;
pub mod result;
pub mod storage;

#[cfg(test)]
mod test_util;

pub use cancellation::{AtomicCancellationToken, CancellationToken, NeverCancelled};
pub use config::{CheckConfig, PendingListPolicy};
pub use gin::{check_index, GinState};
pub use relation::{IndexHandle, RelationEntry};
pub use result::{Error, Result};
pub use storage::StorageManager;

/// Install `env_logger` as the global logger, for standalone callers (the
/// host database server normally brings its own).
pub fn init_logging() {
    let _ = env_logger::try_init();
}
