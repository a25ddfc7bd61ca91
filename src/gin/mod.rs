pub mod entry_tree;
pub mod item_page;
pub mod page;
pub mod posting_tree;
pub mod state;
pub mod tuple;

pub use entry_tree::check_index;
pub use state::GinState;

/// Sentinel meaning "no such block" — used for right-links off the
/// rightmost page and for an entry tuple with no posting tree yet.
pub const INVALID_BLOCK_NUMBER: u32 = 0xFFFF_FFFF;

/// The entry tree's root is always this fixed block; `0` is reserved for
/// the metapage and is never part of either tree.
pub const GIN_ROOT_BLKNO: u32 = 1;
pub const GIN_META_BLKNO: u32 = 0;
