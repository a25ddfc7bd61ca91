use crate::cancellation::CancellationToken;
use crate::config::{CheckConfig, PendingListPolicy};
use crate::gin::page::{classify_page, MetaPageReader, PageKind};
use crate::gin::posting_tree::check_posting_tree;
use crate::gin::state::GinState;
use crate::gin::tuple::{decode_entry_tuple, Category, EntryPayload, EntryTuple};
use crate::gin::{GIN_META_BLKNO, GIN_ROOT_BLKNO, INVALID_BLOCK_NUMBER};
use crate::relation::IndexHandle;
use crate::storage::{BufferManager, GenericPageReader, StorageManager, HEADER_SIZE};
use crate::{Error, Result};

use log::{debug, warn};
use std::cmp::Ordering;

const MAX_HEAP_OFFSET: u16 = 291;

/// A parent's declared lower bound for one child subtree: the attribute, the
/// key's category, and its bytes. Carried across the stack so the walker can
/// check the parent-covers-child invariant and detect concurrent splits
/// without re-fetching the parent.
#[derive(Clone)]
struct DownlinkKey {
    attnum: u16,
    category: Category,
    key: Vec<u8>,
}

struct Frame {
    block: u32,
    expected_level: Option<u16>,
    parent_block: Option<u32>,
    downlink: Option<DownlinkKey>,
}

fn item_page_reader<'a>(reader: &GenericPageReader<'a>, buffer: &'a [u8; crate::storage::PAGE_SIZE]) -> crate::gin::item_page::ItemPageReader<'a> {
    crate::gin::item_page::ItemPageReader::new(buffer, reader.lower(), reader.upper())
}

fn decode_page_tuples(
    buffer: &[u8; crate::storage::PAGE_SIZE],
    reader: &GenericPageReader<'_>,
    relation: &str,
    block: u32,
) -> Result<Vec<EntryTuple>> {
    let items = item_page_reader(reader, buffer);
    (0..items.num_items())
        .map(|i| decode_entry_tuple(items.item(relation, block, i)?, relation, block))
        .collect()
}

/// Order a tuple's key against a parent-supplied downlink bound, comparing
/// by attribute first (via the `attr_of` collaborator) and only falling
/// through to the byte/category comparison when both sides name the same
/// attribute.
fn key_cmp(gin_state: &dyn GinState, a_attnum: u16, a_cat: Category, a_key: &[u8], b: &DownlinkKey) -> Ordering {
    match gin_state.attr_of(a_attnum).cmp(&gin_state.attr_of(b.attnum)) {
        Ordering::Equal => gin_state.compare(a_attnum, a_cat, a_key, b.category, &b.key),
        other => other,
    }
}

/// Order two sibling tuples the same way, for the intra-page strict-order check.
fn tuple_cmp(gin_state: &dyn GinState, a: &EntryTuple, b: &EntryTuple) -> Ordering {
    match gin_state.attr_of(a.attnum).cmp(&gin_state.attr_of(b.attnum)) {
        Ordering::Equal => gin_state.compare(a.attnum, a.category, &a.key, b.category, &b.key),
        other => other,
    }
}

/// Re-read `parent_block` fresh and look for a downlink to `child_block`,
/// chasing right siblings if the parent itself has split since we last read
/// it. Returns the downlink's current key on success.
fn refind_downlink(
    bufmgr: &BufferManager<'_>,
    relation: &str,
    mut parent_block: u32,
    child_block: u32,
) -> Result<DownlinkKey> {
    let mut hops = 0;
    loop {
        if hops > 64 {
            return Err(Error::structural_corruption(
                relation,
                child_block,
                None,
                "could not re-find a downlink to this page after chasing right siblings",
            ));
        }
        hops += 1;

        let pinned = bufmgr.read_shared(parent_block as usize)?;
        let kind = classify_page(pinned.buffer(), relation, parent_block)?;
        if kind == PageKind::Deleted {
            return Err(Error::structural_corruption(
                relation,
                child_block,
                None,
                "parent page was deleted while re-finding a downlink",
            ));
        }

        let reader = GenericPageReader::new(pinned.buffer());
        let tuples = decode_page_tuples(pinned.buffer(), &reader, relation, parent_block)?;

        for tuple in &tuples {
            if tuple.downlink_block() == Some(child_block) {
                return Ok(DownlinkKey {
                    attnum: tuple.attnum,
                    category: tuple.category,
                    key: tuple.key.clone(),
                });
            }
        }

        let rightlink = reader.rightlink();
        if rightlink == INVALID_BLOCK_NUMBER {
            return Err(Error::structural_corruption(
                relation,
                child_block,
                None,
                "reached the rightmost sibling without finding a downlink to this page",
            ));
        }
        parent_block = rightlink;
    }
}

fn check_entry_leaf(
    bufmgr: &BufferManager<'_>,
    relation: &str,
    config: &CheckConfig,
    cancellation: &dyn CancellationToken,
    tuples: &[EntryTuple],
    block: u32,
) -> Result<()> {
    for tuple in tuples {
        match &tuple.payload {
            EntryPayload::InlinePosting(items) => {
                for pair in items.windows(2) {
                    if pair[0] >= pair[1] {
                        return Err(Error::structural_corruption(
                            relation,
                            block,
                            None,
                            "inline posting list is not strictly increasing",
                        ));
                    }
                }
                for item in items {
                    if item.block == INVALID_BLOCK_NUMBER || item.offset == 0 || item.offset > MAX_HEAP_OFFSET {
                        return Err(Error::structural_corruption(
                            relation,
                            block,
                            None,
                            "inline posting item is not a plausible heap pointer",
                        ));
                    }
                }
            }
            EntryPayload::PostingTreeRef(root) => {
                check_posting_tree(bufmgr, *root, relation, config, cancellation)?;
            }
            EntryPayload::Downlink(_) => {
                return Err(Error::structural_corruption(
                    relation,
                    block,
                    None,
                    "a leaf page entry carries an internal-page downlink payload",
                ));
            }
        }
    }
    Ok(())
}

fn check_meta_page(bufmgr: &BufferManager<'_>, relation: &str, config: &CheckConfig) -> Result<()> {
    let pinned = bufmgr.read_shared(GIN_META_BLKNO as usize)?;
    let meta = MetaPageReader::new(pinned.buffer());

    if meta.has_pending_list() {
        let message = format!(
            "index has a non-empty pending list ({} page(s) starting at block {})",
            meta.n_pending_pages(),
            meta.pending_head()
        );
        match config.on_nonempty_pending_list {
            PendingListPolicy::Advisory => warn!("{}: {}", relation, message),
            PendingListPolicy::Reject => return Err(Error::UnsupportedTarget(format!("{}: {}", relation, message))),
        }
    }
    Ok(())
}

/// Walk the entry tree rooted at `GIN_ROOT_BLKNO`, checking every tuple and,
/// for every entry that points at a posting tree, walking that tree too.
/// Both walks use an explicit stack rather than host-language recursion, so
/// a page's pin is released the moment its tuples have been read out and
/// before any child is ever fetched.
pub fn check_index(
    index: &dyn IndexHandle,
    storage: &StorageManager,
    gin_state: &dyn GinState,
    config: &CheckConfig,
    cancellation: &dyn CancellationToken,
) -> Result<()> {
    if !index.is_gin() {
        return Err(Error::UnsupportedTarget(format!("{} is not a GIN index", index.name())));
    }
    if !index.is_valid() {
        return Err(Error::UnsupportedTarget(format!("{} is not a valid index", index.name())));
    }
    if index.is_other_session_temp() {
        return Err(Error::UnsupportedTarget(format!(
            "{} is a temporary index belonging to another session",
            index.name()
        )));
    }

    let shandle = storage.open(index.name())?;
    let bufmgr = BufferManager::new(storage, shandle, config.cache_capacity);

    check_meta_page(&bufmgr, index.name(), config)?;

    let mut stack = vec![Frame {
        block: GIN_ROOT_BLKNO,
        expected_level: None,
        parent_block: None,
        downlink: None,
    }];

    while let Some(frame) = stack.pop() {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let pinned = bufmgr.read_shared(frame.block as usize)?;
        let kind = classify_page(pinned.buffer(), index.name(), frame.block)?;

        if kind == PageKind::Deleted {
            let reader = GenericPageReader::new(pinned.buffer());
            if reader.lower() as usize != HEADER_SIZE {
                return Err(Error::structural_corruption(
                    index.name(),
                    frame.block,
                    None,
                    "a deleted page must contain zero live tuples",
                ));
            }
            debug!("{}: entry-tree block {} was concurrently deleted, skipping", index.name(), frame.block);
            continue;
        }
        if kind.is_data() {
            return Err(Error::structural_corruption(
                index.name(),
                frame.block,
                None,
                "entry tree referenced a data page",
            ));
        }

        let reader = GenericPageReader::new(pinned.buffer());
        if let Some(expected) = frame.expected_level {
            if reader.level() != expected {
                return Err(Error::structural_corruption(
                    index.name(),
                    frame.block,
                    None,
                    "entry-tree page level does not match its depth from the root",
                ));
            }
        }
        if (reader.level() == 0) != kind.is_leaf() {
            return Err(Error::structural_corruption(
                index.name(),
                frame.block,
                None,
                "entry-tree leaf flag disagrees with its stored level",
            ));
        }

        let tuples = decode_page_tuples(pinned.buffer(), &reader, index.name(), frame.block)?;

        if tuples.len() > config.max_tuples_per_page {
            return Err(Error::structural_corruption(
                index.name(),
                frame.block,
                None,
                "entry-tree page exceeds the configured tuple density bound",
            ));
        }
        if kind == PageKind::EntryInternal && tuples.is_empty() {
            return Err(Error::structural_corruption(
                index.name(),
                frame.block,
                None,
                "entry-tree internal page has no downlinks",
            ));
        }
        for pair in tuples.windows(2) {
            if tuple_cmp(gin_state, &pair[0], &pair[1]) != Ordering::Less {
                return Err(Error::structural_corruption(
                    index.name(),
                    frame.block,
                    None,
                    "entry-tree page tuples are not strictly increasing",
                ));
            }
        }

        // I5: a parent's downlink is an upper bound on everything in the
        // child subtree it points at (`page_max <= downlink`). Tuples are
        // strictly increasing (I4), so only the last tuple can ever violate
        // this — checking the first tuple against the same bound would
        // reject every page with more than one entry.
        if let (Some(last), Some(downlink)) = (tuples.last(), frame.downlink.as_ref()) {
            if key_cmp(gin_state, last.attnum, last.category, &last.key, downlink) == Ordering::Greater {
                if let Some(parent_block) = frame.parent_block {
                    let fresh = refind_downlink(&bufmgr, index.name(), parent_block, frame.block)?;
                    if key_cmp(gin_state, last.attnum, last.category, &last.key, &fresh) == Ordering::Greater {
                        return Err(Error::structural_corruption(
                            index.name(),
                            frame.block,
                            None,
                            "page content exceeds its parent's declared upper bound",
                        ));
                    }
                    debug!("{}: block {} reconciled against a refreshed downlink", index.name(), frame.block);
                }

                let rightlink = reader.rightlink();
                if rightlink != INVALID_BLOCK_NUMBER {
                    stack.push(Frame {
                        block: rightlink,
                        expected_level: frame.expected_level,
                        parent_block: frame.parent_block,
                        downlink: frame.downlink.clone(),
                    });
                }
            }
        }

        // entry-tree internal pages always have level >= 1 here: the
        // leaf-flag/level agreement check above already ruled out level 0.
        let child_level = reader.level().saturating_sub(1);

        // Every tuple this page has to offer is now in `tuples`; drop the
        // pin before descending into a child or a referenced posting tree,
        // the same way the walker never holds a parent's pin while visiting
        // its children.
        drop(reader);
        drop(pinned);

        match kind {
            PageKind::EntryInternal => {
                for tuple in tuples.into_iter().rev() {
                    let child = tuple.downlink_block().ok_or_else(|| {
                        Error::structural_corruption(
                            index.name(),
                            frame.block,
                            None,
                            "entry-tree internal page entry has no downlink payload",
                        )
                    })?;
                    stack.push(Frame {
                        block: child,
                        expected_level: Some(child_level),
                        parent_block: Some(frame.block),
                        downlink: Some(DownlinkKey {
                            attnum: tuple.attnum,
                            category: tuple.category,
                            key: tuple.key,
                        }),
                    });
                }
            }
            PageKind::EntryLeaf => {
                check_entry_leaf(&bufmgr, index.name(), config, cancellation, &tuples, frame.block)?;
            }
            _ => unreachable!("filtered above"),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gin::state::ByteOrderGinState;
    use crate::gin::tuple::{Category, ItemPointer};
    use crate::relation::RelationEntry;
    use crate::storage::disk_page::{GenericPageWriter, PageFlags};
    use crate::test_util::{build_internal_page, build_leaf_page, FakeIndexBuilder};
    use crate::{AtomicCancellationToken, CheckConfig, NeverCancelled, PendingListPolicy};

    fn inline_entry(key: &[u8], items: Vec<ItemPointer>) -> EntryTuple {
        EntryTuple {
            attnum: 1,
            category: Category::Normal,
            key: key.to_vec(),
            payload: EntryPayload::InlinePosting(items),
        }
    }

    fn posting_ref_entry(key: &[u8], root: u32) -> EntryTuple {
        EntryTuple {
            attnum: 1,
            category: Category::Normal,
            key: key.to_vec(),
            payload: EntryPayload::PostingTreeRef(root),
        }
    }

    fn downlink_entry(key: &[u8], child: u32) -> EntryTuple {
        EntryTuple {
            attnum: 1,
            category: Category::Normal,
            key: key.to_vec(),
            payload: EntryPayload::Downlink(child),
        }
    }

    #[test]
    fn empty_index_passes() {
        let builder = FakeIndexBuilder::new();
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap();
    }

    #[test]
    fn single_inline_entry_passes() {
        let mut builder = FakeIndexBuilder::new();
        builder.set_root_leaf_entries(&[inline_entry(b"a", vec![ItemPointer { block: 5, offset: 1 }])]);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap();
    }

    #[test]
    fn single_leaf_posting_tree_passes() {
        let mut builder = FakeIndexBuilder::new();
        let posting_leaf = crate::test_util::build_posting_leaf_page(
            &[ItemPointer { block: 1, offset: 1 }, ItemPointer { block: 2, offset: 3 }],
            true,
        );
        let posting_block = builder.push_page(posting_leaf);
        builder.set_root_leaf_entries(&[posting_ref_entry(b"a", posting_block)]);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap();
    }

    #[test]
    fn out_of_order_entries_are_rejected() {
        let mut builder = FakeIndexBuilder::new();
        builder.set_root_leaf_entries(&[
            inline_entry(b"b", vec![ItemPointer { block: 1, offset: 1 }]),
            inline_entry(b"a", vec![ItemPointer { block: 1, offset: 2 }]),
        ]);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        assert!(check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).is_err());
    }

    #[test]
    fn corrupted_level_is_rejected() {
        let mut builder = FakeIndexBuilder::new();
        let mut page = build_leaf_page(&[inline_entry(b"a", vec![ItemPointer { block: 1, offset: 1 }])], INVALID_BLOCK_NUMBER, true);
        {
            let mut writer = GenericPageWriter::new(&mut page);
            writer.set_level(7);
            writer.finish_checksum();
        }
        builder.set_page(GIN_ROOT_BLKNO, page);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        assert!(check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).is_err());
    }

    #[test]
    fn nonempty_pending_list_is_advisory_by_default_but_rejectable() {
        let mut builder = FakeIndexBuilder::new();
        let mut meta = [0u8; crate::storage::PAGE_SIZE];
        {
            use crate::gin::page::MetaPageWriter;
            MetaPageWriter::new(&mut meta).set_pending_list(2, 2, 1);
        }
        builder.set_page(GIN_META_BLKNO, meta);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");

        check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap();

        let strict = CheckConfig::new().on_nonempty_pending_list(PendingListPolicy::Reject);
        assert!(check_index(&index, &smgr, &ByteOrderGinState, &strict, &NeverCancelled).is_err());
    }

    #[test]
    fn non_gin_index_is_unsupported() {
        let builder = FakeIndexBuilder::new();
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx").not_gin();
        let err = check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTarget(_)));
    }

    #[test]
    fn other_session_temp_index_is_unsupported() {
        let builder = FakeIndexBuilder::new();
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx").other_session_temp();
        let err = check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTarget(_)));
    }

    #[test]
    fn cancelled_token_stops_the_walk() {
        let builder = FakeIndexBuilder::new();
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        let cancellation = AtomicCancellationToken::new();
        cancellation.cancel();
        let err = check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &cancellation).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn deleted_page_with_live_tuples_is_rejected() {
        let mut builder = FakeIndexBuilder::new();
        let mut page = build_leaf_page(&[inline_entry(b"a", vec![ItemPointer { block: 1, offset: 1 }])], INVALID_BLOCK_NUMBER, true);
        {
            let mut writer = GenericPageWriter::new(&mut page);
            writer.set_flags(PageFlags::DELETED | PageFlags::LEAF);
            writer.finish_checksum();
        }
        builder.set_page(GIN_ROOT_BLKNO, page);
        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        assert!(check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).is_err());
    }

    #[test]
    fn two_level_tree_with_multi_entry_leaves_passes() {
        let mut builder = FakeIndexBuilder::new();

        let leaf2 = build_leaf_page(
            &[
                inline_entry(b"c", vec![ItemPointer { block: 3, offset: 1 }]),
                inline_entry(b"d", vec![ItemPointer { block: 3, offset: 2 }]),
            ],
            INVALID_BLOCK_NUMBER,
            true,
        );
        let leaf2_block = builder.push_page(leaf2);

        let leaf1 = build_leaf_page(
            &[
                inline_entry(b"a", vec![ItemPointer { block: 1, offset: 1 }]),
                inline_entry(b"b", vec![ItemPointer { block: 1, offset: 2 }]),
            ],
            leaf2_block,
            false,
        );
        let leaf1_block = builder.push_page(leaf1);

        let root = build_internal_page(&[downlink_entry(b"b", leaf1_block), downlink_entry(b"d", leaf2_block)], INVALID_BLOCK_NUMBER, true, 1);
        builder.set_page(GIN_ROOT_BLKNO, root);

        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).unwrap();
    }

    #[test]
    fn exceeding_parent_bound_is_rejected() {
        let mut builder = FakeIndexBuilder::new();

        let leaf = build_leaf_page(&[inline_entry(b"z", vec![ItemPointer { block: 1, offset: 1 }])], INVALID_BLOCK_NUMBER, true);
        let leaf_block = builder.push_page(leaf);

        let root = build_internal_page(&[downlink_entry(b"b", leaf_block)], INVALID_BLOCK_NUMBER, true, 1);
        builder.set_page(GIN_ROOT_BLKNO, root);

        let (smgr, _dir) = builder.finish("idx");
        let index = RelationEntry::new("idx");
        assert!(check_index(&index, &smgr, &ByteOrderGinState, &CheckConfig::new(), &NeverCancelled).is_err());
    }
}
