use crate::cancellation::CancellationToken;
use crate::config::CheckConfig;
use crate::gin::page::{classify_page, PageKind};
use crate::gin::tuple::{decode_posting_list, ItemPointer, ITEM_POINTER_SIZE};
use crate::gin::INVALID_BLOCK_NUMBER;
use crate::storage::{disk_page::HEADER_SIZE, BufferManager, GenericPageReader};
use crate::{Error, Result};

use byteorder::{ByteOrder, LittleEndian};
use log::trace;

const INTERNAL_ITEM_SIZE: usize = 4 + ITEM_POINTER_SIZE;

/// The highest heap-tuple offset a well-formed page could ever hand out;
/// a posting item past this is not a plausible heap pointer.
const MAX_HEAP_OFFSET: u16 = 291;

struct InternalItem {
    child: u32,
    boundary: ItemPointer,
}

fn decode_internal_items(reader: &GenericPageReader<'_>, relation: &str, block: u32) -> Result<Vec<InternalItem>> {
    let payload_len = (reader.lower() as usize).saturating_sub(HEADER_SIZE);
    if payload_len % INTERNAL_ITEM_SIZE != 0 {
        return Err(Error::structural_corruption(
            relation,
            block,
            None,
            "posting-tree internal page body is not a whole number of items",
        ));
    }
    let body = &reader.body()[..payload_len];
    Ok(body
        .chunks_exact(INTERNAL_ITEM_SIZE)
        .map(|chunk| InternalItem {
            child: LittleEndian::read_u32(&chunk[0..4]),
            boundary: ItemPointer::decode(&chunk[4..]),
        })
        .collect())
}

fn check_heap_pointer(item: &ItemPointer, relation: &str, block: u32) -> Result<()> {
    if item.block == INVALID_BLOCK_NUMBER || item.offset == 0 || item.offset > MAX_HEAP_OFFSET {
        return Err(Error::structural_corruption(
            relation,
            block,
            None,
            "posting item is not a plausible heap pointer",
        ));
    }
    Ok(())
}

struct Frame {
    block: u32,
    expected_level: Option<u16>,
}

/// Walk one posting tree with an explicit stack, mirroring the entry-tree
/// walker but over a simpler, single-key-space structure: posting items
/// compare by heap pointer alone, so no caller-supplied comparator is
/// needed here.
pub fn check_posting_tree(
    bufmgr: &BufferManager<'_>,
    root: u32,
    relation: &str,
    config: &CheckConfig,
    cancellation: &dyn CancellationToken,
) -> Result<()> {
    let mut stack = vec![Frame {
        block: root,
        expected_level: None,
    }];

    while let Some(frame) = stack.pop() {
        if cancellation.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let pinned = bufmgr.read_shared(frame.block as usize)?;
        let kind = classify_page(pinned.buffer(), relation, frame.block)?;

        if kind == PageKind::Deleted {
            let reader = GenericPageReader::new(pinned.buffer());
            if reader.lower() as usize != HEADER_SIZE {
                return Err(Error::structural_corruption(
                    relation,
                    frame.block,
                    None,
                    "a deleted page must contain zero live tuples",
                ));
            }
            trace!("{}: posting-tree block {} was concurrently deleted, skipping", relation, frame.block);
            continue;
        }
        if !kind.is_data() {
            return Err(Error::structural_corruption(
                relation,
                frame.block,
                None,
                "posting tree referenced a page that is not a data page",
            ));
        }

        let reader = GenericPageReader::new(pinned.buffer());
        if let Some(expected) = frame.expected_level {
            if reader.level() != expected {
                return Err(Error::structural_corruption(
                    relation,
                    frame.block,
                    None,
                    "posting-tree page level does not match its depth from the root",
                ));
            }
        }
        if reader.level() == 0 && !kind.is_leaf() || reader.level() > 0 && kind.is_leaf() {
            return Err(Error::structural_corruption(
                relation,
                frame.block,
                None,
                "posting-tree leaf flag disagrees with its stored level",
            ));
        }

        match kind {
            PageKind::DataInternal => {
                let items = decode_internal_items(&reader, relation, frame.block)?;
                if items.is_empty() {
                    return Err(Error::structural_corruption(
                        relation,
                        frame.block,
                        None,
                        "posting-tree internal page has no downlinks",
                    ));
                }
                if items.len() > config.max_tuples_per_page {
                    return Err(Error::structural_corruption(
                        relation,
                        frame.block,
                        None,
                        "posting-tree internal page exceeds the configured tuple density bound",
                    ));
                }
                for pair in items.windows(2) {
                    if pair[0].boundary >= pair[1].boundary {
                        return Err(Error::structural_corruption(
                            relation,
                            frame.block,
                            None,
                            "posting-tree internal page downlinks are not strictly increasing",
                        ));
                    }
                }
                for item in items.into_iter().rev() {
                    stack.push(Frame {
                        block: item.child,
                        expected_level: Some(reader.level() - 1),
                    });
                }
            }
            PageKind::DataLeaf => {
                let payload_len = (reader.lower() as usize).saturating_sub(HEADER_SIZE);
                let body = &reader.body()[..payload_len];
                let items = decode_posting_list(body, relation, frame.block)?;

                if items.len() > config.max_tuples_per_page {
                    return Err(Error::structural_corruption(
                        relation,
                        frame.block,
                        None,
                        "posting-tree leaf page exceeds the configured tuple density bound",
                    ));
                }
                for item in &items {
                    check_heap_pointer(item, relation, frame.block)?;
                }
                for pair in items.windows(2) {
                    if pair[0] >= pair[1] {
                        return Err(Error::structural_corruption(
                            relation,
                            frame.block,
                            None,
                            "posting list is not strictly increasing",
                        ));
                    }
                }
            }
            _ => unreachable!("filtered above"),
        }
    }

    Ok(())
}
