use crate::{Error, Result};

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// A heap tuple pointer: block number plus the line-pointer offset within
/// that block. Always encoded as a fixed 6 bytes, never through bincode,
/// since its shape never varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemPointer {
    pub block: u32,
    pub offset: u16,
}

pub const ITEM_POINTER_SIZE: usize = 6;

impl ItemPointer {
    pub fn encode(&self, out: &mut [u8]) {
        LittleEndian::write_u32(&mut out[0..4], self.block);
        LittleEndian::write_u16(&mut out[4..6], self.offset);
    }

    pub fn decode(bytes: &[u8]) -> Self {
        Self {
            block: LittleEndian::read_u32(&bytes[0..4]),
            offset: LittleEndian::read_u16(&bytes[4..6]),
        }
    }

    fn as_sort_key(&self) -> u64 {
        ((self.block as u64) << 16) | self.offset as u64
    }
}

/// Where an entry key sits relative to ordinary indexed values. Declared in
/// the order the category-aware comparator sorts them: ordinary keys first,
/// then the three sentinels in this fixed order regardless of their bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Normal,
    NullKey,
    NullItem,
    EmptyItem,
}

/// What an entry tuple points at: either the heap pointers fit inline, or
/// there were too many and they live in their own posting tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EntryPayload {
    InlinePosting(Vec<ItemPointer>),
    PostingTreeRef(u32),
    /// Entry-tree internal pages reuse the same tuple shape, tagged with
    /// this variant instead, so the tree has one tuple codec end to end.
    Downlink(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EntryTupleBody {
    attnum: u16,
    category: Category,
    key: Vec<u8>,
    payload: EntryPayload,
}

#[derive(Debug, Clone)]
pub struct EntryTuple {
    pub attnum: u16,
    pub category: Category,
    pub key: Vec<u8>,
    pub payload: EntryPayload,
}

impl EntryTuple {
    pub fn posting_tree_block(&self) -> Option<u32> {
        match self.payload {
            EntryPayload::PostingTreeRef(block) => Some(block),
            EntryPayload::InlinePosting(_) | EntryPayload::Downlink(_) => None,
        }
    }

    pub fn downlink_block(&self) -> Option<u32> {
        match self.payload {
            EntryPayload::Downlink(block) => Some(block),
            EntryPayload::InlinePosting(_) | EntryPayload::PostingTreeRef(_) => None,
        }
    }
}

/// Serialize an entry tuple, prefixing it with its own aligned byte length
/// so a reader can check the line pointer's declared size against what the
/// tuple itself claims to be before it touches the bincode payload.
pub fn encode_entry_tuple(tuple: &EntryTuple) -> Vec<u8> {
    let body = EntryTupleBody {
        attnum: tuple.attnum,
        category: tuple.category,
        key: tuple.key.clone(),
        payload: tuple.payload.clone(),
    };
    let encoded = bincode::serialize(&body).expect("in-memory tuple encoding cannot fail");

    let mut out = Vec::with_capacity(2 + encoded.len());
    out.extend_from_slice(&(encoded.len() as u16 + 2).to_le_bytes());
    out.extend_from_slice(&encoded);
    out
}

/// Decode a tuple previously written by `encode_entry_tuple`, checking the
/// self-declared length against the slice the caller actually read out of
/// the page (the slice length comes from the line pointer).
pub fn decode_entry_tuple(bytes: &[u8], relation: &str, block: u32) -> Result<EntryTuple> {
    if bytes.len() < 2 {
        return Err(Error::structural_corruption(
            relation,
            block,
            None,
            "entry tuple is too short to hold its own length prefix",
        ));
    }

    let declared_len = LittleEndian::read_u16(&bytes[0..2]) as usize;
    if declared_len != bytes.len() {
        return Err(Error::structural_corruption(
            relation,
            block,
            None,
            "entry tuple's self-declared length does not match its line pointer",
        ));
    }

    let body: EntryTupleBody = bincode::deserialize(&bytes[2..])
        .map_err(|e| Error::decoding_mismatch(relation, block, &format!("entry tuple body: {}", e)))?;

    Ok(EntryTuple {
        attnum: body.attnum,
        category: body.category,
        key: body.key,
        payload: body.payload,
    })
}

/// Encode a sorted posting list as a varbyte-delta stream: a `u32` item
/// count, then each item's sort key as the varint-encoded delta from the
/// previous one (the first delta is from zero).
pub fn encode_posting_list(items: &[ItemPointer]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + items.len() * 2);
    out.extend_from_slice(&(items.len() as u32).to_le_bytes());

    let mut prev = 0u64;
    for item in items {
        let key = item.as_sort_key();
        write_varbyte(&mut out, key - prev);
        prev = key;
    }
    out
}

/// Decode a varbyte-delta posting list, requiring the number of items
/// actually decoded to match the header count exactly.
pub fn decode_posting_list(bytes: &[u8], relation: &str, block: u32) -> Result<Vec<ItemPointer>> {
    if bytes.len() < 4 {
        return Err(Error::structural_corruption(
            relation,
            block,
            None,
            "posting list is too short to hold its item count",
        ));
    }

    let count = LittleEndian::read_u32(&bytes[0..4]) as usize;
    let mut cursor = 4usize;
    let mut prev = 0u64;
    let mut items = Vec::with_capacity(count.min(1024));

    while cursor < bytes.len() {
        let (delta, consumed) = read_varbyte(&bytes[cursor..]).ok_or_else(|| {
            Error::decoding_mismatch(relation, block, "truncated varbyte in posting list")
        })?;
        cursor += consumed;
        prev += delta;
        items.push(ItemPointer {
            block: (prev >> 16) as u32,
            offset: (prev & 0xFFFF) as u16,
        });
    }

    if items.len() != count {
        return Err(Error::decoding_mismatch(
            relation,
            block,
            &format!("posting list declared {} items but decoded {}", count, items.len()),
        ));
    }

    Ok(items)
}

fn write_varbyte(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_varbyte(bytes: &[u8]) -> Option<(u64, usize)> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, &byte) in bytes.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        shift += 7;
    }
    None
}
