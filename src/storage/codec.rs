//! # Chunked Entity Codec
//!
//! Serializes an entity to JSON and spreads the text across a fixed number of
//! bounded string slots (`P0..P{n-1}`), so a record of any size up to the slot
//! capacity fits a table store with per-property size limits.
//!
//! ## Format
//!
//! - Slot `i` holds the next run of at most `slot_size_bytes` bytes of the JSON
//!   text, in order. Slots are cut on UTF-8 character boundaries so every slot is
//!   itself valid text; a slot may therefore be a few bytes short of the limit.
//! - Unused trailing slots are absent from the chunk set.
//! - Decoding concatenates `P0..P{n-1}` in index order (absent slots are empty)
//!   and parses the result. A chunk set that does not parse is an error, never a
//!   partial read.
//!
//! Payloads larger than the layout capacity fail with
//! [`CodecError::EntityTooLarge`]; they are never truncated.

use super::errors::CodecError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of chunk slots per record
pub const DEFAULT_SLOT_COUNT: usize = 14;

/// Default size of one chunk slot (64 KiB)
pub const DEFAULT_SLOT_SIZE_BYTES: usize = 64 * 1024;

/// Longest UTF-8 encoding of one character; a slot must hold at least this much
const MIN_SLOT_SIZE_BYTES: usize = 4;

/// Slot name -> fragment. Only used slots are present.
pub type ChunkSet = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkLayout {
    pub slot_count: usize,
    pub slot_size_bytes: usize,
}

impl Default for ChunkLayout {
    fn default() -> Self {
        Self {
            slot_count: DEFAULT_SLOT_COUNT,
            slot_size_bytes: DEFAULT_SLOT_SIZE_BYTES,
        }
    }
}

impl ChunkLayout {
    pub fn new(slot_count: usize, slot_size_bytes: usize) -> Result<Self, CodecError> {
        if slot_count == 0 {
            return Err(CodecError::invalid_layout("slot_count must be at least 1"));
        }
        if slot_size_bytes < MIN_SLOT_SIZE_BYTES {
            return Err(CodecError::invalid_layout(format!(
                "slot_size_bytes must be at least {MIN_SLOT_SIZE_BYTES}"
            )));
        }
        Ok(Self {
            slot_count,
            slot_size_bytes,
        })
    }

    pub fn capacity_bytes(&self) -> usize {
        self.slot_count.saturating_mul(self.slot_size_bytes)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkedEntityCodec {
    layout: ChunkLayout,
}

impl ChunkedEntityCodec {
    pub fn new(layout: ChunkLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> ChunkLayout {
        self.layout
    }

    /// Property name of slot `index`
    pub fn slot_name(index: usize) -> String {
        format!("P{index}")
    }

    /// Index of a slot name, `None` for anything that is not `P<number>`
    pub fn slot_index(name: &str) -> Option<usize> {
        name.strip_prefix('P')
            .filter(|digits| !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()))
            .and_then(|digits| digits.parse().ok())
    }

    pub fn encode<T: Serialize>(&self, entity: &T) -> Result<ChunkSet, CodecError> {
        let payload =
            serde_json::to_string(entity).map_err(|e| CodecError::serialization(e.to_string()))?;
        self.split(&payload)
    }

    pub fn decode<T: DeserializeOwned>(&self, chunks: &ChunkSet) -> Result<T, CodecError> {
        let payload = self.join(chunks)?;
        serde_json::from_str(&payload).map_err(|e| CodecError::deserialization(e.to_string()))
    }

    /// Split serialized text into slots
    pub fn split(&self, payload: &str) -> Result<ChunkSet, CodecError> {
        let too_large = || CodecError::EntityTooLarge {
            size_bytes: payload.len(),
            capacity_bytes: self.layout.capacity_bytes(),
        };

        if payload.len() > self.layout.capacity_bytes() {
            return Err(too_large());
        }

        let mut chunks = ChunkSet::new();
        let mut rest = payload;
        let mut index = 0;

        while !rest.is_empty() {
            if index >= self.layout.slot_count {
                // Character-boundary cuts can leave a tail that no longer fits
                return Err(too_large());
            }

            let mut end = rest.len().min(self.layout.slot_size_bytes);
            while !rest.is_char_boundary(end) {
                end -= 1;
            }

            let (head, tail) = rest.split_at(end);
            chunks.insert(Self::slot_name(index), head.to_string());
            rest = tail;
            index += 1;
        }

        Ok(chunks)
    }

    /// Concatenate slots `P0..P{n-1}` in order
    pub fn join(&self, chunks: &ChunkSet) -> Result<String, CodecError> {
        for name in chunks.keys() {
            match Self::slot_index(name) {
                Some(index) if index < self.layout.slot_count => {}
                Some(index) => {
                    return Err(CodecError::corrupt(format!(
                        "slot {name} is outside the {}-slot layout (index {index})",
                        self.layout.slot_count
                    )))
                }
                None => {
                    return Err(CodecError::corrupt(format!(
                        "unexpected property {name} in chunk set"
                    )))
                }
            }
        }

        let mut payload = String::new();
        for index in 0..self.layout.slot_count {
            if let Some(fragment) = chunks.get(&Self::slot_name(index)) {
                payload.push_str(fragment);
            }
        }
        Ok(payload)
    }
}
