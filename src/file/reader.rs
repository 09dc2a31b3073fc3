// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Forward traversal of the on-disk stream, yielding lazy record handles.
//!
//! # Chunk layout
//!
//! ```text
//! ┌────────┬───────────────┬──────────────┬──────────────┐
//! │marker:1│IndexEntry × N │IndexChain:1+8│Value × N     │
//! └────────┴───────────────┴──────────────┴──────────────┘
//! ```
//!
//! Structural traversal (following the chain from one chunk to the next)
//! only ever touches the marker, the index entries, and the chain record:
//! it never has to skip over the value region, since the chain record
//! immediately follows the last index entry.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use ahash::HashMap;
use parking_lot::Mutex;

use crate::codec::{TAG_CHUNK_START, TAG_INDEX_CHAIN, TAG_INDEX_ENTRY, TAG_VALUE};
use crate::database::Database;
use crate::error::{DecodeError, Error, Result};
use crate::lazy::{KeyValue, LazyLoader};
use crate::type_handler::{self, TypeHandler, TypeRegistry};

use super::Shared;

/// A decoded structural record: either a key bound to the absolute offset
/// of its value, or this chunk's own forward link.
pub(crate) enum ChunkStep<K> {
    Entry { key: K, value_offset: u64 },
    Chain { next_offset: u64 },
}

/// Reads exactly one structural record starting at `pos`, optionally
/// consuming the chunk-start marker first. Returns the decoded step and
/// the stream position immediately after it.
pub(crate) fn read_chunk_step<K, S: Read + Write + Seek>(
    stream: &mut S,
    pos: u64,
    expect_marker: bool,
    key_handler: &dyn TypeHandler<K>,
    strict: bool,
) -> Result<(ChunkStep<K>, u64)> {
    stream.seek(SeekFrom::Start(pos))?;
    if expect_marker {
        let mut marker = [0u8; 1];
        read_exact(stream, &mut marker)?;
        if marker[0] != TAG_CHUNK_START {
            return Err(DecodeError::UnknownRecordTag(marker[0]).into());
        }
    }
    let mut tag = [0u8; 1];
    read_exact(stream, &mut tag)?;
    match tag[0] {
        TAG_INDEX_ENTRY => {
            let key = type_handler::read_key(stream, key_handler, strict)?;
            let mut offset_buf = [0u8; 8];
            read_exact(stream, &mut offset_buf)?;
            let value_offset = u64::from_le_bytes(offset_buf);
            let new_pos = stream.stream_position()?;
            Ok((ChunkStep::Entry { key, value_offset }, new_pos))
        }
        TAG_INDEX_CHAIN => {
            let mut offset_buf = [0u8; 8];
            read_exact(stream, &mut offset_buf)?;
            let next_offset = u64::from_le_bytes(offset_buf);
            let new_pos = stream.stream_position()?;
            Ok((ChunkStep::Chain { next_offset }, new_pos))
        }
        other => Err(DecodeError::UnknownRecordTag(other).into()),
    }
}

pub(super) fn read_exact<S: Read>(stream: &mut S, buf: &mut [u8]) -> Result<()> {
    stream.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated.into()
        } else {
            Error::from(e)
        }
    })
}

/// Walks the chain from offset `0` to find the current terminal chunk's
/// own chain record, i.e. the record a future insert must patch. Returns
/// `None` if the stream is empty (no chunk has ever been written).
pub(crate) fn locate_terminal_chain_offset<K, S: Read + Write + Seek>(
    stream: &mut S,
    key_handler: &dyn TypeHandler<K>,
    strict: bool,
) -> Result<Option<u64>> {
    if stream.seek(SeekFrom::End(0))? == 0 {
        return Ok(None);
    }
    let mut pos = 0u64;
    let mut expect_marker = true;
    loop {
        let chain_record_offset = pos; // only meaningful once we hit a Chain step
        let (step, new_pos) = read_chunk_step(stream, pos, expect_marker, key_handler, strict)?;
        match step {
            ChunkStep::Entry { .. } => {
                pos = new_pos;
                expect_marker = false;
            }
            ChunkStep::Chain { next_offset } => {
                if next_offset == 0 {
                    return Ok(Some(chain_record_offset));
                }
                pos = next_offset;
                expect_marker = true;
            }
        }
    }
}

/// Memoizes already-decoded lazy-loader handles by absolute value offset,
/// so repeated enumerations over the same offset share one decode. Cleared
/// by [`FileReader::drain_buffer`] after any write that may have mutated
/// records.
pub(crate) struct PositionCache<V> {
    memos: Mutex<HashMap<u64, Arc<Mutex<Option<V>>>>>,
}

impl<V> Default for PositionCache<V> {
    fn default() -> Self {
        Self {
            memos: Mutex::new(HashMap::default()),
        }
    }
}

impl<V> PositionCache<V> {
    fn memo_for(&self, offset: u64) -> Arc<Mutex<Option<V>>> {
        self.memos
            .lock()
            .entry(offset)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Resets every memo's contents to `None` before dropping the map.
    /// Resetting the contents (not just dropping our own map entries)
    /// matters because a [`FileLoader`] obtained before this call holds
    /// its own clone of the per-offset `Arc`; an overwrite at that offset
    /// must make that outstanding loader re-read from the stream on its
    /// next `load()` rather than keep returning the value it memoized
    /// before the overwrite.
    fn drain(&self) {
        let mut memos = self.memos.lock();
        for memo in memos.values() {
            *memo.lock() = None;
        }
        memos.clear();
    }
}

/// A lazy handle to a value at a known absolute offset. `Load()` seeks to
/// the offset, decodes the typed value, and releases the stream lock.
pub struct FileLoader<V, S> {
    shared: Arc<Shared<S>>,
    offset: u64,
    registry: Arc<TypeRegistry<V>>,
    strict_length: bool,
    memo: Arc<Mutex<Option<V>>>,
}

impl<V, S> FileLoader<V, S> {
    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }
}

impl<V, S> Clone for FileLoader<V, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            offset: self.offset,
            registry: self.registry.clone(),
            strict_length: self.strict_length,
            memo: self.memo.clone(),
        }
    }
}

impl<V: Clone, S: Read + Write + Seek> LazyLoader<V> for FileLoader<V, S> {
    fn load(&self) -> Result<V> {
        if let Some(v) = self.memo.lock().as_ref() {
            return Ok(v.clone());
        }
        let value = self.shared.with_stream(|stream| {
            stream.seek(SeekFrom::Start(self.offset))?;
            let mut tag = [0u8; 1];
            read_exact(stream, &mut tag)?;
            if tag[0] != TAG_VALUE {
                return Err(DecodeError::UnknownRecordTag(tag[0]).into());
            }
            type_handler::read_typed(stream, &self.registry, self.strict_length)
        })?;
        *self.memo.lock() = Some(value.clone());
        Ok(value)
    }
}

/// Forward/positional traversal over the on-disk stream.
pub struct FileReader<K, V, S> {
    pub(crate) shared: Arc<Shared<S>>,
    pub(crate) key_handler: Arc<dyn TypeHandler<K>>,
    pub(crate) value_registry: Arc<TypeRegistry<V>>,
    pub(crate) strict_length: bool,
    pub(crate) cache: Arc<PositionCache<V>>,
}

impl<K, V, S> Clone for FileReader<K, V, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            key_handler: self.key_handler.clone(),
            value_registry: self.value_registry.clone(),
            strict_length: self.strict_length,
            cache: self.cache.clone(),
        }
    }
}

impl<K, V, S> FileReader<K, V, S>
where
    K: Clone,
    S: Read + Write + Seek,
{
    fn loader_for(&self, offset: u64) -> FileLoader<V, S> {
        FileLoader {
            shared: self.shared.clone(),
            offset,
            registry: self.value_registry.clone(),
            strict_length: self.strict_length,
            memo: self.cache.memo_for(offset),
        }
    }

    /// Invalidates the positional cache. Must be called after any write
    /// that may have extended or mutated records.
    pub fn drain_buffer(&self) {
        self.cache.drain();
    }

    /// Returns the first entry, or [`Error::NotFound`] if the store is
    /// empty.
    pub fn first(&self) -> Result<KeyValue<K, FileLoader<V, S>>> {
        self.enumerate()?.next().ok_or(Error::NotFound)?
    }

    /// Linear scan for the first entry matching `key`.
    pub fn get_by_index(&self, key: &K) -> Result<KeyValue<K, FileLoader<V, S>>>
    where
        K: PartialEq,
    {
        for kv in self.enumerate()? {
            let kv = kv?;
            if &kv.key == key {
                return Ok(kv);
            }
        }
        Err(Error::NotFound)
    }

    /// Linear scan for every entry matching `key`, in file order.
    pub fn get_multiple_by_index(&self, key: &K) -> Result<Vec<KeyValue<K, FileLoader<V, S>>>>
    where
        K: PartialEq,
    {
        let mut out = Vec::new();
        for kv in self.enumerate()? {
            let kv = kv?;
            if &kv.key == key {
                out.push(kv);
            }
        }
        Ok(out)
    }

    /// Yields every `(key, lazy value)` pair in insertion order across all
    /// chunks, starting at the first chunk and following chain pointers.
    pub fn enumerate(&self) -> Result<Enumerator<'_, K, V, S>> {
        Ok(Enumerator {
            reader: self,
            pos: 0,
            expect_marker: true,
            done: self.shared.is_disposed(),
            started: false,
        })
    }
}

/// Iterator produced by [`FileReader::enumerate`].
pub struct Enumerator<'r, K, V, S> {
    reader: &'r FileReader<K, V, S>,
    pos: u64,
    expect_marker: bool,
    done: bool,
    started: bool,
}

impl<'r, K, V, S> Iterator for Enumerator<'r, K, V, S>
where
    K: Clone,
    S: Read + Write + Seek,
{
    type Item = Result<KeyValue<K, FileLoader<V, S>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
            // An empty stream has no chunk at all; treat as immediately done.
            let empty = match self.reader.shared.with_stream(|s| Ok(s.seek(SeekFrom::End(0))? == 0)) {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            if empty {
                self.done = true;
                return None;
            }
        }
        loop {
            let step = self.reader.shared.with_stream(|stream| {
                read_chunk_step(
                    stream,
                    self.pos,
                    self.expect_marker,
                    self.reader.key_handler.as_ref(),
                    self.reader.strict_length,
                )
            });
            let (step, new_pos) = match step {
                Ok(v) => v,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };
            self.expect_marker = false;
            match step {
                ChunkStep::Entry { key, value_offset } => {
                    self.pos = new_pos;
                    let loader = self.reader.loader_for(value_offset);
                    return Some(Ok(KeyValue::new(key, loader)));
                }
                ChunkStep::Chain { next_offset } => {
                    if next_offset == 0 {
                        self.done = true;
                        return None;
                    }
                    self.pos = next_offset;
                    self.expect_marker = true;
                    continue;
                }
            }
        }
    }
}

/// Blanket impl so a bare [`FileReader`] can itself be driven through the
/// `Database` contract for read-only access ahead of being wrapped by
/// [`super::FileDatabase`].
impl<K, V, S> Database<K, V> for FileReader<K, V, S>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
    S: Read + Write + Seek + 'static,
{
    type Loader = FileLoader<V, S>;

    fn insert_range(&self, _pairs: Vec<(K, V)>) -> Result<()> {
        Err(Error::ReadOnlyViolation)
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>> {
        Ok(Box::new(FileReader::enumerate(self)?))
    }
}
