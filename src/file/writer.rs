// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Append-only batch insertion with index-chain back-patching.
//!
//! A batch is written as a single chunk: `[marker][entries][own chain
//! (0)][values]`. The chunk's own content is written and flushed in full
//! before the *previous* terminal chunk's chain pointer is patched to
//! point at it — that patch is the only write that makes the new chunk
//! reachable, so a crash at any point before it leaves the new chunk
//! unlinked and invisible to readers.

use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{TAG_CHUNK_START, TAG_INDEX_CHAIN, TAG_INDEX_ENTRY, TAG_VALUE};
use crate::error::{DecodeError, Error, Result};
use crate::type_handler::{self, TypeHandler};

use super::reader::{self, PositionCache};
use super::Shared;

struct WriterState {
    /// Absolute offset of the current terminal chunk's own `IndexChain`
    /// tag byte, or `None` if no chunk has ever been written.
    last_chain_offset: Option<u64>,
}

/// Appends batches and back-patches the forward chain. Holds the only
/// mutable book-keeping (`last_chain_offset`) in the whole engine; every
/// other piece of state lives on the shared stream itself.
pub struct FileWriter<K, V, S> {
    shared: Arc<Shared<S>>,
    key_handler: Arc<dyn TypeHandler<K>>,
    value_handler: Arc<dyn TypeHandler<V>>,
    strict_length: bool,
    state: Mutex<WriterState>,
}

impl<K, V, S> FileWriter<K, V, S>
where
    S: Read + Write + Seek,
{
    /// Opens a writer over `shared`, re-deriving the terminal chunk by
    /// walking the chain forward from offset zero. Performed once, not
    /// per insert.
    pub fn open(
        shared: Arc<Shared<S>>,
        key_handler: Arc<dyn TypeHandler<K>>,
        value_handler: Arc<dyn TypeHandler<V>>,
        strict_length: bool,
    ) -> Result<Self> {
        let last_chain_offset = shared.with_stream(|stream| {
            reader::locate_terminal_chain_offset(stream, key_handler.as_ref(), strict_length)
        })?;
        Ok(Self {
            shared,
            key_handler,
            value_handler,
            strict_length,
            state: Mutex::new(WriterState { last_chain_offset }),
        })
    }

    /// Writes `pairs` as a single linked chunk, then drains `cache` so the
    /// reader re-decodes anything that touched the mutated region.
    pub fn insert_range(&self, pairs: &[(K, V)], cache: &PositionCache<V>) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock();

        let mut entry_bufs = Vec::with_capacity(pairs.len());
        for (key, _) in pairs {
            let mut buf = Vec::new();
            type_handler::write_key(&mut buf, self.key_handler.as_ref(), key)?;
            entry_bufs.push(buf);
        }
        let mut value_bufs = Vec::with_capacity(pairs.len());
        for (_, value) in pairs {
            let mut buf = vec![TAG_VALUE];
            type_handler::write_typed(&mut buf, self.value_handler.as_ref(), value)?;
            value_bufs.push(buf);
        }

        let index_region_size: u64 = entry_bufs
            .iter()
            .map(|buf| 1 + buf.len() as u64 + 8)
            .sum();
        const CHAIN_RECORD_SIZE: u64 = 1 + 8;

        let chunk_offset = self
            .shared
            .with_stream(|stream| Ok(stream.seek(SeekFrom::End(0))?))?;

        let mut chunk_buf = Vec::with_capacity(
            1 + index_region_size as usize
                + CHAIN_RECORD_SIZE as usize
                + value_bufs.iter().map(Vec::len).sum::<usize>(),
        );
        chunk_buf.push(TAG_CHUNK_START);

        let mut value_offset = chunk_offset + 1 + index_region_size + CHAIN_RECORD_SIZE;
        for (entry_buf, value_buf) in entry_bufs.iter().zip(value_bufs.iter()) {
            chunk_buf.push(TAG_INDEX_ENTRY);
            chunk_buf.extend_from_slice(entry_buf);
            chunk_buf.extend_from_slice(&value_offset.to_le_bytes());
            value_offset += value_buf.len() as u64;
        }

        let own_chain_offset = chunk_offset + 1 + index_region_size;
        chunk_buf.push(TAG_INDEX_CHAIN);
        chunk_buf.extend_from_slice(&0u64.to_le_bytes());

        for value_buf in &value_bufs {
            chunk_buf.extend_from_slice(value_buf);
        }

        self.shared.with_stream(|stream| {
            stream.seek(SeekFrom::Start(chunk_offset))?;
            stream.write_all(&chunk_buf)?;
            stream.flush()?;
            Ok(())
        })?;

        if let Some(prev_chain_offset) = state.last_chain_offset {
            self.shared.with_stream(|stream| {
                stream.seek(SeekFrom::Start(prev_chain_offset + 1))?;
                stream.write_all(&chunk_offset.to_le_bytes())?;
                stream.flush()?;
                Ok(())
            })?;
        }

        state.last_chain_offset = Some(own_chain_offset);
        drop(state);
        cache.drain();
        log::debug!(
            "insert_range: wrote {} entries at chunk offset {chunk_offset}",
            pairs.len()
        );
        Ok(())
    }

    /// Replaces the payload of the value record at `offset` in place.
    /// Fails with [`Error::OverwriteSizeMismatch`] unless the new value
    /// encodes to exactly the same payload length as the existing one.
    pub fn overwrite_value(
        &self,
        offset: u64,
        new_value: &V,
        cache: &PositionCache<V>,
    ) -> Result<()> {
        let (old_len, payload_start) = self.shared.with_stream(|stream| {
            stream.seek(SeekFrom::Start(offset))?;
            let mut tag = [0u8; 1];
            reader::read_exact(stream, &mut tag)?;
            if tag[0] != TAG_VALUE {
                return Err(DecodeError::UnknownRecordTag(tag[0]).into());
            }
            let mut _type_id = [0u8; 1];
            reader::read_exact(stream, &mut _type_id)?;
            let old_len = crate::codec::read_length(stream, self.strict_length)?;
            let payload_start = stream.stream_position()?;
            Ok((old_len, payload_start))
        })?;

        let new_len = self.value_handler.length(new_value);
        if new_len != old_len {
            return Err(Error::OverwriteSizeMismatch {
                expected: old_len,
                actual: new_len,
            });
        }

        self.shared.with_stream(|stream| {
            stream.seek(SeekFrom::Start(payload_start))?;
            self.value_handler.write(stream, new_value)?;
            stream.flush()?;
            Ok(())
        })?;

        cache.drain();
        log::debug!("overwrite_value: replaced {new_len} bytes at offset {offset}");
        Ok(())
    }
}
