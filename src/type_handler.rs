// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Pluggable (de)serialization for on-disk value types, keyed by a single
//! byte id. Built-in handlers cover byte arrays, UTF-8 strings, and
//! stream-as-bytes payloads; custom handlers must use ids `>= 0x30`.

use std::io::{Read, Write};
use std::sync::Arc;

use ahash::HashMap;

use crate::codec::{self, CUSTOM_TYPE_ID_MIN};
use crate::error::{DecodeError, EncodeError, Result};

/// A codec for a single on-disk value type `T`.
pub trait TypeHandler<T>: Send + Sync {
    /// The byte id this handler is addressed by in a [`TypeRegistry`].
    fn id(&self) -> u8;
    /// The exact number of bytes [`Self::write`] will emit for `item`.
    fn length(&self, item: &T) -> u64;
    /// Writes exactly `length(item)` bytes of payload.
    fn write(&self, w: &mut dyn Write, item: &T) -> Result<()>;
    /// Reads exactly `len` bytes of payload and decodes them into a `T`.
    fn read(&self, r: &mut dyn Read, len: u64) -> Result<T>;
    /// Value equality as seen by this handler (used by `Get`/`GetAll`
    /// callers that compare decoded values, not by the store itself).
    fn compare(&self, a: &T, b: &T) -> bool;
}

/// Writes a typed value record body: `[type-id:1][length-prefix][payload]`.
/// The caller is responsible for the preceding `TAG_VALUE` byte.
pub fn write_typed<W: Write, T>(w: &mut W, handler: &dyn TypeHandler<T>, item: &T) -> Result<()> {
    w.write_all(&[handler.id()])?;
    let len = handler.length(item);
    codec::write_length(w, len as i64)?;
    let mut sink = CountingSink::wrap(w);
    handler.write(&mut sink, item)?;
    let written = sink.count();
    if written != len {
        return Err(EncodeError::HandlerLengthMismatch {
            id: handler.id(),
            expected: len,
            actual: written,
        }
        .into());
    }
    Ok(())
}

/// Reads a typed value record body, given a registry to dispatch the type-id
/// byte against. The caller is responsible for having already consumed the
/// preceding `TAG_VALUE` byte.
pub fn read_typed<R: Read, T>(
    r: &mut R,
    registry: &TypeRegistry<T>,
    strict_length: bool,
) -> Result<T> {
    let mut id = [0u8; 1];
    r.read_exact(&mut id).map_err(|e| map_eof(e))?;
    let handler = registry
        .get(id[0])
        .ok_or(DecodeError::UnknownTypeId(id[0]))?;
    let len = codec::read_length(r, strict_length)?;
    handler.read(r, len)
}

/// Writes a key as `[length-prefix][payload]`, with no type-id byte: an
/// `IndexEntry`'s key is always decoded with the one `TypeHandler<K>` the
/// store was opened with, so there is nothing to dispatch on.
pub fn write_key<W: Write, K>(w: &mut W, handler: &dyn TypeHandler<K>, key: &K) -> Result<()> {
    let len = handler.length(key);
    codec::write_length(w, len as i64)?;
    let mut sink = CountingSink::wrap(w);
    handler.write(&mut sink, key)?;
    let written = sink.count();
    if written != len {
        return Err(EncodeError::HandlerLengthMismatch {
            id: handler.id(),
            expected: len,
            actual: written,
        }
        .into());
    }
    Ok(())
}

/// Reads a key previously written by [`write_key`].
pub fn read_key<R: Read, K>(r: &mut R, handler: &dyn TypeHandler<K>, strict_length: bool) -> Result<K> {
    let len = codec::read_length(r, strict_length)?;
    handler.read(r, len)
}

fn map_eof(e: std::io::Error) -> crate::error::Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        DecodeError::Truncated.into()
    } else {
        e.into()
    }
}

/// Wraps a `Write` to count the bytes actually written, so
/// [`write_typed`] can enforce the handler's length contract.
struct CountingSink<'a> {
    inner: &'a mut dyn Write,
    count: u64,
}

impl<'a> CountingSink<'a> {
    fn wrap(inner: &'a mut dyn Write) -> Self {
        Self { inner, count: 0 }
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl Write for CountingSink<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Maps type ids to the handler that can decode them. A `FileDatabase`
/// writes with a single *active* handler but can read any value type
/// registered here, which lets a store evolve its on-disk encoding over
/// time while remaining able to read older records.
#[derive(Clone)]
pub struct TypeRegistry<T> {
    handlers: HashMap<u8, Arc<dyn TypeHandler<T>>>,
}

impl<T> Default for TypeRegistry<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::default(),
        }
    }
}

impl<T> TypeRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler`. Custom handlers must use an id `>= 0x30`;
    /// panics otherwise, since that would silently collide with reserved
    /// built-in ids.
    pub fn register(&mut self, handler: Arc<dyn TypeHandler<T>>) -> &mut Self {
        let id = handler.id();
        assert!(
            id >= CUSTOM_TYPE_ID_MIN || is_builtin_id(id),
            "custom type handler ids must be >= {CUSTOM_TYPE_ID_MIN:#x}, got {id:#x}"
        );
        self.handlers.insert(id, handler);
        self
    }

    pub fn get(&self, id: u8) -> Option<&Arc<dyn TypeHandler<T>>> {
        self.handlers.get(&id)
    }
}

fn is_builtin_id(id: u8) -> bool {
    matches!(
        id,
        codec::TYPE_ID_BYTES | codec::TYPE_ID_STRING | codec::TYPE_ID_STREAM
    )
}

/// Built-in handler for `Vec<u8>`, reserved id `0x01`.
pub struct ByteArrayHandler;

impl TypeHandler<Vec<u8>> for ByteArrayHandler {
    fn id(&self) -> u8 {
        codec::TYPE_ID_BYTES
    }

    fn length(&self, item: &Vec<u8>) -> u64 {
        item.len() as u64
    }

    fn write(&self, w: &mut dyn Write, item: &Vec<u8>) -> Result<()> {
        w.write_all(item)?;
        Ok(())
    }

    fn read(&self, r: &mut dyn Read, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf).map_err(map_eof)?;
        Ok(buf)
    }

    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> bool {
        a == b
    }
}

/// Built-in handler for UTF-8 `String`, reserved id `0x02`.
pub struct StringHandler;

impl TypeHandler<String> for StringHandler {
    fn id(&self) -> u8 {
        codec::TYPE_ID_STRING
    }

    fn length(&self, item: &String) -> u64 {
        item.len() as u64
    }

    fn write(&self, w: &mut dyn Write, item: &String) -> Result<()> {
        w.write_all(item.as_bytes())?;
        Ok(())
    }

    fn read(&self, r: &mut dyn Read, len: u64) -> Result<String> {
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf).map_err(map_eof)?;
        String::from_utf8(buf).map_err(|_| DecodeError::Truncated.into())
    }

    fn compare(&self, a: &String, b: &String) -> bool {
        a == b
    }
}

/// Built-in handler for an opaque byte stream, reserved id `0x03`. Unlike
/// [`ByteArrayHandler`], this handler exists to mark payloads that were
/// sourced from an `impl Read` at write time rather than an in-memory
/// buffer; its on-disk representation is identical (raw bytes), so it is
/// modeled the same way as [`ByteArrayHandler`] here.
pub struct StreamHandler;

impl TypeHandler<Vec<u8>> for StreamHandler {
    fn id(&self) -> u8 {
        codec::TYPE_ID_STREAM
    }

    fn length(&self, item: &Vec<u8>) -> u64 {
        item.len() as u64
    }

    fn write(&self, w: &mut dyn Write, item: &Vec<u8>) -> Result<()> {
        w.write_all(item)?;
        Ok(())
    }

    fn read(&self, r: &mut dyn Read, len: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf).map_err(map_eof)?;
        Ok(buf)
    }

    fn compare(&self, a: &Vec<u8>, b: &Vec<u8>) -> bool {
        a == b
    }
}
