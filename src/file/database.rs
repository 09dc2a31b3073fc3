// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Binds a [`FileReader`] and [`FileWriter`] over one shared stream and
//! implements the [`Database`] contract.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::database::Database;
use crate::error::Result;
use crate::lazy::KeyValue;
use crate::type_handler::{TypeHandler, TypeRegistry};

use super::reader::{FileLoader, FileReader, PositionCache};
use super::writer::FileWriter;
use super::Shared;

/// Construction knobs for a [`FileDatabase`], matching the `source` /
/// `dispose_inner` / `key_type` / `value_type` knobs named for `Database`
/// construction generally. `source` (file path vs. already-open stream)
/// is handled by the caller choosing what `S` to open and pass to
/// [`FileDatabase::open`]; this struct covers the rest.
pub struct FileDatabaseOptions<K, V> {
    /// Whether disposing this database also closes the underlying stream.
    pub dispose_inner: bool,
    /// The handler used to encode/decode keys. Its `id()` is never
    /// persisted.
    pub key_handler: Arc<dyn TypeHandler<K>>,
    /// The handler used to encode newly written values.
    pub value_handler: Arc<dyn TypeHandler<V>>,
    /// Handlers consulted when decoding values, keyed by type-id. Must
    /// include `value_handler` to read back what was just written.
    pub value_registry: TypeRegistry<V>,
    /// See [`crate::codec::read_length`].
    pub strict_length_decoding: bool,
}

impl<K, V> FileDatabaseOptions<K, V> {
    /// A registry containing only `value_handler`, `dispose_inner = false`,
    /// legacy (non-strict) length decoding.
    pub fn new(key_handler: Arc<dyn TypeHandler<K>>, value_handler: Arc<dyn TypeHandler<V>>) -> Self {
        let mut value_registry = TypeRegistry::new();
        value_registry.register(value_handler.clone());
        Self {
            dispose_inner: false,
            key_handler,
            value_handler,
            value_registry,
            strict_length_decoding: false,
        }
    }

    pub fn with_dispose_inner(mut self, dispose_inner: bool) -> Self {
        self.dispose_inner = dispose_inner;
        self
    }

    pub fn with_strict_length_decoding(mut self, strict: bool) -> Self {
        self.strict_length_decoding = strict;
        self
    }

    /// Adds a handler the reader can decode but the writer never produces,
    /// so the store can read values written by an earlier handler revision.
    pub fn register_value_handler(mut self, handler: Arc<dyn TypeHandler<V>>) -> Self {
        self.value_registry.register(handler);
        self
    }
}

/// An append-only, file-backed `Database`. Binds one [`FileReader`] and
/// one [`FileWriter`] over a single shared, mutex-guarded stream.
pub struct FileDatabase<K, V, S> {
    reader: FileReader<K, V, S>,
    writer: FileWriter<K, V, S>,
    cache: Arc<PositionCache<V>>,
    shared: Arc<Shared<S>>,
    dispose_inner: bool,
}

impl<K, V, S> FileDatabase<K, V, S>
where
    S: Read + Write + Seek,
{
    /// Opens `stream` as a database, re-deriving the terminal chunk by
    /// walking the chain forward from offset zero.
    pub fn open(stream: S, options: FileDatabaseOptions<K, V>) -> Result<Self> {
        let shared = Shared::new(stream);
        let cache = Arc::new(PositionCache::default());
        let writer = FileWriter::open(
            shared.clone(),
            options.key_handler.clone(),
            options.value_handler.clone(),
            options.strict_length_decoding,
        )?;
        let reader = FileReader {
            shared: shared.clone(),
            key_handler: options.key_handler,
            value_registry: Arc::new(options.value_registry),
            strict_length: options.strict_length_decoding,
            cache: cache.clone(),
        };
        Ok(Self {
            reader,
            writer,
            cache,
            shared,
            dispose_inner: options.dispose_inner,
        })
    }

    /// Invalidates the reader's positional cache. Normally unnecessary:
    /// every write already drains it.
    pub fn drain_buffer(&self) {
        self.reader.drain_buffer();
    }

    /// Returns the first entry, or [`crate::error::Error::NotFound`] if
    /// the store is empty.
    pub fn first(&self) -> Result<KeyValue<K, FileLoader<V, S>>>
    where
        K: Clone,
    {
        self.reader.first()
    }

    /// Linear scan for the first entry matching `key`.
    pub fn get_by_index(&self, key: &K) -> Result<KeyValue<K, FileLoader<V, S>>>
    where
        K: Clone + PartialEq,
    {
        self.reader.get_by_index(key)
    }

    /// Linear scan for every entry matching `key`, in file order.
    pub fn get_multiple_by_index(&self, key: &K) -> Result<Vec<KeyValue<K, FileLoader<V, S>>>>
    where
        K: Clone + PartialEq,
    {
        self.reader.get_multiple_by_index(key)
    }

    /// Replaces `pair`'s value in place. Fails with
    /// [`crate::error::Error::OverwriteSizeMismatch`] unless `new_value`
    /// encodes to the same payload length as the value being replaced.
    pub fn overwrite_value(
        &self,
        pair: &KeyValue<K, FileLoader<V, S>>,
        new_value: &V,
    ) -> Result<()> {
        self.writer
            .overwrite_value(pair.value.offset(), new_value, &self.cache)
    }

    /// Enumerates `self` and inserts everything into `target` as one
    /// batch, in enumeration order. The append-only format never reclaims
    /// space in place; cleaning into a fresh target compacts it.
    pub fn clean_to<T>(&self, target: &T) -> Result<()>
    where
        K: Clone + 'static,
        V: Clone + 'static,
        T: Database<K, V>,
    {
        let pairs = self
            .reader
            .enumerate()?
            .map(|kv| {
                let kv = kv?;
                Ok((kv.key, kv.value.load()?))
            })
            .collect::<Result<Vec<_>>>()?;
        target.insert_range(pairs)
    }

    /// The dual of [`Self::clean_to`]: enumerates `source` and inserts
    /// everything into `self` as one batch.
    pub fn clean_from<D>(&self, source: &D) -> Result<()>
    where
        K: Clone + PartialEq + 'static,
        V: Clone + 'static,
        S: 'static,
        D: Database<K, V>,
    {
        let pairs = source
            .enumerate()?
            .map(|kv| {
                let kv = kv?;
                Ok((kv.key, kv.value.load()?))
            })
            .collect::<Result<Vec<_>>>()?;
        self.insert_range(pairs)
    }
}

impl<K, V, S> Database<K, V> for FileDatabase<K, V, S>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
    S: Read + Write + Seek + 'static,
{
    type Loader = FileLoader<V, S>;

    fn insert_range(&self, pairs: Vec<(K, V)>) -> Result<()> {
        self.writer.insert_range(&pairs, &self.cache)
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>> {
        Ok(Box::new(self.reader.enumerate()?))
    }

    fn dispose(&self) -> Result<()> {
        if self.dispose_inner {
            self.shared.dispose();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_handler::StringHandler;
    use std::io::Cursor;

    fn string_options() -> FileDatabaseOptions<String, String> {
        FileDatabaseOptions::new(Arc::new(StringHandler), Arc::new(StringHandler))
    }

    #[test]
    fn insert_then_read() {
        let db = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        db.insert_range(vec![
            ("a".to_string(), "1".to_string()),
            ("b".to_string(), "2".to_string()),
            ("c".to_string(), "3".to_string()),
        ])
        .unwrap();

        assert_eq!(db.get(&"b".to_string()).unwrap(), "2");
        assert_eq!(db.get(&"c".to_string()).unwrap(), "3");
        let keys: Vec<_> = db
            .enumerate()
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn multiple_batches_link_correctly() {
        let db = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        db.insert("a".to_string(), "1".to_string()).unwrap();
        db.insert("b".to_string(), "2".to_string()).unwrap();
        db.insert("c".to_string(), "3".to_string()).unwrap();

        let keys: Vec<_> = db
            .enumerate()
            .unwrap()
            .map(|kv| kv.unwrap().key)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn duplicate_keys_get_first_get_all_all() {
        let db = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        db.insert_range(vec![
            ("k".to_string(), "1".to_string()),
            ("k".to_string(), "2".to_string()),
            ("k".to_string(), "3".to_string()),
        ])
        .unwrap();

        assert_eq!(db.get(&"k".to_string()).unwrap(), "1");
        let all: Vec<String> = db
            .get_all(&"k".to_string())
            .unwrap()
            .iter()
            .map(|l| l.load().unwrap())
            .collect();
        assert_eq!(all, vec!["1", "2", "3"]);
    }

    #[test]
    fn overwrite_same_size_value() {
        let db = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        db.insert("k".to_string(), "abc".to_string()).unwrap();
        let pair = db.get_by_index(&"k".to_string()).unwrap();

        db.overwrite_value(&pair, &"xyz".to_string()).unwrap();
        assert_eq!(db.get(&"k".to_string()).unwrap(), "xyz");

        let err = db
            .overwrite_value(&pair, &"toolong".to_string())
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::OverwriteSizeMismatch { .. }
        ));
    }

    #[test]
    fn overwrite_invalidates_an_already_loaded_handle() {
        let db = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        db.insert("k".to_string(), "abc".to_string()).unwrap();
        let pair = db.get_by_index(&"k".to_string()).unwrap();

        // Memoize the pre-overwrite value on this specific loader before
        // touching the stream again.
        assert_eq!(pair.value.load().unwrap(), "abc");

        db.overwrite_value(&pair, &"xyz".to_string()).unwrap();

        // The outstanding loader must not keep serving its pre-overwrite
        // memo; `drain_buffer` resets it, not just the reader's own map.
        assert_eq!(pair.value.load().unwrap(), "xyz");
    }

    #[test]
    fn clean_compacts_into_single_chunk() {
        let a = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        for i in 0..100 {
            a.insert(format!("k{i}"), format!("v{i}")).unwrap();
        }
        let b = FileDatabase::open(Cursor::new(Vec::new()), string_options()).unwrap();
        a.clean_to(&b).unwrap();

        let a_keys: Vec<_> = a.enumerate().unwrap().map(|kv| kv.unwrap().key).collect();
        let b_keys: Vec<_> = b.enumerate().unwrap().map(|kv| kv.unwrap().key).collect();
        assert_eq!(a_keys, b_keys);
    }
}
