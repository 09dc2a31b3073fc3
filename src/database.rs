// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The uniform contract implemented by every backing store and every
//! layer in this crate.

use crate::error::Result;
use crate::lazy::{KeyValue, LazyLoader};

/// A key/value database: in-memory, file-backed, or a layer delegating to
/// an inner `Database`. Every implementation names its own concrete
/// lazy-loader type via `Loader`, so layers can wrap it without resorting
/// to a boxed trait object.
pub trait Database<K, V> {
    type Loader: LazyLoader<V>;

    /// Inserts a single pair. Equivalent to `insert_range` with one item.
    fn insert(&self, key: K, value: V) -> Result<()> {
        self.insert_range(vec![(key, value)])
    }

    /// Inserts a batch of pairs as a single logical unit.
    fn insert_range(&self, pairs: Vec<(K, V)>) -> Result<()>;

    /// Returns the first match in enumeration order, or
    /// [`crate::error::Error::NotFound`].
    fn get(&self, key: &K) -> Result<V>
    where
        K: PartialEq,
    {
        self.try_get(key)?.ok_or(crate::error::Error::NotFound)
    }

    /// Returns the first match in enumeration order, or `None`.
    fn try_get(&self, key: &K) -> Result<Option<V>>
    where
        K: PartialEq,
    {
        for kv in self.enumerate()? {
            let kv = kv?;
            if &kv.key == key {
                return Ok(Some(kv.value.load()?));
            }
        }
        Ok(None)
    }

    /// Returns every match, in enumeration order, as lazy loaders.
    fn get_all(&self, key: &K) -> Result<Vec<Self::Loader>>
    where
        K: PartialEq,
    {
        let mut out = Vec::new();
        for kv in self.enumerate()? {
            let kv = kv?;
            if &kv.key == key {
                out.push(kv.value);
            }
        }
        Ok(out)
    }

    /// Enumerates every pair in insertion order. Yielding a pair never
    /// materializes its value; `Load()` on the lazy-loader does that.
    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>>;

    /// Releases resources held by this database. Disposing an outer layer
    /// does not dispose its inner database unless explicitly configured to.
    fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
