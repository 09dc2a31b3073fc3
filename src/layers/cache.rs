// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Memoizes lazy-loader handles by enumeration position, so that
//! repeated enumerations over a stable inner database yield the same
//! (memoizing) loader for a given position and a single `load()` suffices
//! for the cache's lifetime.
//!
//! Insert policy (open question, resolved per `spec.md` §9): inserting
//! into the inner database does not invalidate already-cached positions;
//! the cache list is lazily extended the next time enumeration reaches a
//! position it has not seen before. This assumes the inner's enumeration
//! order is stable and only grows at the tail.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::database::Database;
use crate::error::Result;
use crate::lazy::{KeyValue, LazyLoader};

/// A loader that memoizes its first successful `load()`. `load_count`
/// tracks how many times the inner loader was actually invoked, which
/// should never exceed 1 for the lifetime of the cache.
pub struct CacheLoader<V, L> {
    inner: L,
    memo: Arc<Mutex<Option<V>>>,
    loads: Arc<AtomicUsize>,
}

impl<V, L: Clone> Clone for CacheLoader<V, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            memo: self.memo.clone(),
            loads: self.loads.clone(),
        }
    }
}

impl<V, L> CacheLoader<V, L> {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl<V: Clone, L: LazyLoader<V>> LazyLoader<V> for CacheLoader<V, L> {
    fn load(&self) -> Result<V> {
        if let Some(v) = self.memo.lock().as_ref() {
            return Ok(v.clone());
        }
        let value = self.inner.load()?;
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.memo.lock() = Some(value.clone());
        Ok(value)
    }
}

/// Wraps any `Database<K, V>`, memoizing lazy-loaders by position.
pub struct CacheDatabase<K, V, D>
where
    D: Database<K, V>,
{
    inner: D,
    slots: Mutex<Vec<CacheLoader<V, D::Loader>>>,
}

impl<K, V, D> CacheDatabase<K, V, D>
where
    D: Database<K, V>,
{
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            slots: Mutex::new(Vec::new()),
        }
    }

    pub fn inner_database(&self) -> &D {
        &self.inner
    }
}

impl<K, V, D> Database<K, V> for CacheDatabase<K, V, D>
where
    D: Database<K, V>,
    V: Clone + 'static,
    D::Loader: 'static,
{
    type Loader = CacheLoader<V, D::Loader>;

    fn insert_range(&self, pairs: Vec<(K, V)>) -> Result<()> {
        self.inner.insert_range(pairs)
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>> {
        let mut slots = self.slots.lock();
        let mut out = Vec::new();
        for (i, kv) in self.inner.enumerate()?.enumerate() {
            let kv = kv?;
            if i >= slots.len() {
                slots.push(CacheLoader {
                    inner: kv.value,
                    memo: Arc::new(Mutex::new(None)),
                    loads: Arc::new(AtomicUsize::new(0)),
                });
            }
            out.push(Ok(KeyValue::new(kv.key, slots[i].clone())));
        }
        Ok(Box::new(out.into_iter()))
    }

    fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }
}
