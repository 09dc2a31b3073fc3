// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! An in-RAM `Database` implementation preserving insertion order.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::database::Database;
use crate::error::Result;
use crate::lazy::{EagerLoader, KeyValue};

/// Backing store: an ordered sequence of pairs. `insert_range` appends;
/// `get`/`try_get`/`get_all` scan linearly, matching the on-disk stores'
/// semantics so callers can swap a `MemoryDatabase` in for a
/// `FileDatabase` during tests without behavior drift.
#[derive(Debug, Default, Clone)]
pub struct MemoryDatabase<K, V> {
    entries: Arc<RwLock<Vec<(K, V)>>>,
}

impl<K, V> MemoryDatabase<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl<K, V> Database<K, V> for MemoryDatabase<K, V>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
{
    type Loader = EagerLoader<V>;

    fn insert_range(&self, pairs: Vec<(K, V)>) -> Result<()> {
        self.entries.write().extend(pairs);
        Ok(())
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>> {
        let snapshot = self.entries.read().clone();
        Ok(Box::new(
            snapshot
                .into_iter()
                .map(|(k, v)| Ok(KeyValue::new(k, EagerLoader(v)))),
        ))
    }
}
