// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A thin wrapper that forwards reads and rejects writes.

use std::marker::PhantomData;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::lazy::KeyValue;

/// Forwards `get`/`try_get`/`get_all`/`enumerate` to `inner`; `insert`
/// and `insert_range` always fail with [`Error::ReadOnlyViolation`].
/// Whether disposing this wrapper also disposes `inner` is a
/// construction-time choice.
pub struct ReadOnlyDatabase<K, V, D> {
    inner: D,
    dispose_inner: bool,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, D> ReadOnlyDatabase<K, V, D>
where
    D: Database<K, V>,
{
    pub fn new(inner: D, dispose_inner: bool) -> Self {
        Self {
            inner,
            dispose_inner,
            _marker: PhantomData,
        }
    }

    pub fn inner_database(&self) -> &D {
        &self.inner
    }
}

impl<K, V, D> Database<K, V> for ReadOnlyDatabase<K, V, D>
where
    D: Database<K, V>,
{
    type Loader = D::Loader;

    fn insert_range(&self, _pairs: Vec<(K, V)>) -> Result<()> {
        Err(Error::ReadOnlyViolation)
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<K, Self::Loader>>> + '_>> {
        self.inner.enumerate()
    }

    fn dispose(&self) -> Result<()> {
        if self.dispose_inner {
            self.inner.dispose()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDatabase;

    #[test]
    fn writes_are_rejected() {
        let inner: MemoryDatabase<&str, i32> = MemoryDatabase::new();
        inner.insert("a", 1).unwrap();
        let ro = ReadOnlyDatabase::new(inner, false);

        assert!(matches!(
            ro.insert("b", 2).unwrap_err(),
            Error::ReadOnlyViolation
        ));
        assert_eq!(ro.get(&"a").unwrap(), 1);
    }

    #[test]
    fn dispose_inner_flag_controls_propagation() {
        let inner: MemoryDatabase<&str, i32> = MemoryDatabase::new();
        let ro = ReadOnlyDatabase::new(inner, true);
        ro.dispose().unwrap();
    }
}
