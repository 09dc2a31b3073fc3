// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A lazy-loader is a capability, not a closure: a small value holding
//! enough state (a stream handle, an offset, a type handler) to seek and
//! decode a value on demand, without borrowing the database itself.

use crate::error::Result;

/// A deferred handle for a value. Obtaining one from enumeration is cheap;
/// the cost of seeking and decoding is paid inside [`LazyLoader::load`].
pub trait LazyLoader<V>: Clone {
    fn load(&self) -> Result<V>;
}

/// A key paired with a lazy-loader for its value.
#[derive(Clone)]
pub struct KeyValue<K, L> {
    pub key: K,
    pub value: L,
}

impl<K, L> KeyValue<K, L> {
    pub fn new(key: K, value: L) -> Self {
        Self { key, value }
    }
}

/// The trivial loader: a value that has already been materialized.
/// Used by [`crate::memory::MemoryDatabase`] to honor the `Database`
/// contract without pretending to defer anything.
#[derive(Clone)]
pub struct EagerLoader<V>(pub V);

impl<V: Clone> LazyLoader<V> for EagerLoader<V> {
    fn load(&self) -> Result<V> {
        Ok(self.0.clone())
    }
}
