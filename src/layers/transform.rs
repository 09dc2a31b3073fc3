// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Converts keys and values across a type boundary around an inner
//! database. Transformers are first-class values, not subclasses.

use std::sync::Arc;

use crate::database::Database;
use crate::error::Result;
use crate::lazy::{KeyValue, LazyLoader};

/// A pair of pure conversions between an outer and an inner
/// representation of the same logical key or value.
#[derive(Clone)]
pub struct Transformer<Outer, Inner> {
    to_inner: Arc<dyn Fn(&Outer) -> Inner + Send + Sync>,
    to_outer: Arc<dyn Fn(Inner) -> Outer + Send + Sync>,
}

impl<Outer, Inner> Transformer<Outer, Inner> {
    pub fn new(
        to_inner: impl Fn(&Outer) -> Inner + Send + Sync + 'static,
        to_outer: impl Fn(Inner) -> Outer + Send + Sync + 'static,
    ) -> Self {
        Self {
            to_inner: Arc::new(to_inner),
            to_outer: Arc::new(to_outer),
        }
    }
}

/// Wraps an inner lazy-loader so `load()` applies the value transformer's
/// `to_outer` conversion to the decoded inner value.
pub struct TransformLoader<Outer, Inner, L> {
    inner: L,
    to_outer: Arc<dyn Fn(Inner) -> Outer + Send + Sync>,
}

impl<Outer, Inner, L: Clone> Clone for TransformLoader<Outer, Inner, L> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            to_outer: self.to_outer.clone(),
        }
    }
}

impl<Outer, Inner, L: LazyLoader<Inner>> LazyLoader<Outer> for TransformLoader<Outer, Inner, L> {
    fn load(&self) -> Result<Outer> {
        Ok((self.to_outer)(self.inner.load()?))
    }
}

/// Composes an inner `Database<Kinner, Vinner>` with a key and a value
/// [`Transformer`]. Every operation converts arguments inbound and
/// results outbound; enumeration re-wraps each lazy-loader so its
/// `load()` applies the value transformer's `to_outer` conversion.
pub struct TransformDatabase<Kouter, Vouter, Kinner, Vinner, D> {
    inner: D,
    keys: Transformer<Kouter, Kinner>,
    values: Transformer<Vouter, Vinner>,
}

impl<Kouter, Vouter, Kinner, Vinner, D> TransformDatabase<Kouter, Vouter, Kinner, Vinner, D>
where
    D: Database<Kinner, Vinner>,
{
    pub fn new(
        inner: D,
        keys: Transformer<Kouter, Kinner>,
        values: Transformer<Vouter, Vinner>,
    ) -> Self {
        Self { inner, keys, values }
    }

    pub fn inner_database(&self) -> &D {
        &self.inner
    }
}

impl<Kouter, Vouter, Kinner, Vinner, D> Database<Kouter, Vouter>
    for TransformDatabase<Kouter, Vouter, Kinner, Vinner, D>
where
    D: Database<Kinner, Vinner>,
    Kinner: 'static,
    Vinner: 'static,
{
    type Loader = TransformLoader<Vouter, Vinner, D::Loader>;

    fn insert_range(&self, pairs: Vec<(Kouter, Vouter)>) -> Result<()> {
        let converted = pairs
            .into_iter()
            .map(|(k, v)| ((self.keys.to_inner)(&k), (self.values.to_inner)(&v)))
            .collect();
        self.inner.insert_range(converted)
    }

    fn enumerate(&self) -> Result<Box<dyn Iterator<Item = Result<KeyValue<Kouter, Self::Loader>>> + '_>> {
        let to_outer_value = self.values.to_outer.clone();
        let to_outer_key = self.keys.to_outer.clone();
        Ok(Box::new(self.inner.enumerate()?.map(move |kv| {
            let kv = kv?;
            let loader = TransformLoader {
                inner: kv.value,
                to_outer: to_outer_value.clone(),
            };
            Ok(KeyValue::new((to_outer_key)(kv.key), loader))
        })))
    }

    fn dispose(&self) -> Result<()> {
        self.inner.dispose()
    }
}
