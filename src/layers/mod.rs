// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! `Database` wrappers that delegate to an inner database after
//! transforming, caching, or restricting operations. Each is a plain
//! generic struct over its inner type parameter, matching the teacher's
//! `TrackingStore<T>` / `RollingStore<T>` layering pattern rather than a
//! boxed trait object.

mod cache;
mod readonly;
mod transform;

pub use cache::{CacheDatabase, CacheLoader};
pub use readonly::ReadOnlyDatabase;
pub use transform::{TransformDatabase, TransformLoader, Transformer};
