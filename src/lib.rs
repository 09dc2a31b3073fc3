// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! An embedded, append-only key/value store with a self-describing
//! on-disk binary format and a composable in-memory database algebra.
//!
//! The on-disk engine (`codec` + `type_handler` + `file`) persists
//! batches of `(key, value)` insertions as forward-linked chunks,
//! decoding values lazily on demand. The `Database` trait provides one
//! contract implemented by [`memory::MemoryDatabase`],
//! [`file::FileDatabase`], and the `layers` wrappers
//! (`TransformDatabase`, `CacheDatabase`, `ReadOnlyDatabase`), so any of
//! them can be composed without resorting to a boxed trait object.

pub mod codec;
pub mod database;
pub mod error;
pub mod file;
pub mod layers;
pub mod lazy;
pub mod memory;
pub mod type_handler;

pub use database::Database;
pub use error::{DecodeError, EncodeError, Error, Result};
pub use file::{FileDatabase, FileDatabaseOptions, FileLoader, FileReader, FileWriter};
pub use layers::{CacheDatabase, CacheLoader, ReadOnlyDatabase, TransformDatabase, TransformLoader, Transformer};
pub use lazy::{EagerLoader, KeyValue, LazyLoader};
pub use memory::MemoryDatabase;
pub use type_handler::{ByteArrayHandler, StreamHandler, StringHandler, TypeHandler, TypeRegistry};
