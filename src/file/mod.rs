// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! The on-disk storage engine: a codec-backed reader and writer sharing a
//! single seekable stream, bound together by [`database::FileDatabase`].

mod database;
mod reader;
mod writer;

pub use database::{FileDatabase, FileDatabaseOptions};
pub use reader::{FileLoader, FileReader};
pub use writer::FileWriter;

use parking_lot::Mutex;
use std::io::{Read, Seek, Write};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A handle to the stream shared by a reader and a writer, plus the mutex
/// serializing access to it. `None` once the database has been disposed.
pub(crate) struct Shared<S> {
    stream: Mutex<Option<S>>,
}

impl<S> Shared<S> {
    fn new(stream: S) -> Arc<Self> {
        Arc::new(Self {
            stream: Mutex::new(Some(stream)),
        })
    }

    /// Runs `f` with exclusive access to the stream, for the duration of a
    /// single structural read/write. Fails with [`Error::UseAfterDispose`]
    /// if the database has been disposed.
    fn with_stream<R>(&self, f: impl FnOnce(&mut S) -> Result<R>) -> Result<R>
    where
        S: Read + Write + Seek,
    {
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or(Error::UseAfterDispose)?;
        f(stream)
    }

    fn dispose(&self) {
        self.stream.lock().take();
    }

    fn is_disposed(&self) -> bool {
        self.stream.lock().is_none()
    }
}
