// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Error types for the storage engine and the database algebra.

use thiserror::Error;

/// Failures that can occur while encoding a value or a length prefix.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("length {0} cannot be represented as an unsigned on-disk length")]
    NegativeLength(i64),
    #[error("type handler {id} wrote {actual} bytes, expected {expected}")]
    HandlerLengthMismatch { id: u8, expected: u64, actual: u64 },
}

/// Failures that can occur while decoding a record from the stream.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unexpected end of stream while decoding a record")]
    Truncated,
    #[error("unrecognized record tag byte 0x{0:02x}")]
    UnknownRecordTag(u8),
    #[error("no type handler registered for type id 0x{0:02x}")]
    UnknownTypeId(u8),
    #[error("unrecognized length-prefix discriminant byte 0x{0:02x}")]
    UnknownLengthDiscriminant(u8),
}

/// The single error type shared by every `Database` implementation in this
/// crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key not found")]
    NotFound,
    #[error("database is read-only")]
    ReadOnlyViolation,
    #[error("overwrite_value: new encoded length {actual} does not match existing length {expected}")]
    OverwriteSizeMismatch { expected: u64, actual: u64 },
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("operation attempted on a disposed database")]
    UseAfterDispose,
}

pub type Result<T> = std::result::Result<T, Error>;
