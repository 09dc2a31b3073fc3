// Copyright 2019-2023 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Byte-level primitives shared by the file reader and writer: the
//! variable-width length prefix and the record tag bytes.
//!
//! # Length prefix
//!
//! ```text
//! ├──────────────┬─────────────┤
//! │discriminant:1│payload:1/2/4/8│
//! └──────────────┴─────────────┘
//! ```
//!
//! The four discriminants are fixed and MUST NOT change: existing files
//! depend on them.

use std::io::{Read, Write};

use crate::error::{DecodeError, EncodeError};

/// 1-byte length payload follows.
pub const LEN_TAG_U8: u8 = 0xFE;
/// 2-byte little-endian length payload follows.
pub const LEN_TAG_U16: u8 = 0xFD;
/// 4-byte little-endian length payload follows.
pub const LEN_TAG_U32: u8 = 0xFC;
/// 8-byte little-endian signed length payload follows.
pub const LEN_TAG_I64: u8 = 0xFB;

/// Record kind: a jump pointer to the next index chunk.
pub const TAG_INDEX_CHAIN: u8 = 0x10;
/// Record kind: a key bound to an absolute value offset.
pub const TAG_INDEX_ENTRY: u8 = 0x11;
/// Record kind: a typed, length-prefixed payload.
pub const TAG_VALUE: u8 = 0x12;
/// Marks the start of a chunk's index region. Written once per chunk,
/// immediately before its first `IndexEntry`.
pub const TAG_CHUNK_START: u8 = 0x13;

/// Reserved [`crate::type_handler::TypeHandler`] ids. Custom handlers must
/// use an id `>= CUSTOM_TYPE_ID_MIN`.
pub const TYPE_ID_BYTES: u8 = 0x01;
pub const TYPE_ID_STRING: u8 = 0x02;
pub const TYPE_ID_STREAM: u8 = 0x03;
pub const CUSTOM_TYPE_ID_MIN: u8 = 0x30;

/// Returns the exact on-disk byte cost of encoding `n` as a length prefix:
/// one discriminant byte plus the narrowest payload width that fits.
pub fn estimate_length_size(n: u64) -> usize {
    if n <= u8::MAX as u64 {
        1 + 1
    } else if n <= u16::MAX as u64 {
        1 + 2
    } else if n <= u32::MAX as u64 {
        1 + 4
    } else {
        1 + 8
    }
}

/// Writes a length prefix, picking the narrowest representation that fits
/// `n`. `n` is accepted as `i64` so that lengths derived from subtraction
/// can be checked for negativity without a separate cast at the call site.
pub fn write_length<W: Write>(w: &mut W, n: i64) -> crate::error::Result<()> {
    if n < 0 {
        return Err(EncodeError::NegativeLength(n).into());
    }
    let n = n as u64;
    if n <= u8::MAX as u64 {
        w.write_all(&[LEN_TAG_U8, n as u8])?;
    } else if n <= u16::MAX as u64 {
        let mut buf = [0u8; 3];
        buf[0] = LEN_TAG_U16;
        buf[1..].copy_from_slice(&(n as u16).to_le_bytes());
        w.write_all(&buf)?;
    } else if n <= u32::MAX as u64 {
        let mut buf = [0u8; 5];
        buf[0] = LEN_TAG_U32;
        buf[1..].copy_from_slice(&(n as u32).to_le_bytes());
        w.write_all(&buf)?;
    } else {
        let mut buf = [0u8; 9];
        buf[0] = LEN_TAG_I64;
        buf[1..].copy_from_slice(&(n as i64).to_le_bytes());
        w.write_all(&buf)?;
    }
    Ok(())
}

/// Reads a length prefix. With `strict = false` (the default, matching
/// legacy on-disk behavior) an unrecognized discriminant returns `Ok(0)`
/// rather than failing. With `strict = true` it returns
/// [`DecodeError::UnknownLengthDiscriminant`].
pub fn read_length<R: Read>(r: &mut R, strict: bool) -> crate::error::Result<u64> {
    let mut tag = [0u8; 1];
    r.read_exact(&mut tag).map_err(map_eof)?;
    match tag[0] {
        LEN_TAG_U8 => {
            let mut buf = [0u8; 1];
            r.read_exact(&mut buf).map_err(map_eof)?;
            Ok(buf[0] as u64)
        }
        LEN_TAG_U16 => {
            let mut buf = [0u8; 2];
            r.read_exact(&mut buf).map_err(map_eof)?;
            Ok(u16::from_le_bytes(buf) as u64)
        }
        LEN_TAG_U32 => {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf).map_err(map_eof)?;
            Ok(u32::from_le_bytes(buf) as u64)
        }
        LEN_TAG_I64 => {
            let mut buf = [0u8; 8];
            r.read_exact(&mut buf).map_err(map_eof)?;
            let n = i64::from_le_bytes(buf);
            if n < 0 {
                Err(EncodeError::NegativeLength(n).into())
            } else {
                Ok(n as u64)
            }
        }
        other if strict => Err(DecodeError::UnknownLengthDiscriminant(other).into()),
        _ => Ok(0),
    }
}

fn map_eof(e: std::io::Error) -> crate::error::Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        DecodeError::Truncated.into()
    } else {
        e.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn estimate_matches_written_bytes() {
        for n in [0u64, 1, 255, 256, 65535, 65536, u32::MAX as u64, u32::MAX as u64 + 1] {
            let mut buf = Vec::new();
            write_length(&mut buf, n as i64).unwrap();
            assert_eq!(buf.len(), estimate_length_size(n));
        }
    }

    #[test]
    fn round_trip_all_widths() {
        for n in [0u64, 1, 200, 255, 256, 60000, 65535, 65536, 5_000_000, u32::MAX as u64, u32::MAX as u64 + 1, i64::MAX as u64] {
            let mut buf = Vec::new();
            write_length(&mut buf, n as i64).unwrap();
            let mut cur = Cursor::new(buf);
            let got = read_length(&mut cur, true).unwrap();
            assert_eq!(got, n);
        }
    }

    #[test]
    fn negative_length_rejected() {
        let mut buf = Vec::new();
        assert!(write_length(&mut buf, -1).is_err());
    }

    #[test]
    fn unknown_discriminant_legacy_is_zero() {
        let mut cur = Cursor::new(vec![0x99u8]);
        assert_eq!(read_length(&mut cur, false).unwrap(), 0);
    }

    #[test]
    fn unknown_discriminant_strict_errors() {
        let mut cur = Cursor::new(vec![0x99u8]);
        assert!(read_length(&mut cur, true).is_err());
    }

    #[quickcheck_macros::quickcheck]
    fn prop_round_trip(n: u32) -> bool {
        let n = n as u64;
        let mut buf = Vec::new();
        write_length(&mut buf, n as i64).unwrap();
        let mut cur = Cursor::new(buf.clone());
        read_length(&mut cur, true).unwrap() == n && buf.len() == estimate_length_size(n)
    }
}
