//! RDB Snapshot Decoder
//!
//! Walks a Redis RDB file and hands every string entry to a callback as a
//! `(key, value, expiry)` triple. Entries of other types are parsed just far
//! enough to skip over them.
//!
//! ## File Layout
//!
//! ```text
//! "REDIS" <4 ASCII digit version>
//! [0xFA aux-key aux-value]*            metadata, ignored
//! 0xFE <db number>                     select database
//! 0xFB <table size> <expires size>     resize hint
//! [0xFD <u32 LE secs> | 0xFC <u64 LE ms>] <type> <key> <value>
//! ...
//! 0xFF <8 byte checksum>               end of file
//! ```
//!
//! Expiry instants are absolute Unix times and are passed through untouched.

use bytes::{Buf, Bytes};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

const MAGIC: &[u8] = b"REDIS";

/// Newest format version this decoder was written against.
pub const MAX_RDB_VERSION: u32 = 12;

mod opcode {
    pub const IDLE: u8 = 0xF8;
    pub const FREQ: u8 = 0xF9;
    pub const AUX: u8 = 0xFA;
    pub const RESIZE_DB: u8 = 0xFB;
    pub const EXPIRE_TIME_MS: u8 = 0xFC;
    pub const EXPIRE_TIME: u8 = 0xFD;
    pub const SELECT_DB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;
}

mod value_type {
    pub const STRING: u8 = 0;
    pub const LIST: u8 = 1;
    pub const SET: u8 = 2;
    pub const ZSET: u8 = 3;
    pub const HASH: u8 = 4;
    pub const ZSET_2: u8 = 5;
    pub const HASH_ZIPMAP: u8 = 9;
    pub const LIST_ZIPLIST: u8 = 10;
    pub const SET_INTSET: u8 = 11;
    pub const ZSET_ZIPLIST: u8 = 12;
    pub const HASH_ZIPLIST: u8 = 13;
    pub const LIST_QUICKLIST: u8 = 14;
    pub const HASH_LISTPACK: u8 = 16;
    pub const ZSET_LISTPACK: u8 = 17;
    pub const LIST_QUICKLIST_2: u8 = 18;
    pub const SET_LISTPACK: u8 = 20;
}

/// Errors raised while reading or decoding a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an RDB file: bad header")]
    InvalidHeader,

    #[error("unsupported RDB version {0}")]
    UnsupportedVersion(u32),

    #[error("unexpected end of snapshot data")]
    UnexpectedEof,

    #[error("unsupported string encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("unsupported value type {0}")]
    UnsupportedType(u8),

    #[error("unsupported opcode {0:#04x}")]
    UnsupportedOpcode(u8),

    #[error("expiry out of range: {0}")]
    InvalidExpiry(u64),
}

/// Counts reported once decoding finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// String entries handed to the callback
    pub strings: usize,
    /// Entries of other types that were skipped
    pub skipped: usize,
}

/// A decoded length prefix.
enum Length {
    Len(usize),
    /// Special string encoding selector (the low 6 bits of a `11xxxxxx` byte)
    Encoded(u8),
}

/// Decoder over an in-memory RDB image.
///
/// # Example
///
/// ```
/// use redlite::snapshot::RdbDecoder;
///
/// // header, one string entry "k" => "v", EOF, checksum
/// let mut data = b"REDIS0011\x00\x01k\x01v\xff".to_vec();
/// data.extend_from_slice(&[0; 8]);
///
/// let mut entries = Vec::new();
/// let stats = RdbDecoder::new(&data)
///     .for_each_entry(|key, value, expiry| entries.push((key, value, expiry)))
///     .unwrap();
///
/// assert_eq!(stats.strings, 1);
/// assert_eq!(&entries[0].0[..], b"k");
/// ```
pub struct RdbDecoder<'a> {
    buf: &'a [u8],
}

impl<'a> RdbDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { buf: data }
    }

    /// Decodes the whole snapshot, calling `f` for each string entry.
    pub fn for_each_entry<F>(mut self, mut f: F) -> Result<DecodeStats, SnapshotError>
    where
        F: FnMut(Bytes, Bytes, Option<SystemTime>),
    {
        self.read_header()?;

        let mut stats = DecodeStats::default();
        let mut expiry = None;

        loop {
            self.ensure(1)?;
            match self.buf.get_u8() {
                opcode::EOF => break,
                opcode::SELECT_DB => {
                    self.read_plain_length()?;
                }
                opcode::RESIZE_DB => {
                    self.read_plain_length()?;
                    self.read_plain_length()?;
                }
                opcode::AUX => {
                    self.read_string()?;
                    self.read_string()?;
                }
                opcode::EXPIRE_TIME => {
                    self.ensure(4)?;
                    let secs = u64::from(self.buf.get_u32_le());
                    expiry = Some(unix_time(Duration::from_secs(secs), secs)?);
                }
                opcode::EXPIRE_TIME_MS => {
                    self.ensure(8)?;
                    let millis = self.buf.get_u64_le();
                    expiry = Some(unix_time(Duration::from_millis(millis), millis)?);
                }
                // LRU idle time and LFU counter of the next entry
                opcode::IDLE => {
                    self.read_plain_length()?;
                }
                opcode::FREQ => {
                    self.ensure(1)?;
                    self.buf.advance(1);
                }
                op @ 0xF5..=0xF7 => return Err(SnapshotError::UnsupportedOpcode(op)),
                value_type::STRING => {
                    let key = self.read_string()?;
                    let value = self.read_string()?;
                    f(key, value, expiry.take());
                    stats.strings += 1;
                }
                ty => {
                    self.read_string()?;
                    self.skip_value(ty)?;
                    expiry = None;
                    stats.skipped += 1;
                }
            }
        }

        Ok(stats)
    }

    fn read_header(&mut self) -> Result<(), SnapshotError> {
        if self.buf.remaining() < MAGIC.len() + 4 || !self.buf.starts_with(MAGIC) {
            return Err(SnapshotError::InvalidHeader);
        }
        self.buf.advance(MAGIC.len());

        let digits = &self.buf[..4];
        let version: u32 = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(SnapshotError::InvalidHeader)?;
        self.buf.advance(4);

        if version == 0 || version > MAX_RDB_VERSION {
            return Err(SnapshotError::UnsupportedVersion(version));
        }
        Ok(())
    }

    /// Skips the value of a non-string entry.
    fn skip_value(&mut self, ty: u8) -> Result<(), SnapshotError> {
        match ty {
            value_type::LIST | value_type::SET | value_type::LIST_QUICKLIST => {
                for _ in 0..self.read_plain_length()? {
                    self.read_string()?;
                }
            }
            value_type::HASH => {
                for _ in 0..self.read_plain_length()? {
                    self.read_string()?;
                    self.read_string()?;
                }
            }
            value_type::ZSET => {
                for _ in 0..self.read_plain_length()? {
                    self.read_string()?;
                    // Old text-encoded double: 253/254/255 are nan/+inf/-inf
                    self.ensure(1)?;
                    let len = self.buf.get_u8();
                    if len < 253 {
                        self.take(usize::from(len))?;
                    }
                }
            }
            value_type::ZSET_2 => {
                for _ in 0..self.read_plain_length()? {
                    self.read_string()?;
                    self.take(8)?;
                }
            }
            value_type::LIST_QUICKLIST_2 => {
                for _ in 0..self.read_plain_length()? {
                    self.read_plain_length()?;
                    self.read_string()?;
                }
            }
            value_type::HASH_ZIPMAP
            | value_type::LIST_ZIPLIST
            | value_type::SET_INTSET
            | value_type::ZSET_ZIPLIST
            | value_type::HASH_ZIPLIST
            | value_type::HASH_LISTPACK
            | value_type::ZSET_LISTPACK
            | value_type::SET_LISTPACK => {
                self.read_string()?;
            }
            other => return Err(SnapshotError::UnsupportedType(other)),
        }
        Ok(())
    }

    fn read_length(&mut self) -> Result<Length, SnapshotError> {
        self.ensure(1)?;
        let first = self.buf.get_u8();

        match first >> 6 {
            0b00 => Ok(Length::Len(usize::from(first & 0x3F))),
            0b01 => {
                self.ensure(1)?;
                let next = self.buf.get_u8();
                Ok(Length::Len((usize::from(first & 0x3F) << 8) | usize::from(next)))
            }
            0b10 => {
                let len = match first {
                    0x80 => {
                        self.ensure(4)?;
                        u64::from(self.buf.get_u32())
                    }
                    0x81 => {
                        self.ensure(8)?;
                        self.buf.get_u64()
                    }
                    _ => {
                        return Err(SnapshotError::UnsupportedEncoding(format!(
                            "length prefix {:#04x}",
                            first
                        )))
                    }
                };
                // A length that doesn't fit in memory can't be backed by data.
                usize::try_from(len)
                    .map(Length::Len)
                    .map_err(|_| SnapshotError::UnexpectedEof)
            }
            _ => Ok(Length::Encoded(first & 0x3F)),
        }
    }

    fn read_plain_length(&mut self) -> Result<usize, SnapshotError> {
        match self.read_length()? {
            Length::Len(n) => Ok(n),
            Length::Encoded(enc) => Err(SnapshotError::UnsupportedEncoding(format!(
                "special encoding {} where a length was expected",
                enc
            ))),
        }
    }

    /// Reads a string, rendering integer encodings as decimal text.
    fn read_string(&mut self) -> Result<Bytes, SnapshotError> {
        let number = match self.read_length()? {
            Length::Len(n) => return self.take(n),
            Length::Encoded(0) => {
                self.ensure(1)?;
                i64::from(self.buf.get_i8())
            }
            Length::Encoded(1) => {
                self.ensure(2)?;
                i64::from(self.buf.get_i16_le())
            }
            Length::Encoded(2) => {
                self.ensure(4)?;
                i64::from(self.buf.get_i32_le())
            }
            Length::Encoded(3) => {
                return Err(SnapshotError::UnsupportedEncoding(
                    "LZF-compressed string".to_string(),
                ))
            }
            Length::Encoded(other) => {
                return Err(SnapshotError::UnsupportedEncoding(format!(
                    "string encoding {}",
                    other
                )))
            }
        };
        Ok(Bytes::from(number.to_string()))
    }

    fn take(&mut self, n: usize) -> Result<Bytes, SnapshotError> {
        self.ensure(n)?;
        Ok(self.buf.copy_to_bytes(n))
    }

    #[inline]
    fn ensure(&self, n: usize) -> Result<(), SnapshotError> {
        if self.buf.remaining() < n {
            Err(SnapshotError::UnexpectedEof)
        } else {
            Ok(())
        }
    }
}

fn unix_time(offset: Duration, raw: u64) -> Result<SystemTime, SnapshotError> {
    UNIX_EPOCH
        .checked_add(offset)
        .ok_or(SnapshotError::InvalidExpiry(raw))
}
