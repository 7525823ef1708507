// ABOUTME: Binary payload adapter between SQLite blob values and PostgreSQL bytea
// ABOUTME: Accepts NULL, raw bytes or text-surfaced blobs and encodes back to bytes or NULL

use crate::error::DecodeError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ValueRef};
use std::fmt;

/// An owned blob-typed column value.
///
/// `None` is the unset state produced by a NULL source value; it always
/// encodes back to NULL. A zero-length blob is *not* unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BinaryValue(Option<Vec<u8>>);

impl BinaryValue {
    pub fn unset() -> Self {
        BinaryValue(None)
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        BinaryValue(Some(bytes.into()))
    }

    /// Decode a raw SQLite value.
    ///
    /// Some SQLite writers store blob payloads with TEXT affinity, so text
    /// is reinterpreted byte for byte. Numbers are rejected.
    pub fn decode(value: ValueRef<'_>) -> Result<Self, DecodeError> {
        match value {
            ValueRef::Null => Ok(BinaryValue(None)),
            ValueRef::Blob(bytes) => Ok(BinaryValue(Some(bytes.to_vec()))),
            ValueRef::Text(bytes) => Ok(BinaryValue(Some(bytes.to_vec()))),
            ValueRef::Integer(_) => Err(DecodeError::UnsupportedValueKind {
                expected: "binary",
                found: "integer",
            }),
            ValueRef::Real(_) => Err(DecodeError::UnsupportedValueKind {
                expected: "binary",
                found: "real",
            }),
        }
    }

    /// Bytes to bind as a bytea parameter, `None` binds NULL.
    pub fn encode(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    pub fn is_unset(&self) -> bool {
        self.0.is_none()
    }

    pub fn into_inner(self) -> Option<Vec<u8>> {
        self.0
    }
}

impl FromSql for BinaryValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        BinaryValue::decode(value).map_err(|_| FromSqlError::InvalidType)
    }
}

/// Diagnostic rendering only, never used for storage.
impl fmt::Display for BinaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => write!(f, "NULL"),
            Some(bytes) => write!(f, "\\x{}", hex::encode(bytes)),
        }
    }
}

impl fmt::Debug for BinaryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
