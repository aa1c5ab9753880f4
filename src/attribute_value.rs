//! Attribute Value Model
//!
//! Typed, renderable attribute values and the ordered multi-value container
//! stored per attribute on an object. Every value renders to a string; the
//! native accessors return `None` when the value is of another kind.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::errors::{PwnError, Result};
use crate::sid::Sid;

/// 100-ns intervals between 1601-01-01 and 1970-01-01
const WINDOWS_EPOCH_DIFF: i64 = 116_444_736_000_000_000;

/// Convert a Windows FILETIME (100-ns ticks since 1601) to a UTC timestamp.
///
/// `0` and `i64::MAX` are the directory's "never" markers and yield `None`.
pub fn filetime_to_datetime(filetime: i64) -> Option<DateTime<Utc>> {
    if filetime <= 0 || filetime == i64::MAX {
        return None;
    }
    let unix_100ns = filetime - WINDOWS_EPOCH_DIFF;
    let secs = unix_100ns.div_euclid(10_000_000);
    let nanos = (unix_100ns.rem_euclid(10_000_000) * 100) as u32;
    Utc.timestamp_opt(secs, nanos).single()
}

/// Convert a UTC timestamp to a Windows FILETIME
pub fn datetime_to_filetime(timestamp: &DateTime<Utc>) -> i64 {
    timestamp.timestamp() * 10_000_000
        + i64::from(timestamp.timestamp_subsec_nanos() / 100)
        + WINDOWS_EPOCH_DIFF
}

/// Decode a 16-byte directory GUID (mixed-endian, MS-DTYP 2.3.4.2)
pub fn guid_from_bytes(bytes: &[u8]) -> Result<Uuid> {
    let raw: [u8; 16] = bytes
        .try_into()
        .map_err(|_| PwnError::InvalidGuid(format!("expected 16 bytes, got {:02x?}", bytes)))?;
    Ok(Uuid::from_bytes_le(raw))
}

/// A single typed attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Time(DateTime<Utc>),
    Sid(Sid),
    Guid(Uuid),
    Blob(Vec<u8>),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer value; decimal strings are accepted since LDAP returns text
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(i) => Some(*i),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            AttributeValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_sid(&self) -> Option<&Sid> {
        match self {
            AttributeValue::Sid(sid) => Some(sid),
            _ => None,
        }
    }

    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            AttributeValue::Guid(guid) => Some(*guid),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            AttributeValue::Blob(bytes) => Some(bytes),
            AttributeValue::Sid(sid) => Some(sid.as_bytes()),
            _ => None,
        }
    }

    pub fn is_string(&self) -> bool {
        matches!(self, AttributeValue::String(_))
    }

    /// SID from a typed value, raw binary or canonical text
    pub fn to_sid(&self) -> Option<Sid> {
        match self {
            AttributeValue::Sid(sid) => Some(sid.clone()),
            AttributeValue::Blob(bytes) => Sid::from_bytes(bytes).ok(),
            AttributeValue::String(text) => Sid::parse(text.trim()).ok(),
            _ => None,
        }
    }

    /// GUID from a typed value, little-endian binary or text with or without braces
    pub fn to_guid(&self) -> Option<Uuid> {
        match self {
            AttributeValue::Guid(guid) => Some(*guid),
            AttributeValue::Blob(bytes) => guid_from_bytes(bytes).ok(),
            AttributeValue::String(text) => Uuid::parse_str(text.trim().trim_matches(&['{', '}'][..])).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{}", i),
            AttributeValue::Time(t) => f.write_str(&t.to_rfc3339()),
            AttributeValue::Sid(sid) => write!(f, "{}", sid),
            AttributeValue::Guid(guid) => write!(f, "{}", guid),
            AttributeValue::Blob(bytes) => {
                for byte in bytes {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AttributeValue::Int(i) => serializer.serialize_i64(*i),
            other => serializer.collect_str(other),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::String(s)
    }
}

impl From<i64> for AttributeValue {
    fn from(i: i64) -> Self {
        AttributeValue::Int(i)
    }
}

impl From<Sid> for AttributeValue {
    fn from(sid: Sid) -> Self {
        AttributeValue::Sid(sid)
    }
}

impl From<Uuid> for AttributeValue {
    fn from(guid: Uuid) -> Self {
        AttributeValue::Guid(guid)
    }
}

impl From<DateTime<Utc>> for AttributeValue {
    fn from(t: DateTime<Utc>) -> Self {
        AttributeValue::Time(t)
    }
}

/// Ordered values of one attribute. Most attributes are single-valued, so
/// that case is stored without a vector allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValues {
    Single(AttributeValue),
    Multi(Vec<AttributeValue>),
}

impl AttributeValues {
    pub fn len(&self) -> usize {
        match self {
            AttributeValues::Single(_) => 1,
            AttributeValues::Multi(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn first(&self) -> Option<&AttributeValue> {
        match self {
            AttributeValues::Single(value) => Some(value),
            AttributeValues::Multi(values) => values.first(),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeValue> {
        self.as_slice().iter()
    }

    pub fn as_slice(&self) -> &[AttributeValue] {
        match self {
            AttributeValues::Single(value) => std::slice::from_ref(value),
            AttributeValues::Multi(values) => values,
        }
    }

    pub fn push(&mut self, value: AttributeValue) {
        match self {
            AttributeValues::Single(existing) => {
                let existing = existing.clone();
                *self = AttributeValues::Multi(vec![existing, value]);
            }
            AttributeValues::Multi(values) => values.push(value),
        }
    }

    /// Rendered values, one string per value
    pub fn strings(&self) -> Vec<String> {
        self.iter().map(|v| v.to_string()).collect()
    }
}

impl From<AttributeValue> for AttributeValues {
    fn from(value: AttributeValue) -> Self {
        AttributeValues::Single(value)
    }
}

impl From<Vec<AttributeValue>> for AttributeValues {
    fn from(mut values: Vec<AttributeValue>) -> Self {
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return AttributeValues::Single(value);
            }
        }
        AttributeValues::Multi(values)
    }
}

impl<'a> IntoIterator for &'a AttributeValues {
    type Item = &'a AttributeValue;
    type IntoIter = std::slice::Iter<'a, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for AttributeValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_slice().serialize(serializer)
    }
}
