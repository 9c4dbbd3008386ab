//! Typed entity model of the network-intelligence graph.
//!
//! Five collections hold the entities: IP addresses, BGP prefixes, IP blocks,
//! autonomous systems and organizations. Forward references between them are
//! authoritative; reference counters and the ASN/BGP prefix link arrays are
//! derived state recomputed by the reconciler.

mod record;
mod relation;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use record::{AsnRecord, BgpPrefixRecord, IpBlockRecord, IpRecord, OrgRecord, Record};
pub use relation::{Counter, LinkArray, Reference};

/// A collection of the entity datastore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Ip,
    BgpPrefix,
    IpBlock,
    Asn,
    Org,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::Ip,
        Collection::BgpPrefix,
        Collection::IpBlock,
        Collection::Asn,
        Collection::Org,
    ];

    /// Name of the collection (and of its table in SQL backends).
    pub fn name(self) -> &'static str {
        match self {
            Collection::Ip => "ip",
            Collection::BgpPrefix => "bgppref",
            Collection::IpBlock => "ipblock",
            Collection::Asn => "asn",
            Collection::Org => "org",
        }
    }

    /// Human readable plural used in notices.
    pub fn describe(self) -> &'static str {
        match self {
            Collection::Ip => "IP addresses",
            Collection::BgpPrefix => "BGP prefixes",
            Collection::IpBlock => "IP blocks",
            Collection::Asn => "ASNs",
            Collection::Org => "organizations",
        }
    }

    /// Kind of the identifying key of documents in this collection.
    pub fn key_kind(self) -> KeyKind {
        match self {
            Collection::Asn => KeyKind::Integer,
            _ => KeyKind::Text,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Representation of a document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Integer,
    Text,
}

/// Canonical key of a document.
///
/// Serializes untagged, so integral keys are always written as JSON integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocId {
    Int(i64),
    Text(String),
}

impl DocId {
    pub fn kind(&self) -> KeyKind {
        match self {
            DocId::Int(_) => KeyKind::Integer,
            DocId::Text(_) => KeyKind::Text,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            DocId::Int(value) => Some(*value),
            DocId::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            DocId::Int(_) => None,
            DocId::Text(value) => Some(value),
        }
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocId::Int(value) => write!(f, "{value}"),
            DocId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for DocId {
    fn from(value: i64) -> Self {
        DocId::Int(value)
    }
}

impl From<&str> for DocId {
    fn from(value: &str) -> Self {
        DocId::Text(value.to_string())
    }
}

impl From<String> for DocId {
    fn from(value: String) -> Self {
        DocId::Text(value)
    }
}

/// A reference element as it is stored in a link array.
///
/// Older writers stored ASN numbers as floating point values, so an element
/// may not be in canonical form. Use [`RefValue::normalize`] before using it
/// as a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RefValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RefValue {
    /// Convert to the canonical key of the referenced collection.
    ///
    /// Integral floats are cast to integers. Returns `None` when the value
    /// cannot name a document of the given key kind.
    pub fn normalize(&self, kind: KeyKind) -> Option<DocId> {
        match (self, kind) {
            (RefValue::Int(value), KeyKind::Integer) => Some(DocId::Int(*value)),
            (RefValue::Float(value), KeyKind::Integer) => {
                if value.is_finite()
                    && value.fract() == 0.0
                    && *value >= i64::MIN as f64
                    && *value < i64::MAX as f64
                {
                    Some(DocId::Int(*value as i64))
                } else {
                    None
                }
            }
            (RefValue::Text(value), KeyKind::Text) => Some(DocId::Text(value.clone())),
            _ => None,
        }
    }
}

impl From<DocId> for RefValue {
    fn from(id: DocId) -> Self {
        match id {
            DocId::Int(value) => RefValue::Int(value),
            DocId::Text(value) => RefValue::Text(value),
        }
    }
}

impl From<i64> for RefValue {
    fn from(value: i64) -> Self {
        RefValue::Int(value)
    }
}

impl From<&str> for RefValue {
    fn from(value: &str) -> Self {
        RefValue::Text(value.to_string())
    }
}
