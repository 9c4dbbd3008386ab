use std::fmt;

use serde::{Deserialize, Serialize};

use super::Collection;

/// A scalar forward reference from a source document to a target document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// `ip.bgppref` -> `bgppref`
    IpBgpPrefix,
    /// `ip.ipblock` -> `ipblock`
    IpIpBlock,
    /// `asn.org` -> `org`
    AsnOrg,
    /// `ipblock.org` -> `org`
    IpBlockOrg,
}

impl Reference {
    pub fn source(self) -> Collection {
        match self {
            Reference::IpBgpPrefix | Reference::IpIpBlock => Collection::Ip,
            Reference::AsnOrg => Collection::Asn,
            Reference::IpBlockOrg => Collection::IpBlock,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            Reference::IpBgpPrefix => "bgppref",
            Reference::IpIpBlock => "ipblock",
            Reference::AsnOrg | Reference::IpBlockOrg => "org",
        }
    }

    pub fn target(self) -> Collection {
        match self {
            Reference::IpBgpPrefix => Collection::BgpPrefix,
            Reference::IpIpBlock => Collection::IpBlock,
            Reference::AsnOrg | Reference::IpBlockOrg => Collection::Org,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.source(), self.field())
    }
}

/// A denormalized reference counter (`ref_cnt`) on a target collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    BgpPrefixRefCnt,
    IpBlockRefCnt,
    OrgRefCnt,
}

impl Counter {
    pub fn collection(self) -> Collection {
        match self {
            Counter::BgpPrefixRefCnt => Collection::BgpPrefix,
            Counter::IpBlockRefCnt => Collection::IpBlock,
            Counter::OrgRefCnt => Collection::Org,
        }
    }

    pub fn field(self) -> &'static str {
        "ref_cnt"
    }

    /// Forward references that feed this counter.
    pub fn sources(self) -> &'static [Reference] {
        match self {
            Counter::BgpPrefixRefCnt => &[Reference::IpBgpPrefix],
            Counter::IpBlockRefCnt => &[Reference::IpIpBlock],
            Counter::OrgRefCnt => &[Reference::AsnOrg, Reference::IpBlockOrg],
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.collection(), self.field())
    }
}

/// One side of the many-to-many ASN <-> BGP prefix relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkArray {
    /// `asn.bgppref`: prefixes announced by an ASN.
    AsnBgpPrefixes,
    /// `bgppref.asn`: ASNs announcing a prefix.
    BgpPrefixAsns,
}

impl LinkArray {
    /// Collection whose documents own the array.
    pub fn owner(self) -> Collection {
        match self {
            LinkArray::AsnBgpPrefixes => Collection::Asn,
            LinkArray::BgpPrefixAsns => Collection::BgpPrefix,
        }
    }

    pub fn field(self) -> &'static str {
        match self {
            LinkArray::AsnBgpPrefixes => "bgppref",
            LinkArray::BgpPrefixAsns => "asn",
        }
    }

    /// Collection the array elements point at.
    pub fn points_to(self) -> Collection {
        self.mirror().owner()
    }

    /// The array on the other side of the relation.
    pub fn mirror(self) -> LinkArray {
        match self {
            LinkArray::AsnBgpPrefixes => LinkArray::BgpPrefixAsns,
            LinkArray::BgpPrefixAsns => LinkArray::AsnBgpPrefixes,
        }
    }
}

impl fmt::Display for LinkArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner(), self.field())
    }
}
