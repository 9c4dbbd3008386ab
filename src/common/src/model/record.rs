use serde::{Deserialize, Serialize};

use super::{Collection, DocId, RefValue};

/// An IP address. Only its forward references matter to the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bgppref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipblock: Option<String>,
}

impl IpRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            bgppref: None,
            ipblock: None,
        }
    }

    pub fn with_bgppref(mut self, prefix: impl Into<String>) -> Self {
        self.bgppref = Some(prefix.into());
        self
    }

    pub fn with_ipblock(mut self, block: impl Into<String>) -> Self {
        self.ipblock = Some(block.into());
        self
    }
}

/// A routed BGP prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BgpPrefixRecord {
    pub id: String,
    #[serde(default)]
    pub ref_cnt: i64,
    #[serde(default)]
    pub asn: Vec<RefValue>,
}

impl BgpPrefixRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ref_cnt: 0,
            asn: Vec::new(),
        }
    }

    pub fn with_ref_cnt(mut self, ref_cnt: i64) -> Self {
        self.ref_cnt = ref_cnt;
        self
    }

    pub fn with_asns<I, V>(mut self, asns: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RefValue>,
    {
        self.asn = asns.into_iter().map(Into::into).collect();
        self
    }
}

/// An administratively assigned IP block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpBlockRecord {
    pub id: String,
    #[serde(default)]
    pub ref_cnt: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl IpBlockRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ref_cnt: 0,
            org: None,
        }
    }

    pub fn with_ref_cnt(mut self, ref_cnt: i64) -> Self {
        self.ref_cnt = ref_cnt;
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }
}

/// An autonomous system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsnRecord {
    pub id: i64,
    #[serde(default)]
    pub bgppref: Vec<RefValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl AsnRecord {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            bgppref: Vec::new(),
            org: None,
        }
    }

    pub fn with_prefixes<I, V>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<RefValue>,
    {
        self.bgppref = prefixes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }
}

/// A registered organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrgRecord {
    pub id: String,
    #[serde(default)]
    pub ref_cnt: i64,
}

impl OrgRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ref_cnt: 0,
        }
    }

    pub fn with_ref_cnt(mut self, ref_cnt: i64) -> Self {
        self.ref_cnt = ref_cnt;
        self
    }
}

/// A document of any collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "collection", rename_all = "snake_case")]
pub enum Record {
    Ip(IpRecord),
    BgpPrefix(BgpPrefixRecord),
    IpBlock(IpBlockRecord),
    Asn(AsnRecord),
    Org(OrgRecord),
}

impl Record {
    pub fn collection(&self) -> Collection {
        match self {
            Record::Ip(_) => Collection::Ip,
            Record::BgpPrefix(_) => Collection::BgpPrefix,
            Record::IpBlock(_) => Collection::IpBlock,
            Record::Asn(_) => Collection::Asn,
            Record::Org(_) => Collection::Org,
        }
    }

    pub fn id(&self) -> DocId {
        match self {
            Record::Ip(r) => DocId::Text(r.id.clone()),
            Record::BgpPrefix(r) => DocId::Text(r.id.clone()),
            Record::IpBlock(r) => DocId::Text(r.id.clone()),
            Record::Asn(r) => DocId::Int(r.id),
            Record::Org(r) => DocId::Text(r.id.clone()),
        }
    }

    /// The counter value of collections that carry `ref_cnt`.
    pub fn ref_cnt(&self) -> Option<i64> {
        match self {
            Record::BgpPrefix(r) => Some(r.ref_cnt),
            Record::IpBlock(r) => Some(r.ref_cnt),
            Record::Org(r) => Some(r.ref_cnt),
            Record::Ip(_) | Record::Asn(_) => None,
        }
    }

    pub fn into_bgp_prefix(self) -> Option<BgpPrefixRecord> {
        match self {
            Record::BgpPrefix(r) => Some(r),
            _ => None,
        }
    }

    pub fn into_asn(self) -> Option<AsnRecord> {
        match self {
            Record::Asn(r) => Some(r),
            _ => None,
        }
    }
}

impl From<IpRecord> for Record {
    fn from(r: IpRecord) -> Self {
        Record::Ip(r)
    }
}

impl From<BgpPrefixRecord> for Record {
    fn from(r: BgpPrefixRecord) -> Self {
        Record::BgpPrefix(r)
    }
}

impl From<IpBlockRecord> for Record {
    fn from(r: IpBlockRecord) -> Self {
        Record::IpBlock(r)
    }
}

impl From<AsnRecord> for Record {
    fn from(r: AsnRecord) -> Self {
        Record::Asn(r)
    }
}

impl From<OrgRecord> for Record {
    fn from(r: OrgRecord) -> Self {
        Record::Org(r)
    }
}
