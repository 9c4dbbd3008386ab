//! Seed graphs for reconciliation tests.
//!
//! Every scenario is self-consistent apart from the defect it exercises, so
//! a run over it removes exactly the documents the scenario is about.

use crate::model::{
    AsnRecord, BgpPrefixRecord, IpBlockRecord, IpRecord, OrgRecord, Record, RefValue,
};
use crate::store::{EntityStore, StoreError};

pub const PREFIX_1: &str = "192.0.2.0/24";
pub const PREFIX_2: &str = "198.51.100.0/24";
pub const PREFIX_3: &str = "203.0.113.0/24";

pub const ASN_1: i64 = 64501;
pub const ASN_2: i64 = 64502;
pub const ASN_3: i64 = 64503;

pub const BLOCK_1: &str = "192.0.2.0 - 192.0.2.255";
pub const BLOCK_2: &str = "198.51.100.0 - 198.51.100.255";

pub const ORG_1: &str = "ORG1";
pub const ORG_2: &str = "ORG2";

/// Insert every record into the store.
pub async fn seed<S>(store: &S, records: Vec<Record>) -> Result<(), StoreError>
where
    S: EntityStore + ?Sized,
{
    for record in records {
        store.insert(record).await?;
    }
    Ok(())
}

fn ips_in(prefix: &str, hosts: std::ops::RangeInclusive<u8>) -> Vec<Record> {
    let network = prefix.trim_end_matches(".0/24");
    hosts
        .map(|host| IpRecord::new(format!("{network}.{host}")).with_bgppref(prefix).into())
        .collect()
}

/// Three IPs reference `PREFIX_1`; `PREFIX_2` is unreferenced with a stale counter.
pub fn scenario_a() -> Vec<Record> {
    let mut records = ips_in(PREFIX_1, 1..=3);
    records.extend([
        Record::from(BgpPrefixRecord::new(PREFIX_1).with_asns([ASN_1])),
        BgpPrefixRecord::new(PREFIX_2)
            .with_ref_cnt(5)
            .with_asns([ASN_1])
            .into(),
        AsnRecord::new(ASN_1).with_prefixes([PREFIX_1]).into(),
    ]);
    records
}

/// `ASN_1` announces `PREFIX_1` and the missing `PREFIX_3`; `ASN_2` announces `PREFIX_1`.
pub fn scenario_b() -> Vec<Record> {
    let mut records = ips_in(PREFIX_1, 1..=2);
    records.extend([
        Record::from(
            BgpPrefixRecord::new(PREFIX_1)
                .with_ref_cnt(2)
                .with_asns([ASN_1, ASN_2]),
        ),
        AsnRecord::new(ASN_1)
            .with_prefixes([PREFIX_1, PREFIX_3])
            .into(),
        AsnRecord::new(ASN_2).with_prefixes([PREFIX_1]).into(),
    ]);
    records
}

/// Two ASNs and one IP block all belong to `ORG_1`.
pub fn scenario_c() -> Vec<Record> {
    let mut records = ips_in(PREFIX_1, 1..=2);
    records.push(
        IpRecord::new("192.0.2.200")
            .with_bgppref(PREFIX_1)
            .with_ipblock(BLOCK_1)
            .into(),
    );
    records.extend([
        Record::from(BgpPrefixRecord::new(PREFIX_1).with_asns([ASN_1, ASN_2])),
        AsnRecord::new(ASN_1)
            .with_prefixes([PREFIX_1])
            .with_org(ORG_1)
            .into(),
        AsnRecord::new(ASN_2)
            .with_prefixes([PREFIX_1])
            .with_org(ORG_1)
            .into(),
        IpBlockRecord::new(BLOCK_1).with_org(ORG_1).into(),
        OrgRecord::new(ORG_1).into(),
    ]);
    records
}

/// `ASN_3` announces nothing and no prefix points back at it.
pub fn scenario_d() -> Vec<Record> {
    let mut records = scenario_b();
    records.push(AsnRecord::new(ASN_3).into());
    records
}

/// A graph mixing every relation shape and every repairable defect.
///
/// Includes stale counters, an asymmetric link, a float-encoded ASN id,
/// duplicate array elements, a dangling organization reference and an IP
/// block nobody points at.
pub fn sample_graph() -> Vec<Record> {
    let mut records = ips_in(PREFIX_1, 1..=4);
    records.extend(ips_in(PREFIX_2, 1..=2));
    records.extend([
        Record::from(
            IpRecord::new("192.0.2.100")
                .with_bgppref(PREFIX_1)
                .with_ipblock(BLOCK_1),
        ),
        IpRecord::new("192.0.2.101").with_ipblock(BLOCK_1).into(),
        IpRecord::new("203.0.113.9").into(),
        BgpPrefixRecord::new(PREFIX_1)
            .with_ref_cnt(1)
            .with_asns([ASN_1])
            .into(),
        BgpPrefixRecord {
            id: PREFIX_2.to_string(),
            ref_cnt: 0,
            asn: vec![
                RefValue::Float(ASN_2 as f64),
                RefValue::Int(ASN_2),
            ],
        }
        .into(),
        BgpPrefixRecord::new(PREFIX_3).with_ref_cnt(9).into(),
        AsnRecord::new(ASN_1)
            .with_prefixes([PREFIX_1, PREFIX_1])
            .with_org(ORG_1)
            .into(),
        AsnRecord::new(ASN_2)
            .with_prefixes([PREFIX_1, PREFIX_2])
            .with_org("ORG-MISSING")
            .into(),
        AsnRecord::new(ASN_3).with_org(ORG_2).into(),
        IpBlockRecord::new(BLOCK_1)
            .with_ref_cnt(40)
            .with_org(ORG_1)
            .into(),
        IpBlockRecord::new(BLOCK_2).with_org(ORG_2).into(),
        OrgRecord::new(ORG_1).with_ref_cnt(1).into(),
        OrgRecord::new(ORG_2).with_ref_cnt(2).into(),
    ]);
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Collection, DocId};

    #[test]
    fn test_ips_in_prefix() {
        let ids: Vec<_> = ips_in(PREFIX_1, 1..=2).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![DocId::from("192.0.2.1"), DocId::from("192.0.2.2")]);
    }

    #[test]
    fn test_scenario_d_extends_scenario_b() {
        let records = scenario_d();
        assert_eq!(records.len(), scenario_b().len() + 1);
        assert_eq!(
            records.iter().filter(|r| r.collection() == Collection::Asn).count(),
            3
        );
    }
}
