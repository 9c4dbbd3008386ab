//! Read-only check of the integrity invariants.
//!
//! Recomputes every counter and both link directions from the forward
//! references and compares them with what is stored. Never writes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::EntityStore;
use common::model::{Collection, Counter, DocId, LinkArray};
use serde::Serialize;

use crate::error::{ReconcileError, Step, StepContext};

const COUNTERS: [Counter; 3] = [
    Counter::BgpPrefixRefCnt,
    Counter::IpBlockRefCnt,
    Counter::OrgRefCnt,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Stored counter differs from the number of referencing documents.
    CounterMismatch {
        counter: Counter,
        id: DocId,
        stored: i64,
        expected: u64,
    },
    /// A reconciled array element naming a document that does not exist.
    DanglingLink {
        array: LinkArray,
        owner: DocId,
        target: DocId,
    },
    /// An edge present on one side only; both documents exist.
    AsymmetricLink {
        asn: DocId,
        prefix: DocId,
        missing_in: LinkArray,
    },
    /// A document with a zero counter or an empty reconciled array.
    Orphan { collection: Collection, id: DocId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub violations: Vec<Violation>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn log(&self) {
        if self.is_consistent() {
            tracing::info!("Entity graph is consistent");
            return;
        }
        for violation in &self.violations {
            tracing::warn!(?violation, "Integrity violation");
        }
        tracing::warn!(
            violations = self.violations.len(),
            "Entity graph is inconsistent"
        );
    }
}

pub struct ConsistencyChecker {
    store: Arc<dyn EntityStore>,
}

impl ConsistencyChecker {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn check(&self) -> Result<ConsistencyReport, ReconcileError> {
        let mut report = ConsistencyReport::default();
        for counter in COUNTERS {
            self.check_counter(counter, &mut report).await?;
        }
        self.check_links(&mut report).await?;
        Ok(report)
    }

    async fn check_counter(
        &self,
        counter: Counter,
        report: &mut ConsistencyReport,
    ) -> Result<(), ReconcileError> {
        let mut expected: BTreeMap<DocId, u64> = BTreeMap::new();
        for reference in counter.sources() {
            let groups = self
                .store
                .group_references(*reference)
                .await
                .during(Step::Verify)?;
            for (id, count) in groups {
                *expected.entry(id).or_default() += count;
            }
        }

        let stored = self
            .store
            .load_counters(counter)
            .await
            .during(Step::Verify)?;
        for (id, value) in stored {
            let want = expected.get(&id).copied().unwrap_or(0);
            if value != want as i64 {
                report.violations.push(Violation::CounterMismatch {
                    counter,
                    id,
                    stored: value,
                    expected: want,
                });
            } else if value == 0 {
                report.violations.push(Violation::Orphan {
                    collection: counter.collection(),
                    id,
                });
            }
        }
        Ok(())
    }

    /// Load one side of the ASN <-> prefix relation as (asn, prefix) edges.
    async fn edges(
        &self,
        array: LinkArray,
        report: &mut ConsistencyReport,
    ) -> Result<(BTreeSet<DocId>, BTreeSet<(DocId, DocId)>), ReconcileError> {
        let entries = self
            .store
            .array_entries(array)
            .await
            .during(Step::Verify)?;

        let kind = array.points_to().key_kind();
        let mut owners = BTreeSet::new();
        let mut edges = BTreeSet::new();
        for (owner, values) in entries {
            if values.is_empty() {
                report.violations.push(Violation::Orphan {
                    collection: array.owner(),
                    id: owner.clone(),
                });
            }
            for target in values.iter().filter_map(|v| v.normalize(kind)) {
                let edge = match array {
                    LinkArray::AsnBgpPrefixes => (owner.clone(), target),
                    LinkArray::BgpPrefixAsns => (target, owner.clone()),
                };
                edges.insert(edge);
            }
            owners.insert(owner);
        }
        Ok((owners, edges))
    }

    async fn check_links(&self, report: &mut ConsistencyReport) -> Result<(), ReconcileError> {
        let (asns, asn_side) = self.edges(LinkArray::AsnBgpPrefixes, report).await?;
        let (prefixes, prefix_side) = self.edges(LinkArray::BgpPrefixAsns, report).await?;

        for (asn, prefix) in asn_side.difference(&prefix_side) {
            let violation = if prefixes.contains(prefix) {
                Violation::AsymmetricLink {
                    asn: asn.clone(),
                    prefix: prefix.clone(),
                    missing_in: LinkArray::BgpPrefixAsns,
                }
            } else {
                Violation::DanglingLink {
                    array: LinkArray::AsnBgpPrefixes,
                    owner: asn.clone(),
                    target: prefix.clone(),
                }
            };
            report.violations.push(violation);
        }
        for (asn, prefix) in prefix_side.difference(&asn_side) {
            let violation = if asns.contains(asn) {
                Violation::AsymmetricLink {
                    asn: asn.clone(),
                    prefix: prefix.clone(),
                    missing_in: LinkArray::AsnBgpPrefixes,
                }
            } else {
                Violation::DanglingLink {
                    array: LinkArray::BgpPrefixAsns,
                    owner: prefix.clone(),
                    target: asn.clone(),
                }
            };
            report.violations.push(violation);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;
    use common::model::{AsnRecord, BgpPrefixRecord, IpRecord, OrgRecord, RefValue};

    #[tokio::test]
    async fn test_consistent_graph_has_no_violations() {
        let store = Arc::new(
            MemoryStore::with_records([
                IpRecord::new("192.0.2.1").with_bgppref("192.0.2.0/24").into(),
                BgpPrefixRecord::new("192.0.2.0/24")
                    .with_ref_cnt(1)
                    .with_asns([64500_i64])
                    .into(),
                AsnRecord::new(64500)
                    .with_prefixes(["192.0.2.0/24"])
                    .with_org("ORG1")
                    .into(),
                OrgRecord::new("ORG1").with_ref_cnt(1).into(),
            ])
            .await,
        );

        let report = ConsistencyChecker::new(store).check().await.unwrap();
        assert!(report.is_consistent(), "{:?}", report.violations);
    }

    #[tokio::test]
    async fn test_reports_every_kind_of_violation() {
        let store = Arc::new(
            MemoryStore::with_records([
                IpRecord::new("192.0.2.1").with_bgppref("192.0.2.0/24").into(),
                BgpPrefixRecord {
                    id: "192.0.2.0/24".to_string(),
                    ref_cnt: 4,
                    asn: vec![RefValue::Float(64500.0), RefValue::Int(64501)],
                }
                .into(),
                BgpPrefixRecord::new("198.51.100.0/24")
                    .with_asns([64501_i64])
                    .into(),
                AsnRecord::new(64500)
                    .with_prefixes(["192.0.2.0/24", "198.51.100.0/24"])
                    .into(),
                AsnRecord::new(64501).with_prefixes(["198.51.100.0/24"]).into(),
                AsnRecord::new(64502).into(),
            ])
            .await,
        );

        let report = ConsistencyChecker::new(store).check().await.unwrap();

        assert_eq!(
            report.violations,
            vec![
                Violation::CounterMismatch {
                    counter: Counter::BgpPrefixRefCnt,
                    id: DocId::from("192.0.2.0/24"),
                    stored: 4,
                    expected: 1,
                },
                Violation::Orphan {
                    collection: Collection::BgpPrefix,
                    id: DocId::from("198.51.100.0/24"),
                },
                Violation::Orphan {
                    collection: Collection::Asn,
                    id: DocId::Int(64502),
                },
                Violation::AsymmetricLink {
                    asn: DocId::Int(64500),
                    prefix: DocId::from("198.51.100.0/24"),
                    missing_in: LinkArray::BgpPrefixAsns,
                },
                Violation::AsymmetricLink {
                    asn: DocId::Int(64501),
                    prefix: DocId::from("192.0.2.0/24"),
                    missing_in: LinkArray::AsnBgpPrefixes,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_link_to_missing_document_is_reported() {
        let store = Arc::new(
            MemoryStore::with_records([
                IpRecord::new("192.0.2.1").with_bgppref("192.0.2.0/24").into(),
                BgpPrefixRecord::new("192.0.2.0/24")
                    .with_ref_cnt(1)
                    .with_asns([64500_i64])
                    .into(),
                AsnRecord::new(64500)
                    .with_prefixes(["192.0.2.0/24", "198.51.100.0/24"])
                    .into(),
            ])
            .await,
        );

        let report = ConsistencyChecker::new(store).check().await.unwrap();
        assert_eq!(
            report.violations,
            vec![Violation::DanglingLink {
                array: LinkArray::AsnBgpPrefixes,
                owner: DocId::Int(64500),
                target: DocId::from("198.51.100.0/24"),
            }]
        );
    }

    #[tokio::test]
    async fn test_prefix_naming_missing_asn_is_reported() {
        let store = Arc::new(
            MemoryStore::with_records([
                IpRecord::new("192.0.2.1").with_bgppref("192.0.2.0/24").into(),
                BgpPrefixRecord::new("192.0.2.0/24")
                    .with_ref_cnt(1)
                    .with_asns([64500_i64, 64599])
                    .into(),
                AsnRecord::new(64500).with_prefixes(["192.0.2.0/24"]).into(),
            ])
            .await,
        );

        let report = ConsistencyChecker::new(store).check().await.unwrap();
        assert_eq!(
            report.violations,
            vec![Violation::DanglingLink {
                array: LinkArray::BgpPrefixAsns,
                owner: DocId::from("192.0.2.0/24"),
                target: DocId::Int(64599),
            }]
        );
    }
}
