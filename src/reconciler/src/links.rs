//! Many-to-many back-reference reconciliation.
//!
//! A [`LinkReconciler`] rebuilds one [`LinkArray`] as the image of its
//! mirror: every element `t` of `mirror[s]` becomes an element `s` of
//! `array[t]`. Running it for both arrays, one after the other, leaves the
//! relation symmetric.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use common::EntityStore;
use common::model::{DocId, LinkArray};
use serde::Serialize;

use crate::counter::DEFAULT_BATCH_SIZE;
use crate::error::{ReconcileError, Step, StepContext};
use crate::orphan::{PruneTarget, Settled, sealed};

/// Result of a completed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct LinkOutcome {
    pub array: LinkArray,
    /// Documents whose array was emptied
    pub reset: u64,
    /// Distinct documents the derived edges point at
    pub groups: u64,
    /// Distinct edges derived from the mirror array
    pub edges: u64,
    /// Documents whose array was written
    pub matched: u64,
    /// Groups for documents that do not exist
    pub dangling: u64,
    /// Mirror elements that could not be read as an id
    pub skipped: u64,
}

impl sealed::Sealed for LinkOutcome {}

impl Settled for LinkOutcome {
    fn prune_target(&self) -> PruneTarget {
        PruneTarget::EmptyArray(self.array)
    }
}

pub struct LinkReconciler {
    store: Arc<dyn EntityStore>,
    array: LinkArray,
    batch_size: usize,
}

impl LinkReconciler {
    /// Rebuild `array` from `array.mirror()`.
    pub fn new(store: Arc<dyn EntityStore>, array: LinkArray) -> Self {
        Self {
            store,
            array,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn array(&self) -> LinkArray {
        self.array
    }

    pub async fn reset(&self) -> Result<LinksReset<'_>, ReconcileError> {
        let reset = self
            .store
            .reset_array(self.array)
            .await
            .during(Step::Reset)?;
        tracing::debug!(array = %self.array, reset, "Link arrays reset");
        Ok(LinksReset {
            reconciler: self,
            reset,
        })
    }

    pub async fn run(&self) -> Result<LinkOutcome, ReconcileError> {
        self.reset().await?.derive().await?.apply().await
    }
}

/// Arrays are emptied; no edge has been derived yet.
#[must_use]
pub struct LinksReset<'a> {
    reconciler: &'a LinkReconciler,
    reset: u64,
}

impl<'a> LinksReset<'a> {
    pub fn reset(&self) -> u64 {
        self.reset
    }

    pub async fn derive(self) -> Result<DerivedLinks<'a>, ReconcileError> {
        let array = self.reconciler.array;
        let mirror = array.mirror();
        let entries = self
            .reconciler
            .store
            .array_entries(mirror)
            .await
            .during(Step::Derive)?;

        let target_kind = array.owner().key_kind();
        let mut links: BTreeMap<DocId, BTreeSet<DocId>> = BTreeMap::new();
        let mut skipped: u64 = 0;
        for (source, values) in entries {
            for value in values {
                match value.normalize(target_kind) {
                    Some(target) => {
                        links.entry(target).or_default().insert(source.clone());
                    }
                    None => {
                        skipped += 1;
                        tracing::warn!(
                            array = %mirror,
                            document = %source,
                            value = ?value,
                            "Ignoring link element that is not a {} id",
                            array.owner()
                        );
                    }
                }
            }
        }

        let edges: u64 = links.values().map(|sources| sources.len() as u64).sum();
        tracing::debug!(
            array = %array,
            groups = links.len(),
            edges,
            skipped,
            "Links derived"
        );
        Ok(DerivedLinks {
            reconciler: self.reconciler,
            reset: self.reset,
            links,
            edges,
            skipped,
        })
    }
}

/// Edges are derived, grouped by the document that will hold them.
#[must_use]
pub struct DerivedLinks<'a> {
    reconciler: &'a LinkReconciler,
    reset: u64,
    links: BTreeMap<DocId, BTreeSet<DocId>>,
    edges: u64,
    skipped: u64,
}

impl DerivedLinks<'_> {
    pub fn links(&self) -> &BTreeMap<DocId, BTreeSet<DocId>> {
        &self.links
    }

    pub async fn apply(self) -> Result<LinkOutcome, ReconcileError> {
        let reconciler = self.reconciler;
        let groups = self.links.len() as u64;
        let rows: Vec<(DocId, Vec<DocId>)> = self
            .links
            .into_iter()
            .map(|(target, sources)| (target, sources.into_iter().collect()))
            .collect();

        let mut matched = 0;
        for batch in rows.chunks(reconciler.batch_size) {
            matched += reconciler
                .store
                .set_arrays(reconciler.array, batch)
                .await
                .during(Step::Apply)?;
        }

        let outcome = LinkOutcome {
            array: reconciler.array,
            reset: self.reset,
            groups,
            edges: self.edges,
            matched,
            dangling: groups.saturating_sub(matched),
            skipped: self.skipped,
        };
        tracing::debug!(
            array = %reconciler.array,
            matched,
            dangling = outcome.dangling,
            "Links applied"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;
    use common::model::{AsnRecord, BgpPrefixRecord, RefValue};

    const P1: &str = "192.0.2.0/24";
    const P3: &str = "203.0.113.0/24";

    async fn arrays(store: &MemoryStore, array: LinkArray) -> Vec<(DocId, Vec<RefValue>)> {
        store.array_entries(array).await.unwrap()
    }

    #[tokio::test]
    async fn test_derives_prefix_asns_from_asn_prefixes() {
        let store = Arc::new(
            MemoryStore::with_records([
                AsnRecord::new(64501).with_prefixes([P1, P3]).into(),
                AsnRecord::new(64502).with_prefixes([P1]).into(),
                BgpPrefixRecord::new(P1).with_asns([64999_i64]).into(),
            ])
            .await,
        );

        let outcome = LinkReconciler::new(store.clone(), LinkArray::BgpPrefixAsns)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.reset, 1);
        assert_eq!(outcome.groups, 2);
        assert_eq!(outcome.edges, 3);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.dangling, 1);
        assert_eq!(
            arrays(&store, LinkArray::BgpPrefixAsns).await,
            vec![(DocId::from(P1), vec![RefValue::Int(64501), RefValue::Int(64502)])]
        );
    }

    #[tokio::test]
    async fn test_float_elements_are_written_back_as_integers() {
        let store = Arc::new(
            MemoryStore::with_records([
                AsnRecord::new(64501).into(),
                AsnRecord::new(64502).into(),
                BgpPrefixRecord {
                    id: P1.to_string(),
                    ref_cnt: 1,
                    asn: vec![
                        RefValue::Float(64501.0),
                        RefValue::Int(64501),
                        RefValue::Float(64502.5),
                    ],
                }
                .into(),
            ])
            .await,
        );

        let outcome = LinkReconciler::new(store.clone(), LinkArray::AsnBgpPrefixes)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.edges, 1);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(
            arrays(&store, LinkArray::AsnBgpPrefixes).await,
            vec![
                (DocId::Int(64501), vec![RefValue::Text(P1.to_string())]),
                (DocId::Int(64502), vec![]),
            ]
        );
    }

    #[tokio::test]
    async fn test_derive_groups_in_ascending_order() {
        let store = Arc::new(
            MemoryStore::with_records([
                AsnRecord::new(64502).with_prefixes([P3, P1]).into(),
                AsnRecord::new(64501).with_prefixes([P3]).into(),
            ])
            .await,
        );
        let reconciler = LinkReconciler::new(store, LinkArray::BgpPrefixAsns);

        let derived = reconciler.reset().await.unwrap().derive().await.unwrap();
        let links: Vec<(&DocId, Vec<&DocId>)> = derived
            .links()
            .iter()
            .map(|(target, sources)| (target, sources.iter().collect()))
            .collect();

        assert_eq!(
            links,
            vec![
                (&DocId::from(P1), vec![&DocId::Int(64502)]),
                (&DocId::from(P3), vec![&DocId::Int(64501), &DocId::Int(64502)]),
            ]
        );
    }
}
