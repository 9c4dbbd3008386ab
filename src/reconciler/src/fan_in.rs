//! Counters fed by several source collections.
//!
//! The counter is reset exactly once; each source is then grouped and its
//! counts are *added* to the counter. Sources may be accumulated in any
//! order, but each one only once.

use std::sync::Arc;

use common::EntityStore;
use common::model::{Counter, Reference};

use crate::counter::{CounterOutcome, DEFAULT_BATCH_SIZE, apply_counts, check_source};
use crate::error::{ReconcileError, Step, StepContext};

pub struct FanInAccumulator {
    store: Arc<dyn EntityStore>,
    counter: Counter,
    sources: Vec<Reference>,
    batch_size: usize,
}

impl FanInAccumulator {
    /// Accumulate every reference feeding `counter`.
    pub fn for_counter(store: Arc<dyn EntityStore>, counter: Counter) -> Self {
        Self {
            store,
            counter,
            sources: counter.sources().to_vec(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Accumulate an explicit list of sources.
    pub fn new(
        store: Arc<dyn EntityStore>,
        counter: Counter,
        sources: impl IntoIterator<Item = Reference>,
    ) -> Result<Self, ReconcileError> {
        let mut checked: Vec<Reference> = Vec::new();
        for reference in sources {
            check_source(counter, reference)?;
            if checked.contains(&reference) {
                return Err(ReconcileError::DuplicateSource { counter, reference });
            }
            checked.push(reference);
        }
        Ok(Self {
            store,
            counter,
            sources: checked,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn sources(&self) -> &[Reference] {
        &self.sources
    }

    pub async fn reset(&self) -> Result<FanInReset<'_>, ReconcileError> {
        let reset = self
            .store
            .reset_counter(self.counter)
            .await
            .during(Step::Reset)?;
        tracing::debug!(counter = %self.counter, reset, "Fan-in counters reset");
        Ok(FanInReset {
            accumulator: self,
            outcome: CounterOutcome::new(self.counter, reset),
            accumulated: Vec::new(),
        })
    }

    pub async fn run(&self) -> Result<CounterOutcome, ReconcileError> {
        let mut state = self.reset().await?;
        for reference in &self.sources {
            state = state.accumulate(*reference).await?;
        }
        Ok(state.finish())
    }
}

/// Counter reset once, with zero or more sources added on top.
#[must_use]
pub struct FanInReset<'a> {
    accumulator: &'a FanInAccumulator,
    outcome: CounterOutcome,
    accumulated: Vec<(Reference, u64)>,
}

impl<'a> FanInReset<'a> {
    /// Group one source collection and increment the counters by its counts.
    pub async fn accumulate(mut self, reference: Reference) -> Result<Self, ReconcileError> {
        let counter = self.accumulator.counter;
        check_source(counter, reference)?;
        if self.accumulated.iter().any(|(seen, _)| *seen == reference) {
            return Err(ReconcileError::DuplicateSource { counter, reference });
        }

        let store = self.accumulator.store.as_ref();
        let groups = store
            .group_references(reference)
            .await
            .during(Step::Count)?;
        let matched = apply_counts(store, counter, &groups, self.accumulator.batch_size, true).await?;

        let references: u64 = groups.iter().map(|(_, count)| count).sum();
        tracing::debug!(
            counter = %counter,
            source = %reference,
            groups = groups.len(),
            references,
            matched,
            "Source accumulated"
        );

        self.outcome.record(groups.len() as u64, matched);
        self.accumulated.push((reference, references));
        Ok(self)
    }

    /// References counted per source so far.
    pub fn contributions(&self) -> &[(Reference, u64)] {
        &self.accumulated
    }

    pub fn finish(self) -> CounterOutcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;
    use common::model::{AsnRecord, Collection, DocId, IpBlockRecord, OrgRecord};

    async fn store() -> Arc<MemoryStore> {
        Arc::new(
            MemoryStore::with_records([
                AsnRecord::new(64501).with_org("ORG1").into(),
                AsnRecord::new(64502).with_org("ORG1").into(),
                AsnRecord::new(64503).with_org("ORG2").into(),
                IpBlockRecord::new("192.0.2.0 - 192.0.2.255")
                    .with_org("ORG1")
                    .into(),
                IpBlockRecord::new("198.51.100.0 - 198.51.100.255")
                    .with_org("ORG3")
                    .into(),
                IpBlockRecord::new("203.0.113.0 - 203.0.113.255").into(),
                OrgRecord::new("ORG1").with_ref_cnt(10).into(),
                OrgRecord::new("ORG2").into(),
                OrgRecord::new("ORG3").into(),
                OrgRecord::new("ORG4").with_ref_cnt(1).into(),
            ])
            .await,
        )
    }

    async fn counters(store: &MemoryStore) -> Vec<(DocId, i64)> {
        store.load_counters(Counter::OrgRefCnt).await.unwrap()
    }

    #[tokio::test]
    async fn test_sums_every_source() {
        let store = store().await;
        let outcome = FanInAccumulator::for_counter(store.clone(), Counter::OrgRefCnt)
            .run()
            .await
            .unwrap();

        assert_eq!(outcome.reset, 4);
        assert_eq!(outcome.groups, 4);
        assert_eq!(outcome.matched, 4);
        assert_eq!(
            counters(&store).await,
            vec![
                (DocId::from("ORG1"), 3),
                (DocId::from("ORG2"), 1),
                (DocId::from("ORG3"), 1),
                (DocId::from("ORG4"), 0),
            ]
        );
    }

    #[tokio::test]
    async fn test_source_order_does_not_matter() {
        let forward = store().await;
        let backward = store().await;

        FanInAccumulator::new(
            forward.clone(),
            Counter::OrgRefCnt,
            [Reference::AsnOrg, Reference::IpBlockOrg],
        )
        .unwrap()
        .run()
        .await
        .unwrap();
        FanInAccumulator::new(
            backward.clone(),
            Counter::OrgRefCnt,
            [Reference::IpBlockOrg, Reference::AsnOrg],
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        assert_eq!(counters(&forward).await, counters(&backward).await);
    }

    #[tokio::test]
    async fn test_contributions_add_up_to_counter() {
        let store = store().await;
        let accumulator = FanInAccumulator::for_counter(store.clone(), Counter::OrgRefCnt);

        let state = accumulator
            .reset()
            .await
            .unwrap()
            .accumulate(Reference::AsnOrg)
            .await
            .unwrap()
            .accumulate(Reference::IpBlockOrg)
            .await
            .unwrap();
        assert_eq!(
            state.contributions(),
            &[(Reference::AsnOrg, 3), (Reference::IpBlockOrg, 2)]
        );
        state.finish();

        let total: i64 = counters(&store).await.iter().map(|(_, c)| c).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn test_accumulating_a_source_twice_is_rejected() {
        let store = store().await;
        let accumulator = FanInAccumulator::for_counter(store.clone(), Counter::OrgRefCnt);

        let state = accumulator
            .reset()
            .await
            .unwrap()
            .accumulate(Reference::AsnOrg)
            .await
            .unwrap();
        let result = state.accumulate(Reference::AsnOrg).await;

        assert!(matches!(
            result,
            Err(ReconcileError::DuplicateSource { .. })
        ));
        let org1 = store
            .fetch(Collection::Org, &DocId::from("ORG1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(org1.ref_cnt(), Some(2));
    }

    #[tokio::test]
    async fn test_rejects_foreign_source() {
        let store = Arc::new(MemoryStore::new());
        let result = FanInAccumulator::new(
            store,
            Counter::OrgRefCnt,
            [Reference::AsnOrg, Reference::IpIpBlock],
        );
        assert!(matches!(
            result,
            Err(ReconcileError::InvalidSource {
                reference: Reference::IpIpBlock,
                ..
            })
        ));
    }
}
