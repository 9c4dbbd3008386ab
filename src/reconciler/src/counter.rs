//! One-to-many reference counting.
//!
//! Recomputes a `ref_cnt` counter from a scalar forward reference as a
//! three step pipeline: [`ReferenceCounter::reset`] zeroes every counter,
//! [`CounterReset::count`] groups the referencing documents and
//! [`CountedReferences::apply`] overwrites the counters with the group sizes.

use std::sync::Arc;

use common::EntityStore;
use common::model::{Counter, DocId, Reference};
use serde::Serialize;

use crate::error::{ReconcileError, Step, StepContext};
use crate::orphan::{PruneTarget, Settled, sealed};

pub(crate) const DEFAULT_BATCH_SIZE: usize = 1000;

/// Result of a completed counting pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct CounterOutcome {
    pub counter: Counter,
    /// Documents whose counter was reset to 0
    pub reset: u64,
    /// (target, count) groups computed from the sources
    pub groups: u64,
    /// Groups whose target document exists
    pub matched: u64,
    /// Groups pointing at documents that do not exist
    pub dangling: u64,
}

impl CounterOutcome {
    pub(crate) fn new(counter: Counter, reset: u64) -> Self {
        Self {
            counter,
            reset,
            groups: 0,
            matched: 0,
            dangling: 0,
        }
    }

    pub(crate) fn record(&mut self, groups: u64, matched: u64) {
        self.groups += groups;
        self.matched += matched;
        self.dangling += groups.saturating_sub(matched);
    }
}

impl sealed::Sealed for CounterOutcome {}

impl Settled for CounterOutcome {
    fn prune_target(&self) -> PruneTarget {
        PruneTarget::ZeroCounter(self.counter)
    }
}

pub(crate) fn check_source(counter: Counter, reference: Reference) -> Result<(), ReconcileError> {
    if reference.target() == counter.collection() {
        Ok(())
    } else {
        Err(ReconcileError::InvalidSource { counter, reference })
    }
}

/// Write counts with `set` or `increment` semantics, one committed call per batch.
pub(crate) async fn apply_counts(
    store: &dyn EntityStore,
    counter: Counter,
    groups: &[(DocId, u64)],
    batch_size: usize,
    increment: bool,
) -> Result<u64, ReconcileError> {
    let mut matched = 0;
    for batch in groups.chunks(batch_size.max(1)) {
        matched += if increment {
            store.increment_counters(counter, batch).await
        } else {
            store.set_counters(counter, batch).await
        }
        .during(Step::Apply)?;
    }
    Ok(matched)
}

pub struct ReferenceCounter {
    store: Arc<dyn EntityStore>,
    reference: Reference,
    counter: Counter,
    batch_size: usize,
}

impl ReferenceCounter {
    /// Count `reference` into `counter`; the reference must target the counter's collection.
    pub fn new(
        store: Arc<dyn EntityStore>,
        reference: Reference,
        counter: Counter,
    ) -> Result<Self, ReconcileError> {
        check_source(counter, reference)?;
        Ok(Self {
            store,
            reference,
            counter,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn reference(&self) -> Reference {
        self.reference
    }

    pub fn counter(&self) -> Counter {
        self.counter
    }

    pub async fn reset(&self) -> Result<CounterReset<'_>, ReconcileError> {
        let reset = self
            .store
            .reset_counter(self.counter)
            .await
            .during(Step::Reset)?;
        tracing::debug!(counter = %self.counter, reset, "Counters reset");
        Ok(CounterReset {
            counter: self,
            reset,
        })
    }

    /// Run reset, count and apply back to back.
    pub async fn run(&self) -> Result<CounterOutcome, ReconcileError> {
        self.reset().await?.count().await?.apply().await
    }
}

/// Counters are zeroed; the sources are not counted yet.
#[must_use]
pub struct CounterReset<'a> {
    counter: &'a ReferenceCounter,
    reset: u64,
}

impl<'a> CounterReset<'a> {
    pub fn reset(&self) -> u64 {
        self.reset
    }

    pub async fn count(self) -> Result<CountedReferences<'a>, ReconcileError> {
        let groups = self
            .counter
            .store
            .group_references(self.counter.reference)
            .await
            .during(Step::Count)?;
        tracing::debug!(
            reference = %self.counter.reference,
            groups = groups.len(),
            "References grouped"
        );
        Ok(CountedReferences {
            counter: self.counter,
            reset: self.reset,
            groups,
        })
    }
}

/// Group sizes are known but not written yet.
#[must_use]
pub struct CountedReferences<'a> {
    counter: &'a ReferenceCounter,
    reset: u64,
    groups: Vec<(DocId, u64)>,
}

impl CountedReferences<'_> {
    pub fn groups(&self) -> &[(DocId, u64)] {
        &self.groups
    }

    pub async fn apply(self) -> Result<CounterOutcome, ReconcileError> {
        let counter = self.counter;
        let matched = apply_counts(
            counter.store.as_ref(),
            counter.counter,
            &self.groups,
            counter.batch_size,
            false,
        )
        .await?;

        let mut outcome = CounterOutcome::new(counter.counter, self.reset);
        outcome.record(self.groups.len() as u64, matched);
        tracing::debug!(
            counter = %counter.counter,
            matched = outcome.matched,
            dangling = outcome.dangling,
            "Counters applied"
        );
        Ok(outcome)
    }
}
