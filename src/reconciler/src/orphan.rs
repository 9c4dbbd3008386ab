//! Deletion of entities left without referents.
//!
//! After a correct, complete run no document should end up with a zero
//! counter or an empty reconciled array. When one does, it is removed and a
//! notice is emitted; this is a cleanup, not an error.

use std::fmt;
use std::sync::Arc;

use common::EntityStore;
use common::model::{Collection, Counter, LinkArray};
use serde::Serialize;

use crate::error::{ReconcileError, Step, StepContext};

/// The predicate an orphan is recognized by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneTarget {
    ZeroCounter(Counter),
    EmptyArray(LinkArray),
}

impl PruneTarget {
    pub fn collection(self) -> Collection {
        match self {
            PruneTarget::ZeroCounter(counter) => counter.collection(),
            PruneTarget::EmptyArray(array) => array.owner(),
        }
    }

    /// The line reported for a prune that removed documents.
    pub fn notice(self, removed: u64) -> String {
        format!("Removed {removed} {} with {self}", self.collection().describe())
    }
}

impl fmt::Display for PruneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PruneTarget::ZeroCounter(counter) => write!(f, "zero {}", counter.field()),
            PruneTarget::EmptyArray(array) => write!(f, "empty {}", array.field()),
        }
    }
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// Outcome of a fully applied counting or reconciling step.
///
/// Sealed: only the outcomes returned by completed pipelines implement it,
/// so a prune can never run against half-computed state.
///
/// ```compile_fail
/// use common::model::Counter;
/// use reconciler::{PruneTarget, Settled};
///
/// struct Unapplied;
///
/// impl Settled for Unapplied {
///     fn prune_target(&self) -> PruneTarget {
///         PruneTarget::ZeroCounter(Counter::OrgRefCnt)
///     }
/// }
/// ```
pub trait Settled: sealed::Sealed {
    fn prune_target(&self) -> PruneTarget;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct PruneOutcome {
    pub target: PruneTarget,
    pub removed: u64,
}

impl PruneOutcome {
    pub fn notice(&self) -> Option<String> {
        (self.removed > 0).then(|| self.target.notice(self.removed))
    }
}

pub struct OrphanPruner {
    store: Arc<dyn EntityStore>,
}

impl OrphanPruner {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub async fn prune(&self, outcome: &impl Settled) -> Result<PruneOutcome, ReconcileError> {
        let target = outcome.prune_target();
        let removed = match target {
            PruneTarget::ZeroCounter(counter) => self.store.delete_zero_counter(counter).await,
            PruneTarget::EmptyArray(array) => self.store.delete_empty_array(array).await,
        }
        .during(Step::Prune)?;

        if removed > 0 {
            tracing::warn!(
                collection = %target.collection(),
                removed,
                "{}",
                target.notice(removed)
            );
        } else {
            tracing::debug!(collection = %target.collection(), "No orphans to remove");
        }

        Ok(PruneOutcome { target, removed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::MemoryStore;
    use common::model::{AsnRecord, BgpPrefixRecord, OrgRecord};

    struct Done(PruneTarget);

    impl sealed::Sealed for Done {}

    impl Settled for Done {
        fn prune_target(&self) -> PruneTarget {
            self.0
        }
    }

    #[test]
    fn test_notice_wording() {
        let target = PruneTarget::ZeroCounter(Counter::BgpPrefixRefCnt);
        assert_eq!(target.notice(1), "Removed 1 BGP prefixes with zero ref_cnt");

        let target = PruneTarget::EmptyArray(LinkArray::AsnBgpPrefixes);
        assert_eq!(target.notice(2), "Removed 2 ASNs with empty bgppref");
    }

    #[tokio::test]
    async fn test_prune_zero_counter() {
        let store = Arc::new(
            MemoryStore::with_records([
                OrgRecord::new("ORG1").with_ref_cnt(2).into(),
                OrgRecord::new("ORG2").into(),
            ])
            .await,
        );
        let pruner = OrphanPruner::new(store.clone());

        let outcome = pruner
            .prune(&Done(PruneTarget::ZeroCounter(Counter::OrgRefCnt)))
            .await
            .unwrap();

        assert_eq!(outcome.removed, 1);
        assert_eq!(
            outcome.notice().as_deref(),
            Some("Removed 1 organizations with zero ref_cnt")
        );
        assert_eq!(store.count_documents(Collection::Org).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_without_orphans_has_no_notice() {
        let store = Arc::new(
            MemoryStore::with_records([
                AsnRecord::new(64500).with_prefixes(["192.0.2.0/24"]).into(),
                BgpPrefixRecord::new("192.0.2.0/24").with_asns([64500_i64]).into(),
            ])
            .await,
        );
        let pruner = OrphanPruner::new(store);

        let outcome = pruner
            .prune(&Done(PruneTarget::EmptyArray(LinkArray::AsnBgpPrefixes)))
            .await
            .unwrap();

        assert_eq!(outcome.removed, 0);
        assert!(outcome.notice().is_none());
    }
}
