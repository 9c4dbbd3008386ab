//! Offline recomputation of the entity graph's derived state.
//!
//! Recomputes reference counters and the ASN <-> BGP prefix link arrays from
//! the authoritative forward references, then prunes documents left without
//! referents. See [`Orchestrator`] for the pass order.

pub mod counter;
pub mod error;
pub mod fan_in;
pub mod links;
pub mod metrics;
pub mod orchestrator;
pub mod orphan;
pub mod verify;

pub use counter::{CounterOutcome, ReferenceCounter};
pub use error::{ReconcileError, Step};
pub use fan_in::FanInAccumulator;
pub use links::{LinkOutcome, LinkReconciler};
pub use metrics::{MetricsSummary, ReconcileMetrics};
pub use orchestrator::{Orchestrator, Pass, PassReport, RunReport};
pub use orphan::{OrphanPruner, PruneOutcome, PruneTarget, Settled};
pub use verify::{ConsistencyChecker, ConsistencyReport, Violation};
