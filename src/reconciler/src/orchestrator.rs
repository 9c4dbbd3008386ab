//! Drives the five reconciliation passes in dependency order.
//!
//! Each pass runs to completion, prune step included, before the next one
//! starts: later passes group over collections that earlier passes pruned.
//! There is no transaction across passes. Every pass starts with an
//! unconditional reset, so re-running the whole job after a failure
//! converges to the same end state.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::EntityStore;
use common::config::ReconcilerConfig;
use common::model::{Counter, LinkArray, Reference};
use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::counter::{CounterOutcome, ReferenceCounter};
use crate::error::ReconcileError;
use crate::fan_in::FanInAccumulator;
use crate::links::{LinkOutcome, LinkReconciler};
use crate::metrics::ReconcileMetrics;
use crate::orphan::{OrphanPruner, PruneOutcome, PruneTarget};
use crate::verify::{ConsistencyChecker, ConsistencyReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Pass {
    /// `bgppref.ref_cnt` from `ip.bgppref`
    #[serde(rename = "ip_bgppref")]
    IpBgpPrefix,
    /// `ipblock.ref_cnt` from `ip.ipblock`
    #[serde(rename = "ip_ipblock")]
    IpIpBlock,
    /// `asn.bgppref` from `bgppref.asn`
    #[serde(rename = "asn_bgppref")]
    AsnBgpPrefixes,
    /// `bgppref.asn` from `asn.bgppref`
    #[serde(rename = "bgppref_asn")]
    BgpPrefixAsns,
    /// `org.ref_cnt` from `asn.org` and `ipblock.org`
    #[serde(rename = "org_fan_in")]
    OrgFanIn,
}

impl Pass {
    /// Execution order.
    pub const ALL: [Pass; 5] = [
        Pass::IpBgpPrefix,
        Pass::IpIpBlock,
        Pass::AsnBgpPrefixes,
        Pass::BgpPrefixAsns,
        Pass::OrgFanIn,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::IpBgpPrefix => "ip_bgppref",
            Pass::IpIpBlock => "ip_ipblock",
            Pass::AsnBgpPrefixes => "asn_bgppref",
            Pass::BgpPrefixAsns => "bgppref_asn",
            Pass::OrgFanIn => "org_fan_in",
        }
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub pass: Pass,
    pub pruned: PruneTarget,
    pub reset: u64,
    pub groups: u64,
    pub matched: u64,
    pub dangling: u64,
    pub removed: u64,
    pub duration_ms: u64,
}

impl PassReport {
    fn from_counter(pass: Pass, outcome: &CounterOutcome, pruned: &PruneOutcome) -> Self {
        Self {
            pass,
            pruned: pruned.target,
            reset: outcome.reset,
            groups: outcome.groups,
            matched: outcome.matched,
            dangling: outcome.dangling,
            removed: pruned.removed,
            duration_ms: 0,
        }
    }

    fn from_links(pass: Pass, outcome: &LinkOutcome, pruned: &PruneOutcome) -> Self {
        Self {
            pass,
            pruned: pruned.target,
            reset: outcome.reset,
            groups: outcome.groups,
            matched: outcome.matched,
            dangling: outcome.dangling,
            removed: pruned.removed,
            duration_ms: 0,
        }
    }

    pub fn notice(&self) -> Option<String> {
        (self.removed > 0).then(|| self.pruned.notice(self.removed))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub passes: Vec<PassReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<ConsistencyReport>,
}

impl RunReport {
    /// Removal notices, one per pass that removed documents.
    pub fn notices(&self) -> Vec<String> {
        self.passes.iter().filter_map(PassReport::notice).collect()
    }

    pub fn removed(&self) -> u64 {
        self.passes.iter().map(|p| p.removed).sum()
    }

    pub fn pass(&self, pass: Pass) -> Option<&PassReport> {
        self.passes.iter().find(|p| p.pass == pass)
    }

    pub fn log(&self) {
        for pass in &self.passes {
            tracing::info!(
                run_id = %self.run_id,
                pass = %pass.pass,
                reset = pass.reset,
                groups = pass.groups,
                matched = pass.matched,
                dangling = pass.dangling,
                removed = pass.removed,
                duration_ms = pass.duration_ms,
                "Pass summary"
            );
        }
        let elapsed = self.completed_at - self.started_at;
        tracing::info!(
            run_id = %self.run_id,
            passes = self.passes.len(),
            removed = self.removed(),
            elapsed_ms = elapsed.num_milliseconds(),
            "Reconciliation run complete"
        );
    }
}

pub struct Orchestrator {
    store: Arc<dyn EntityStore>,
    config: ReconcilerConfig,
    metrics: ReconcileMetrics,
    pruner: OrphanPruner,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn EntityStore>,
        config: ReconcilerConfig,
        metrics: ReconcileMetrics,
    ) -> Self {
        Self {
            pruner: OrphanPruner::new(store.clone()),
            store,
            config,
            metrics,
        }
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    /// Run every pass once. The first failure aborts the run.
    pub async fn run(&self) -> Result<RunReport, ReconcileError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        self.metrics.record_run_start();
        tracing::info!(%run_id, "Starting reconciliation run");

        let mut passes = Vec::with_capacity(Pass::ALL.len());
        for pass in Pass::ALL {
            let pass_clock = Instant::now();
            match self.run_pass(pass).await {
                Ok(mut report) => {
                    report.duration_ms = pass_clock.elapsed().as_millis() as u64;
                    self.metrics.record_pass(report.removed, report.dangling);
                    tracing::info!(
                        %run_id,
                        %pass,
                        matched = report.matched,
                        removed = report.removed,
                        "Pass complete"
                    );
                    passes.push(report);
                }
                Err(err) => {
                    self.metrics.record_run_failure();
                    tracing::error!(%run_id, %pass, error = %err, "Pass failed, aborting run");
                    return Err(ReconcileError::Pass {
                        pass,
                        source: Box::new(err),
                    });
                }
            }
        }

        let verification = if self.config.verify_after_run {
            let report = ConsistencyChecker::new(self.store.clone())
                .check()
                .await
                .inspect_err(|_| self.metrics.record_run_failure())?;
            report.log();
            Some(report)
        } else {
            None
        };

        self.metrics.record_run_success(clock.elapsed());
        Ok(RunReport {
            run_id,
            started_at,
            completed_at: Utc::now(),
            passes,
            verification,
        })
    }

    async fn run_pass(&self, pass: Pass) -> Result<PassReport, ReconcileError> {
        match pass {
            Pass::IpBgpPrefix => {
                self.count(pass, Reference::IpBgpPrefix, Counter::BgpPrefixRefCnt)
                    .await
            }
            Pass::IpIpBlock => {
                self.count(pass, Reference::IpIpBlock, Counter::IpBlockRefCnt)
                    .await
            }
            Pass::AsnBgpPrefixes => self.reconcile(pass, LinkArray::AsnBgpPrefixes).await,
            Pass::BgpPrefixAsns => self.reconcile(pass, LinkArray::BgpPrefixAsns).await,
            Pass::OrgFanIn => {
                let outcome = FanInAccumulator::for_counter(self.store.clone(), Counter::OrgRefCnt)
                    .with_batch_size(self.config.apply_batch_size)
                    .run()
                    .await?;
                let pruned = self.pruner.prune(&outcome).await?;
                Ok(PassReport::from_counter(pass, &outcome, &pruned))
            }
        }
    }

    async fn count(
        &self,
        pass: Pass,
        reference: Reference,
        counter: Counter,
    ) -> Result<PassReport, ReconcileError> {
        let outcome = ReferenceCounter::new(self.store.clone(), reference, counter)?
            .with_batch_size(self.config.apply_batch_size)
            .run()
            .await?;
        let pruned = self.pruner.prune(&outcome).await?;
        Ok(PassReport::from_counter(pass, &outcome, &pruned))
    }

    async fn reconcile(&self, pass: Pass, array: LinkArray) -> Result<PassReport, ReconcileError> {
        let outcome = LinkReconciler::new(self.store.clone(), array)
            .with_batch_size(self.config.apply_batch_size)
            .run()
            .await?;
        let pruned = self.pruner.prune(&outcome).await?;
        Ok(PassReport::from_links(pass, &outcome, &pruned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Step;
    use common::MemoryStore;
    use common::testing::MockEntityStore;
    use common::testing::fixtures;

    fn orchestrator(store: Arc<dyn EntityStore>) -> Orchestrator {
        Orchestrator::new(store, ReconcilerConfig::default(), ReconcileMetrics::new())
    }

    #[test]
    fn test_pass_names() {
        let names: Vec<_> = Pass::ALL.iter().map(|p| p.name()).collect();
        assert_eq!(
            names,
            vec!["ip_bgppref", "ip_ipblock", "asn_bgppref", "bgppref_asn", "org_fan_in"]
        );
        assert_eq!(
            serde_json::to_value(Pass::OrgFanIn).unwrap(),
            serde_json::json!("org_fan_in")
        );
    }

    #[tokio::test]
    async fn test_run_reports_every_pass_in_order() {
        let store = Arc::new(MemoryStore::with_records(fixtures::scenario_a()).await);
        let orchestrator = orchestrator(store);

        let report = orchestrator.run().await.unwrap();

        let order: Vec<Pass> = report.passes.iter().map(|p| p.pass).collect();
        assert_eq!(order, Pass::ALL.to_vec());
        assert_eq!(
            report.notices(),
            vec!["Removed 1 BGP prefixes with zero ref_cnt".to_string()]
        );
        assert!(report.verification.is_none());

        let metrics = orchestrator.metrics().summary();
        assert_eq!(metrics.runs_succeeded, 1);
        assert_eq!(metrics.passes_completed, 5);
        assert_eq!(metrics.documents_removed, 1);
    }

    #[tokio::test]
    async fn test_verify_after_run_attaches_report() {
        let store = Arc::new(MemoryStore::with_records(fixtures::sample_graph()).await);
        let config = ReconcilerConfig {
            verify_after_run: true,
            ..ReconcilerConfig::default()
        };
        let orchestrator = Orchestrator::new(store, config, ReconcileMetrics::new());

        let report = orchestrator.run().await.unwrap();
        let verification = report.verification.expect("verification requested");
        assert!(verification.is_consistent(), "{:?}", verification.violations);
    }

    #[tokio::test]
    async fn test_failure_aborts_remaining_passes() {
        let mut mock = MockEntityStore::new();
        mock.expect_reset_counter()
            .withf(|counter| *counter == Counter::BgpPrefixRefCnt)
            .times(1)
            .returning(|_| Ok(2));
        mock.expect_group_references()
            .times(1)
            .returning(|_| Ok(vec![(common::DocId::from("192.0.2.0/24"), 3)]));
        mock.expect_set_counters()
            .times(1)
            .returning(|_, _| Err(sqlx::Error::PoolTimedOut.into()));
        mock.expect_delete_zero_counter().never();
        mock.expect_reset_array().never();

        let orchestrator = orchestrator(Arc::new(mock));
        let err = orchestrator.run().await.unwrap_err();

        assert_eq!(err.pass(), Some(Pass::IpBgpPrefix));
        assert_eq!(err.step(), Some(Step::Apply));
        let metrics = orchestrator.metrics().summary();
        assert_eq!(metrics.runs_failed, 1);
        assert_eq!(metrics.passes_completed, 0);
    }

    #[tokio::test]
    async fn test_prune_failure_names_prune_step() {
        let mut mock = MockEntityStore::new();
        mock.expect_reset_counter().returning(|_| Ok(0));
        mock.expect_group_references().returning(|_| Ok(Vec::new()));
        mock.expect_set_counters().never();
        mock.expect_delete_zero_counter()
            .times(1)
            .returning(|_| Err(sqlx::Error::PoolClosed.into()));

        let err = orchestrator(Arc::new(mock)).run().await.unwrap_err();
        assert_eq!(err.pass(), Some(Pass::IpBgpPrefix));
        assert_eq!(err.step(), Some(Step::Prune));
    }
}
