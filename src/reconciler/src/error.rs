use std::fmt;

use common::StoreError;
use common::model::{Counter, Reference};
use serde::Serialize;
use thiserror::Error;

use crate::orchestrator::Pass;

/// A step of a reconciliation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Reset,
    Count,
    Derive,
    Apply,
    Prune,
    Verify,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Reset => "reset",
            Step::Count => "count",
            Step::Derive => "derive",
            Step::Apply => "apply",
            Step::Prune => "prune",
            Step::Verify => "verify",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A datastore operation failed; nothing after it was executed.
    #[error("{step} step failed: {source}")]
    Store {
        step: Step,
        #[source]
        source: StoreError,
    },

    /// A pass was aborted; the remaining passes were not run.
    #[error("pass {pass} aborted: {source}")]
    Pass {
        pass: Pass,
        #[source]
        source: Box<ReconcileError>,
    },

    #[error("reference {reference} does not feed counter {counter}")]
    InvalidSource {
        counter: Counter,
        reference: Reference,
    },

    #[error("reference {reference} already accumulated into counter {counter}")]
    DuplicateSource {
        counter: Counter,
        reference: Reference,
    },
}

impl ReconcileError {
    /// The pass that was aborted, if the error escaped a pass.
    pub fn pass(&self) -> Option<Pass> {
        match self {
            ReconcileError::Pass { pass, .. } => Some(*pass),
            _ => None,
        }
    }

    /// The pipeline step whose datastore call failed.
    pub fn step(&self) -> Option<Step> {
        match self {
            ReconcileError::Store { step, .. } => Some(*step),
            ReconcileError::Pass { source, .. } => source.step(),
            _ => None,
        }
    }
}

/// Attach the failing step to a datastore result.
pub(crate) trait StepContext<T> {
    fn during(self, step: Step) -> Result<T, ReconcileError>;
}

impl<T> StepContext<T> for Result<T, StoreError> {
    fn during(self, step: Step) -> Result<T, ReconcileError> {
        self.map_err(|source| ReconcileError::Store { step, source })
    }
}
