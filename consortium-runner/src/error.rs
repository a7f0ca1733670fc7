//! Runner error types and exit code mapping

use consortium_convergence::ConvergenceError;
use consortium_core::error::{ConnectionError, ConsortiumError};

use crate::stage::Stage;

/// Failure of a workflow stage.
///
/// Every variant names the stage it happened in.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Configuration could not be turned into workflow inputs.
    #[error("[{stage}] invalid configuration: {source}")]
    Config {
        stage: Stage,
        #[source]
        source: ConsortiumError,
    },

    /// A collaborator call failed.
    #[error("[{stage}] {operation} failed: {source}")]
    Connection {
        stage: Stage,
        operation: &'static str,
        #[source]
        source: ConnectionError,
    },

    /// A convergence wait failed or exhausted its budget.
    #[error("[{stage}] {source}")]
    Convergence {
        stage: Stage,
        #[source]
        source: ConvergenceError,
    },

    /// A lifecycle wait exhausted its budget.
    #[error(
        "[{stage}] {what} did not converge after {attempts} attempts (still missing: {}, last error: {})",
        .missing.join(", "),
        .last_error.as_deref().unwrap_or("none")
    )]
    NotConverged {
        stage: Stage,
        what: String,
        attempts: u32,
        /// Peers that had not reported at the last attempt.
        missing: Vec<String>,
        last_error: Option<String>,
    },

    /// An observed result differs from what the workflow requires.
    #[error("[{stage}] {what}: expected {expected}, observed {observed}")]
    Assertion {
        stage: Stage,
        what: String,
        expected: String,
        observed: String,
    },

    /// A transaction endorsed by a single organization was accepted.
    #[error("[{stage}] endorsement policy not enforced: single-organization transaction succeeded")]
    PolicyNotEnforced { stage: Stage },

    /// Stage barrier violation.
    #[error("stage {stage} cannot run after {last}")]
    OutOfOrder { stage: Stage, last: Stage },
}

impl WorkflowError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Config { stage, .. }
            | Self::Connection { stage, .. }
            | Self::Convergence { stage, .. }
            | Self::NotConverged { stage, .. }
            | Self::Assertion { stage, .. }
            | Self::PolicyNotEnforced { stage }
            | Self::OutOfOrder { stage, .. } => *stage,
        }
    }

    /// Whether the failure is a retry budget running out, as opposed to a hard error.
    pub fn is_exhaustion(&self) -> bool {
        match self {
            Self::NotConverged { .. } => true,
            Self::Convergence { source, .. } => source.is_exhaustion(),
            _ => false,
        }
    }

    /// `map_err` adapter for collaborator calls.
    pub(crate) fn connection(
        stage: Stage,
        operation: &'static str,
    ) -> impl FnOnce(ConnectionError) -> Self {
        move |source| Self::Connection {
            stage,
            operation,
            source,
        }
    }

    pub(crate) fn convergence(stage: Stage) -> impl FnOnce(ConvergenceError) -> Self {
        move |source| Self::Convergence { stage, source }
    }

    pub(crate) fn config(stage: Stage) -> impl FnOnce(ConsortiumError) -> Self {
        move |source| Self::Config { stage, source }
    }

    pub(crate) fn assertion(
        stage: Stage,
        what: impl Into<String>,
        expected: impl ToString,
        observed: impl ToString,
    ) -> Self {
        Self::Assertion {
            stage,
            what: what.into(),
            expected: expected.to_string(),
            observed: observed.to_string(),
        }
    }
}

/// Top-level error of the `consortium-runner` binary.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] ConsortiumError),

    /// Logging could not be initialised.
    #[error("logging error: {0}")]
    Logging(String),

    /// The workflow failed.
    #[error("workflow failed: {0}")]
    Workflow(#[from] WorkflowError),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error while writing output.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RunnerError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                          |
    /// |------|----------------------------------|
    /// | 0    | Success                          |
    /// | 1    | Workflow or output failure       |
    /// | 2    | Configuration or logging error   |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Logging(_) => 2,
            Self::Workflow(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }
}
