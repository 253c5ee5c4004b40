use crate::client::ClientError;
use crate::report::{Confidence, Finding, ResultRef, Risk};
use crate::script::{Priority, StatementKind};
use crate::transport::TransportError;
use std::fmt;

/// Plugin id stamped on findings raised by failing actions.
pub const FAIL_ACTION_PLUGIN_ID: u32 = 50004;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Action,
    Assignment,
    Assertion,
    Client,
    Transport,
}

impl FailureKind {
    /// Whether the run carries on after a statement fails this way.
    pub fn is_recoverable(self) -> bool {
        matches!(self, FailureKind::Action | FailureKind::Assignment)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Action => "action",
            FailureKind::Assignment => "assignment",
            FailureKind::Assertion => "assertion",
            FailureKind::Client => "client",
            FailureKind::Transport => "transport",
        };
        f.write_str(label)
    }
}

/// Failure of a single statement.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{message}")]
    Action {
        message: String,
        priority: Option<Priority>,
    },
    #[error("{0}")]
    Assignment(String),
    #[error("{0}")]
    Assertion(String),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl StepError {
    pub fn action(message: impl Into<String>) -> Self {
        StepError::Action {
            message: message.into(),
            priority: None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            StepError::Action { .. } => FailureKind::Action,
            StepError::Assignment(_) => FailureKind::Assignment,
            StepError::Assertion(_) => FailureKind::Assertion,
            StepError::Client(_) => FailureKind::Client,
            StepError::Transport(_) => FailureKind::Transport,
        }
    }
}

/// Fatal failure that ended a run.
#[derive(Debug, thiserror::Error)]
#[error("{statement} statement #{index} failed ({kind}): {source}", kind = .source.kind())]
pub struct RunError {
    pub index: usize,
    pub statement: StatementKind,
    #[source]
    pub source: StepError,
}

impl RunError {
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}

/// Turns recoverable action failures into reportable findings.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailureTranslator;

impl FailureTranslator {
    pub fn action_finding(
        &self,
        message: &str,
        priority: Option<Priority>,
        source: Option<ResultRef>,
    ) -> Finding {
        Finding {
            plugin_id: FAIL_ACTION_PLUGIN_ID,
            risk: priority.map(Risk::from).unwrap_or(Risk::Low),
            confidence: Confidence::Medium,
            name: message.to_string(),
            evidence: None,
            source,
        }
    }
}
