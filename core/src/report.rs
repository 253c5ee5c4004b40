use crate::script::Priority;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sequence index given to exchanges the scanner sends on its own.
pub const SCANNER_SEQUENCE_INDEX: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptResult {
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub passed: bool,
    #[serde(default)]
    pub message: Option<String>,
    pub index: i64,
    pub kind: ResultType,
    pub recorded_at: String,
    pub elapsed_ms: u64,
}

impl ScriptResult {
    pub fn reference(&self) -> ResultRef {
        ResultRef {
            index: self.index,
            url: self.url.clone(),
        }
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.passed = false;
        self.message = Some(message.into());
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Ordinary,
    ScanAction,
}

/// Back-reference from a finding to the result that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultRef {
    pub index: i64,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Finding {
    pub plugin_id: u32,
    pub risk: Risk,
    pub confidence: Confidence,
    pub name: String,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub source: Option<ResultRef>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Risk {
    Info,
    Low,
    Medium,
    High,
}

impl From<Priority> for Risk {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Info => Risk::Info,
            Priority::Low => Risk::Low,
            Priority::Medium => Risk::Medium,
            Priority::High => Risk::High,
        }
    }
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Info => write!(f, "INFO"),
            Risk::Low => write!(f, "LOW"),
            Risk::Medium => write!(f, "MEDIUM"),
            Risk::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
    Confirmed,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::Low => write!(f, "LOW"),
            Confidence::Medium => write!(f, "MEDIUM"),
            Confidence::High => write!(f, "HIGH"),
            Confidence::Confirmed => write!(f, "CONFIRMED"),
        }
    }
}
