//! OutcomeRecord: emitted when an idea reaches a terminal state in the
//! pipeline. Terminal and immutable — no status column, every write is a
//! new row, and `idea_id` is deliberately non-unique because an idea can
//! re-enter the pipeline and terminate again.

use crate::core::error::ContrailError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const OUTCOME_CONTRACT_VERSION: &str = "1.1.0";

/// Terminal states for an idea in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalOutcome {
    Published,
    Rejected,
    Deferred,
    BuildFailed,
    FeatureBacklog,
}

impl TerminalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalOutcome::Published => "published",
            TerminalOutcome::Rejected => "rejected",
            TerminalOutcome::Deferred => "deferred",
            TerminalOutcome::BuildFailed => "build_failed",
            TerminalOutcome::FeatureBacklog => "feature_backlog",
        }
    }
}

/// Record of an idea passing through one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineTrace {
    pub stage: String,
    pub entered_at: DateTime<Utc>,
    #[serde(default)]
    pub exited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub persona_used: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    pub idea_id: i64,
    pub idea_title: String,
    pub outcome: TerminalOutcome,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub capabilities_fit: Option<String>,
    #[serde(default)]
    pub build_outcome: Option<String>,
    #[serde(default)]
    pub artifact_count: i64,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub pipeline_trace: Vec<PipelineTrace>,
    #[serde(default)]
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub idea_type: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

fn default_contract_version() -> String {
    OUTCOME_CONTRACT_VERSION.to_string()
}

impl OutcomeRecord {
    /// Accept or reject the record before any I/O.
    ///
    /// The trace must be non-decreasing in `entered_at`: a stage cannot be
    /// entered before the stage recorded ahead of it.
    pub fn validate(&self) -> Result<(), ContrailError> {
        if self.contract_version.is_empty() {
            return Err(ContrailError::ValidationError(
                "contract_version must not be empty".to_string(),
            ));
        }
        for pair in self.pipeline_trace.windows(2) {
            let (prev, curr) = (&pair[0], &pair[1]);
            if curr.entered_at < prev.entered_at {
                return Err(ContrailError::ValidationError(format!(
                    "pipeline_trace not chronological: {} ({}) -> {} ({})",
                    prev.stage,
                    prev.entered_at.to_rfc3339(),
                    curr.stage,
                    curr.entered_at.to_rfc3339()
                )));
            }
        }
        Ok(())
    }
}
