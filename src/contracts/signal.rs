//! ResearchSignal: a paper, tool, or trend a research agent surfaced for
//! the analyst. `consumed_by` is the mutable field — null until a
//! consumer claims the signal, after which it records the latest
//! consumer name on the index row.

use crate::core::error::ContrailError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const SIGNAL_CONTRACT_VERSION: &str = "1.0.0";

/// Source agent that produced the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    ArxivHf,
    ToolMonitor,
    DomainWatch,
    IdeaMachine,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::ArxivHf => "arxiv_hf",
            SignalSource::ToolMonitor => "tool_monitor",
            SignalSource::DomainWatch => "domain_watch",
            SignalSource::IdeaMachine => "idea_machine",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalRelevance {
    High,
    Medium,
    Low,
}

impl SignalRelevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalRelevance::High => "high",
            SignalRelevance::Medium => "medium",
            SignalRelevance::Low => "low",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchSignal {
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    pub signal_id: String,
    pub source: SignalSource,
    pub title: String,
    pub summary: String,
    #[serde(default)]
    pub url: Option<String>,
    pub relevance: SignalRelevance,
    #[serde(default)]
    pub relevance_rationale: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub raw_data: Option<JsonValue>,
    #[serde(default)]
    pub consumed_by: Option<String>,
    pub emitted_at: DateTime<Utc>,
}

fn default_contract_version() -> String {
    SIGNAL_CONTRACT_VERSION.to_string()
}

impl ResearchSignal {
    pub fn validate(&self) -> Result<(), ContrailError> {
        if self.contract_version.is_empty() {
            return Err(ContrailError::ValidationError(
                "contract_version must not be empty".to_string(),
            ));
        }
        if self.signal_id.is_empty() {
            return Err(ContrailError::ValidationError(
                "signal_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
