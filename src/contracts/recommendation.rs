//! ImprovementRecommendation: typed proposal from the analyst to the
//! academy, replacing free-form markdown with a parseable contract.
//!
//! `status` is the mutable field: it starts at `pending` and downstream
//! review moves it to `applied` or `rejected` on the index row only. The
//! log entry keeps the write-time value forever.

use crate::core::error::ContrailError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const RECOMMENDATION_CONTRACT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    VoiceAdjustment,
    FrameworkAddition,
    FrameworkRefinement,
    ValidationMarkerChange,
    CaseStudyAddition,
    ConstraintAddition,
    ConstraintRemoval,
    ClaudeMdUpdate,
    PipelineChange,
    Other,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::VoiceAdjustment => "voice_adjustment",
            RecommendationType::FrameworkAddition => "framework_addition",
            RecommendationType::FrameworkRefinement => "framework_refinement",
            RecommendationType::ValidationMarkerChange => "validation_marker_change",
            RecommendationType::CaseStudyAddition => "case_study_addition",
            RecommendationType::ConstraintAddition => "constraint_addition",
            RecommendationType::ConstraintRemoval => "constraint_removal",
            RecommendationType::ClaudeMdUpdate => "claude_md_update",
            RecommendationType::PipelineChange => "pipeline_change",
            RecommendationType::Other => "other",
        }
    }
}

/// Scope of the recommendation: one persona, every persona, or a department.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetScope {
    SpecificPersona,
    AllPersonas,
    AllInDepartment,
}

impl TargetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetScope::SpecificPersona => "specific_persona",
            TargetScope::AllPersonas => "all_personas",
            TargetScope::AllInDepartment => "all_in_department",
        }
    }
}

/// Evidence supporting a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBasis {
    #[serde(default)]
    pub outcome_record_ids: Vec<i64>,
    #[serde(default = "default_pattern_frequency")]
    pub pattern_frequency: i64,
    #[serde(default = "default_signal_strength")]
    pub signal_strength: f64,
    #[serde(default)]
    pub description: String,
}

fn default_pattern_frequency() -> i64 {
    1
}

fn default_signal_strength() -> f64 {
    0.5
}

impl Default for EvidenceBasis {
    fn default() -> Self {
        EvidenceBasis {
            outcome_record_ids: Vec::new(),
            pattern_frequency: 1,
            signal_strength: 0.5,
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementRecommendation {
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    pub recommendation_id: String,
    #[serde(default)]
    pub session_id: String,
    pub recommendation_type: RecommendationType,
    // persona | claude_md | pipeline
    #[serde(default = "default_target_system")]
    pub target_system: String,
    pub title: String,
    pub description: String,
    pub suggested_change: String,
    #[serde(default = "default_scope")]
    pub scope: TargetScope,
    #[serde(default)]
    pub target_persona_ids: Vec<String>,
    #[serde(default)]
    pub target_department: Option<String>,
    // high | medium | low
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub impact: String,
    #[serde(default = "default_reversibility")]
    pub reversibility: String,
    #[serde(default)]
    pub evidence: EvidenceBasis,
    // pending | applied | rejected
    #[serde(default = "default_status")]
    pub status: String,
    pub emitted_at: DateTime<Utc>,
}

fn default_contract_version() -> String {
    RECOMMENDATION_CONTRACT_VERSION.to_string()
}

fn default_target_system() -> String {
    "persona".to_string()
}

fn default_scope() -> TargetScope {
    TargetScope::AllPersonas
}

fn default_priority() -> String {
    "medium".to_string()
}

fn default_reversibility() -> String {
    "high".to_string()
}

fn default_status() -> String {
    "pending".to_string()
}

impl ImprovementRecommendation {
    /// Accept or reject the recommendation before any I/O.
    ///
    /// Scope-dependent fields:
    /// - `specific_persona` requires at least one target persona id
    /// - `all_in_department` requires a target department
    pub fn validate(&self) -> Result<(), ContrailError> {
        if self.contract_version.is_empty() {
            return Err(ContrailError::ValidationError(
                "contract_version must not be empty".to_string(),
            ));
        }
        if self.recommendation_id.is_empty() {
            return Err(ContrailError::ValidationError(
                "recommendation_id must not be empty".to_string(),
            ));
        }
        if self.scope == TargetScope::SpecificPersona && self.target_persona_ids.is_empty() {
            return Err(ContrailError::ValidationError(
                "target_persona_ids must be non-empty when scope is specific_persona".to_string(),
            ));
        }
        if self.scope == TargetScope::AllInDepartment
            && self.target_department.as_deref().unwrap_or("").is_empty()
        {
            return Err(ContrailError::ValidationError(
                "target_department must be set when scope is all_in_department".to_string(),
            ));
        }
        if self.evidence.pattern_frequency < 1 {
            return Err(ContrailError::ValidationError(
                "evidence.pattern_frequency must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.evidence.signal_strength) {
            return Err(ContrailError::ValidationError(
                "evidence.signal_strength must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}
