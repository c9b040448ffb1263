//! PersonaUpgradePatch: ordered field-level edits the academy proposes
//! against a persona document, linked back to the recommendations that
//! motivated them. The store transports and tracks these; applying the
//! edits to a persona file is the reviewer tooling's job, not ours.

use crate::core::error::ContrailError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

pub const PATCH_CONTRACT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchOperation {
    Add,
    Replace,
    Remove,
}

impl PatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatchOperation::Add => "add",
            PatchOperation::Replace => "replace",
            PatchOperation::Remove => "remove",
        }
    }
}

/// One field-level edit against the persona document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaFieldPatch {
    pub operation: PatchOperation,
    pub path: String,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaUpgradePatch {
    #[serde(default = "default_contract_version")]
    pub contract_version: String,
    pub patch_id: String,
    pub persona_id: String,
    pub patches: Vec<PersonaFieldPatch>,
    #[serde(default)]
    pub rationale: String,
    #[serde(default)]
    pub from_version: Option<String>,
    #[serde(default)]
    pub to_version: Option<String>,
    #[serde(default = "default_schema_valid")]
    pub schema_valid: bool,
    pub source_recommendation_ids: Vec<String>,
    // proposed | applied | rejected
    #[serde(default = "default_status")]
    pub status: String,
    pub emitted_at: DateTime<Utc>,
}

fn default_contract_version() -> String {
    PATCH_CONTRACT_VERSION.to_string()
}

fn default_schema_valid() -> bool {
    true
}

fn default_status() -> String {
    "proposed".to_string()
}

impl PersonaUpgradePatch {
    /// Accept or reject the patch before any I/O.
    ///
    /// A patch with no edit operations or no source recommendation is
    /// meaningless: there is nothing to review and nothing to trace it
    /// back to.
    pub fn validate(&self) -> Result<(), ContrailError> {
        if self.contract_version.is_empty() {
            return Err(ContrailError::ValidationError(
                "contract_version must not be empty".to_string(),
            ));
        }
        if self.patch_id.is_empty() {
            return Err(ContrailError::ValidationError(
                "patch_id must not be empty".to_string(),
            ));
        }
        if self.persona_id.is_empty() {
            return Err(ContrailError::ValidationError(
                "persona_id must not be empty".to_string(),
            ));
        }
        if self.patches.is_empty() {
            return Err(ContrailError::ValidationError(
                "patches must contain at least one operation".to_string(),
            ));
        }
        if self.source_recommendation_ids.is_empty() {
            return Err(ContrailError::ValidationError(
                "source_recommendation_ids must link at least one recommendation".to_string(),
            ));
        }
        for p in &self.patches {
            if p.path.is_empty() {
                return Err(ContrailError::ValidationError(format!(
                    "patch operation {} has an empty path",
                    p.operation.as_str()
                )));
            }
        }
        Ok(())
    }
}
