//! Typed contracts passed between the loop's agent subsystems.
//!
//! Each contract is a versioned, fully-formed message: producers build
//! it, `validate()` accepts or rejects it before any I/O, and the store
//! persists it immutably. Four kinds flow around the loop:
//!
//! - [`OutcomeRecord`]: pipeline -> analyst, emitted at a terminal state
//! - [`ImprovementRecommendation`]: analyst -> academy
//! - [`PersonaUpgradePatch`]: academy -> pipeline
//! - [`ResearchSignal`]: research agents -> analyst

pub mod outcome;
pub mod patch;
pub mod recommendation;
pub mod signal;

pub use outcome::{OutcomeRecord, PipelineTrace, TerminalOutcome};
pub use patch::{PatchOperation, PersonaFieldPatch, PersonaUpgradePatch};
pub use recommendation::{
    EvidenceBasis, ImprovementRecommendation, RecommendationType, TargetScope,
};
pub use signal::{ResearchSignal, SignalRelevance, SignalSource};
