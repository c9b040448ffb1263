//! Read-only readers over data owned by other subsystems.

pub mod pipeline;

pub use pipeline::{IdeaDetail, IdeaSummary, PipelineReader};
