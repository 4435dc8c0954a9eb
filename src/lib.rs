//! Recursive web research: plan sub-queries for a topic, search and extract
//! learnings for each, and follow up on what was found down to a fixed depth.

pub mod api;
pub mod config;
pub mod error;
pub mod extractor;
pub mod jobs;
pub mod llm;
pub mod ollama;
pub mod planner;
pub mod progress;
pub mod prompt;
pub mod report;
pub mod research;
pub mod search;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ResearchEvent, ResearchParams, ResearchService};
pub use config::Config;
pub use error::{ConfigError, ExtractionError, JobError, LlmError, ResearchError, SearchError};
pub use jobs::{JobCallbacks, JobRegistry, JobStatus, ResearchJob};
pub use progress::{ProgressCallback, ProgressReporter, ResearchProgress};
pub use research::{ResearchOrchestrator, ResearchResult, ResearchScope};
