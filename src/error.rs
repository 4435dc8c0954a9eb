//! Error types for the research engine.
//!
//! Branch-level failures (`SearchError`, `ExtractionError`) are recovered by the
//! orchestrator; `ResearchError` is what a caller of a whole research request
//! can observe.

use std::path::PathBuf;

/// Top-level error for a research request.
#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to generate SERP queries: {0}")]
    QueryGeneration(#[source] LlmError),

    #[error("Failed to write report: {0}")]
    Report(#[source] LlmError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

impl ResearchError {
    pub(crate) fn invalid(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ResearchError::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not configured")]
    MissingCredential { name: &'static str },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config.toml: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors from the language-model completion service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Completion request failed: {message}")]
    Request { message: String },

    #[error("Completion API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("Could not parse model response as JSON: {message}")]
    ResponseParse { message: String },

    #[error("Model response does not match the requested schema: {message}")]
    Schema { message: String },
}

/// Errors from the web-search provider.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Search timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Search request failed: {message}")]
    Request { message: String },

    #[error("Search API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Search provider reported failure: {message}")]
    Provider { message: String },

    #[error("Could not parse search response: {message}")]
    ResponseParse { message: String },
}

impl SearchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SearchError::Timeout { .. })
    }
}

/// Errors from turning search hits into learnings.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("No valid content found in search results for '{query}'")]
    NoContent { query: String },

    #[error(transparent)]
    Completion(#[from] LlmError),
}

/// Errors from the job registry.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job '{id}' is still {status}")]
    AlreadyActive { id: String, status: String },
}
