//! Entry points for callers: validated research requests, an event stream,
//! background jobs and report writing.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::{Config, ResearchConfig};
use crate::error::ResearchError;
use crate::jobs::{JobCallbacks, JobRegistry, ResearchJob};
use crate::llm::LanguageModel;
use crate::ollama::OllamaClient;
use crate::progress::{ProgressCallback, ProgressReporter, ResearchProgress};
use crate::report::ReportWriter;
use crate::research::{BranchSettings, ResearchOrchestrator, ResearchResult, ResearchScope};
use crate::search::{FirecrawlClient, SearchProvider};

/// A research request as received from a caller. Missing breadth and depth
/// fall back to the configured defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchParams {
    pub topic: String,
    #[serde(default)]
    pub breadth: Option<usize>,
    #[serde(default)]
    pub depth: Option<usize>,
}

impl ResearchParams {
    pub fn new(topic: impl Into<String>) -> Self {
        ResearchParams {
            topic: topic.into(),
            ..Default::default()
        }
    }

    pub fn with_breadth(mut self, breadth: usize) -> Self {
        self.breadth = Some(breadth);
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = Some(depth);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ValidatedParams {
    topic: String,
    breadth: usize,
    depth: usize,
}

/// One message of a streamed research run. A stream carries any number of
/// `Progress` events followed by exactly one `Complete` or `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResearchEvent {
    Progress { data: ResearchProgress },
    Complete { data: ResearchResult },
    Error { error: String },
}

impl ResearchEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ResearchEvent::Progress { .. })
    }
}

#[derive(Clone)]
pub struct ResearchService {
    orchestrator: ResearchOrchestrator,
    report_writer: ReportWriter,
    jobs: JobRegistry,
    limits: ResearchConfig,
}

impl ResearchService {
    /// Validate `config` and build the Ollama and Firecrawl clients from it.
    pub fn from_config(config: &Config) -> Result<Self, ResearchError> {
        config.validate()?;
        let model = OllamaClient::with_config(&config.ollama)?;
        let search = FirecrawlClient::with_config(&config.search)?;
        tracing::info!(
            model = model.get_model(),
            search = %config.search.base_url,
            concurrency = config.research.concurrency_limit,
            "research service configured"
        );
        Ok(Self::new(Arc::new(model), Arc::new(search), config))
    }

    pub fn new(
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        config: &Config,
    ) -> Self {
        let orchestrator = ResearchOrchestrator::new(
            model.clone(),
            search,
            config.research.concurrency_limit,
            config.research.content_char_limit,
            BranchSettings::from_config(&config.search, &config.research),
        );
        ResearchService {
            report_writer: ReportWriter::new(model, config.research.report_char_budget),
            jobs: JobRegistry::new(orchestrator.clone()),
            orchestrator,
            limits: config.research.clone(),
        }
    }

    pub async fn research(&self, params: ResearchParams) -> Result<ResearchResult, ResearchError> {
        self.research_with(params, None, &CancellationToken::new()).await
    }

    /// Run a request to completion, reporting progress to `on_progress` and
    /// stopping early when `cancel` fires.
    pub async fn research_with(
        &self,
        params: ResearchParams,
        on_progress: Option<ProgressCallback>,
        cancel: &CancellationToken,
    ) -> Result<ResearchResult, ResearchError> {
        let params = self.validate(&params)?;
        tracing::info!(
            topic = %params.topic,
            breadth = params.breadth,
            depth = params.depth,
            "starting research"
        );

        let progress = ProgressReporter::new(params.breadth, params.depth, on_progress);
        let result = self
            .orchestrator
            .run(
                ResearchScope::new(params.topic, params.breadth, params.depth),
                &progress,
                cancel,
            )
            .await?;

        tracing::info!(
            learnings = result.learnings.len(),
            urls = result.visited_urls.len(),
            "research finished"
        );
        Ok(result)
    }

    /// Run a request in the background and stream its events. Invalid
    /// parameters produce a single `Error` event.
    pub fn research_stream(
        &self,
        params: ResearchParams,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<ResearchEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = self.clone();

        tokio::spawn(async move {
            let progress_tx = tx.clone();
            let on_progress: ProgressCallback = Arc::new(move |p: &ResearchProgress| {
                // the receiver may be gone; the run still completes
                let _ = progress_tx.send(ResearchEvent::Progress { data: p.clone() });
            });

            let last = match service.research_with(params, Some(on_progress), &cancel).await {
                Ok(result) => ResearchEvent::Complete { data: result },
                Err(e) => {
                    tracing::error!(error = %e, "streamed research failed");
                    ResearchEvent::Error { error: e.to_string() }
                }
            };
            if tx.send(last).is_err() {
                tracing::debug!("research stream receiver dropped before completion");
            }
        });

        rx
    }

    /// Validate and start a background job; returns its id.
    pub fn submit(&self, params: ResearchParams) -> Result<String, ResearchError> {
        self.submit_with(params, JobCallbacks::default())
    }

    pub fn submit_with(
        &self,
        params: ResearchParams,
        callbacks: JobCallbacks,
    ) -> Result<String, ResearchError> {
        let params = self.validate(&params)?;
        Ok(self.jobs.submit(params.topic, params.breadth, params.depth, callbacks)?)
    }

    pub fn status(&self, id: &str) -> Option<ResearchJob> {
        self.jobs.status(id)
    }

    pub fn cancel(&self, id: &str) -> bool {
        self.jobs.cancel(id)
    }

    pub fn jobs(&self) -> Vec<ResearchJob> {
        self.jobs.list()
    }

    pub async fn write_report(
        &self,
        topic: &str,
        result: &ResearchResult,
    ) -> Result<String, ResearchError> {
        self.report_writer
            .write(topic, &result.learnings, &result.visited_urls)
            .await
            .map_err(ResearchError::Report)
    }

    fn validate(&self, params: &ResearchParams) -> Result<ValidatedParams, ResearchError> {
        let topic = params.topic.trim();
        if topic.is_empty() {
            return Err(ResearchError::invalid("topic", "\"\"", "must not be empty"));
        }

        let breadth = params.breadth.unwrap_or(self.limits.default_breadth);
        if !(1..=self.limits.max_breadth).contains(&breadth) {
            return Err(ResearchError::invalid(
                "breadth",
                breadth,
                format!("must be between 1 and {}", self.limits.max_breadth),
            ));
        }

        let depth = params.depth.unwrap_or(self.limits.default_depth);
        if !(1..=self.limits.max_depth).contains(&depth) {
            return Err(ResearchError::invalid(
                "depth",
                depth,
                format!("must be between 1 and {}", self.limits.max_depth),
            ));
        }

        Ok(ValidatedParams {
            topic: topic.to_string(),
            breadth,
            depth,
        })
    }
}
