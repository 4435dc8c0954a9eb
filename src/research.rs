//! Recursive research orchestration.
//!
//! Each call plans `breadth` queries, runs one branch per query (search, then
//! extraction) under a semaphore shared by the whole call tree, and recurses on
//! every surviving branch with `ceil(breadth / 2)` and `depth - 1`. Branch
//! failures degrade the result instead of failing the call; only a planning
//! failure fails a call.

use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::{ResearchConfig, SearchConfig};
use crate::error::{ExtractionError, ResearchError, SearchError};
use crate::extractor::{ExtractionResult, ResultExtractor};
use crate::llm::LanguageModel;
use crate::planner::{QueryPlanner, ResearchQuery};
use crate::progress::ProgressReporter;
use crate::search::{SearchExecutor, SearchProvider};

/// Deduplicated learnings and source URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchResult {
    pub learnings: BTreeSet<String>,
    pub visited_urls: BTreeSet<String>,
}

impl ResearchResult {
    pub fn from_parts<L, U>(learnings: L, visited_urls: U) -> Self
    where
        L: IntoIterator<Item = String>,
        U: IntoIterator<Item = String>,
    {
        ResearchResult {
            learnings: learnings.into_iter().collect(),
            visited_urls: visited_urls.into_iter().collect(),
        }
    }

    pub fn merge(&mut self, other: ResearchResult) {
        self.learnings.extend(other.learnings);
        self.visited_urls.extend(other.visited_urls);
    }

    pub fn is_empty(&self) -> bool {
        self.learnings.is_empty() && self.visited_urls.is_empty()
    }
}

/// Inputs of one `run` invocation. The accumulators are snapshots owned by
/// the call; children get their own copies.
#[derive(Debug, Clone)]
pub struct ResearchScope {
    pub topic: String,
    pub breadth: usize,
    pub depth: usize,
    pub learnings: Vec<String>,
    pub visited_urls: Vec<String>,
}

impl ResearchScope {
    pub fn new(topic: impl Into<String>, breadth: usize, depth: usize) -> Self {
        ResearchScope {
            topic: topic.into(),
            breadth,
            depth,
            learnings: Vec::new(),
            visited_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BranchSettings {
    pub search_timeout: Duration,
    pub result_limit: usize,
    pub learnings_per_query: usize,
}

impl BranchSettings {
    pub fn from_config(search: &SearchConfig, research: &ResearchConfig) -> Self {
        BranchSettings {
            search_timeout: Duration::from_millis(search.timeout_ms),
            result_limit: search.result_limit,
            learnings_per_query: research.learnings_per_query,
        }
    }
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self::from_config(&SearchConfig::default(), &ResearchConfig::default())
    }
}

#[derive(Debug, thiserror::Error)]
enum BranchError {
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// The recursive coordinator. Cloning is cheap and clones share the limiter.
#[derive(Clone)]
pub struct ResearchOrchestrator {
    planner: QueryPlanner,
    search: SearchExecutor,
    extractor: ResultExtractor,
    limiter: Arc<Semaphore>,
    settings: BranchSettings,
}

impl ResearchOrchestrator {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        provider: Arc<dyn SearchProvider>,
        concurrency_limit: usize,
        content_char_limit: usize,
        settings: BranchSettings,
    ) -> Self {
        ResearchOrchestrator {
            planner: QueryPlanner::new(model.clone()),
            search: SearchExecutor::new(provider),
            extractor: ResultExtractor::new(model, content_char_limit),
            limiter: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            settings,
        }
    }

    /// Research `scope.topic` down to `scope.depth` levels.
    ///
    /// Fails only when planning this level fails or the scope is invalid.
    /// Once `cancel` fires no new branches or recursive calls are started;
    /// branches already running finish and are folded into the result.
    pub fn run<'a>(
        &'a self,
        scope: ResearchScope,
        progress: &'a ProgressReporter,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<ResearchResult, ResearchError>> {
        async move {
            if scope.breadth == 0 {
                return Err(ResearchError::invalid("breadth", 0, "must be at least 1"));
            }
            if scope.depth == 0 {
                return Err(ResearchError::invalid("depth", 0, "must be at least 1"));
            }

            let queries = self
                .planner
                .generate(&scope.topic, &scope.learnings, scope.breadth)
                .await
                .map_err(ResearchError::QueryGeneration)?;

            progress.queries_planned(
                queries.len(),
                queries.first().map(|q| q.text.as_str()),
                scope.depth,
                scope.breadth,
            );

            if queries.is_empty() {
                tracing::info!(depth = scope.depth, "no queries planned, branch complete");
                return Ok(ResearchResult::default());
            }

            let parent = Arc::new(scope);
            let mut started = Vec::with_capacity(queries.len());
            let mut handles = Vec::with_capacity(queries.len());
            for query in queries {
                if cancel.is_cancelled() {
                    tracing::info!(query = %query.text, "research cancelled, not starting branch");
                    progress.query_completed(&query.text, parent.depth, parent.breadth);
                    continue;
                }

                started.push(query.text.clone());
                let this = self.clone();
                let parent = parent.clone();
                let progress = progress.clone();
                let cancel = cancel.clone();
                handles.push(tokio::spawn(async move {
                    this.run_branch(query, &parent, &progress, &cancel).await
                }));
            }

            let mut result = ResearchResult::default();
            for (query, joined) in started.iter().zip(join_all(handles).await) {
                match joined {
                    Ok(contribution) => result.merge(contribution),
                    Err(e) => {
                        // a panicked branch never reported itself
                        tracing::error!(query = %query, error = %e, "research branch task failed");
                        progress.query_completed(query, parent.depth, parent.breadth);
                    }
                }
            }
            Ok(result)
        }
        .boxed()
    }

    async fn run_branch(
        &self,
        query: ResearchQuery,
        parent: &ResearchScope,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> ResearchResult {
        let next_breadth = parent.breadth.div_ceil(2).max(1);
        let next_depth = parent.depth - 1;

        let extraction = match self.search_and_extract(&query, next_breadth).await {
            Ok(extraction) => extraction,
            Err(BranchError::Search(e)) if e.is_timeout() => {
                tracing::warn!(query = %query.text, error = %e, "timeout running query");
                progress.query_completed(&query.text, parent.depth, parent.breadth);
                return ResearchResult::default();
            }
            Err(e) => {
                tracing::warn!(query = %query.text, error = %e, "error running query");
                progress.query_completed(&query.text, parent.depth, parent.breadth);
                return ResearchResult::default();
            }
        };

        let mut learnings = parent.learnings.clone();
        learnings.extend(extraction.learnings.iter().cloned());
        let mut visited_urls = parent.visited_urls.clone();
        visited_urls.extend(extraction.visited_urls.iter().cloned());
        let own =
            ResearchResult::from_parts(learnings.iter().cloned(), visited_urls.iter().cloned());

        let contribution = if next_depth > 0 && !cancel.is_cancelled() {
            tracing::info!(breadth = next_breadth, depth = next_depth, "researching deeper");
            let scope = ResearchScope {
                topic: follow_up_topic(&query, &extraction),
                breadth: next_breadth,
                depth: next_depth,
                learnings,
                visited_urls,
            };
            match self.run(scope, progress, cancel).await {
                Ok(deeper) => deeper,
                Err(e) => {
                    tracing::warn!(
                        query = %query.text,
                        error = %e,
                        "deeper research failed, keeping branch findings"
                    );
                    own
                }
            }
        } else {
            own
        };

        progress.query_completed(&query.text, next_depth, next_breadth);
        contribution
    }

    // The permit covers search and extraction only; it is released before
    // recursing so parents never hold permits their children wait on.
    async fn search_and_extract(
        &self,
        query: &ResearchQuery,
        num_follow_ups: usize,
    ) -> Result<ExtractionResult, BranchError> {
        let _permit = self.limiter.acquire().await.map_err(|_| SearchError::Request {
            message: "concurrency limiter closed".to_string(),
        })?;

        let hits = self
            .search
            .search(query, self.settings.search_timeout, self.settings.result_limit)
            .await?;
        let extraction = self
            .extractor
            .extract(query, &hits, self.settings.learnings_per_query, num_follow_ups)
            .await?;

        tracing::debug!(
            query = %query.text,
            learnings = extraction.learnings.len(),
            urls = extraction.visited_urls.len(),
            "branch extracted"
        );
        Ok(extraction)
    }
}

fn follow_up_topic(query: &ResearchQuery, extraction: &ExtractionResult) -> String {
    let directions: String = extraction
        .follow_up_questions
        .iter()
        .map(|q| format!("\n{q}"))
        .collect();
    format!(
        "Previous research goal: {}\nFollow-up research directions: {}",
        query.research_goal, directions
    )
    .trim()
    .to_string()
}
