use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::ExtractionError;
use crate::llm::{generate_object, LanguageModel};
use crate::planner::ResearchQuery;
use crate::prompt::{system_prompt, trim_prompt};
use crate::search::SearchHit;

/// Findings extracted from the search results of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub learnings: Vec<String>,
    pub follow_up_questions: Vec<String>,
    pub visited_urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedFindings {
    learnings: Vec<String>,
    follow_up_questions: Vec<String>,
}

#[derive(Clone)]
pub struct ResultExtractor {
    model: Arc<dyn LanguageModel>,
    content_char_limit: usize,
}

impl ResultExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, content_char_limit: usize) -> Self {
        ResultExtractor {
            model,
            content_char_limit,
        }
    }

    pub async fn extract(
        &self,
        query: &ResearchQuery,
        hits: &[SearchHit],
        num_learnings: usize,
        num_follow_ups: usize,
    ) -> Result<ExtractionResult, ExtractionError> {
        let used: Vec<(&SearchHit, &str)> = hits
            .iter()
            .filter_map(|hit| {
                let content = hit.content.as_deref()?;
                (!content.trim().is_empty())
                    .then(|| (hit, trim_prompt(content, self.content_char_limit)))
            })
            .collect();

        if used.is_empty() {
            return Err(ExtractionError::NoContent {
                query: query.text.clone(),
            });
        }

        let mut visited_urls: Vec<String> = Vec::new();
        for (hit, _) in &used {
            if let Some(url) = hit.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
                if !visited_urls.iter().any(|seen| seen == url) {
                    visited_urls.push(url.to_string());
                }
            }
        }

        let contents: Vec<&str> = used.iter().map(|(_, content)| *content).collect();
        tracing::debug!(
            query = %query.text,
            hits = hits.len(),
            used = contents.len(),
            "extracting learnings"
        );

        let prompt = Self::build_prompt(&query.text, &contents, num_learnings, num_follow_ups);
        let findings: ExtractedFindings =
            generate_object(self.model.as_ref(), &system_prompt(), &prompt, &Self::schema())
                .await?;

        Ok(ExtractionResult {
            learnings: keep_first(findings.learnings, num_learnings),
            follow_up_questions: keep_first(findings.follow_up_questions, num_follow_ups),
            visited_urls,
        })
    }

    fn build_prompt(
        query: &str,
        contents: &[&str],
        num_learnings: usize,
        num_follow_ups: usize,
    ) -> String {
        let joined = contents
            .iter()
            .map(|content| format!("<content>\n{content}\n</content>"))
            .collect::<Vec<_>>()
            .join("\n---\n");
        format!(
            "Given the following search results for the query <query>{query}</query>, \
             extract exactly {num_learnings} key learnings and generate exactly \
             {num_follow_ups} follow-up questions. Make each learning unique, concise and \
             information dense, and include any entities like people, places, companies, \
             products, things, metrics, numbers or dates.\n\n\
             <contents>\n{joined}\n</contents>"
        )
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "learnings": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Key learnings from the search results. Be specific and detailed."
                },
                "followUpQuestions": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Follow-up questions to explore based on the learnings. Make these specific and targeted."
                }
            },
            "required": ["learnings", "followUpQuestions"]
        })
    }
}

fn keep_first(items: Vec<String>, limit: usize) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .take(limit)
        .collect()
}
