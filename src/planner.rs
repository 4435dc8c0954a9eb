use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{generate_object, LanguageModel};
use crate::prompt::system_prompt;

/// A SERP query together with the reason it is being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchQuery {
    #[serde(rename = "query")]
    pub text: String,
    pub research_goal: String,
}

#[derive(Debug, Deserialize)]
struct PlannedQueries {
    queries: Vec<ResearchQuery>,
}

/// Turns a topic into an ordered list of sub-queries.
#[derive(Clone)]
pub struct QueryPlanner {
    model: Arc<dyn LanguageModel>,
}

impl QueryPlanner {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        QueryPlanner { model }
    }

    /// Returns at most `num_queries` queries, in model order.
    pub async fn generate(
        &self,
        topic: &str,
        prior_learnings: &[String],
        num_queries: usize,
    ) -> Result<Vec<ResearchQuery>, LlmError> {
        if num_queries == 0 {
            return Ok(Vec::new());
        }

        let prompt = Self::build_prompt(topic, prior_learnings, num_queries);
        let schema = Self::schema(num_queries);
        let planned: PlannedQueries =
            generate_object(self.model.as_ref(), &system_prompt(), &prompt, &schema).await?;

        let returned = planned.queries.len();
        let mut seen = HashSet::new();
        let queries: Vec<ResearchQuery> = planned
            .queries
            .into_iter()
            .filter(|q| !q.text.trim().is_empty())
            .filter(|q| seen.insert(q.text.trim().to_lowercase()))
            .take(num_queries)
            .collect();

        if returned > num_queries {
            tracing::debug!(returned, requested = num_queries, "truncating planned queries");
        }
        tracing::info!(count = queries.len(), topic = %first_line(topic), "created queries");
        for query in &queries {
            tracing::debug!(query = %query.text, goal = %query.research_goal, "planned query");
        }

        Ok(queries)
    }

    fn build_prompt(topic: &str, prior_learnings: &[String], num_queries: usize) -> String {
        let mut prompt = format!(
            "Given the following prompt from the user, generate a list of SERP queries to \
             research the topic. Return a maximum of {num_queries} queries, but feel free to \
             return less if the original prompt is clear. Make sure each query is unique and \
             not similar to each other: <prompt>{topic}</prompt>\n\n"
        );
        if !prior_learnings.is_empty() {
            prompt.push_str(
                "Here are some learnings from previous research, use them to generate more specific queries: ",
            );
            prompt.push_str(&prior_learnings.join("\n"));
        }
        prompt
    }

    fn schema(num_queries: usize) -> Value {
        json!({
            "type": "object",
            "properties": {
                "queries": {
                    "type": "array",
                    "description": format!("List of SERP queries, max of {num_queries}"),
                    "items": {
                        "type": "object",
                        "properties": {
                            "query": {
                                "type": "string",
                                "description": "The SERP query"
                            },
                            "researchGoal": {
                                "type": "string",
                                "description": "First talk about the goal of the research that this query is meant to accomplish, then go deeper into how to advance the research once the results are found, mention additional research directions. Be as specific as possible, especially for additional research directions."
                            }
                        },
                        "required": ["query", "researchGoal"]
                    }
                }
            },
            "required": ["queries"]
        })
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}
