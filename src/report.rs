use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::LlmError;
use crate::llm::{generate_object, LanguageModel};
use crate::prompt::{system_prompt, trim_prompt};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDraft {
    report_markdown: String,
}

/// Turns accumulated learnings into a markdown report with a sources list.
#[derive(Clone)]
pub struct ReportWriter {
    model: Arc<dyn LanguageModel>,
    char_budget: usize,
}

impl ReportWriter {
    pub fn new(model: Arc<dyn LanguageModel>, char_budget: usize) -> Self {
        ReportWriter { model, char_budget }
    }

    pub async fn write<L, U>(
        &self,
        topic: &str,
        learnings: L,
        visited_urls: U,
    ) -> Result<String, LlmError>
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        U: IntoIterator,
        U::Item: AsRef<str>,
    {
        let wrapped = learnings
            .into_iter()
            .map(|l| format!("<learning>\n{}\n</learning>", l.as_ref()))
            .collect::<Vec<_>>()
            .join("\n");
        let learnings = trim_prompt(&wrapped, self.char_budget);
        if learnings.len() < wrapped.len() {
            tracing::info!(
                kept = learnings.len(),
                total = wrapped.len(),
                "learnings trimmed to fit report budget"
            );
        }

        let prompt = format!(
            "Given the following prompt from the user, write a final report on the topic using \
             the learnings from research. Make it as detailed as possible, aim for 3 or more \
             pages, include ALL the learnings from research:\n\n<prompt>{topic}</prompt>\n\n\
             Here are all the learnings from previous research:\n\n\
             <learnings>\n{learnings}\n</learnings>"
        );
        let draft: ReportDraft =
            generate_object(self.model.as_ref(), &system_prompt(), &prompt, &Self::schema())
                .await?;

        let mut report = strip_sources(&draft.report_markdown).trim_end().to_string();
        report.push_str("\n\n");
        report.push_str(&sources_section(visited_urls));
        Ok(report)
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "reportMarkdown": {
                    "type": "string",
                    "description": "Final report on the topic in Markdown"
                }
            },
            "required": ["reportMarkdown"]
        })
    }
}

/// `## Sources` followed by one bullet per distinct URL, in first-seen order.
pub fn sources_section<U>(visited_urls: U) -> String
where
    U: IntoIterator,
    U::Item: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for url in visited_urls {
        let url = url.as_ref().trim();
        if !url.is_empty() && !seen.iter().any(|s| s == url) {
            seen.push(url.to_string());
        }
    }

    let mut section = String::from("## Sources\n");
    if !seen.is_empty() {
        section.push('\n');
        for url in &seen {
            section.push_str("- ");
            section.push_str(url);
            section.push('\n');
        }
    }
    section
}

// Removes any sources section the model wrote so the appended list is the
// only one. The section ends at the next heading of the same or a higher level.
fn strip_sources(markdown: &str) -> String {
    let (Ok(sources), Ok(heading)) = (
        Regex::new(r"(?i)^\s*(#{1,3})\s*(sources|references)\s*:?\s*$"),
        Regex::new(r"^\s*(#{1,6})\s"),
    ) else {
        return markdown.to_string();
    };

    let mut kept = Vec::new();
    let mut skipping: Option<usize> = None;
    for line in markdown.lines() {
        if let Some(caps) = sources.captures(line) {
            skipping = Some(caps[1].len());
            continue;
        }
        if let (Some(level), Some(caps)) = (skipping, heading.captures(line)) {
            if caps[1].len() <= level {
                skipping = None;
            }
        }
        if skipping.is_none() {
            kept.push(line);
        }
    }
    kept.join("\n")
}
