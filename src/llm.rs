use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::LlmError;

/// A completion service that answers with a JSON object matching `schema`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str, schema: &Value) -> Result<Value, LlmError>;
}

/// Run a structured completion and deserialize the answer into `T`.
pub async fn generate_object<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    system: &str,
    prompt: &str,
    schema: &Value,
) -> Result<T, LlmError> {
    let value = model.complete(system, prompt, schema).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Schema {
        message: e.to_string(),
    })
}

/// Parse a model answer as JSON, recovering the first balanced object when the
/// model wrapped it in prose or a code fence.
pub fn parse_json_response(text: &str) -> Result<Value, LlmError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LlmError::EmptyResponse);
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(first) => {
            let extracted = extract_json_object(trimmed).ok_or_else(|| LlmError::ResponseParse {
                message: first.to_string(),
            })?;
            serde_json::from_str(&extracted).map_err(|e| LlmError::ResponseParse {
                message: e.to_string(),
            })
        }
    }
}

// Find the first { and its matching } while skipping braces inside strings
fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}
