use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

fn default_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_search_url() -> String {
    "http://localhost:3002".to_string()
}

fn default_search_timeout_ms() -> u64 {
    15_000
}

fn default_result_limit() -> usize {
    5
}

fn default_concurrency_limit() -> usize {
    2
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub research: ResearchConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OllamaConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        OllamaConfig {
            host: default_host(),
            model: default_model(),
            api_key: None,
            temperature: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Firecrawl-compatible search endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    #[serde(default = "default_search_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            base_url: default_search_url(),
            api_key: None,
            timeout_ms: default_search_timeout_ms(),
            result_limit: default_result_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Branches allowed inside the search + extraction section at once,
    /// across the whole call tree.
    pub concurrency_limit: usize,
    pub default_breadth: usize,
    pub default_depth: usize,
    pub max_breadth: usize,
    pub max_depth: usize,
    pub learnings_per_query: usize,
    /// Per-hit cap applied before search content goes into a prompt.
    pub content_char_limit: usize,
    /// Cap for the joined learnings embedded in the report prompt.
    pub report_char_budget: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        ResearchConfig {
            concurrency_limit: default_concurrency_limit(),
            default_breadth: 2,
            default_depth: 1,
            max_breadth: 5,
            max_depth: 3,
            learnings_per_query: 3,
            content_char_limit: 25_000,
            report_char_budget: 150_000,
        }
    }
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::get_config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&contents)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `OLLAMA_*` / `FIRECRAWL_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("OLLAMA_HOST") {
            self.ollama.host = host;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.ollama.model = model;
        }
        if let Some(key) = lookup("OLLAMA_API_KEY") {
            self.ollama.api_key = Some(key);
        }
        if let Some(url) = lookup("FIRECRAWL_BASE_URL") {
            self.search.base_url = url;
        }
        if let Some(key) = lookup("FIRECRAWL_KEY") {
            self.search.api_key = Some(key);
        }
        if let Some(limit) = lookup("FIRECRAWL_CONCURRENCY_LIMIT") {
            self.research.concurrency_limit =
                limit.trim().parse().map_err(|_| ConfigError::Invalid {
                    name: "FIRECRAWL_CONCURRENCY_LIMIT",
                    reason: format!("'{}' is not a positive integer", limit),
                })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ollama.host.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "ollama.host" });
        }
        if self.ollama.model.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "ollama.model" });
        }
        if self.search.base_url.trim().is_empty() {
            return Err(ConfigError::MissingCredential { name: "search.base_url" });
        }

        let positive = [
            ("ollama.request_timeout_secs", self.ollama.request_timeout_secs as usize),
            ("search.timeout_ms", self.search.timeout_ms as usize),
            ("search.result_limit", self.search.result_limit),
            ("research.concurrency_limit", self.research.concurrency_limit),
            ("research.max_breadth", self.research.max_breadth),
            ("research.max_depth", self.research.max_depth),
            ("research.learnings_per_query", self.research.learnings_per_query),
            ("research.content_char_limit", self.research.content_char_limit),
            ("research.report_char_budget", self.research.report_char_budget),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    name,
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        let research = &self.research;
        if research.default_breadth == 0 || research.default_breadth > research.max_breadth {
            return Err(ConfigError::Invalid {
                name: "research.default_breadth",
                reason: format!("must be between 1 and {}", research.max_breadth),
            });
        }
        if research.default_depth == 0 || research.default_depth > research.max_depth {
            return Err(ConfigError::Invalid {
                name: "research.default_depth",
                reason: format!("must be between 1 and {}", research.max_depth),
            });
        }
        Ok(())
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/deep-research")
        } else {
            PathBuf::from(".")
        }
    }
}
