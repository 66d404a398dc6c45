//! Process and agent configuration

use crate::llm::DEFAULT_MODEL;
use crate::state_machine::DEFAULT_MAX_ROUNDS;
use crate::tools::{DEFAULT_DATABASE, DEFAULT_OPENFDA_BASE_URL};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Credentials supplied by the user: the LLM key and the graph connection.
///
/// All four are required; a blank value counts as missing.
#[derive(Clone, Default, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default)]
    pub graph_db_uri: String,
    #[serde(default)]
    pub graph_db_username: String,
    #[serde(default)]
    pub graph_db_password: String,
}

impl AgentConfig {
    pub fn new(
        llm_api_key: impl Into<String>,
        graph_db_uri: impl Into<String>,
        graph_db_username: impl Into<String>,
        graph_db_password: impl Into<String>,
    ) -> Self {
        Self {
            llm_api_key: llm_api_key.into(),
            graph_db_uri: graph_db_uri.into(),
            graph_db_username: graph_db_username.into(),
            graph_db_password: graph_db_password.into(),
        }
    }

    pub fn is_complete(&self) -> bool {
        [
            &self.llm_api_key,
            &self.graph_db_uri,
            &self.graph_db_username,
            &self.graph_db_password,
        ]
        .iter()
        .all(|v| !v.trim().is_empty())
    }

    /// Same config with surrounding whitespace removed
    pub fn trimmed(&self) -> Self {
        Self::new(
            self.llm_api_key.trim(),
            self.graph_db_uri.trim(),
            self.graph_db_username.trim(),
            self.graph_db_password.trim(),
        )
    }

    /// Complete config from `OPENAI_API_KEY` and `NEO4J_*`, if all are set
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let config = Self::new(
            lookup("OPENAI_API_KEY")?,
            lookup("NEO4J_URI")?,
            lookup("NEO4J_USERNAME")?,
            lookup("NEO4J_PASSWORD")?,
        );
        config.is_complete().then(|| config.trimmed())
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("llm_api_key", &"[redacted]")
            .field("graph_db_uri", &self.graph_db_uri)
            .field("graph_db_username", &self.graph_db_username)
            .field("graph_db_password", &"[redacted]")
            .finish()
    }
}

/// Settings used to build an agent, shared by every session initialization
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub max_rounds: u32,
    pub parallel_tools: bool,
    /// Explicit corpus location; otherwise the default candidates are searched
    pub pdf_path: Option<PathBuf>,
    pub openfda_base_url: String,
    pub openai_base_url: String,
    pub neo4j_database: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tools: false,
            pdf_path: None,
            openfda_base_url: DEFAULT_OPENFDA_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            neo4j_database: DEFAULT_DATABASE.to_string(),
        }
    }
}

/// Server configuration from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub agent: AgentSettings,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = AgentSettings::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            port: non_empty("PHARMA_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            agent: AgentSettings {
                model: non_empty("PHARMA_MODEL").unwrap_or(defaults.model),
                max_rounds: non_empty("PHARMA_MAX_ROUNDS")
                    .and_then(|v| v.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.max_rounds),
                parallel_tools: non_empty("PHARMA_PARALLEL_TOOLS")
                    .is_some_and(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes")),
                pdf_path: non_empty("PHARMA_PDF_PATH").map(PathBuf::from),
                openfda_base_url: non_empty("OPENFDA_BASE_URL").unwrap_or(defaults.openfda_base_url),
                openai_base_url: non_empty("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
                neo4j_database: non_empty("NEO4J_DATABASE").unwrap_or(defaults.neo4j_database),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_completeness_ignores_whitespace() {
        assert!(AgentConfig::new("sk", "bolt://x", "neo4j", "pw").is_complete());
        assert!(!AgentConfig::new("sk", "bolt://x", "  ", "pw").is_complete());
        assert!(!AgentConfig::default().is_complete());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", AgentConfig::new("sk-secret", "bolt://x", "neo4j", "hunter2"));
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("bolt://x"));
    }

    #[test]
    fn test_agent_config_from_env_requires_all() {
        let partial = lookup(&[("OPENAI_API_KEY", "sk"), ("NEO4J_URI", "bolt://x")]);
        assert!(AgentConfig::from_lookup(partial).is_none());

        let full = lookup(&[
            ("OPENAI_API_KEY", " sk "),
            ("NEO4J_URI", "bolt://x"),
            ("NEO4J_USERNAME", "neo4j"),
            ("NEO4J_PASSWORD", "pw"),
        ]);
        let config = AgentConfig::from_lookup(full).unwrap();
        assert_eq!(config.llm_api_key, "sk");
    }

    #[test]
    fn test_server_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[]));
        assert_eq!(config.port, 8000);
        assert_eq!(config.agent.model, "gpt-4");
        assert_eq!(config.agent.max_rounds, 10);
        assert!(!config.agent.parallel_tools);
        assert!(config.agent.pdf_path.is_none());
        assert_eq!(config.agent.neo4j_database, "neo4j");
    }

    #[test]
    fn test_server_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("PHARMA_PORT", "9100"),
            ("PHARMA_MAX_ROUNDS", "0"),
            ("PHARMA_PARALLEL_TOOLS", "true"),
            ("PHARMA_PDF_PATH", "/data/report.pdf"),
            ("OPENFDA_BASE_URL", "http://localhost:1234"),
        ]));
        assert_eq!(config.port, 9100);
        assert_eq!(config.agent.max_rounds, 10);
        assert!(config.agent.parallel_tools);
        assert_eq!(config.agent.pdf_path, Some(PathBuf::from("/data/report.pdf")));
        assert_eq!(config.agent.openfda_base_url, "http://localhost:1234");
    }
}
