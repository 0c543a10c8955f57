//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.urbanq.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".urbanq.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Generation model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Specialist agent settings.
    #[serde(default)]
    pub agents: AgentsConfig,

    /// Knowledge-base settings.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Reranking weights.
    #[serde(default)]
    pub rerank: RerankWeights,

    /// Validation thresholds and tables.
    #[serde(default)]
    pub validation: ValidationConfig,

    /// Session memory settings.
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Number of prior turns read when building the context.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            verbose: false,
        }
    }
}

fn default_history_limit() -> usize {
    5
}

/// Text-generation collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model used when the caller gives no (or an unknown) hint.
    #[serde(default = "default_model")]
    pub name: String,

    /// Models a caller may select.
    #[serde(default = "default_supported_models")]
    pub supported: Vec<String>,

    /// Synthesizer endpoint. Generation is disabled when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_model_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model(),
            supported: default_supported_models(),
            endpoint: None,
            timeout_seconds: default_model_timeout(),
        }
    }
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_supported_models() -> Vec<String> {
    vec![
        "gpt-4",
        "gpt-4-turbo",
        "gpt-3.5-turbo",
        "gpt-4o",
        "gpt-4o-mini",
        "anthropic/claude-3-5-sonnet-20241022",
        "anthropic/claude-3-5-haiku-20241022",
        "google/gemini-1.5-pro",
        "google/gemini-1.5-flash",
        "deepseek/deepseek-chat",
        "groq/llama-3.1-70b-versatile",
        "zhipuai/glm-4-plus",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_model_timeout() -> u64 {
    60
}

impl ModelConfig {
    /// Resolve a caller's model hint against the supported list.
    ///
    /// A hint is accepted if it equals a supported id or is contained in one.
    /// A partial hint is rewritten to the full namespaced id
    /// (`claude-3-5-sonnet-20241022` becomes
    /// `anthropic/claude-3-5-sonnet-20241022`) rather than passed through as
    /// given, so the synthesizer always receives an id from the supported
    /// list. Anything else falls back to the default model.
    pub fn resolve(&self, hint: Option<&str>) -> String {
        let Some(hint) = hint.map(str::trim).filter(|h| !h.is_empty()) else {
            return self.name.clone();
        };

        self.supported
            .iter()
            .find(|supported| supported.as_str() == hint)
            .or_else(|| self.supported.iter().find(|s| s.contains(hint)))
            .cloned()
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Specialist agent settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Base URL; each specialist lives at `{base_url}/agent-{name}`.
    #[serde(default = "default_agents_url")]
    pub base_url: String,

    /// Bearer token sent to specialists.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub timeout_seconds: u64,

    /// Substitute deterministic stubs for failing specialists.
    /// Test configuration only.
    #[serde(default)]
    pub use_stubs: bool,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            base_url: default_agents_url(),
            api_key: None,
            timeout_seconds: default_agent_timeout(),
            use_stubs: false,
        }
    }
}

fn default_agents_url() -> String {
    "http://localhost:54321/functions/v1".to_string()
}

fn default_agent_timeout() -> u64 {
    30
}

/// A known-correct value for one parameter of one zone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceValue {
    pub zone: String,
    pub parameter: String,
    pub value: f64,
}

/// Knowledge-base settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Remote lookup endpoint. The static tables below are used when unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Lookup timeout in seconds.
    #[serde(default = "default_knowledge_timeout")]
    pub timeout_seconds: u64,

    /// Article labels known to exist (e.g. "LUOS - Art. 89").
    #[serde(default = "default_articles")]
    pub articles: Vec<String>,

    /// Concept labels known to exist.
    #[serde(default = "default_concepts")]
    pub concepts: Vec<String>,

    /// Authoritative parameter values per zone.
    #[serde(default = "default_reference_values")]
    pub reference_values: Vec<ReferenceValue>,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_knowledge_timeout(),
            articles: default_articles(),
            concepts: default_concepts(),
            reference_values: default_reference_values(),
        }
    }
}

fn default_knowledge_timeout() -> u64 {
    10
}

fn default_articles() -> Vec<String> {
    let luos = [1, 3, 5, 81, 86, 89, 92, 95];
    let pdus = [1, 3, 92, 104];

    luos.iter()
        .map(|n| format!("LUOS - Art. {}", n))
        .chain(pdus.iter().map(|n| format!("PDUS - Art. {}", n)))
        .collect()
}

fn default_concepts() -> Vec<String> {
    vec![
        "EIV",
        "ZEIS",
        "Outorga Onerosa",
        "Coeficiente de Aproveitamento",
        "Taxa de Ocupação",
        "Taxa de Permeabilidade",
        "APP",
        "Zoneamento",
        "Plano Diretor",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_reference_values() -> Vec<ReferenceValue> {
    vec![ReferenceValue {
        zone: "ZOT 08.1".to_string(),
        parameter: "Altura Máxima".to_string(),
        value: 130.0,
    }]
}

/// Weights of the five reranking criteria.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankWeights {
    #[serde(default = "default_w_confidence")]
    pub confidence: f64,
    #[serde(default = "default_w_priority")]
    pub priority: f64,
    #[serde(default = "default_w_relevance")]
    pub relevance: f64,
    #[serde(default = "default_w_completeness")]
    pub completeness: f64,
    #[serde(default = "default_w_authority")]
    pub authority: f64,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            confidence: default_w_confidence(),
            priority: default_w_priority(),
            relevance: default_w_relevance(),
            completeness: default_w_completeness(),
            authority: default_w_authority(),
        }
    }
}

fn default_w_confidence() -> f64 {
    0.25
}

fn default_w_priority() -> f64 {
    0.20
}

fn default_w_relevance() -> f64 {
    0.25
}

fn default_w_completeness() -> f64 {
    0.15
}

fn default_w_authority() -> f64 {
    0.15
}

/// Validation thresholds and lookup tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Verdicts below this confidence require refinement.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Maximum tolerated variance of specialist confidences.
    #[serde(default = "default_variance_threshold")]
    pub variance_threshold: f64,

    /// Confidence reported when no check could run.
    #[serde(default = "default_empty_confidence")]
    pub empty_confidence: f64,

    /// Highest valid article number per law.
    #[serde(default = "default_law_ranges")]
    pub law_ranges: BTreeMap<String, u32>,

    /// Location names that are easily confused with each other.
    #[serde(default = "default_confusable_locations")]
    pub confusable_locations: Vec<(String, String)>,

    /// Legal concepts that name a zone type and must show up as a zone.
    #[serde(default = "default_zone_concepts")]
    pub zone_concepts: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            variance_threshold: default_variance_threshold(),
            empty_confidence: default_empty_confidence(),
            law_ranges: default_law_ranges(),
            confusable_locations: default_confusable_locations(),
            zone_concepts: default_zone_concepts(),
        }
    }
}

fn default_confidence_threshold() -> f64 {
    0.7
}

fn default_variance_threshold() -> f64 {
    0.2
}

fn default_empty_confidence() -> f64 {
    0.1
}

fn default_law_ranges() -> BTreeMap<String, u32> {
    BTreeMap::from([("LUOS".to_string(), 200), ("PDUS".to_string(), 250)])
}

fn default_confusable_locations() -> Vec<(String, String)> {
    vec![
        ("Boa Vista", "Boa Vista do Sul"),
        ("Vila Nova", "Vila Nova do Sul"),
        ("Santana", "Sant'Ana"),
    ]
    .into_iter()
    .map(|(a, b)| (a.to_string(), b.to_string()))
    .collect()
}

fn default_zone_concepts() -> Vec<String> {
    vec!["ZEIS".to_string()]
}

/// Session memory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// JSON-lines file holding session turns. In-memory when unset.
    #[serde(default)]
    pub path: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.agents_url {
            self.agents.base_url = url.clone();
        }
        if let Some(ref key) = args.api_key {
            self.agents.api_key = Some(key.clone());
        }
        if let Some(ref url) = args.synthesizer_url {
            self.model.endpoint = Some(url.clone());
        }
        if let Some(timeout) = args.timeout {
            self.agents.timeout_seconds = timeout;
            self.model.timeout_seconds = timeout;
        }
        if let Some(ref path) = args.memory_path {
            self.memory.path = Some(path.display().to_string());
        }

        // Flags always override
        if args.stub_agents {
            self.agents.use_stubs = true;
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Log level after merging: `quiet` wins, then `general.verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
