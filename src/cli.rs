//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// UrbanQ - ask questions about the municipal urban-planning code
///
/// Fans the question out to specialist agents (legal text, zoning
/// parameters, geography, concepts, calculations, fact graph), validates
/// what comes back and answers with a confidence score.
///
/// Examples:
///   urbanq --query "o que diz o artigo 89 da LUOS?"
///   urbanq --query "altura máxima na ZOT 08.1" --session abc --format text
///   urbanq --query "qual a taxa de ocupação no Centro Histórico?" --stub-agents
///   urbanq --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Question to answer
    #[arg(short = 'Q', long, value_name = "TEXT", required_unless_present = "init_config")]
    pub query: Option<String>,

    /// Session identifier; a new session is started when omitted
    #[arg(short, long, value_name = "ID", env = "URBANQ_SESSION")]
    pub session: Option<String>,

    /// Model used to compose the answer
    ///
    /// Unknown models fall back to the configured default.
    #[arg(short, long, env = "URBANQ_MODEL")]
    pub model: Option<String>,

    /// Answer from the first pass even if validation asks for refinement
    #[arg(long)]
    pub skip_refinement: bool,

    /// Output format (json, text)
    #[arg(long, default_value = "json", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .urbanq.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL of the specialist agents
    #[arg(long, value_name = "URL", env = "URBANQ_AGENTS_URL")]
    pub agents_url: Option<String>,

    /// Bearer token for the specialist agents
    #[arg(long, value_name = "TOKEN", env = "URBANQ_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Synthesizer endpoint used to compose the answer
    #[arg(long, value_name = "URL", env = "URBANQ_SYNTHESIZER_URL")]
    pub synthesizer_url: Option<String>,

    /// Per-call timeout in seconds for agents and the synthesizer
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// JSON-lines file used as session memory
    #[arg(long, value_name = "FILE")]
    pub memory_path: Option<PathBuf>,

    /// Substitute deterministic stub agents for unreachable ones (testing only)
    #[arg(long)]
    pub stub_agents: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .urbanq.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Full response as JSON (default)
    #[default]
    Json,
    /// Answer text followed by a confidence line
    Text,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the query text (empty if absent; validated first).
    pub fn query_text(&self) -> &str {
        self.query.as_deref().unwrap_or("")
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.query_text().trim().is_empty() {
            return Err("Query must not be empty".to_string());
        }

        for (name, url) in [
            ("Agents URL", &self.agents_url),
            ("Synthesizer URL", &self.synthesizer_url),
        ] {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(format!("{} must start with 'http://' or 'https://'", name));
                }
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ref session) = self.session {
            if session.trim().is_empty() {
                return Err("Session id must not be blank".to_string());
            }
        }

        Ok(())
    }
}
