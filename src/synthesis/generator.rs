//! Text-generation collaborator.

use crate::config::ModelConfig;
use crate::error::GenerationError;
use crate::models::AgentKind;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Strategy tag sent with every generation request.
pub const STRATEGY: &str = "agentic";

/// What the generator is asked to write about.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest<'a> {
    pub original_query: &'a str,
    pub strategy: &'a str,
    pub agent_payloads: BTreeMap<AgentKind, Vec<Value>>,
    pub model: &'a str,
}

/// Text produced by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    pub confidence: f64,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generated, GenerationError>;
}

/// Used when no synthesizer endpoint is configured.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default, alias = "text")]
    response: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Synthesizer service reached over HTTP.
pub struct HttpGenerator {
    endpoint: String,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl HttpGenerator {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            timeout_seconds,
            http_client,
        })
    }
}

#[async_trait]
impl TextGenerator for HttpGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<Generated, GenerationError> {
        debug!("POST {} (model {})", self.endpoint, request.model);

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(self.timeout_seconds)
                } else {
                    GenerationError::Transport {
                        endpoint: self.endpoint.clone(),
                        source: e,
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let answer: GenerationResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        let text = answer
            .response
            .filter(|t| !t.trim().is_empty())
            .ok_or(GenerationError::EmptyText)?;

        Ok(Generated {
            text,
            confidence: answer.confidence.unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }
}

/// Generator for the configured model section.
pub fn from_config(config: &ModelConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.endpoint {
        Some(ref endpoint) => Ok(Arc::new(HttpGenerator::new(endpoint, config.timeout_seconds)?)),
        None => Ok(Arc::new(DisabledGenerator)),
    }
}
