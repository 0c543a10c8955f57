//! Specialists reached over HTTP.
//!
//! Each specialist lives at `{base_url}/agent-{kind}` and takes a JSON body
//! `{query, context}`, answering with an [`AgentResult`].

use super::specialist::{Specialist, SpecialistRegistry};
use crate::config::AgentsConfig;
use crate::error::AgentError;
use crate::models::{AgentKind, AgentResult, Context};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Serialize)]
struct SpecialistRequest<'a> {
    query: &'a str,
    context: &'a Context,
}

pub struct HttpSpecialist {
    kind: AgentKind,
    url: String,
    api_key: Option<String>,
    http_client: reqwest::Client,
}

impl HttpSpecialist {
    pub fn new(
        kind: AgentKind,
        base_url: &str,
        api_key: Option<String>,
        http_client: reqwest::Client,
    ) -> Self {
        let url = format!("{}/agent-{}", base_url.trim_end_matches('/'), kind);
        Self {
            kind,
            url,
            api_key,
            http_client,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Specialist for HttpSpecialist {
    fn kind(&self) -> AgentKind {
        self.kind
    }

    async fn process(&self, query: &str, context: &Context) -> Result<AgentResult, AgentError> {
        debug!("POST {}", self.url);

        let mut request = self
            .http_client
            .post(&self.url)
            .json(&SpecialistRequest { query, context });
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|source| AgentError::Transport {
            agent: self.kind,
            source,
        })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                agent: self.kind,
                status,
                body,
            });
        }

        let result: AgentResult = response.json().await.map_err(|e| AgentError::Decode {
            agent: self.kind,
            message: e.to_string(),
        })?;

        if result.agent_type != self.kind {
            return Err(AgentError::Decode {
                agent: self.kind,
                message: format!("answered as {}", result.agent_type),
            });
        }

        Ok(result)
    }
}

impl SpecialistRegistry {
    /// One HTTP specialist per kind, sharing a single client.
    ///
    /// Call timeouts are enforced by the executor, not the client.
    pub fn over_http(config: &AgentsConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        let mut registry = SpecialistRegistry::new();
        for kind in AgentKind::ALL {
            registry.register(Arc::new(HttpSpecialist::new(
                kind,
                &config.base_url,
                config.api_key.clone(),
                http_client.clone(),
            )));
        }
        Ok(registry)
    }
}
