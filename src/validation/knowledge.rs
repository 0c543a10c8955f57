//! Knowledge-base lookups and the alignment check built on them.

use super::CheckBuilder;
use crate::config::KnowledgeConfig;
use crate::error::KnowledgeError;
use crate::models::{zone_key, CheckCategory, RankedResult, ValidationCheck};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Relationship types the fact graph may use.
pub const RELATIONSHIP_TYPES: &[&str] = &[
    "DEFINES",
    "REFERENCES",
    "BELONGS_TO",
    "HAS_PARAMETER",
    "LOCATED_IN",
    "MODIFIES",
    "REVOKES",
    "REGULATES",
    "CONTRADICTS",
    "COMPLEMENTS",
    "IMPLEMENTS",
];

/// Kind of node looked up in the knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Article,
    Concept,
}

/// Authoritative lookups used by the validator.
///
/// `Ok(false)` / `Ok(None)` mean "not known"; `Err` means the lookup itself
/// failed and the caller should degrade instead of reporting an issue.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn exists(&self, label: &str, kind: NodeKind) -> Result<bool, KnowledgeError>;

    async fn reference_value(&self, zone: &str, parameter: &str)
        -> Result<Option<f64>, KnowledgeError>;
}

/// Knowledge base held in configuration tables.
#[derive(Debug, Clone, Default)]
pub struct StaticKnowledgeBase {
    articles: Vec<String>,
    concepts: Vec<String>,
    reference_values: HashMap<(String, String), f64>,
}

impl StaticKnowledgeBase {
    pub fn from_config(config: &KnowledgeConfig) -> Self {
        Self {
            articles: config.articles.clone(),
            concepts: config.concepts.clone(),
            reference_values: config
                .reference_values
                .iter()
                .map(|r| ((zone_key(&r.zone), r.parameter.clone()), r.value))
                .collect(),
        }
    }
}

#[async_trait]
impl KnowledgeBase for StaticKnowledgeBase {
    async fn exists(&self, label: &str, kind: NodeKind) -> Result<bool, KnowledgeError> {
        let known = match kind {
            NodeKind::Article => &self.articles,
            NodeKind::Concept => &self.concepts,
        };
        Ok(known.iter().any(|k| k == label))
    }

    async fn reference_value(
        &self,
        zone: &str,
        parameter: &str,
    ) -> Result<Option<f64>, KnowledgeError> {
        let key = (zone_key(zone), parameter.to_string());
        Ok(self.reference_values.get(&key).copied())
    }
}

#[derive(Debug, Serialize)]
struct NodeQuery<'a> {
    label: &'a str,
    kind: NodeKind,
}

#[derive(Debug, Deserialize)]
struct NodeAnswer {
    exists: bool,
}

#[derive(Debug, Serialize)]
struct ReferenceQuery<'a> {
    zone: &'a str,
    parameter: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReferenceAnswer {
    #[serde(default)]
    value: Option<f64>,
}

/// Knowledge base behind an HTTP lookup service.
///
/// `POST {endpoint}/nodes` answers `{exists}` and
/// `POST {endpoint}/reference-values` answers `{value}`.
pub struct HttpKnowledgeBase {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpKnowledgeBase {
    pub fn new(endpoint: &str, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    async fn post<Q: Serialize + Sync, A: DeserializeOwned>(
        &self,
        path: &str,
        body: &Q,
    ) -> Result<A, KnowledgeError> {
        let response = self
            .http_client
            .post(format!("{}/{}", self.endpoint, path))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Status { status, body });
        }

        response
            .json()
            .await
            .map_err(|e| KnowledgeError::Lookup(e.to_string()))
    }
}

#[async_trait]
impl KnowledgeBase for HttpKnowledgeBase {
    async fn exists(&self, label: &str, kind: NodeKind) -> Result<bool, KnowledgeError> {
        let answer: NodeAnswer = self.post("nodes", &NodeQuery { label, kind }).await?;
        Ok(answer.exists)
    }

    async fn reference_value(
        &self,
        zone: &str,
        parameter: &str,
    ) -> Result<Option<f64>, KnowledgeError> {
        let answer: ReferenceAnswer = self
            .post("reference-values", &ReferenceQuery { zone, parameter })
            .await?;
        Ok(answer.value)
    }
}

/// Referenced concepts must exist and relationship types must come from
/// the fixed vocabulary.
pub async fn alignment(results: &[RankedResult], knowledge: &dyn KnowledgeBase) -> ValidationCheck {
    let mut check = CheckBuilder::new(CheckCategory::KnowledgeGraph);

    let mut concepts: Vec<&str> = Vec::new();
    for concept in results.iter().flat_map(|r| r.result.strings("concepts")) {
        if !concepts.contains(&concept) {
            concepts.push(concept);
        }
    }

    for concept in concepts {
        match knowledge.exists(concept, NodeKind::Concept).await {
            Ok(true) => {}
            Ok(false) => check.penalize(0.1, format!("Concept not found in the knowledge base: {}", concept)),
            Err(e) => {
                warn!("Concept lookup failed for {}: {}", concept, e);
                check.degrade(0.1);
            }
        }
    }

    let relationship_types = results
        .iter()
        .flat_map(|r| r.result.entries("relationships"))
        .map(|rel| rel.get("type").and_then(Value::as_str).unwrap_or(""));

    for kind in relationship_types {
        if !RELATIONSHIP_TYPES.contains(&kind) {
            check.penalize(0.05, format!("Invalid relationship type: {}", kind));
            check.suggest("Use valid relationship types: DEFINES, REFERENCES, HAS_PARAMETER");
        }
    }

    check.finish()
}
