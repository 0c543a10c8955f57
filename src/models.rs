//! Data models for the question-answering pipeline.
//!
//! This module contains the structures that flow between stages:
//! the derived query context, routing directives, specialist results,
//! ranked results, validation verdicts and persisted session turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Marker that flags an issue as a critical inconsistency.
pub const CRITICAL_MARKER: &str = "CRITICAL:";

/// Text returned to the user when a technical fault aborts the request.
pub const APOLOGY: &str = "Sorry, an error occurred while processing your request.";

/// Returns true if the issue text carries the critical marker.
pub fn is_critical(issue: &str) -> bool {
    issue.starts_with(CRITICAL_MARKER)
}

/// The closed set of specialists the coordinator can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Legal text: articles, laws, legal concepts
    Legal,
    /// Structured zoning parameters per zone
    Urban,
    /// Neighborhoods, districts and their boundaries
    Geographic,
    /// Plain-language explanations of planning concepts
    Conceptual,
    /// Derived figures (areas, coefficients, totals)
    Calculator,
    /// Fact graph of articles, concepts and their relationships
    KnowledgeGraph,
    /// Remote validation specialist
    Validator,
}

impl AgentKind {
    /// Every specialist kind, in declaration order.
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Legal,
        AgentKind::Urban,
        AgentKind::Geographic,
        AgentKind::Conceptual,
        AgentKind::Calculator,
        AgentKind::KnowledgeGraph,
        AgentKind::Validator,
    ];

    /// Wire name of the specialist.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Legal => "legal",
            AgentKind::Urban => "urban",
            AgentKind::Geographic => "geographic",
            AgentKind::Conceptual => "conceptual",
            AgentKind::Calculator => "calculator",
            AgentKind::KnowledgeGraph => "knowledge_graph",
            AgentKind::Validator => "validator",
        }
    }

    /// Authority score used by the reranker.
    pub fn authority(&self) -> f64 {
        match self {
            AgentKind::Legal | AgentKind::KnowledgeGraph => 0.9,
            _ => 0.7,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority attached to a routing directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
}

impl Priority {
    /// Priority score used by the reranker.
    pub fn score(&self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 0.8,
            Priority::Medium => 0.5,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Critical => write!(f, "critical"),
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
        }
    }
}

/// Coarse estimate of how involved a query is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

/// Entities extracted from the query text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entities {
    /// Article numbers, as written (e.g. "89").
    #[serde(default)]
    pub articles: Vec<String>,
    /// Known neighborhood names, canonical spelling.
    #[serde(default)]
    pub neighborhoods: Vec<String>,
    /// Zone codes, normalised (e.g. "ZOT 08.1").
    #[serde(default)]
    pub zones: Vec<String>,
}

impl Entities {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty() && self.neighborhoods.is_empty() && self.zones.is_empty()
    }
}

/// Explicit version and comparison hints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemporalHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub comparison: bool,
}

/// Carried by an escalated context during the refinement round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementState {
    pub round: u8,
    pub prior_issues: Vec<String>,
    pub prior_confidence: f64,
}

/// Structured view of a query, built once per request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// The original query text.
    pub query: String,
    pub has_legal_reference: bool,
    pub has_location_reference: bool,
    pub has_parameter_query: bool,
    pub needs_explanation: bool,
    pub requires_calculation: bool,
    #[serde(default)]
    pub entities: Entities,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub temporal: TemporalHints,
    /// Topics of recent turns, most recent first, deduplicated.
    #[serde(default)]
    pub previous_topics: Vec<String>,
    /// A recent turn ended on an unresolved ambiguity.
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<RefinementState>,
}

impl Context {
    /// Topic labels of this context, used as history signal for later turns.
    pub fn topics(&self) -> Vec<String> {
        let flags = [
            (self.has_legal_reference, "legal"),
            (self.has_location_reference, "location"),
            (self.has_parameter_query, "parameters"),
            (self.needs_explanation, "explanation"),
            (self.requires_calculation, "calculation"),
        ];

        let mut topics: Vec<String> = flags
            .iter()
            .filter(|(on, _)| *on)
            .map(|(_, name)| name.to_string())
            .collect();

        topics.extend(self.entities.zones.iter().cloned());
        topics.extend(self.entities.neighborhoods.iter().cloned());
        topics.extend(self.entities.articles.iter().map(|a| format!("art. {}", a)));
        topics
    }

    /// Refinement round this context belongs to (0 for the first pass).
    pub fn round(&self) -> u8 {
        self.refinement.as_ref().map(|r| r.round).unwrap_or(0)
    }

    /// Build the escalated context used by the refinement round.
    pub fn escalate(&self, verdict: &ValidationVerdict) -> Context {
        Context {
            refinement: Some(RefinementState {
                round: self.round() + 1,
                prior_issues: verdict.issues.clone(),
                prior_confidence: verdict.confidence,
            }),
            ..self.clone()
        }
    }
}

/// Instruction to invoke a specialist at a priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingDirective {
    pub agent: AgentKind,
    pub priority: Priority,
}

impl RoutingDirective {
    pub fn new(agent: AgentKind, priority: Priority) -> Self {
        Self { agent, priority }
    }
}

/// What a specialist returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    #[serde(rename = "type")]
    pub agent_type: AgentKind,
    pub confidence: f64,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl AgentResult {
    pub fn new(agent_type: AgentKind, confidence: f64, data: Value) -> Self {
        Self {
            agent_type,
            confidence,
            data,
            metadata: None,
        }
    }

    /// True if the payload carries nothing (null, `{}` or `[]`).
    pub fn has_empty_payload(&self) -> bool {
        is_empty_value(&self.data)
    }

    /// String entries of an array field in the payload.
    pub fn strings(&self, field: &str) -> Vec<&str> {
        self.data
            .get(field)
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Entries of an array field in the payload.
    pub fn entries(&self, field: &str) -> &[Value] {
        self.data
            .get(field)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names in an array field, given either as plain strings or as objects
    /// carrying a `label` or `name`.
    pub fn labels(&self, field: &str) -> Vec<&str> {
        self.entries(field)
            .iter()
            .filter_map(|entry| {
                entry
                    .as_str()
                    .or_else(|| entry.get("label").and_then(Value::as_str))
                    .or_else(|| entry.get("name").and_then(Value::as_str))
            })
            .collect()
    }

    /// Payload fields as `(non_empty, empty)` counts. A non-object payload
    /// counts as a single field.
    pub fn field_counts(&self) -> (usize, usize) {
        match &self.data {
            Value::Object(map) if !map.is_empty() => {
                let empty = map.values().filter(|v| is_empty_value(v)).count();
                (map.len() - empty, empty)
            }
            other if is_empty_value(other) => (0, 1),
            _ => (1, 0),
        }
    }
}

/// Article number of a citation such as `"LUOS - Art. 89"`.
pub fn article_number(citation: &str) -> Option<u32> {
    let start = citation.find("Art.")? + "Art.".len();
    let digits: String = citation[start..]
        .trim_start()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// Comparison key for zone codes: upper case, no whitespace.
pub fn zone_key(zone: &str) -> String {
    zone.split_whitespace().collect::<String>().to_uppercase()
}

/// True for null, empty strings, empty arrays and empty objects.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// A specialist result together with the priority it was dispatched at.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedResult {
    pub priority: Priority,
    pub result: AgentResult,
}

/// Per-criterion scores of a ranked result.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub confidence: f64,
    pub priority: f64,
    pub relevance: f64,
    pub completeness: f64,
    pub authority: f64,
}

/// A specialist result with its reranking scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    #[serde(flatten)]
    pub result: AgentResult,
    pub priority: Priority,
    pub scores: ScoreBreakdown,
    pub final_score: f64,
}

/// Category of a validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    LegalCitations,
    NumericData,
    Consistency,
    Contradictions,
    Completeness,
    KnowledgeGraph,
    Ambiguity,
}

impl fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckCategory::LegalCitations => "legal_citations",
            CheckCategory::NumericData => "numeric_data",
            CheckCategory::Consistency => "consistency",
            CheckCategory::Contradictions => "contradictions",
            CheckCategory::Completeness => "completeness",
            CheckCategory::KnowledgeGraph => "knowledge_graph",
            CheckCategory::Ambiguity => "ambiguity",
        };
        f.write_str(name)
    }
}

/// Outcome of one validation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub category: CheckCategory,
    pub passed: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationCheck {
    pub fn has_critical_issue(&self) -> bool {
        self.issues.iter().any(|i| is_critical(i))
    }
}

/// Urgency of a suggested correction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionPriority {
    High,
    Medium,
}

/// Suggestions collected from a failed check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub category: CheckCategory,
    pub priority: CorrectionPriority,
    pub suggestions: Vec<String>,
    pub confidence: f64,
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub is_valid: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub requires_refinement: bool,
    #[serde(default)]
    pub checks: Vec<ValidationCheck>,
    #[serde(default)]
    pub corrections: Vec<Correction>,
    #[serde(default)]
    pub summary: String,
}

impl ValidationVerdict {
    pub fn critical_issue_count(&self) -> usize {
        self.issues.iter().filter(|i| is_critical(i)).count()
    }
}

/// Extra facts persisted with a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnMetadata {
    pub agents_used: Vec<AgentKind>,
    #[serde(default)]
    pub was_refined: bool,
    #[serde(default)]
    pub needs_clarification: bool,
}

/// One persisted query/response exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTurn {
    pub session_id: String,
    pub turn_number: u64,
    pub query: String,
    pub context: Context,
    pub agent_results: Vec<AgentResult>,
    pub response_text: String,
    pub confidence: f64,
    #[serde(default)]
    pub metadata: TurnMetadata,
    pub timestamp: DateTime<Utc>,
}

/// A turn before its number is allocated.
#[derive(Debug, Clone)]
pub struct TurnDraft {
    pub session_id: String,
    pub query: String,
    pub context: Context,
    pub agent_results: Vec<AgentResult>,
    pub response_text: String,
    pub confidence: f64,
    pub metadata: TurnMetadata,
}

impl TurnDraft {
    /// Number the draft and stamp it with the current time.
    pub fn into_turn(self, turn_number: u64) -> SessionTurn {
        SessionTurn {
            session_id: self.session_id,
            turn_number,
            query: self.query,
            context: self.context,
            agent_results: self.agent_results,
            response_text: self.response_text,
            confidence: self.confidence,
            metadata: self.metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Caller options for a single request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitOptions {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub skip_refinement: bool,
}

/// Input of the `submit` operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub options: SubmitOptions,
}

impl SubmitRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Where the response text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SynthesisSource {
    Generated,
    Fallback,
}

/// Stages of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    ContextBuilt,
    Routed,
    Executed,
    Ranked,
    Validated,
    RefinementExecuted,
    Synthesized,
    Persisted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Metadata reported alongside the response text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub agents_used: Vec<AgentKind>,
    pub validation: ValidationVerdict,
    pub context: Context,
    pub was_refined: bool,
    pub session_id: String,
    pub model: String,
    pub synthesis: SynthesisSource,
    pub stages: Vec<Stage>,
}

/// Output of the `submit` operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub response: String,
    pub confidence: f64,
    pub metadata: ResponseMetadata,
}

/// What the caller sees when a technical fault aborts the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureResponse {
    pub error: String,
    pub response: String,
    pub confidence: f64,
}

impl FailureResponse {
    pub fn from_error(error: &impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
            response: APOLOGY.to_string(),
            confidence: 0.0,
        }
    }
}
