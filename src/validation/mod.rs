//! Rule-based validation of ranked specialist results.
//!
//! The [`Validator`] runs an ordered battery of independent checks and folds
//! them into a [`ValidationVerdict`]. It never fails: malformed payloads
//! degrade the check that reads them, and an empty input gets a fixed
//! low-confidence verdict.

pub mod citations;
pub mod coherence;
pub mod knowledge;
pub mod numeric;

use crate::config::ValidationConfig;
use crate::models::{
    is_critical, AgentResult, CheckCategory, Context, Correction, CorrectionPriority,
    RankedResult, ValidationCheck, ValidationVerdict, CRITICAL_MARKER,
};
use anyhow::Result;
use citations::CitationRules;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

pub use knowledge::{HttpKnowledgeBase, KnowledgeBase, NodeKind, StaticKnowledgeBase};

/// Reason reported when there is nothing to validate.
pub const NO_RESULTS: &str = "No agent results available";

/// Accumulates the outcome of one check.
pub(crate) struct CheckBuilder {
    category: CheckCategory,
    confidence: f64,
    ceiling: f64,
    issues: Vec<String>,
    suggestions: Vec<String>,
}

impl CheckBuilder {
    pub(crate) fn new(category: CheckCategory) -> Self {
        Self {
            category,
            confidence: 1.0,
            ceiling: 1.0,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Record an issue and lower confidence.
    pub(crate) fn penalize(&mut self, amount: f64, issue: impl Into<String>) {
        self.issues.push(issue.into());
        self.confidence -= amount;
    }

    /// Lower confidence without recording an issue.
    pub(crate) fn degrade(&mut self, amount: f64) {
        self.confidence -= amount;
    }

    /// Record a critical issue and cap confidence at `ceiling`.
    pub(crate) fn critical(&mut self, ceiling: f64, issue: impl AsRef<str>) {
        self.issues.push(format!("{} {}", CRITICAL_MARKER, issue.as_ref()));
        self.ceiling = self.ceiling.min(ceiling);
    }

    pub(crate) fn suggest(&mut self, suggestion: impl Into<String>) {
        let suggestion = suggestion.into();
        if !self.suggestions.contains(&suggestion) {
            self.suggestions.push(suggestion);
        }
    }

    pub(crate) fn finish(self) -> ValidationCheck {
        ValidationCheck {
            category: self.category,
            passed: self.issues.is_empty(),
            confidence: self.confidence.min(self.ceiling).clamp(0.0, 1.0),
            issues: self.issues,
            suggestions: self.suggestions,
        }
    }
}

/// A numeric claim found in a `parameters` array.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub(crate) struct ParameterClaim {
    #[serde(default)]
    pub zone: Option<String>,
    pub parameter: String,
    pub value: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Well-formed parameter claims of a result; anything else is skipped.
pub(crate) fn parameter_claims(result: &AgentResult) -> Vec<ParameterClaim> {
    result
        .entries("parameters")
        .iter()
        .filter_map(|entry| serde_json::from_value(entry.clone()).ok())
        .collect()
}

/// True if the payload carries a non-null field of that name.
pub(crate) fn has_field(result: &AgentResult, field: &str) -> bool {
    result.data.get(field).is_some_and(|v| !v.is_null())
}

/// Runs the check battery.
pub struct Validator {
    config: ValidationConfig,
    citations: CitationRules,
    knowledge: Arc<dyn KnowledgeBase>,
}

impl Validator {
    pub fn new(config: ValidationConfig, knowledge: Arc<dyn KnowledgeBase>) -> Result<Self> {
        let citations = CitationRules::new(&config)?;
        Ok(Self {
            config,
            citations,
            knowledge,
        })
    }

    /// Validate ranked results. The context feeds the completeness and
    /// ambiguity checks; without it they only look at the payloads.
    pub async fn validate(
        &self,
        results: &[RankedResult],
        context: Option<&Context>,
    ) -> ValidationVerdict {
        if results.is_empty() {
            info!("Nothing to validate");
            return self.incomplete(NO_RESULTS);
        }

        let knowledge = self.knowledge.as_ref();
        let mut checks = Vec::new();

        if let Some(check) = self.citations.check(results, knowledge).await {
            checks.push(check);
        }
        if let Some(check) = numeric::check(results, knowledge).await {
            checks.push(check);
        }
        checks.push(coherence::consistency(results, &self.config));
        checks.push(coherence::contradictions(results, &self.config));
        checks.push(coherence::completeness(results, context));
        checks.push(knowledge::alignment(results, knowledge).await);
        checks.push(coherence::ambiguity(results, context, &self.config));

        for check in &checks {
            debug!(
                "Check {}: passed={} confidence={:.2} issues={}",
                check.category,
                check.passed,
                check.confidence,
                check.issues.len()
            );
        }

        self.aggregate(checks)
    }

    fn aggregate(&self, checks: Vec<ValidationCheck>) -> ValidationVerdict {
        if checks.is_empty() {
            return self.incomplete("No validation checks ran");
        }

        let confidence = checks.iter().map(|c| c.confidence).sum::<f64>() / checks.len() as f64;
        let issues: Vec<String> = checks.iter().flat_map(|c| c.issues.clone()).collect();
        let has_critical = issues.iter().any(|i| is_critical(i));
        let all_passed = checks.iter().all(|c| c.passed);

        let verdict = ValidationVerdict {
            is_valid: all_passed && !has_critical,
            confidence,
            requires_refinement: confidence < self.config.confidence_threshold
                || !all_passed
                || has_critical,
            corrections: corrections(&checks),
            summary: summary(&checks, confidence),
            issues,
            checks,
        };

        info!(
            "Validation: valid={} confidence={:.2} refine={}",
            verdict.is_valid, verdict.confidence, verdict.requires_refinement
        );
        verdict
    }

    /// Verdict for a validation that could not run any check.
    fn incomplete(&self, reason: &str) -> ValidationVerdict {
        ValidationVerdict {
            is_valid: false,
            confidence: self.config.empty_confidence,
            issues: vec![reason.to_string()],
            requires_refinement: true,
            checks: Vec::new(),
            corrections: Vec::new(),
            summary: format!("Validation incomplete: {}", reason),
        }
    }
}

/// Suggestions of failed checks, high priority first.
fn corrections(checks: &[ValidationCheck]) -> Vec<Correction> {
    let mut corrections: Vec<Correction> = checks
        .iter()
        .filter(|c| !c.passed && !c.suggestions.is_empty())
        .map(|c| Correction {
            category: c.category,
            priority: if c.has_critical_issue() {
                CorrectionPriority::High
            } else {
                CorrectionPriority::Medium
            },
            suggestions: c.suggestions.clone(),
            confidence: c.confidence,
        })
        .collect();

    corrections.sort_by_key(|c| c.priority);
    corrections
}

fn summary(checks: &[ValidationCheck], confidence: f64) -> String {
    let total = checks.len();
    let failed = checks.iter().filter(|c| !c.passed).count();
    let percent = (confidence * 100.0).round();

    if failed == 0 {
        format!("All {} checks passed (confidence: {}%)", total, percent)
    } else {
        format!("{} of {} checks failed (confidence: {}%)", failed, total, percent)
    }
}
