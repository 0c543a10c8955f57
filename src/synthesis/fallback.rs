//! Deterministic answer assembled from structured payloads alone.

use crate::analysis::of_kind;
use crate::models::{AgentKind, RankedResult};
use serde_json::Value;

/// Used when no specialist produced anything the fallback can state.
pub const UNABLE_TO_ANSWER: &str =
    "Unable to process your request. Please rephrase the question.";

/// Appended when the verdict confidence is below the threshold.
pub const LOW_CONFIDENCE_DISCLAIMER: &str =
    "Note: this answer has moderate confidence. Additional verification is recommended.";

/// Citations, then relationship sentences, then the disclaimer.
pub fn compose(results: &[RankedResult], confidence: f64, threshold: f64) -> String {
    let mut sections = Vec::new();

    let articles = cited_articles(results);
    if !articles.is_empty() {
        sections.push(format!("According to the legislation: {}.", articles.join(", ")));
    }

    let relationships = relationship_sentences(results);
    if !relationships.is_empty() {
        sections.push(relationships.join("\n"));
    }

    if sections.is_empty() {
        sections.push(UNABLE_TO_ANSWER.to_string());
    }

    if confidence < threshold {
        sections.push(LOW_CONFIDENCE_DISCLAIMER.to_string());
    }

    sections.join("\n\n")
}

/// Legal citations in ranked order, first occurrence wins.
fn cited_articles(results: &[RankedResult]) -> Vec<&str> {
    let mut articles: Vec<&str> = Vec::new();
    for article in of_kind(results, AgentKind::Legal).flat_map(|r| r.result.strings("articles")) {
        if !articles.contains(&article) {
            articles.push(article);
        }
    }
    articles
}

/// `"<source> <type> <target>."` per well-formed relationship.
fn relationship_sentences(results: &[RankedResult]) -> Vec<String> {
    of_kind(results, AgentKind::KnowledgeGraph)
        .flat_map(|r| r.result.entries("relationships"))
        .filter_map(|rel| {
            let source = rel.get("source").and_then(Value::as_str)?;
            let kind = rel.get("type").and_then(Value::as_str)?;
            let target = rel.get("target").and_then(Value::as_str)?;
            Some(format!(
                "{} {} {}.",
                source,
                kind.to_lowercase().replace('_', " "),
                target
            ))
        })
        .collect()
}
