//! Multi-criteria reranking of specialist results.

use crate::config::RerankWeights;
use crate::models::{
    article_number, zone_key, AgentKind, AgentResult, Complexity, Context, DispatchedResult,
    RankedResult, ScoreBreakdown,
};
use std::cmp::Ordering;
use tracing::debug;

const BASE_RELEVANCE: f64 = 0.5;
const NEED_MATCH_BONUS: f64 = 0.3;
const ENTITY_MATCH_BONUS: f64 = 0.2;

const BASE_COMPLETENESS: f64 = 0.5;

/// Scores results against a context with fixed weights.
#[derive(Debug, Clone, Copy)]
pub struct Reranker {
    weights: RerankWeights,
}

impl Reranker {
    pub fn new(weights: RerankWeights) -> Self {
        Self { weights }
    }

    /// Score every result and sort by final score, highest first.
    ///
    /// Equal scores keep their input order.
    pub fn rerank(&self, results: Vec<DispatchedResult>, context: &Context) -> Vec<RankedResult> {
        let mut ranked: Vec<RankedResult> = results
            .into_iter()
            .map(|dispatched| self.score(dispatched, context))
            .collect();

        // sort_by is stable
        ranked.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(Ordering::Equal)
        });

        for r in &ranked {
            debug!(
                "Ranked {} at {:.3} (relevance {:.2}, completeness {:.2})",
                r.result.agent_type, r.final_score, r.scores.relevance, r.scores.completeness
            );
        }

        ranked
    }

    fn score(&self, dispatched: DispatchedResult, context: &Context) -> RankedResult {
        let DispatchedResult { priority, result } = dispatched;

        let scores = ScoreBreakdown {
            confidence: clamp(result.confidence),
            priority: priority.score(),
            relevance: relevance(&result, context),
            completeness: completeness(&result),
            authority: result.agent_type.authority(),
        };

        let w = &self.weights;
        let final_score = clamp(
            scores.confidence * w.confidence
                + scores.priority * w.priority
                + scores.relevance * w.relevance
                + scores.completeness * w.completeness
                + scores.authority * w.authority,
        );

        RankedResult {
            result,
            priority,
            scores,
            final_score,
        }
    }
}

fn clamp(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// True if the result's type is one the context asks for.
fn matches_need(kind: AgentKind, context: &Context) -> bool {
    match kind {
        AgentKind::Legal => context.has_legal_reference,
        AgentKind::Urban | AgentKind::Geographic => {
            context.has_location_reference || context.has_parameter_query
        }
        AgentKind::Conceptual => context.needs_explanation,
        AgentKind::Calculator => context.requires_calculation,
        AgentKind::KnowledgeGraph => {
            context.complexity == Complexity::High || context.has_legal_reference
        }
        AgentKind::Validator => false,
    }
}

/// True if the payload mentions any entity extracted from the query.
fn matches_entities(result: &AgentResult, context: &Context) -> bool {
    let entities = &context.entities;

    let wanted_articles: Vec<u32> = entities
        .articles
        .iter()
        .filter_map(|a| a.parse().ok())
        .collect();
    let article_hit = result
        .strings("articles")
        .into_iter()
        .filter_map(article_number)
        .any(|n| wanted_articles.contains(&n));

    let wanted_zones: Vec<String> = entities.zones.iter().map(|z| zone_key(z)).collect();
    let zone_hit = result
        .labels("zones")
        .into_iter()
        .any(|z| wanted_zones.contains(&zone_key(z)));

    let place_hit = ["neighborhoods", "locations"].iter().any(|field| {
        result.labels(field).into_iter().any(|name| {
            entities
                .neighborhoods
                .iter()
                .any(|n| n.eq_ignore_ascii_case(name))
        })
    });

    article_hit || zone_hit || place_hit
}

fn relevance(result: &AgentResult, context: &Context) -> f64 {
    let mut score = BASE_RELEVANCE;
    if matches_need(result.agent_type, context) {
        score += NEED_MATCH_BONUS;
    }
    if matches_entities(result, context) {
        score += ENTITY_MATCH_BONUS;
    }
    clamp(score)
}

fn completeness(result: &AgentResult) -> f64 {
    if result.has_empty_payload() {
        return 0.0;
    }

    let (filled, empty) = result.field_counts();
    let mut score = BASE_COMPLETENESS;
    if filled > 3 {
        score += 0.3;
    }
    if filled > 5 {
        score += 0.2;
    }
    if empty == 0 {
        score += 0.2;
    }
    clamp(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entities, Priority};
    use serde_json::json;

    fn dispatched(kind: AgentKind, priority: Priority, confidence: f64, data: serde_json::Value) -> DispatchedResult {
        DispatchedResult {
            priority,
            result: AgentResult::new(kind, confidence, data),
        }
    }

    fn reranker() -> Reranker {
        Reranker::new(RerankWeights::default())
    }

    #[test]
    fn test_scores_of_matching_legal_result() {
        let context = Context {
            has_legal_reference: true,
            entities: Entities {
                articles: vec!["89".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };

        let ranked = reranker().rerank(
            vec![dispatched(
                AgentKind::Legal,
                Priority::High,
                0.8,
                json!({"articles": ["LUOS - Art. 89"], "laws": ["LUOS"]}),
            )],
            &context,
        );

        let scores = ranked[0].scores;
        assert_eq!(scores.priority, 0.8);
        assert_eq!(scores.authority, 0.9);
        assert!((scores.relevance - 1.0).abs() < 1e-9);
        assert!((scores.completeness - 0.7).abs() < 1e-9);

        let expected = 0.8 * 0.25 + 0.8 * 0.20 + 1.0 * 0.25 + 0.7 * 0.15 + 0.9 * 0.15;
        assert!((ranked[0].final_score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_empty_payload_has_zero_completeness() {
        let ranked = reranker().rerank(
            vec![dispatched(AgentKind::Calculator, Priority::High, 0.5, json!({}))],
            &Context::default(),
        );
        assert_eq!(ranked[0].scores.completeness, 0.0);
        assert_eq!(ranked[0].scores.relevance, 0.5);
    }

    #[test]
    fn test_zone_entities_match_after_normalisation() {
        let context = Context {
            has_parameter_query: true,
            entities: Entities {
                zones: vec!["ZOT 08.1".to_string()],
                ..Default::default()
            },
            ..Default::default()
        };
        let ranked = reranker().rerank(
            vec![dispatched(
                AgentKind::Urban,
                Priority::High,
                0.7,
                json!({"zones": [{"label": "zot 08.1"}]}),
            )],
            &context,
        );
        assert!((ranked[0].scores.relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_sorted_descending_and_bounded() {
        let results = vec![
            dispatched(AgentKind::Conceptual, Priority::Medium, 0.2, json!({})),
            dispatched(AgentKind::Legal, Priority::Critical, 1.0, json!({"a": 1, "b": 2, "c": 3, "d": 4, "e": 5, "f": 6})),
            dispatched(AgentKind::Urban, Priority::High, 7.0, json!({"zones": ["ZOT 1"]})),
            dispatched(AgentKind::Geographic, Priority::Medium, -3.0, json!(null)),
        ];
        let ranked = reranker().rerank(results, &Context::default());

        assert_eq!(ranked.len(), 4);
        for pair in ranked.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
        for r in &ranked {
            assert!((0.0..=1.0).contains(&r.final_score));
            assert!((0.0..=1.0).contains(&r.scores.confidence));
        }
    }

    #[test]
    fn test_ties_keep_input_order() {
        let results: Vec<DispatchedResult> = [AgentKind::Urban, AgentKind::Geographic, AgentKind::Conceptual]
            .into_iter()
            .map(|kind| dispatched(kind, Priority::Medium, 0.6, json!({"x": 1})))
            .collect();

        let ranked = reranker().rerank(results, &Context::default());
        let order: Vec<AgentKind> = ranked.iter().map(|r| r.result.agent_type).collect();
        assert_eq!(
            order,
            vec![AgentKind::Urban, AgentKind::Geographic, AgentKind::Conceptual]
        );
    }
}
