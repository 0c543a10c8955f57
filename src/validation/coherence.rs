//! Checks that compare specialists with each other and with the question:
//! consistency, contradictions, completeness and ambiguity.

use super::{has_field, parameter_claims, CheckBuilder};
use crate::analysis::of_kind;
use crate::config::ValidationConfig;
use crate::models::{
    article_number, zone_key, AgentKind, AgentResult, CheckCategory, Context, RankedResult,
    ValidationCheck,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Article that defines the neighbourhood impact study (EIV).
const EIV_ARTICLE: u32 = 89;

/// Values closer than this count as the same claim.
const VALUE_TOLERANCE: f64 = 1e-6;

fn first_of(results: &[RankedResult], kind: AgentKind) -> Option<&AgentResult> {
    of_kind(results, kind).next().map(|r| &r.result)
}

fn urban_locations(results: &[RankedResult]) -> Vec<&str> {
    of_kind(results, AgentKind::Urban)
        .flat_map(|r| r.result.labels("locations"))
        .collect()
}

/// Legal and urban specialists must agree where their claims overlap, and
/// specialist confidences must not spread too far apart.
pub fn consistency(results: &[RankedResult], config: &ValidationConfig) -> ValidationCheck {
    let mut check = CheckBuilder::new(CheckCategory::Consistency);

    if let (Some(legal), Some(urban)) = (
        first_of(results, AgentKind::Legal),
        first_of(results, AgentKind::Urban),
    ) {
        if has_field(urban, "zones") {
            let concepts = legal.strings("concepts");
            let zones = urban.labels("zones");

            for concept in &config.zone_concepts {
                let claimed = concepts.iter().any(|c| *c == concept.as_str());
                let located = zones.iter().any(|z| z.contains(concept.as_str()));
                if claimed && !located {
                    check.penalize(
                        0.2,
                        format!("Inconsistency: {} mentioned but no {} zone identified", concept, concept),
                    );
                }
            }
        }

        if has_field(legal, "articles") && has_field(urban, "restrictions") {
            let cites_eiv = legal
                .strings("articles")
                .into_iter()
                .any(|a| a.contains("LUOS") && article_number(a) == Some(EIV_ARTICLE));
            let restricts_eiv = urban.entries("restrictions").iter().any(|r| {
                r.get("description")
                    .and_then(Value::as_str)
                    .is_some_and(|d| d.contains("EIV"))
            });

            if cites_eiv != restricts_eiv {
                check.penalize(0.15, "Inconsistency between EIV citation and restrictions");
            }
        }
    }

    let confidences: Vec<f64> = results.iter().map(|r| r.result.confidence).collect();
    if confidences.len() > 1 {
        let mean = confidences.iter().sum::<f64>() / confidences.len() as f64;
        let variance =
            confidences.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / confidences.len() as f64;

        if variance > config.variance_threshold {
            check.penalize(0.1, "High confidence variance across specialists");
            check.suggest("Review the specialists with low confidence");
        }
    }

    check.finish()
}

/// One value per (zone, parameter), and no confusable place names side by side.
pub fn contradictions(results: &[RankedResult], config: &ValidationConfig) -> ValidationCheck {
    let mut check = CheckBuilder::new(CheckCategory::Contradictions);

    // keyed by normalised zone; keeps the first spelling for messages
    let mut claims: BTreeMap<(String, String), (String, Vec<f64>)> = BTreeMap::new();
    for ranked in results {
        for claim in parameter_claims(&ranked.result) {
            let Some(zone) = claim.zone else { continue };
            let (_, values) = claims
                .entry((zone_key(&zone), claim.parameter.clone()))
                .or_insert_with(|| (zone.clone(), Vec::new()));
            if !values.iter().any(|v| (v - claim.value).abs() < VALUE_TOLERANCE) {
                values.push(claim.value);
            }
        }
    }

    for ((_, parameter), (zone, values)) in &claims {
        if values.len() > 1 {
            let listed: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            check.critical(
                0.3,
                format!(
                    "Conflicting values for {} {}: {}",
                    zone,
                    parameter,
                    listed.join(", ")
                ),
            );
            check.suggest(format!("Check the correct value for {} in the zoning dataset", zone));
        }
    }

    let locations = urban_locations(results);
    for (first, second) in &config.confusable_locations {
        if locations.contains(&first.as_str()) && locations.contains(&second.as_str()) {
            check.critical(0.4, format!("Ambiguity between {} and {}", first, second));
            check.suggest("Ask the user which neighborhood is meant");
        }
    }

    check.finish()
}

/// The answer must cover what the question asks for, and no specialist
/// should come back empty.
pub fn completeness(results: &[RankedResult], context: Option<&Context>) -> ValidationCheck {
    let mut check = CheckBuilder::new(CheckCategory::Completeness);

    if let Some(context) = context {
        if context.has_legal_reference {
            let answered = of_kind(results, AgentKind::Legal)
                .any(|r| !r.result.strings("articles").is_empty());
            if !answered {
                check.penalize(0.3, "Legal question but no legal citations returned");
                check.suggest("Dispatch the legal specialist to look up the articles");
            }
        }

        if context.has_parameter_query {
            let answered = of_kind(results, AgentKind::Urban)
                .any(|r| !r.result.entries("parameters").is_empty());
            if !answered {
                check.penalize(0.3, "Parameter question but no zoning parameters returned");
                check.suggest("Dispatch the urban specialist to look up the parameters");
            }
        }
    }

    let empty = results.iter().filter(|r| r.result.has_empty_payload()).count();
    if empty > 0 {
        check.penalize(
            0.2 * empty as f64,
            format!("{} specialists returned empty payloads", empty),
        );
    }

    check.finish()
}

/// Confusable place names and unresolved version comparisons.
pub fn ambiguity(
    results: &[RankedResult],
    context: Option<&Context>,
    config: &ValidationConfig,
) -> ValidationCheck {
    let mut check = CheckBuilder::new(CheckCategory::Ambiguity);

    let locations = urban_locations(results);
    for (first, second) in &config.confusable_locations {
        let found = [first, second]
            .into_iter()
            .find(|name| locations.contains(&name.as_str()));

        if let Some(found) = found {
            check.penalize(0.15, format!("Possible ambiguity: {}", found));
            check.suggest(format!("Confirm whether {} or {} is meant", first, second));
        }
    }

    if context.is_some_and(|c| c.temporal.comparison) {
        let versioned = results.iter().any(|r| {
            has_field(&r.result, "version")
                || r.result
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("version"))
                    .is_some_and(|v| !v.is_null())
        });

        if !versioned {
            check.penalize(0.2, "Temporal comparison requested without version information");
            check.suggest("Specify the plan version (2024 vs 2025)");
        }
    }

    check.finish()
}
