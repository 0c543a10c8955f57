//! Numeric-data check over zoning parameters.

use super::knowledge::KnowledgeBase;
use super::{has_field, parameter_claims, CheckBuilder, ParameterClaim};
use crate::analysis::of_kind;
use crate::models::{AgentKind, CheckCategory, RankedResult, ValidationCheck};
use std::ops::RangeInclusive;
use tracing::warn;

pub const MAX_HEIGHT: &str = "Altura Máxima";
pub const BASIC_COEFFICIENT: &str = "Coeficiente de Aproveitamento Básico";
pub const MAX_COEFFICIENT: &str = "Coeficiente de Aproveitamento Máximo";

const HEIGHT_RANGE: RangeInclusive<f64> = 0.0..=200.0;
const COEFFICIENT_RANGE: RangeInclusive<f64> = 0.0..=10.0;
const PERCENT_RANGE: RangeInclusive<f64> = 0.0..=1.0;

/// Tolerance when comparing a claim with its reference value.
const REFERENCE_TOLERANCE: f64 = 1e-6;

/// Runs only when some result carries `parameters` or `metrics`.
pub async fn check(results: &[RankedResult], knowledge: &dyn KnowledgeBase) -> Option<ValidationCheck> {
    let applies = results
        .iter()
        .any(|r| has_field(&r.result, "parameters") || has_field(&r.result, "metrics"));
    if !applies {
        return None;
    }

    let mut check = CheckBuilder::new(CheckCategory::NumericData);

    for ranked in of_kind(results, AgentKind::Urban) {
        let claims = parameter_claims(&ranked.result);

        for claim in &claims {
            check_ranges(&mut check, claim);
            check_reference(&mut check, claim, knowledge).await;
        }

        check_coefficient_order(&mut check, &claims);
    }

    Some(check.finish())
}

fn check_ranges(check: &mut CheckBuilder, claim: &ParameterClaim) {
    if claim.parameter == MAX_HEIGHT && !HEIGHT_RANGE.contains(&claim.value) {
        check.penalize(0.2, format!("Suspicious maximum height: {}m", claim.value));
        check.suggest("Check the maximum height in the zoning dataset");
    }

    if claim.parameter.contains("Coeficiente") && !COEFFICIENT_RANGE.contains(&claim.value) {
        check.penalize(0.2, format!("Coefficient out of range: {}", claim.value));
    }

    if claim.unit.as_deref() == Some("%") && !PERCENT_RANGE.contains(&claim.value) {
        check.penalize(0.2, format!("Invalid percentage: {}", claim.value));
        check.suggest("Percentages must be between 0 and 1");
    }
}

async fn check_reference(check: &mut CheckBuilder, claim: &ParameterClaim, knowledge: &dyn KnowledgeBase) {
    let Some(ref zone) = claim.zone else {
        return;
    };

    match knowledge.reference_value(zone, &claim.parameter).await {
        Ok(Some(expected)) if (expected - claim.value).abs() > REFERENCE_TOLERANCE => {
            check.critical(
                0.4,
                format!(
                    "{} {} should be {}, not {}",
                    zone, claim.parameter, expected, claim.value
                ),
            );
            check.degrade(0.3);
            check.suggest(format!("Use the reference value for {} {}", zone, claim.parameter));
        }
        Ok(_) => {}
        Err(e) => {
            warn!("Reference lookup failed for {} {}: {}", zone, claim.parameter, e);
            check.degrade(0.1);
        }
    }
}

/// Basic coefficient must not exceed the maximum one for the same zone.
fn check_coefficient_order(check: &mut CheckBuilder, claims: &[ParameterClaim]) {
    for basic in claims.iter().filter(|c| c.parameter == BASIC_COEFFICIENT) {
        let maximum = claims
            .iter()
            .find(|c| c.parameter == MAX_COEFFICIENT && c.zone == basic.zone);

        if let Some(maximum) = maximum {
            if basic.value > maximum.value {
                check.critical(0.1, "Basic coefficient greater than maximum coefficient");
                check.suggest("Swap the basic and maximum coefficient values");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::validation::testing::{ranked, FailingKnowledgeBase};
    use crate::validation::StaticKnowledgeBase;
    use serde_json::json;

    fn kb() -> StaticKnowledgeBase {
        StaticKnowledgeBase::from_config(&KnowledgeConfig::default())
    }

    fn urban(parameters: serde_json::Value) -> Vec<RankedResult> {
        vec![ranked(AgentKind::Urban, json!({ "parameters": parameters }))]
    }

    #[tokio::test]
    async fn test_skipped_without_numeric_fields() {
        let results = vec![ranked(AgentKind::Legal, json!({"articles": []}))];
        assert!(check(&results, &kb()).await.is_none());
    }

    #[tokio::test]
    async fn test_reference_value_match_passes() {
        let results = urban(json!([
            {"zone": "ZOT 08.1", "parameter": "Altura Máxima", "value": 130, "unit": "m"},
            {"zone": "ZOT 08.1", "parameter": "Taxa de Ocupação", "value": 0.75, "unit": "%"}
        ]));
        let check = check(&results, &kb()).await.unwrap();
        assert!(check.passed, "issues: {:?}", check.issues);
    }

    #[tokio::test]
    async fn test_reference_mismatch_is_critical() {
        let results = urban(json!([{"zone": "ZOT 08.1", "parameter": "Altura Máxima", "value": 95}]));
        let check = check(&results, &kb()).await.unwrap();

        assert!(check.has_critical_issue());
        assert_eq!(
            check.issues,
            vec!["CRITICAL: ZOT 08.1 Altura Máxima should be 130, not 95"]
        );
        assert!((check.confidence - 0.4).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_range_violations() {
        let results = urban(json!([
            {"parameter": "Altura Máxima", "value": 450},
            {"parameter": "Coeficiente de Aproveitamento Máximo", "value": 12},
            {"parameter": "Taxa de Permeabilidade", "value": 20, "unit": "%"}
        ]));
        let check = check(&results, &kb()).await.unwrap();

        assert_eq!(check.issues.len(), 3);
        assert!((check.confidence - 0.4).abs() < 1e-9);
        assert!(!check.has_critical_issue());
    }

    #[tokio::test]
    async fn test_basic_above_maximum_coefficient() {
        let results = urban(json!([
            {"zone": "ZOT 02", "parameter": "Coeficiente de Aproveitamento Básico", "value": 3.0},
            {"zone": "ZOT 02", "parameter": "Coeficiente de Aproveitamento Máximo", "value": 2.0}
        ]));
        let check = check(&results, &kb()).await.unwrap();

        assert!(check.has_critical_issue());
        assert_eq!(check.confidence, 0.1);
    }

    #[tokio::test]
    async fn test_reference_outage_degrades() {
        let results = urban(json!([{"zone": "ZOT 08.1", "parameter": "Altura Máxima", "value": 95}]));
        let check = check(&results, &FailingKnowledgeBase).await.unwrap();
        assert!(check.passed);
        assert!((check.confidence - 0.9).abs() < 1e-9);
    }
}
