//! Legal citation check.

use super::knowledge::{KnowledgeBase, NodeKind};
use super::CheckBuilder;
use crate::analysis::of_kind;
use crate::config::ValidationConfig;
use crate::models::{article_number, AgentKind, CheckCategory, RankedResult, ValidationCheck};
use anyhow::Result;
use regex::Regex;
use tracing::warn;

/// A citation known to be given in place of the right one.
pub struct Miscitation {
    pub law: &'static str,
    pub cited: u32,
    pub correct: u32,
    pub subject: &'static str,
}

pub const MISCITATIONS: &[Miscitation] = &[Miscitation {
    law: "LUOS",
    cited: 90,
    correct: 89,
    subject: "EIV",
}];

/// Citation grammar and article ranges per law.
pub struct CitationRules {
    format: Regex,
    ranges: Vec<(String, u32)>,
}

impl CitationRules {
    pub fn new(config: &ValidationConfig) -> Result<Self> {
        let laws: Vec<String> = config.law_ranges.keys().map(|law| regex::escape(law)).collect();
        let format = Regex::new(&format!(r"^(?:{})\s*-\s*Art\.\s*\d+", laws.join("|")))?;

        Ok(Self {
            format,
            ranges: config
                .law_ranges
                .iter()
                .map(|(law, max)| (law.clone(), *max))
                .collect(),
        })
    }

    pub fn is_well_formed(&self, citation: &str) -> bool {
        self.format.is_match(citation)
    }

    /// Runs only when a legal specialist answered.
    pub async fn check(
        &self,
        results: &[RankedResult],
        knowledge: &dyn KnowledgeBase,
    ) -> Option<ValidationCheck> {
        let legal: Vec<&RankedResult> = of_kind(results, AgentKind::Legal).collect();
        if legal.is_empty() {
            return None;
        }

        let mut check = CheckBuilder::new(CheckCategory::LegalCitations);

        for result in &legal {
            for citation in result.result.strings("articles") {
                if !self.is_well_formed(citation) {
                    check.penalize(0.2, format!("Invalid citation format: {}", citation));
                    check.suggest("Use the format \"LAW - Art. NUMBER\"");
                }

                match knowledge.exists(citation, NodeKind::Article).await {
                    Ok(true) => {}
                    Ok(false) => {
                        check.penalize(0.3, format!("Article not found in the knowledge base: {}", citation));
                        check.suggest(format!("Check that {} exists in the legislation", citation));
                    }
                    Err(e) => {
                        warn!("Article lookup failed for {}: {}", citation, e);
                        check.degrade(0.1);
                    }
                }

                if let Some(number) = article_number(citation) {
                    for (law, max) in &self.ranges {
                        if citation.contains(law.as_str()) && (number < 1 || number > *max) {
                            check.penalize(0.1, format!("{} article number out of range: {}", law, number));
                        }
                    }
                }
            }
        }

        for known in MISCITATIONS {
            let cites = |number: u32| {
                legal.iter().any(|r| {
                    r.result
                        .strings("articles")
                        .into_iter()
                        .any(|a| a.contains(known.law) && article_number(a) == Some(number))
                })
            };

            if cites(known.cited) && !cites(known.correct) {
                check.critical(
                    0.2,
                    format!(
                        "{} is defined in {} - Art. {}, not Art. {}",
                        known.subject, known.law, known.correct, known.cited
                    ),
                );
                check.suggest(format!(
                    "Correct: {} = {} - Art. {}",
                    known.subject, known.law, known.correct
                ));
            }
        }

        Some(check.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KnowledgeConfig;
    use crate::validation::testing::{ranked, FailingKnowledgeBase};
    use crate::validation::StaticKnowledgeBase;
    use serde_json::json;

    fn rules() -> CitationRules {
        CitationRules::new(&ValidationConfig::default()).unwrap()
    }

    fn kb() -> StaticKnowledgeBase {
        StaticKnowledgeBase::from_config(&KnowledgeConfig::default())
    }

    #[test]
    fn test_citation_grammar() {
        let rules = rules();
        assert!(rules.is_well_formed("LUOS - Art. 89"));
        assert!(rules.is_well_formed("PDUS-Art.104"));
        assert!(!rules.is_well_formed("Art. 89 da LUOS"));
        assert!(!rules.is_well_formed("CTB - Art. 1"));
    }

    #[tokio::test]
    async fn test_skipped_without_legal_results() {
        let results = vec![ranked(AgentKind::Urban, json!({"zones": ["ZOT 08.1"]}))];
        assert!(rules().check(&results, &kb()).await.is_none());
    }

    #[tokio::test]
    async fn test_valid_citations_pass() {
        let results = vec![ranked(
            AgentKind::Legal,
            json!({"articles": ["LUOS - Art. 89", "PDUS - Art. 92"]}),
        )];
        let check = rules().check(&results, &kb()).await.unwrap();
        assert!(check.passed);
        assert_eq!(check.confidence, 1.0);
    }

    #[tokio::test]
    async fn test_bad_format_and_unknown_article() {
        let results = vec![ranked(AgentKind::Legal, json!({"articles": ["Artigo 5 LUOS"]}))];
        let check = rules().check(&results, &kb()).await.unwrap();

        assert!(!check.passed);
        assert_eq!(check.issues.len(), 2);
        assert!((check.confidence - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_out_of_range_article() {
        let results = vec![ranked(AgentKind::Legal, json!({"articles": ["LUOS - Art. 250"]}))];
        let check = rules().check(&results, &kb()).await.unwrap();

        assert!(check
            .issues
            .contains(&"LUOS article number out of range: 250".to_string()));
        assert!((check.confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_known_miscitation_is_critical() {
        let results = vec![ranked(AgentKind::Legal, json!({"articles": ["LUOS - Art. 90"]}))];
        let check = rules().check(&results, &kb()).await.unwrap();

        assert!(check.has_critical_issue());
        assert!(check.confidence <= 0.2);
        assert!(check
            .issues
            .contains(&"CRITICAL: EIV is defined in LUOS - Art. 89, not Art. 90".to_string()));
    }

    #[tokio::test]
    async fn test_lookup_failure_only_degrades() {
        let results = vec![ranked(AgentKind::Legal, json!({"articles": ["LUOS - Art. 89"]}))];
        let check = rules().check(&results, &FailingKnowledgeBase).await.unwrap();
        assert!(check.passed);
        assert!((check.confidence - 0.9).abs() < 1e-9);
    }
}
