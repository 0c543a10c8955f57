//! Rule tables for intent signals, entities and temporal hints.
//!
//! Each table maps a pattern or a keyword list to what it detects. The
//! analyzer only walks the compiled tables, so adding a term or a new
//! pattern never touches control flow.

use regex::Regex;

/// Boolean intent signals a query can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Legal,
    Location,
    Parameter,
    Explanation,
    Calculation,
}

/// How a rule recognises its signal.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// Any keyword occurs in the lower-cased query.
    Keywords(&'static [&'static str]),
    /// The regular expression matches the raw query.
    Pattern(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct SignalRule {
    pub signal: Signal,
    pub matcher: Matcher,
}

/// Kinds of entity the analyzer extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Article,
    Neighborhood,
    Zone,
}

/// How an entity rule pulls values out of the query.
#[derive(Debug, Clone, Copy)]
pub enum Extractor {
    /// First capture group of every match.
    Capture(&'static str),
    /// Capture groups 1 and 2 joined by a space, upper-cased.
    Code(&'static str),
    /// Case-insensitive occurrence of a known name; yields the canonical name.
    Gazetteer(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct EntityRule {
    pub kind: EntityKind,
    pub extractor: Extractor,
}

/// Effect of a temporal rule on the hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalEffect {
    Version(&'static str),
    Comparison,
}

#[derive(Debug, Clone, Copy)]
pub struct TemporalRule {
    pub pattern: &'static str,
    pub effect: TemporalEffect,
}

const LEGAL_CONCEPTS: &[&str] = &[
    "eiv",
    "estudo de impacto",
    "impacto de vizinhança",
    "zeis",
    "zonas especiais",
    "interesse social",
    "outorga onerosa",
    "direito de construir",
    "coeficiente de aproveitamento",
    "taxa de ocupação",
    "taxa de permeabilidade",
    "área de preservação",
    "preservação permanente",
    "zoneamento",
    "uso do solo",
    "plano diretor",
    "política urbana",
];

const LOCATION_TERMS: &[&str] = &[
    "bairro",
    "zona",
    "zot",
    "centro",
    "distrito",
    "boa vista",
    "centro histórico",
    "restinga",
    "cidade baixa",
    "moinhos de vento",
    "ipanema",
];

const PARAMETER_TERMS: &[&str] = &[
    "altura",
    "coeficiente",
    "taxa",
    "regime",
    "parâmetro",
    "máxima",
    "mínima",
    "permitida",
    "gabarito",
    "aproveitamento",
    "ocupação",
    "permeabilidade",
];

/// Neighborhoods recognised by name. Longer names that contain a shorter
/// one are listed too; both are extracted.
pub const NEIGHBORHOODS: &[&str] = &[
    "Centro Histórico",
    "Boa Vista",
    "Boa Vista do Sul",
    "Três Figueiras",
    "Mário Quintana",
    "Cidade Baixa",
    "Moinhos de Vento",
    "Petrópolis",
    "Menino Deus",
    "Restinga",
    "Ipanema",
];

pub const SIGNAL_RULES: &[SignalRule] = &[
    SignalRule {
        signal: Signal::Legal,
        matcher: Matcher::Pattern(r"(?i)\b(?:artigo|art\.?)\s*\d+|\b(?:luos|pdus)\b|\bapp\b"),
    },
    SignalRule {
        signal: Signal::Legal,
        matcher: Matcher::Keywords(LEGAL_CONCEPTS),
    },
    SignalRule {
        signal: Signal::Location,
        matcher: Matcher::Keywords(LOCATION_TERMS),
    },
    SignalRule {
        signal: Signal::Parameter,
        matcher: Matcher::Keywords(PARAMETER_TERMS),
    },
    SignalRule {
        signal: Signal::Explanation,
        matcher: Matcher::Pattern(r"(?i)o que é|como funciona|explique|defina|\bonde\b|\bqual\b"),
    },
    SignalRule {
        signal: Signal::Calculation,
        matcher: Matcher::Pattern(r"(?i)calcular|\bquanto|\bvalor\b|\btotal\b"),
    },
];

pub const ENTITY_RULES: &[EntityRule] = &[
    EntityRule {
        kind: EntityKind::Article,
        extractor: Extractor::Capture(r"(?i)\b(?:artigo|art\.?)\s*(\d+)"),
    },
    EntityRule {
        kind: EntityKind::Neighborhood,
        extractor: Extractor::Gazetteer(NEIGHBORHOODS),
    },
    EntityRule {
        kind: EntityKind::Zone,
        extractor: Extractor::Code(r"(?i)\b(ZOT|ZEIS)\s*(\d+(?:\.\d+)*)"),
    },
];

/// Applied in order; a later version rule overrides an earlier one.
pub const TEMPORAL_RULES: &[TemporalRule] = &[
    TemporalRule {
        pattern: r"(?i)\b(?:novo|nova|atual|2025)\b",
        effect: TemporalEffect::Version("2025"),
    },
    TemporalRule {
        pattern: r"(?i)\b(?:antes|anterior|antigo|2024)\b",
        effect: TemporalEffect::Version("2024"),
    },
    TemporalRule {
        pattern: r"(?i)mudança|alteração|diferença",
        effect: TemporalEffect::Comparison,
    },
];

pub const COMPARISON_PATTERN: &str = r"(?i)diferença|comparar|versus|melhor";
pub const MULTI_TOPIC_PATTERN: &str = r"(?i)\se\s|\sou\s|,";

pub(crate) enum CompiledMatcher {
    Keywords(&'static [&'static str]),
    Pattern(Regex),
}

impl CompiledMatcher {
    fn matches(&self, query: &str, lowered: &str) -> bool {
        match self {
            CompiledMatcher::Keywords(words) => words.iter().any(|w| lowered.contains(w)),
            CompiledMatcher::Pattern(re) => re.is_match(query),
        }
    }
}

pub(crate) enum CompiledExtractor {
    Capture(Regex),
    Code(Regex),
    Gazetteer(&'static [&'static str]),
}

impl CompiledExtractor {
    fn extract(&self, query: &str, lowered: &str) -> Vec<String> {
        match self {
            CompiledExtractor::Capture(re) => re
                .captures_iter(query)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .collect(),
            CompiledExtractor::Code(re) => re
                .captures_iter(query)
                .filter_map(|c| Some(format!("{} {}", c.get(1)?.as_str(), c.get(2)?.as_str())))
                .map(|code| code.to_uppercase())
                .collect(),
            CompiledExtractor::Gazetteer(names) => {
                let mut hits: Vec<(usize, &str)> = names
                    .iter()
                    .filter_map(|name| lowered.find(&name.to_lowercase()).map(|at| (at, *name)))
                    .collect();
                // Stable: names starting at the same offset keep table order.
                hits.sort_by_key(|(at, _)| *at);
                hits.into_iter().map(|(_, name)| name.to_string()).collect()
            }
        }
    }
}

/// Compiled form of all rule tables.
pub struct RuleSet {
    signals: Vec<(Signal, CompiledMatcher)>,
    entities: Vec<(EntityKind, CompiledExtractor)>,
    temporal: Vec<(Regex, TemporalEffect)>,
    comparison: Regex,
    multi_topic: Regex,
}

impl RuleSet {
    /// Compile the built-in tables.
    pub fn standard() -> Result<Self, regex::Error> {
        Self::compile(SIGNAL_RULES, ENTITY_RULES, TEMPORAL_RULES)
    }

    /// Compile arbitrary tables.
    pub fn compile(
        signal_rules: &[SignalRule],
        entity_rules: &[EntityRule],
        temporal_rules: &[TemporalRule],
    ) -> Result<Self, regex::Error> {
        let signals = signal_rules
            .iter()
            .map(|rule| {
                let matcher = match rule.matcher {
                    Matcher::Keywords(words) => CompiledMatcher::Keywords(words),
                    Matcher::Pattern(p) => CompiledMatcher::Pattern(Regex::new(p)?),
                };
                Ok((rule.signal, matcher))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let entities = entity_rules
            .iter()
            .map(|rule| {
                let extractor = match rule.extractor {
                    Extractor::Capture(p) => CompiledExtractor::Capture(Regex::new(p)?),
                    Extractor::Code(p) => CompiledExtractor::Code(Regex::new(p)?),
                    Extractor::Gazetteer(names) => CompiledExtractor::Gazetteer(names),
                };
                Ok((rule.kind, extractor))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        let temporal = temporal_rules
            .iter()
            .map(|rule| Ok((Regex::new(rule.pattern)?, rule.effect)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            signals,
            entities,
            temporal,
            comparison: Regex::new(COMPARISON_PATTERN)?,
            multi_topic: Regex::new(MULTI_TOPIC_PATTERN)?,
        })
    }

    /// True if any rule for `signal` matches.
    pub fn detects(&self, signal: Signal, query: &str, lowered: &str) -> bool {
        self.signals
            .iter()
            .filter(|(s, _)| *s == signal)
            .any(|(_, matcher)| matcher.matches(query, lowered))
    }

    /// All values of one entity kind, first-seen order, no duplicates.
    pub fn extract(&self, kind: EntityKind, query: &str, lowered: &str) -> Vec<String> {
        let mut values: Vec<String> = Vec::new();
        for (_, extractor) in self.entities.iter().filter(|(k, _)| *k == kind) {
            for value in extractor.extract(query, lowered) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        values
    }

    /// Temporal effects whose pattern matches, in table order.
    pub fn temporal_effects(&self, query: &str) -> Vec<TemporalEffect> {
        self.temporal
            .iter()
            .filter(|(re, _)| re.is_match(query))
            .map(|(_, effect)| *effect)
            .collect()
    }

    pub fn is_comparison(&self, query: &str) -> bool {
        self.comparison.is_match(query)
    }

    pub fn has_multiple_topics(&self, query: &str) -> bool {
        self.multi_topic.is_match(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::standard().unwrap()
    }

    fn detects(signal: Signal, query: &str) -> bool {
        rules().detects(signal, query, &query.to_lowercase())
    }

    #[test]
    fn test_signal_table() {
        let cases = [
            (Signal::Legal, "artigo 1º da luos", true),
            (Signal::Legal, "o que diz o art. 89?", true),
            (Signal::Legal, "regras de outorga onerosa", true),
            (Signal::Legal, "o que é app?", true),
            (Signal::Legal, "melhor approach", false),
            (Signal::Location, "imóveis no bairro Petrópolis", true),
            (Signal::Location, "artigo 1º da luos", false),
            (Signal::Parameter, "altura máxima permitida", true),
            (Signal::Explanation, "como funciona o EIV", true),
            (Signal::Explanation, "artigo 1º da luos", false),
            (Signal::Calculation, "quanto posso construir", true),
            (Signal::Calculation, "valorização do imóvel", false),
        ];

        for (signal, query, expected) in cases {
            assert_eq!(detects(signal, query), expected, "{:?} on {:?}", signal, query);
        }
    }

    #[test]
    fn test_article_extraction() {
        let query = "Compare o artigo 89 e o Art. 92 da LUOS";
        let articles = rules().extract(EntityKind::Article, query, &query.to_lowercase());
        assert_eq!(articles, vec!["89", "92"]);
    }

    #[test]
    fn test_zone_codes_are_normalised() {
        let query = "altura na zot 08.1 e na ZOT8";
        let zones = rules().extract(EntityKind::Zone, query, &query.to_lowercase());
        assert_eq!(zones, vec!["ZOT 08.1", "ZOT 8"]);
    }

    #[test]
    fn test_gazetteer_uses_canonical_names() {
        let query = "gabarito em boa vista do sul";
        let names = rules().extract(EntityKind::Neighborhood, query, &query.to_lowercase());
        assert_eq!(names, vec!["Boa Vista", "Boa Vista do Sul"]);
    }

    #[test]
    fn test_neighborhoods_follow_query_order() {
        let query = "compare Petrópolis e Centro Histórico";
        let names = rules().extract(EntityKind::Neighborhood, query, &query.to_lowercase());
        assert_eq!(names, vec!["Petrópolis", "Centro Histórico"]);
    }

    #[test]
    fn test_temporal_effects_in_order() {
        let effects = rules().temporal_effects("qual a diferença entre o plano novo e o anterior?");
        assert_eq!(
            effects,
            vec![
                TemporalEffect::Version("2025"),
                TemporalEffect::Version("2024"),
                TemporalEffect::Comparison,
            ]
        );
    }

    #[test]
    fn test_bad_pattern_fails_compilation() {
        let broken = [SignalRule {
            signal: Signal::Legal,
            matcher: Matcher::Pattern("(unclosed"),
        }];
        assert!(RuleSet::compile(&broken, ENTITY_RULES, TEMPORAL_RULES).is_err());
    }
}
