//! Context analysis.
//!
//! Turns a raw query plus a short slice of session history into the
//! [`Context`] every later stage works from. All detection runs through the
//! rule tables in [`rules`].

pub mod rules;

use crate::error::PipelineError;
use crate::memory::SessionMemory;
use crate::models::{Complexity, Context, Entities, SessionTurn, TemporalHints};
use rules::{EntityKind, RuleSet, Signal, TemporalEffect};
use tracing::{debug, warn};

/// Queries longer than this many words are high complexity.
const HIGH_COMPLEXITY_WORDS: usize = 30;
/// Queries longer than this many words are at least medium complexity.
const MEDIUM_COMPLEXITY_WORDS: usize = 15;

/// Builds a [`Context`] from a query and recent turns.
pub struct ContextAnalyzer {
    rules: RuleSet,
    history_limit: usize,
}

impl ContextAnalyzer {
    /// Compile the rule tables.
    pub fn new(history_limit: usize) -> Result<Self, PipelineError> {
        let rules = RuleSet::standard()
            .map_err(|e| PipelineError::Context(format!("invalid rule pattern: {}", e)))?;

        Ok(Self {
            rules,
            history_limit,
        })
    }

    /// Read recent history for the session and build the context.
    ///
    /// A failed history read is logged and treated as an empty history.
    pub async fn analyze(&self, query: &str, session_id: &str, memory: &SessionMemory) -> Context {
        let history = match memory.recent(session_id, self.history_limit).await {
            Ok(turns) => turns,
            Err(e) => {
                warn!("Could not read history for session {}: {}", session_id, e);
                Vec::new()
            }
        };

        self.build(query, &history)
    }

    /// Build the context from the query and turns ordered newest first.
    pub fn build(&self, query: &str, history: &[SessionTurn]) -> Context {
        let lowered = query.to_lowercase();
        let detects = |signal| self.rules.detects(signal, query, &lowered);

        let entities = Entities {
            articles: self.rules.extract(EntityKind::Article, query, &lowered),
            neighborhoods: self.rules.extract(EntityKind::Neighborhood, query, &lowered),
            zones: self.rules.extract(EntityKind::Zone, query, &lowered),
        };

        let mut previous_topics: Vec<String> = Vec::new();
        for topic in history.iter().flat_map(|turn| turn.context.topics()) {
            if !previous_topics.contains(&topic) {
                previous_topics.push(topic);
            }
        }

        let context = Context {
            query: query.to_string(),
            has_legal_reference: detects(Signal::Legal),
            has_location_reference: detects(Signal::Location),
            has_parameter_query: detects(Signal::Parameter),
            needs_explanation: detects(Signal::Explanation),
            requires_calculation: detects(Signal::Calculation),
            entities,
            complexity: self.complexity(query),
            temporal: self.temporal(query),
            previous_topics,
            needs_clarification: history.iter().any(|t| t.metadata.needs_clarification),
            refinement: None,
        };

        debug!(
            "Context: legal={} location={} parameter={} explanation={} calculation={} complexity={:?}",
            context.has_legal_reference,
            context.has_location_reference,
            context.has_parameter_query,
            context.needs_explanation,
            context.requires_calculation,
            context.complexity
        );

        context
    }

    fn complexity(&self, query: &str) -> Complexity {
        let words = query.split_whitespace().count();

        if words > HIGH_COMPLEXITY_WORDS || self.rules.is_comparison(query) {
            Complexity::High
        } else if words > MEDIUM_COMPLEXITY_WORDS || self.rules.has_multiple_topics(query) {
            Complexity::Medium
        } else {
            Complexity::Low
        }
    }

    fn temporal(&self, query: &str) -> TemporalHints {
        let mut hints = TemporalHints::default();
        for effect in self.rules.temporal_effects(query) {
            match effect {
                TemporalEffect::Version(version) => hints.version = Some(version.to_string()),
                TemporalEffect::Comparison => hints.comparison = true,
            }
        }
        hints
    }
}
