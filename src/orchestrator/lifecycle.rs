//! Request lifecycle.
//!
//! Stages only move forward along fixed edges. The refinement stage is only
//! reachable from `Validated` and nothing leads back there, so a request can
//! refine at most once; the counter enforces the same bound explicitly.

use crate::error::PipelineError;
use crate::models::Stage;
use tracing::debug;

/// Refinement rounds allowed per request.
pub const MAX_REFINEMENTS: u8 = 1;

#[derive(Debug, Clone)]
pub struct Lifecycle {
    stage: Stage,
    trail: Vec<Stage>,
    refinements: u8,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            stage: Stage::Received,
            trail: vec![Stage::Received],
            refinements: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn was_refined(&self) -> bool {
        self.refinements > 0
    }

    pub fn into_trail(self) -> Vec<Stage> {
        self.trail
    }

    /// Move to `next`.
    ///
    /// # Errors
    /// `PipelineError::IllegalTransition` if there is no edge from the
    /// current stage, or the refinement budget is spent.
    pub fn advance(&mut self, next: Stage) -> Result<(), PipelineError> {
        let budget_spent = next == Stage::RefinementExecuted && self.refinements >= MAX_REFINEMENTS;
        if budget_spent || !is_edge(self.stage, next) {
            return Err(PipelineError::IllegalTransition {
                from: self.stage.to_string(),
                to: next.to_string(),
            });
        }

        if next == Stage::RefinementExecuted {
            self.refinements += 1;
        }

        debug!("Stage {} -> {}", self.stage, next);
        self.stage = next;
        self.trail.push(next);
        Ok(())
    }
}

fn is_edge(from: Stage, to: Stage) -> bool {
    use Stage::*;

    matches!(
        (from, to),
        (Received, ContextBuilt)
            | (ContextBuilt, Routed)
            | (Routed, Executed)
            | (Executed, Ranked)
            | (Ranked, Validated)
            | (Validated, RefinementExecuted)
            | (Validated, Synthesized)
            | (RefinementExecuted, Synthesized)
            | (Synthesized, Persisted)
    )
}
