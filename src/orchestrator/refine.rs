//! The single escalated re-run after a failed verdict.

use super::{Orchestrator, Pass};
use crate::error::PipelineError;
use crate::routing::refinement_directives;
use tracing::info;

impl Orchestrator {
    /// Re-run fan-out, rerank and validate once with an escalated context
    /// and forced high-authority routing.
    ///
    /// The second verdict is returned whatever it says; callers never loop
    /// on it.
    pub(super) async fn refine(&self, query: &str, first: Pass) -> Result<Pass, PipelineError> {
        let context = first.context.escalate(&first.verdict);
        let directives = refinement_directives();

        info!(
            "Refinement round {}: {} issues at confidence {:.2}",
            context.round(),
            first.verdict.issues.len(),
            first.verdict.confidence
        );

        let dispatched = self.executor.execute(&directives, query, &context).await?;
        let agent_results = dispatched.iter().map(|d| d.result.clone()).collect();
        let ranked = self.reranker.rerank(dispatched, &context);
        let verdict = self.validator.validate(&ranked, Some(&context)).await;

        info!(
            "Refinement done: valid={} confidence {:.2} -> {:.2}",
            verdict.is_valid, first.verdict.confidence, verdict.confidence
        );

        Ok(Pass {
            context,
            directives,
            agent_results,
            ranked,
            verdict,
        })
    }
}
