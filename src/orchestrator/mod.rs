//! Request orchestration.
//!
//! [`Orchestrator::submit`] runs one request through context analysis,
//! routing, fan-out, reranking and validation, at most one refinement
//! round, synthesis and persistence. Only a fault in the first three
//! stages reaches the caller; everything after them degrades instead.

pub mod lifecycle;
mod refine;

#[cfg(test)]
mod tests;

use crate::agent::{FanOutExecutor, SpecialistRegistry};
use crate::analysis::Reranker;
use crate::config::{Config, ModelConfig};
use crate::context::ContextAnalyzer;
use crate::error::PipelineError;
use crate::memory::{SessionMemory, SessionStore};
use crate::models::{
    AgentKind, AgentResult, CheckCategory, Context, RankedResult, ResponseMetadata,
    RoutingDirective, Stage, SubmitRequest, SubmitResponse, TurnDraft, TurnMetadata,
    ValidationVerdict,
};
use crate::routing::route;
use crate::synthesis::{Synthesizer, TextGenerator};
use crate::validation::{KnowledgeBase, Validator};
use anyhow::Result;
use lifecycle::Lifecycle;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// External collaborators the orchestrator is wired to.
pub struct Collaborators {
    pub specialists: SpecialistRegistry,
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub generator: Arc<dyn TextGenerator>,
    pub store: Arc<dyn SessionStore>,
}

/// Everything one pass of fan-out, rerank and validate produced.
#[derive(Debug, Clone)]
pub(crate) struct Pass {
    pub context: Context,
    pub directives: Vec<RoutingDirective>,
    pub agent_results: Vec<AgentResult>,
    pub ranked: Vec<RankedResult>,
    pub verdict: ValidationVerdict,
}

impl Pass {
    fn agents_used(&self) -> Vec<AgentKind> {
        self.directives.iter().map(|d| d.agent).collect()
    }

    /// The answer left an ambiguity the user should resolve.
    fn needs_clarification(&self) -> bool {
        self.verdict
            .checks
            .iter()
            .any(|c| c.category == CheckCategory::Ambiguity && !c.passed)
    }
}

pub struct Orchestrator {
    analyzer: ContextAnalyzer,
    executor: FanOutExecutor,
    reranker: Reranker,
    validator: Validator,
    synthesizer: Synthesizer,
    memory: SessionMemory,
    model: ModelConfig,
}

impl Orchestrator {
    pub fn new(config: &Config, collaborators: Collaborators) -> Result<Self> {
        Ok(Self {
            analyzer: ContextAnalyzer::new(config.general.history_limit)?,
            executor: FanOutExecutor::new(collaborators.specialists, &config.agents),
            reranker: Reranker::new(config.rerank),
            validator: Validator::new(config.validation.clone(), collaborators.knowledge)?,
            synthesizer: Synthesizer::new(
                collaborators.generator,
                config.validation.confidence_threshold,
            ),
            memory: SessionMemory::new(collaborators.store),
            model: config.model.clone(),
        })
    }

    /// Answer one query.
    ///
    /// # Errors
    /// `PipelineError` if the query is empty or context building, routing
    /// or dispatch cannot run. Low confidence is reported, not raised.
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse, PipelineError> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let session_id = request
            .session_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(new_session_id);
        let model = self.model.resolve(request.options.model.as_deref());
        info!("Processing query for session {} with {}", session_id, model);

        let mut lifecycle = Lifecycle::new();

        let context = self.analyzer.analyze(query, &session_id, &self.memory).await;
        lifecycle.advance(Stage::ContextBuilt)?;

        let directives = route(&context);
        if directives.is_empty() {
            return Err(PipelineError::Routing("no specialist selected".to_string()));
        }
        lifecycle.advance(Stage::Routed)?;

        let dispatched = self.executor.execute(&directives, query, &context).await?;
        lifecycle.advance(Stage::Executed)?;

        let agent_results = dispatched.iter().map(|d| d.result.clone()).collect();
        let ranked = self.reranker.rerank(dispatched, &context);
        lifecycle.advance(Stage::Ranked)?;

        let verdict = self.validator.validate(&ranked, Some(&context)).await;
        lifecycle.advance(Stage::Validated)?;

        let mut pass = Pass {
            context,
            directives,
            agent_results,
            ranked,
            verdict,
        };

        if pass.verdict.requires_refinement {
            if request.options.skip_refinement {
                info!("Refinement required but disabled for this request");
            } else {
                lifecycle.advance(Stage::RefinementExecuted)?;
                pass = self.refine(query, pass).await?;
            }
        }

        let synthesis = self
            .synthesizer
            .synthesize(&pass.ranked, &pass.verdict, &pass.context, &model)
            .await;
        lifecycle.advance(Stage::Synthesized)?;
        debug!(
            "Synthesis from {:?} (generator confidence {:.2})",
            synthesis.source, synthesis.confidence
        );

        let confidence = pass.verdict.confidence;
        let was_refined = lifecycle.was_refined();
        let draft = TurnDraft {
            session_id: session_id.clone(),
            query: query.to_string(),
            context: pass.context.clone(),
            agent_results: pass.agent_results.clone(),
            response_text: synthesis.text.clone(),
            confidence,
            metadata: TurnMetadata {
                agents_used: pass.agents_used(),
                was_refined,
                needs_clarification: pass.needs_clarification(),
            },
        };
        if self.persist(draft).await {
            lifecycle.advance(Stage::Persisted)?;
        }

        Ok(SubmitResponse {
            response: synthesis.text,
            confidence,
            metadata: ResponseMetadata {
                agents_used: pass.agents_used(),
                validation: pass.verdict,
                context: pass.context,
                was_refined,
                session_id,
                model,
                synthesis: synthesis.source,
                stages: lifecycle.into_trail(),
            },
        })
    }

    /// Best effort: a failed write is logged and otherwise ignored.
    async fn persist(&self, draft: TurnDraft) -> bool {
        let session_id = draft.session_id.clone();
        match self.memory.append(draft).await {
            Ok(turn_number) => {
                debug!("Stored turn {} of session {}", turn_number, session_id);
                true
            }
            Err(e) => {
                warn!("Failed to store turn for session {}: {}", session_id, e);
                false
            }
        }
    }
}

fn new_session_id() -> String {
    format!("session_{}", Uuid::new_v4())
}
