//! Concurrent fan-out over routing directives.
//!
//! Every directive becomes one call, bounded by a per-call timeout. All
//! calls are joined before anything is returned; a failed or timed-out call
//! is logged and left out of the result set.

use super::specialist::SpecialistRegistry;
use super::stub;
use crate::config::AgentsConfig;
use crate::error::{AgentError, PipelineError};
use crate::models::{AgentKind, AgentResult, Context, DispatchedResult, RoutingDirective};
use futures::future::join_all;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct FanOutExecutor {
    registry: SpecialistRegistry,
    timeout: Duration,
    use_stubs: bool,
}

impl FanOutExecutor {
    pub fn new(registry: SpecialistRegistry, config: &AgentsConfig) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(config.timeout_seconds),
            use_stubs: config.use_stubs,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dispatch every directive and return the successful results in
    /// directive order.
    ///
    /// # Errors
    /// `PipelineError::Dispatch` if there is nothing to dispatch or no
    /// specialist is registered at all.
    pub async fn execute(
        &self,
        directives: &[RoutingDirective],
        query: &str,
        context: &Context,
    ) -> Result<Vec<DispatchedResult>, PipelineError> {
        if directives.is_empty() {
            return Err(PipelineError::Dispatch("no directives to dispatch".to_string()));
        }
        if self.registry.is_empty() && !self.use_stubs {
            return Err(PipelineError::Dispatch("no specialists registered".to_string()));
        }

        info!(
            "Dispatching {} specialists: {}",
            directives.len(),
            directives
                .iter()
                .map(|d| format!("{}({})", d.agent, d.priority))
                .collect::<Vec<_>>()
                .join(", ")
        );

        let calls = directives
            .iter()
            .map(|directive| self.dispatch(directive.agent, query, context));
        let settled = join_all(calls).await;

        let mut results = Vec::with_capacity(directives.len());
        for (directive, outcome) in directives.iter().zip(settled) {
            match outcome {
                Ok(result) => {
                    debug!(
                        "Specialist {} answered with confidence {:.2}",
                        directive.agent, result.confidence
                    );
                    results.push(DispatchedResult {
                        priority: directive.priority,
                        result,
                    });
                }
                Err(e) => warn!("Specialist {} excluded: {}", directive.agent, e),
            }
        }

        info!("{} of {} specialists answered", results.len(), directives.len());
        Ok(results)
    }

    async fn dispatch(
        &self,
        kind: AgentKind,
        query: &str,
        context: &Context,
    ) -> Result<AgentResult, AgentError> {
        match self.call(kind, query, context).await {
            Err(e) if self.use_stubs => {
                warn!("Specialist {} failed ({}), substituting stub", kind, e);
                Ok(stub::respond(kind, context))
            }
            outcome => outcome,
        }
    }

    async fn call(
        &self,
        kind: AgentKind,
        query: &str,
        context: &Context,
    ) -> Result<AgentResult, AgentError> {
        let specialist = self
            .registry
            .get(kind)
            .ok_or(AgentError::NotRegistered(kind))?;

        match tokio::time::timeout(self.timeout, specialist.process(query, context)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AgentError::Timeout {
                agent: kind,
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}
