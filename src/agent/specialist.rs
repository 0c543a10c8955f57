//! The specialist contract and the registry the executor dispatches through.

use crate::error::AgentError;
use crate::models::{AgentKind, AgentResult, Context};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// A collaborator that answers one narrow slice of the question.
#[async_trait]
pub trait Specialist: Send + Sync {
    /// Which specialist this is.
    fn kind(&self) -> AgentKind;

    /// Answer `query` given the derived context.
    async fn process(&self, query: &str, context: &Context) -> Result<AgentResult, AgentError>;
}

/// Specialists addressable by kind.
#[derive(Clone, Default)]
pub struct SpecialistRegistry {
    specialists: HashMap<AgentKind, Arc<dyn Specialist>>,
}

impl SpecialistRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a specialist under its own kind, replacing any previous one.
    pub fn register(&mut self, specialist: Arc<dyn Specialist>) {
        self.specialists.insert(specialist.kind(), specialist);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, specialist: Arc<dyn Specialist>) -> Self {
        self.register(specialist);
        self
    }

    pub fn get(&self, kind: AgentKind) -> Option<Arc<dyn Specialist>> {
        self.specialists.get(&kind).cloned()
    }

    pub fn len(&self) -> usize {
        self.specialists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specialists.is_empty()
    }
}
