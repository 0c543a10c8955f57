//! Error types for the request pipeline and its collaborators.
//!
//! Only [`PipelineError`] ever reaches the caller of `submit`. Every other
//! error here is absorbed at the stage that produced it and turned into a
//! log line, an excluded result or a degraded confidence.

use crate::models::AgentKind;
use thiserror::Error;

/// A required stage could not run at all.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Query is required")]
    EmptyQuery,

    #[error("Context analysis failed: {0}")]
    Context(String),

    #[error("Routing failed: {0}")]
    Routing(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Illegal lifecycle transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

/// A single specialist call failed or timed out.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent {agent} timed out after {seconds}s")]
    Timeout { agent: AgentKind, seconds: u64 },

    #[error("Cannot reach agent {agent}: {source}")]
    Transport {
        agent: AgentKind,
        #[source]
        source: reqwest::Error,
    },

    #[error("Agent {agent} returned HTTP {status}: {body}")]
    Status {
        agent: AgentKind,
        status: u16,
        body: String,
    },

    #[error("Agent {agent} returned an unreadable payload: {message}")]
    Decode { agent: AgentKind, message: String },

    #[error("No specialist registered for {0}")]
    NotRegistered(AgentKind),
}

impl AgentError {
    /// The specialist the error belongs to.
    pub fn agent(&self) -> AgentKind {
        match self {
            AgentError::Timeout { agent, .. }
            | AgentError::Transport { agent, .. }
            | AgentError::Status { agent, .. }
            | AgentError::Decode { agent, .. } => *agent,
            AgentError::NotRegistered(agent) => *agent,
        }
    }
}

/// The text-generation collaborator could not produce an answer.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation timed out after {0}s")]
    Timeout(u64),

    #[error("Cannot reach synthesizer at {endpoint}: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Synthesizer error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse synthesizer response: {0}")]
    Decode(String),

    #[error("Synthesizer returned an empty answer")]
    EmptyText,

    #[error("Generation is disabled")]
    Disabled,
}

/// Reading or writing session turns failed.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Turn {turn_number} already exists for session {session_id}")]
    DuplicateTurn { session_id: String, turn_number: u64 },

    #[error("Session store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A knowledge-base lookup failed (as opposed to returning "not found").
#[derive(Error, Debug)]
pub enum KnowledgeError {
    #[error("Knowledge base unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Knowledge base error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Knowledge base lookup failed: {0}")]
    Lookup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_error_reports_its_agent() {
        let err = AgentError::Timeout {
            agent: AgentKind::Legal,
            seconds: 5,
        };
        assert_eq!(err.agent(), AgentKind::Legal);
        assert_eq!(err.to_string(), "Agent legal timed out after 5s");

        let err = AgentError::NotRegistered(AgentKind::KnowledgeGraph);
        assert_eq!(err.agent(), AgentKind::KnowledgeGraph);
    }

    #[test]
    fn test_duplicate_turn_message() {
        let err = MemoryError::DuplicateTurn {
            session_id: "s1".to_string(),
            turn_number: 3,
        };
        assert_eq!(err.to_string(), "Turn 3 already exists for session s1");
    }
}
