//! Deterministic stand-ins for specialists.
//!
//! Only used when `agents.use_stubs` is set, to substitute a specialist
//! call that failed. Payloads are fixed so test runs are reproducible.

use crate::models::{AgentKind, AgentResult, Context};
use serde_json::json;

/// Canned answer for `kind`.
pub fn respond(kind: AgentKind, context: &Context) -> AgentResult {
    match kind {
        AgentKind::Legal => {
            let articles = if context.has_legal_reference {
                json!(["LUOS - Art. 89", "PDUS - Art. 92"])
            } else {
                json!([])
            };
            AgentResult::new(
                kind,
                0.8,
                json!({
                    "articles": articles,
                    "laws": ["LUOS", "PDUS"],
                    "concepts": ["EIV", "ZEIS"],
                }),
            )
        }
        AgentKind::Urban => AgentResult::new(
            kind,
            0.75,
            json!({
                "zones": ["ZOT 08.1"],
                "parameters": [
                    {"zone": "ZOT 08.1", "parameter": "Altura Máxima", "value": 130.0, "unit": "m"},
                    {"zone": "ZOT 08.1", "parameter": "Coeficiente de Aproveitamento Básico", "value": 2.0},
                ],
            }),
        ),
        AgentKind::Validator => AgentResult::new(kind, 0.9, json!({"valid": true, "issues": []})),
        AgentKind::KnowledgeGraph => AgentResult::new(
            kind,
            0.85,
            json!({
                "nodes": ["EIV", "LUOS - Art. 89"],
                "relationships": [
                    {"source": "LUOS - Art. 89", "target": "EIV", "type": "DEFINES"}
                ],
            }),
        ),
        _ => AgentResult::new(kind, 0.5, json!({})),
    }
}
