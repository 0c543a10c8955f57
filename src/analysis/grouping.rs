//! Grouping of ranked results by specialist type.

use crate::models::{AgentKind, RankedResult};
use serde_json::Value;
use std::collections::BTreeMap;

/// Payloads grouped by specialist type, each group in ranked order.
pub fn group_payloads(results: &[RankedResult]) -> BTreeMap<AgentKind, Vec<Value>> {
    let mut grouped: BTreeMap<AgentKind, Vec<Value>> = BTreeMap::new();

    for ranked in results {
        grouped
            .entry(ranked.result.agent_type)
            .or_default()
            .push(ranked.result.data.clone());
    }

    grouped
}

/// Results of one specialist type, in ranked order.
pub fn of_kind(results: &[RankedResult], kind: AgentKind) -> impl Iterator<Item = &RankedResult> {
    results.iter().filter(move |r| r.result.agent_type == kind)
}
