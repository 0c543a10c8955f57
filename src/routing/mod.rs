//! Routing: which specialists to call for a context, and at what priority.

use crate::models::{AgentKind, Complexity, Context, Priority, RoutingDirective};

/// Directive count above which the fact graph is added to the fan-out.
const GRAPH_FANOUT_THRESHOLD: usize = 3;

/// Map a context to its directive list.
///
/// Pure and deterministic. The validator is always first; the list order is
/// construction order and says nothing about execution order.
pub fn route(context: &Context) -> Vec<RoutingDirective> {
    let mut directives = vec![RoutingDirective::new(AgentKind::Validator, Priority::Critical)];

    if context.has_legal_reference {
        directives.push(RoutingDirective::new(AgentKind::Legal, Priority::High));
    }

    if context.has_location_reference || context.has_parameter_query {
        directives.push(RoutingDirective::new(AgentKind::Urban, Priority::High));
        directives.push(RoutingDirective::new(AgentKind::Geographic, Priority::Medium));
    }

    if context.needs_explanation {
        directives.push(RoutingDirective::new(AgentKind::Conceptual, Priority::Medium));
    }

    if context.requires_calculation {
        directives.push(RoutingDirective::new(AgentKind::Calculator, Priority::High));
    }

    if context.complexity == Complexity::High || directives.len() > GRAPH_FANOUT_THRESHOLD {
        directives.push(RoutingDirective::new(AgentKind::KnowledgeGraph, Priority::High));
    }

    directives
}

/// Forced high-authority directives for the refinement round.
pub fn refinement_directives() -> Vec<RoutingDirective> {
    vec![
        RoutingDirective::new(AgentKind::KnowledgeGraph, Priority::Critical),
        RoutingDirective::new(AgentKind::Legal, Priority::Critical),
    ]
}
