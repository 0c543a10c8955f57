use super::*;
use crate::agent::testing::Scripted;
use crate::error::MemoryError;
use crate::memory::InMemorySessionStore;
use crate::models::{SessionTurn, SubmitOptions, SynthesisSource};
use crate::synthesis::fallback::{LOW_CONFIDENCE_DISCLAIMER, UNABLE_TO_ANSWER};
use crate::synthesis::testing::FixedGenerator;
use crate::synthesis::DisabledGenerator;
use crate::validation::StaticKnowledgeBase;
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::collections::HashSet;

const LEGAL_QUERY: &str = "artigo 1º da luos";
const HEIGHT_QUERY: &str = "qual a altura máxima na ZOT 08.1?";

fn config() -> Config {
    let mut config = Config::default();
    config.agents.timeout_seconds = 1;
    config
}

fn build(
    specialists: &[Arc<Scripted>],
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn SessionStore>,
) -> Orchestrator {
    let config = config();
    let mut registry = SpecialistRegistry::new();
    for specialist in specialists {
        registry.register(specialist.clone());
    }

    Orchestrator::new(
        &config,
        Collaborators {
            specialists: registry,
            knowledge: Arc::new(StaticKnowledgeBase::from_config(&config.knowledge)),
            generator,
            store,
        },
    )
    .unwrap()
}

fn orchestrator(specialists: &[Arc<Scripted>]) -> Orchestrator {
    build(
        specialists,
        Arc::new(DisabledGenerator),
        Arc::new(InMemorySessionStore::new()),
    )
}

fn validator_agent() -> Arc<Scripted> {
    Arc::new(Scripted::answer(
        AgentKind::Validator,
        0.9,
        json!({"valid": true, "issues": []}),
    ))
}

fn legal_agent() -> Arc<Scripted> {
    Arc::new(Scripted::answer(
        AgentKind::Legal,
        0.8,
        json!({"articles": ["LUOS - Art. 1"], "laws": ["LUOS"], "concepts": ["Zoneamento"]}),
    ))
}

fn graph_agent() -> Arc<Scripted> {
    Arc::new(Scripted::answer(
        AgentKind::KnowledgeGraph,
        0.85,
        json!({"relationships": [{"source": "LUOS - Art. 89", "target": "EIV", "type": "DEFINES"}]}),
    ))
}

fn height_claim(kind: AgentKind, value: f64) -> Arc<Scripted> {
    Arc::new(Scripted::answer(
        kind,
        0.8,
        json!({
            "zones": ["ZOT 08.1"],
            "parameters": [{"zone": "ZOT 08.1", "parameter": "Altura Máxima", "value": value, "unit": "m"}],
        }),
    ))
}

fn conceptual_agent() -> Arc<Scripted> {
    Arc::new(Scripted::answer(
        AgentKind::Conceptual,
        0.7,
        json!({"explanation": "Altura máxima é o limite vertical da edificação."}),
    ))
}

fn count(stages: &[Stage], stage: Stage) -> usize {
    stages.iter().filter(|s| **s == stage).count()
}

async fn turns(orchestrator: &Orchestrator, session_id: &str) -> Vec<SessionTurn> {
    orchestrator.memory.recent(session_id, 10).await.unwrap()
}

#[tokio::test]
async fn test_valid_legal_answer_needs_no_refinement() {
    let legal = legal_agent();
    let orchestrator = orchestrator(&[validator_agent(), legal.clone()]);

    let response = orchestrator
        .submit(SubmitRequest::new(LEGAL_QUERY).with_session("s-a"))
        .await
        .unwrap();

    let metadata = &response.metadata;
    assert!(metadata.context.has_legal_reference);
    assert_eq!(metadata.agents_used, vec![AgentKind::Validator, AgentKind::Legal]);
    assert!(metadata.validation.is_valid, "issues: {:?}", metadata.validation.issues);
    assert!(!metadata.was_refined);
    assert_eq!(count(&metadata.stages, Stage::RefinementExecuted), 0);
    assert_eq!(legal.calls(), 1);

    assert_eq!(metadata.synthesis, SynthesisSource::Fallback);
    assert_eq!(response.response, "According to the legislation: LUOS - Art. 1.");
    assert_eq!(response.confidence, metadata.validation.confidence);
}

#[tokio::test]
async fn test_conflicting_heights_trigger_one_refinement() {
    let urban = height_claim(AgentKind::Urban, 130.0);
    let geographic = height_claim(AgentKind::Geographic, 95.0);
    let graph = graph_agent();
    let legal = Arc::new(Scripted::answer(
        AgentKind::Legal,
        0.8,
        json!({"articles": ["LUOS - Art. 89"], "concepts": ["EIV"]}),
    ));
    let orchestrator = orchestrator(&[
        validator_agent(),
        urban.clone(),
        geographic,
        conceptual_agent(),
        graph.clone(),
        legal.clone(),
    ]);

    let response = orchestrator
        .submit(SubmitRequest::new(HEIGHT_QUERY).with_session("s-b"))
        .await
        .unwrap();

    let metadata = &response.metadata;
    assert!(metadata.was_refined);
    assert_eq!(count(&metadata.stages, Stage::RefinementExecuted), 1);
    assert_eq!(
        metadata.agents_used,
        vec![AgentKind::KnowledgeGraph, AgentKind::Legal]
    );
    assert_eq!(metadata.context.round(), 1);

    let refinement = metadata.context.refinement.as_ref().unwrap();
    assert!(refinement
        .prior_issues
        .iter()
        .any(|i| i.starts_with("CRITICAL: Conflicting values for ZOT 08.1")));

    assert_eq!(urban.calls(), 1);
    assert_eq!(graph.calls(), 2);
    assert_eq!(legal.calls(), 1);
}

#[tokio::test]
async fn test_refinement_runs_once_even_if_it_fails_again() {
    let graph = Arc::new(Scripted::failing(AgentKind::KnowledgeGraph));
    let legal = Arc::new(Scripted::failing(AgentKind::Legal));
    let orchestrator = orchestrator(&[
        validator_agent(),
        height_claim(AgentKind::Urban, 130.0),
        height_claim(AgentKind::Geographic, 95.0),
        conceptual_agent(),
        graph.clone(),
        legal.clone(),
    ]);

    let response = orchestrator
        .submit(SubmitRequest::new(HEIGHT_QUERY))
        .await
        .unwrap();

    let verdict = &response.metadata.validation;
    assert!(verdict.requires_refinement);
    assert!(verdict.confidence <= 0.1);
    assert!(response.metadata.was_refined);
    assert_eq!(count(&response.metadata.stages, Stage::RefinementExecuted), 1);
    assert_eq!(legal.calls(), 1);
    assert_eq!(graph.calls(), 2);
}

#[tokio::test]
async fn test_all_specialists_failing_still_answers() {
    let orchestrator = orchestrator(&[
        Arc::new(Scripted::failing(AgentKind::Validator)),
        Arc::new(Scripted::failing(AgentKind::Legal)),
    ]);

    let response = orchestrator
        .submit(SubmitRequest::new(LEGAL_QUERY))
        .await
        .unwrap();

    let verdict = &response.metadata.validation;
    assert!(!verdict.is_valid);
    assert!(verdict.confidence <= 0.1);
    assert_eq!(verdict.issues, vec![crate::validation::NO_RESULTS]);
    assert_eq!(response.metadata.synthesis, SynthesisSource::Fallback);
    assert_eq!(
        response.response,
        format!("{}\n\n{}", UNABLE_TO_ANSWER, LOW_CONFIDENCE_DISCLAIMER)
    );
    assert!(response.confidence <= 0.1);
}

#[tokio::test]
async fn test_failed_and_hanging_specialists_are_left_out() {
    let orchestrator = orchestrator(&[
        validator_agent(),
        height_claim(AgentKind::Urban, 130.0),
        Arc::new(Scripted::failing(AgentKind::Geographic)),
        conceptual_agent(),
        Arc::new(Scripted::hanging(AgentKind::KnowledgeGraph)),
    ]);

    let mut request = SubmitRequest::new(HEIGHT_QUERY).with_session("s-soft");
    request.options.skip_refinement = true;
    let response = orchestrator.submit(request).await.unwrap();

    assert_eq!(response.metadata.agents_used.len(), 5);
    let stored = turns(&orchestrator, "s-soft").await;
    assert_eq!(stored.len(), 1);

    let answered: Vec<AgentKind> = stored[0].agent_results.iter().map(|r| r.agent_type).collect();
    assert_eq!(
        answered,
        vec![AgentKind::Validator, AgentKind::Urban, AgentKind::Conceptual]
    );
}

#[tokio::test]
async fn test_skip_refinement_option() {
    let legal = Arc::new(Scripted::answer(AgentKind::Legal, 0.8, json!({"articles": ["LUOS - Art. 89"]})));
    let orchestrator = orchestrator(&[
        validator_agent(),
        height_claim(AgentKind::Urban, 130.0),
        height_claim(AgentKind::Geographic, 95.0),
        conceptual_agent(),
        graph_agent(),
        legal.clone(),
    ]);

    let request = SubmitRequest {
        query: HEIGHT_QUERY.to_string(),
        session_id: None,
        options: SubmitOptions {
            model: None,
            skip_refinement: true,
        },
    };
    let response = orchestrator.submit(request).await.unwrap();

    assert!(response.metadata.validation.requires_refinement);
    assert!(response.metadata.validation.critical_issue_count() >= 1);
    assert!(!response.metadata.was_refined);
    assert_eq!(legal.calls(), 0);
}

#[tokio::test]
async fn test_turns_are_numbered_and_feed_the_next_context() {
    let orchestrator = orchestrator(&[validator_agent(), legal_agent()]);

    let first = orchestrator
        .submit(SubmitRequest::new(LEGAL_QUERY).with_session("s-turns"))
        .await
        .unwrap();
    assert!(first.metadata.context.previous_topics.is_empty());
    assert_eq!(count(&first.metadata.stages, Stage::Persisted), 1);

    let second = orchestrator
        .submit(SubmitRequest::new(LEGAL_QUERY).with_session("s-turns"))
        .await
        .unwrap();
    assert!(second.metadata.context.previous_topics.contains(&"legal".to_string()));

    let stored = turns(&orchestrator, "s-turns").await;
    let numbers: Vec<u64> = stored.iter().map(|t| t.turn_number).collect();
    assert_eq!(numbers, vec![2, 1]);
    assert_eq!(stored[0].response_text, second.response);
    assert_eq!(stored[0].metadata.agents_used, second.metadata.agents_used);
}

#[tokio::test]
async fn test_concurrent_requests_on_one_session() {
    let orchestrator = orchestrator(&[validator_agent(), legal_agent()]);

    let requests = (0..8).map(|_| {
        orchestrator.submit(SubmitRequest::new(LEGAL_QUERY).with_session("s-race"))
    });
    for response in join_all(requests).await {
        assert!(response.is_ok());
    }

    let stored = turns(&orchestrator, "s-race").await;
    let numbers: HashSet<u64> = stored.iter().map(|t| t.turn_number).collect();
    assert_eq!(stored.len(), 8);
    assert_eq!(numbers, (1..=8).collect());
}

/// Rejects every write.
struct BrokenStore;

#[async_trait]
impl SessionStore for BrokenStore {
    async fn recent_turns(&self, _session_id: &str, _limit: usize) -> Result<Vec<SessionTurn>, MemoryError> {
        Err(MemoryError::Io(std::io::Error::other("disk gone")))
    }

    async fn last_turn_number(&self, _session_id: &str) -> Result<Option<u64>, MemoryError> {
        Err(MemoryError::Io(std::io::Error::other("disk gone")))
    }

    async fn insert(&self, _turn: SessionTurn) -> Result<(), MemoryError> {
        Err(MemoryError::Io(std::io::Error::other("disk gone")))
    }
}

#[tokio::test]
async fn test_persistence_failure_does_not_fail_the_request() {
    let orchestrator = build(
        &[validator_agent(), legal_agent()],
        Arc::new(DisabledGenerator),
        Arc::new(BrokenStore),
    );

    let response = orchestrator
        .submit(SubmitRequest::new(LEGAL_QUERY))
        .await
        .unwrap();

    assert!(response.metadata.validation.is_valid);
    assert_eq!(count(&response.metadata.stages, Stage::Persisted), 0);
    assert_eq!(response.metadata.stages.last(), Some(&Stage::Synthesized));
}

#[tokio::test]
async fn test_generated_answer_and_model_hint() {
    let generator = Arc::new(FixedGenerator::answering("O artigo 1º da LUOS define seus objetivos."));
    let orchestrator = build(
        &[validator_agent(), legal_agent()],
        generator.clone(),
        Arc::new(InMemorySessionStore::new()),
    );

    let mut request = SubmitRequest::new(LEGAL_QUERY);
    request.options.model = Some("claude-3-5-sonnet-20241022".to_string());
    let response = orchestrator.submit(request).await.unwrap();

    assert_eq!(response.response, "O artigo 1º da LUOS define seus objetivos.");
    assert_eq!(response.metadata.synthesis, SynthesisSource::Generated);
    assert_eq!(response.metadata.model, "anthropic/claude-3-5-sonnet-20241022");
    assert_eq!(response.confidence, response.metadata.validation.confidence);
    assert!(response.metadata.session_id.starts_with("session_"));
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn test_technical_faults_surface_as_errors() {
    let empty = orchestrator(&[]);
    let err = orchestrator(&[validator_agent()])
        .submit(SubmitRequest::new("   "))
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyQuery));

    let err = empty.submit(SubmitRequest::new(LEGAL_QUERY)).await.unwrap_err();
    assert!(matches!(err, PipelineError::Dispatch(_)));
}
