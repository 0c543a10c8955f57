//! Response synthesis.
//!
//! The [`Synthesizer`] asks the text-generation collaborator first and falls
//! back to [`fallback::compose`] whenever that call fails or is disabled.

pub mod fallback;
pub mod generator;

pub use generator::{DisabledGenerator, GenerationRequest, Generated, TextGenerator};

use crate::analysis::group_payloads;
use crate::error::GenerationError;
use crate::models::{Context, RankedResult, SynthesisSource, ValidationVerdict};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final answer text and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
    pub confidence: f64,
    pub source: SynthesisSource,
}

pub struct Synthesizer {
    generator: Arc<dyn TextGenerator>,
    confidence_threshold: f64,
}

impl Synthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, confidence_threshold: f64) -> Self {
        Self {
            generator,
            confidence_threshold,
        }
    }

    pub async fn synthesize(
        &self,
        results: &[RankedResult],
        verdict: &ValidationVerdict,
        context: &Context,
        model: &str,
    ) -> Synthesis {
        let request = GenerationRequest {
            original_query: &context.query,
            strategy: generator::STRATEGY,
            agent_payloads: group_payloads(results),
            model,
        };

        match self.generator.generate(&request).await {
            Ok(generated) => {
                info!("Synthesized response with {}", model);
                return Synthesis {
                    text: generated.text,
                    confidence: generated.confidence,
                    source: SynthesisSource::Generated,
                };
            }
            Err(GenerationError::Disabled) => debug!("Generation disabled, using fallback"),
            Err(e) => warn!("Generation failed, using fallback: {}", e),
        }

        self.fallback(results, verdict)
    }

    /// Deterministic text tagged with the verdict confidence.
    pub fn fallback(&self, results: &[RankedResult], verdict: &ValidationVerdict) -> Synthesis {
        Synthesis {
            text: fallback::compose(results, verdict.confidence, self.confidence_threshold),
            confidence: verdict.confidence,
            source: SynthesisSource::Fallback,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers with fixed text, or fails every call.
    pub(crate) struct FixedGenerator {
        text: Option<String>,
        calls: AtomicUsize,
    }

    impl FixedGenerator {
        pub(crate) fn answering(text: &str) -> Self {
            Self {
                text: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                text: None,
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for FixedGenerator {
        async fn generate(&self, _request: &GenerationRequest<'_>) -> Result<Generated, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.text {
                Some(ref text) => Ok(Generated {
                    text: text.clone(),
                    confidence: 0.95,
                }),
                None => Err(GenerationError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedGenerator;
    use super::*;
    use crate::models::AgentKind;
    use crate::validation::testing::ranked;
    use serde_json::json;

    fn verdict(confidence: f64) -> ValidationVerdict {
        ValidationVerdict {
            is_valid: confidence >= 0.7,
            confidence,
            issues: Vec::new(),
            requires_refinement: confidence < 0.7,
            checks: Vec::new(),
            corrections: Vec::new(),
            summary: String::new(),
        }
    }

    fn results() -> Vec<RankedResult> {
        vec![
            ranked(AgentKind::Legal, json!({"articles": ["LUOS - Art. 89"]})),
            ranked(
                AgentKind::KnowledgeGraph,
                json!({"relationships": [{"source": "LUOS - Art. 89", "target": "EIV", "type": "DEFINES"}]}),
            ),
        ]
    }

    #[tokio::test]
    async fn test_generated_text_is_used() {
        let generator = Arc::new(FixedGenerator::answering("EIV is defined in LUOS - Art. 89."));
        let synthesizer = Synthesizer::new(generator.clone(), 0.7);

        let synthesis = synthesizer
            .synthesize(&results(), &verdict(0.9), &Context::default(), "gpt-4o")
            .await;

        assert_eq!(synthesis.source, SynthesisSource::Generated);
        assert_eq!(synthesis.text, "EIV is defined in LUOS - Art. 89.");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_falls_back_with_verdict_confidence() {
        let synthesizer = Synthesizer::new(Arc::new(FixedGenerator::failing()), 0.7);

        let synthesis = synthesizer
            .synthesize(&results(), &verdict(0.5), &Context::default(), "gpt-4o")
            .await;

        assert_eq!(synthesis.source, SynthesisSource::Fallback);
        assert_eq!(synthesis.confidence, 0.5);
        assert!(synthesis.text.starts_with("According to the legislation: LUOS - Art. 89."));
        assert!(synthesis.text.ends_with(fallback::LOW_CONFIDENCE_DISCLAIMER));
    }

    #[tokio::test]
    async fn test_fallback_is_deterministic() {
        let synthesizer = Synthesizer::new(Arc::new(DisabledGenerator), 0.7);
        let results = results();
        let verdict = verdict(0.6);

        let first = synthesizer
            .synthesize(&results, &verdict, &Context::default(), "gpt-4o")
            .await;
        for _ in 0..5 {
            let again = synthesizer
                .synthesize(&results, &verdict, &Context::default(), "gpt-4o")
                .await;
            assert_eq!(again, first);
        }
    }
}
