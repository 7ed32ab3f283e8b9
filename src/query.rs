//! Query orchestration: authenticate, validate, retrieve, compose, generate.
//!
//! Validation happens before any external call. Every downstream failure is
//! logged with its cause and reported to the caller as an opaque
//! [`QueryError::Internal`].

use std::sync::Arc;
use tracing::{error, info};

use crate::auth::Principal;
use crate::error::{PipelineError, QueryError};
use crate::generation::Generator;
use crate::models::{QueryRequest, QueryResponse};
use crate::prompt::compose_prompt;
use crate::retrieval::Retriever;

pub const MISSING_QUESTION: &str = "The function must be called with a 'question'.";

pub struct QueryOrchestrator {
    retriever: Retriever,
    generator: Arc<dyn Generator>,
    instructions: String,
}

impl QueryOrchestrator {
    pub fn new(retriever: Retriever, generator: Arc<dyn Generator>, instructions: String) -> Self {
        Self {
            retriever,
            generator,
            instructions,
        }
    }

    pub async fn answer(
        &self,
        principal: Option<&Principal>,
        request: QueryRequest,
    ) -> Result<QueryResponse, QueryError> {
        let principal = principal.ok_or(QueryError::Unauthenticated)?;

        let question = request.question.trim();
        if question.is_empty() {
            return Err(QueryError::InvalidArgument(MISSING_QUESTION.to_string()));
        }

        info!(
            principal = %principal.id,
            history_turns = request.history.len(),
            "answering question"
        );

        self.run(question, &request)
            .await
            .map(|response| QueryResponse { response })
            .map_err(|e| {
                error!(principal = %principal.id, error = %e, "query failed");
                QueryError::Internal
            })
    }

    async fn run(&self, question: &str, request: &QueryRequest) -> Result<String, PipelineError> {
        let retrieved = self.retriever.retrieve(question).await?;
        let prompt = compose_prompt(&self.instructions, &request.history, &retrieved, question);
        self.generator.generate(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::models::ConversationTurn;
    use crate::prompt::DEFAULT_INSTRUCTIONS;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }
    }

    #[derive(Default)]
    struct RecordingGenerator {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl Generator for RecordingGenerator {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn generate(&self, prompt: &str) -> Result<String, PipelineError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(PipelineError::GenerationUnavailable("503 upstream".into()));
            }
            Ok("Use the torque wrench.".to_string())
        }
    }

    fn orchestrator(
        embedder: Arc<CountingEmbedder>,
        generator: Arc<RecordingGenerator>,
    ) -> QueryOrchestrator {
        let retriever = Retriever::new(
            embedder,
            Arc::new(InMemoryStore::new()),
            5,
            Duration::from_secs(5),
        );
        QueryOrchestrator::new(retriever, generator, DEFAULT_INSTRUCTIONS.to_string())
    }

    fn request(question: &str) -> QueryRequest {
        QueryRequest {
            question: question.to_string(),
            history: vec![ConversationTurn::user("earlier")],
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_makes_no_calls() {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(RecordingGenerator::default());
        let orch = orchestrator(embedder.clone(), generator.clone());

        let err = orch.answer(None, request("How?")).await.unwrap_err();
        assert_eq!(err, QueryError::Unauthenticated);
        assert_eq!(err.code(), "unauthenticated");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(generator.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_question_is_invalid_argument() {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(RecordingGenerator::default());
        let orch = orchestrator(embedder.clone(), generator.clone());

        for q in ["", "   \n\t"] {
            let err = orch
                .answer(Some(&Principal::local()), request(q))
                .await
                .unwrap_err();
            assert_eq!(err, QueryError::InvalidArgument(MISSING_QUESTION.to_string()));
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_passes_history_and_question() {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(RecordingGenerator::default());
        let orch = orchestrator(embedder.clone(), generator.clone());

        let resp = orch
            .answer(Some(&Principal::local()), request("  How do I torque it?  "))
            .await
            .unwrap();
        assert_eq!(resp.response, "Use the torque wrench.");
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("user: earlier"));
        assert!(prompts[0].contains("USER'S QUESTION:\nHow do I torque it?\n"));
    }

    #[tokio::test]
    async fn test_generation_failure_is_opaque() {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(RecordingGenerator {
            fail: true,
            ..Default::default()
        });
        let orch = orchestrator(embedder, generator);

        let err = orch
            .answer(Some(&Principal::local()), request("How?"))
            .await
            .unwrap_err();
        assert_eq!(err, QueryError::Internal);
        assert!(!err.to_string().contains("503"));
    }
}
