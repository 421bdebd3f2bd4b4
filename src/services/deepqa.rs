use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Answer, PrepareResponse};
use crate::retrieval::chunking::{self, ChunkingConfig};
use crate::retrieval::completion::{CompletionProvider, CompletionRequest};
use crate::retrieval::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::retrieval::store::{IndexStore, QaIndex};
use crate::retrieval::table::Table;
use crate::retrieval::vector::FlatL2Index;
use crate::services::dataset::DatasetStore;
use crate::utils::retry::RetryPolicy;

const SYSTEM_PROMPT: &str = "You are a helpful data analyst.";

/// Tunables for preparation and answering
#[derive(Debug, Clone)]
pub struct DeepQaSettings {
    pub chunking: ChunkingConfig,
    pub top_k: usize,
    pub max_tokens: u32,
    pub temperature: f32,
    pub embedding_retry: RetryPolicy,
    pub completion_retry: RetryPolicy,
}

impl DeepQaSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunking: ChunkingConfig {
                chunk_size: config.chunk_size,
            },
            top_k: config.top_k,
            max_tokens: config.deepqa_max_tokens,
            temperature: config.deepqa_temperature,
            embedding_retry: config.embedding_retry(),
            completion_retry: config.completion_retry(),
        }
    }
}

impl Default for DeepQaSettings {
    fn default() -> Self {
        Self {
            chunking: ChunkingConfig::default(),
            top_k: 5,
            max_tokens: 512,
            temperature: 0.2,
            embedding_retry: RetryPolicy::default(),
            completion_retry: RetryPolicy::default(),
        }
    }
}

/// Retrieval-augmented question answering over uploaded datasets.
///
/// `prepare` builds a per-dataset index of chunk summaries; `ask` retrieves the
/// summaries nearest to a question and has the completion model answer from them.
pub struct DeepQaService {
    datasets: Arc<dyn DatasetStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    completer: Arc<dyn CompletionProvider>,
    indexes: Arc<IndexStore>,
    settings: DeepQaSettings,
}

impl DeepQaService {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        completer: Arc<dyn CompletionProvider>,
        indexes: Arc<IndexStore>,
        settings: DeepQaSettings,
    ) -> Self {
        DeepQaService {
            datasets,
            embedder,
            completer,
            indexes,
            settings,
        }
    }

    /// Build and publish the index for `dataset_id`, replacing any previous one.
    ///
    /// Nothing is published unless every step succeeds.
    pub async fn prepare(&self, dataset_id: i64, user: &str) -> AppResult<PrepareResponse> {
        let bytes = self.datasets.get_dataset(dataset_id, user).await?;
        let table = Table::from_csv(&bytes)?;
        let summaries = chunking::summarize_table(&table, self.settings.chunking.chunk_size)?;

        debug!(
            "Dataset {}: {} rows in {} chunks",
            dataset_id,
            table.row_count(),
            summaries.len()
        );

        let vectors = self.embed(summaries.clone()).await?;
        let index = FlatL2Index::build(&vectors)?;
        debug!(
            "Dataset {}: indexed {} vectors of dimension {}",
            dataset_id,
            index.len(),
            index.dimension()
        );
        let num_chunks = summaries.len();

        self.indexes
            .publish(QaIndex {
                dataset_id,
                owner: user.to_string(),
                summaries,
                index,
                embedding_model: self.embedder.model_name().to_string(),
                prepared_at: Utc::now(),
            })
            .await;

        info!(
            "Deep Q&A prepared for dataset {} ({} chunks, {} datasets prepared)",
            dataset_id,
            num_chunks,
            self.indexes.len().await
        );

        Ok(PrepareResponse {
            message: "Deep Q&A prepared".to_string(),
            num_chunks,
        })
    }

    /// Answer `question` from the prepared index of `dataset_id`
    pub async fn ask(&self, dataset_id: i64, user: &str, question: &str) -> AppResult<Answer> {
        let qa = self
            .indexes
            .get(dataset_id)
            .await
            .ok_or(AppError::NotPrepared)?;

        if qa.owner != user {
            return Err(AppError::NotFound("Dataset not found".to_string()));
        }
        debug!(
            "Using index for dataset {} ({} chunks, prepared at {})",
            dataset_id,
            qa.num_chunks(),
            qa.prepared_at
        );
        if qa.embedding_model != self.embedder.model_name() {
            debug!(
                "Index for dataset {} was built with {}, current model is {}",
                dataset_id,
                qa.embedding_model,
                self.embedder.model_name()
            );
            return Err(AppError::NotPrepared);
        }

        let query = self
            .embed(vec![question.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(EmbeddingError::CountMismatch {
                expected: 1,
                actual: 0,
            })?;

        let hits = qa.index.search(&query, self.settings.top_k)?;
        let context_chunks: Vec<String> = hits
            .iter()
            .filter_map(|hit| qa.summaries.get(hit.position).cloned())
            .collect();

        let request = self.build_request(&context_chunks, question);
        let completer = &self.completer;
        let answer = self
            .settings
            .completion_retry
            .run("Deep Q&A completion", || completer.complete(request.clone()))
            .await?;

        info!(
            "Answered question on dataset {} with {} context chunks",
            dataset_id,
            context_chunks.len()
        );

        Ok(Answer {
            answer: answer.trim().to_string(),
            context_chunks,
        })
    }

    /// Drop the prepared index for `dataset_id`. Returns whether one existed.
    pub async fn evict(&self, dataset_id: i64, user: &str) -> AppResult<bool> {
        match self.indexes.get(dataset_id).await {
            Some(qa) if qa.owner != user => {
                Err(AppError::NotFound("Dataset not found".to_string()))
            }
            _ => Ok(self.indexes.remove(dataset_id).await.is_some()),
        }
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = texts.len();
        let embedder = &self.embedder;
        let vectors = self
            .settings
            .embedding_retry
            .run("Embedding", || embedder.embed(texts.clone()))
            .await?;

        if vectors.len() != expected {
            return Err(EmbeddingError::CountMismatch {
                expected,
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    fn build_request(&self, summaries: &[String], question: &str) -> CompletionRequest {
        CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            user_prompt: build_prompt(summaries, question),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
        }
    }
}

fn build_prompt(summaries: &[String], question: &str) -> String {
    format!(
        "{} Based on the following dataset summaries, answer the user's question as insightfully as possible.\nSummaries:\n{}\nUser question: {}\nAnswer: ",
        SYSTEM_PROMPT,
        summaries.join("\n"),
        question
    )
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::retrieval::completion::CompletionError;
    use crate::services::dataset::testing::MemoryDatasetStore;
    use actix_web::ResponseError;

    const OWNER: &str = "alice@example.com";

    struct Fixture {
        service: DeepQaService,
        indexes: Arc<IndexStore>,
        completer: Arc<RecordingCompleter>,
    }

    fn fixture_with(datasets: MemoryDatasetStore, embedder: Arc<dyn EmbeddingProvider>) -> Fixture {
        let indexes = Arc::new(IndexStore::default());
        let completer = Arc::new(RecordingCompleter::default());
        let service = DeepQaService::new(
            Arc::new(datasets),
            embedder,
            completer.clone(),
            indexes.clone(),
            test_settings(),
        );
        Fixture {
            service,
            indexes,
            completer,
        }
    }

    fn fixture() -> Fixture {
        let datasets = MemoryDatasetStore::default()
            .with_dataset(7, OWNER, &sales_csv(600))
            .with_dataset(8, OWNER, "region,revenue\n")
            .with_dataset(9, OWNER, "region,revenue\nNorth,1,2\n");
        fixture_with(datasets, Arc::new(HashEmbedder::default()))
    }

    #[tokio::test]
    async fn test_prepare_then_ask() {
        let f = fixture();

        let prepared = f.service.prepare(7, OWNER).await.unwrap();
        assert_eq!(prepared.message, "Deep Q&A prepared");
        assert_eq!(prepared.num_chunks, 3);

        let answer = f
            .service
            .ask(7, OWNER, "Which region has the highest revenue?")
            .await
            .unwrap();
        assert_eq!(answer.answer, "North leads on revenue.");
        assert!(!answer.context_chunks.is_empty());
        assert!(answer.context_chunks.len() <= 5);
        assert!(answer
            .context_chunks
            .iter()
            .all(|chunk| chunk.starts_with("Chunk rows: ")));
    }

    #[tokio::test]
    async fn test_prompt_carries_context_and_question() {
        let f = fixture();
        f.service.prepare(7, OWNER).await.unwrap();
        let answer = f.service.ask(7, OWNER, "Total units?").await.unwrap();

        let requests = f.completer.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.system_prompt, "You are a helpful data analyst.");
        assert_eq!(request.max_tokens, 512);
        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert!(request.user_prompt.starts_with(
            "You are a helpful data analyst. Based on the following dataset summaries, answer the user's question as insightfully as possible.\nSummaries:\n"
        ));
        assert!(request
            .user_prompt
            .ends_with("\nUser question: Total units?\nAnswer: "));
        assert!(request
            .user_prompt
            .contains(&answer.context_chunks.join("\n")));
    }

    #[tokio::test]
    async fn test_context_is_nearest_first() {
        let f = fixture();
        f.service.prepare(7, OWNER).await.unwrap();

        // Asking with a chunk summary verbatim puts that chunk first
        let qa = f.indexes.get(7).await.unwrap();
        let target = qa.summaries[1].clone();
        let answer = f.service.ask(7, OWNER, &target).await.unwrap();
        assert_eq!(answer.context_chunks[0], target);
    }

    #[tokio::test]
    async fn test_top_k_bounds_context() {
        let datasets = MemoryDatasetStore::default().with_dataset(1, OWNER, &sales_csv(20));
        let indexes = Arc::new(IndexStore::default());
        let service = DeepQaService::new(
            Arc::new(datasets),
            Arc::new(HashEmbedder::default()),
            Arc::new(RecordingCompleter::default()),
            indexes,
            DeepQaSettings {
                chunking: ChunkingConfig { chunk_size: 2 },
                top_k: 4,
                ..test_settings()
            },
        );

        assert_eq!(service.prepare(1, OWNER).await.unwrap().num_chunks, 10);
        let answer = service.ask(1, OWNER, "anything").await.unwrap();
        assert_eq!(answer.context_chunks.len(), 4);
    }

    #[tokio::test]
    async fn test_ask_unprepared_dataset() {
        let f = fixture();
        let result = f.service.ask(42, OWNER, "What is the trend?").await;
        assert!(matches!(result, Err(AppError::NotPrepared)));
        assert!(f.indexes.get(42).await.is_none());
        assert!(f.completer.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_empty_dataset() {
        let f = fixture();
        assert!(matches!(
            f.service.prepare(8, OWNER).await,
            Err(AppError::EmptyDataset)
        ));
        assert_eq!(f.indexes.len().await, 0);
    }

    #[tokio::test]
    async fn test_prepare_errors() {
        let f = fixture();
        assert!(matches!(
            f.service.prepare(9, OWNER).await,
            Err(AppError::Parse(_))
        ));
        assert!(matches!(
            f.service.prepare(1234, OWNER).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            f.service.prepare(7, "mallory@example.com").await,
            Err(AppError::NotFound(_))
        ));
        assert_eq!(f.indexes.len().await, 0);
    }

    #[tokio::test]
    async fn test_prepare_is_idempotent() {
        let f = fixture();
        let first = f.service.prepare(7, OWNER).await.unwrap();
        let summaries = f.indexes.get(7).await.unwrap().summaries.clone();

        let second = f.service.prepare(7, OWNER).await.unwrap();
        assert_eq!(first.num_chunks, second.num_chunks);
        assert_eq!(f.indexes.get(7).await.unwrap().summaries, summaries);
        assert_eq!(f.indexes.len().await, 1);
        assert!(f.service.ask(7, OWNER, "Summary?").await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_embedding_publishes_nothing() {
        let datasets = MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(10));
        let f = fixture_with(datasets, Arc::new(FailingEmbedder));

        assert!(matches!(
            f.service.prepare(7, OWNER).await,
            Err(AppError::Embedding(EmbeddingError::ApiError(_)))
        ));
        assert!(f.indexes.get(7).await.is_none());
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch_publishes_nothing() {
        let datasets = MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(600));
        let f = fixture_with(datasets, Arc::new(ShortEmbedder));

        assert!(matches!(
            f.service.prepare(7, OWNER).await,
            Err(AppError::Embedding(EmbeddingError::CountMismatch {
                expected: 3,
                actual: 2
            }))
        ));
        assert!(f.indexes.get(7).await.is_none());
        assert_eq!(f.indexes.len().await, 0);
    }

    #[tokio::test]
    async fn test_transient_embedding_failure_is_retried() {
        let datasets = MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(600));
        let embedder = Arc::new(FlakyEmbedder::new(1));
        let f = fixture_with(datasets, embedder.clone());

        let prepared = f.service.prepare(7, OWNER).await.unwrap();
        assert_eq!(prepared.num_chunks, 3);
        assert_eq!(embedder.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(f.indexes.get(7).await.is_some());
    }

    #[tokio::test]
    async fn test_completion_failure_is_a_server_error() {
        let datasets = MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(600));
        let completer = Arc::new(FailingCompleter::default());
        let service = DeepQaService::new(
            Arc::new(datasets),
            Arc::new(HashEmbedder::default()),
            completer.clone(),
            Arc::new(IndexStore::default()),
            test_settings(),
        );
        service.prepare(7, OWNER).await.unwrap();

        let err = service.ask(7, OWNER, "Revenue?").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Completion(CompletionError::ApiError(_))
        ));
        assert_eq!(
            err.status_code(),
            actix_web::http::StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            completer.calls.load(std::sync::atomic::Ordering::SeqCst),
            test_settings().completion_retry.max_attempts
        );
    }

    #[tokio::test]
    async fn test_failed_rebuild_keeps_previous_index() {
        let datasets = MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(10));
        let indexes = Arc::new(IndexStore::default());
        let completer: Arc<RecordingCompleter> = Arc::new(RecordingCompleter::default());
        let working = DeepQaService::new(
            Arc::new(datasets),
            Arc::new(HashEmbedder::default()),
            completer.clone(),
            indexes.clone(),
            test_settings(),
        );
        working.prepare(7, OWNER).await.unwrap();
        let before = indexes.get(7).await.unwrap();

        let broken = DeepQaService::new(
            Arc::new(MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(10))),
            Arc::new(FailingEmbedder),
            completer,
            indexes.clone(),
            test_settings(),
        );
        assert!(broken.prepare(7, OWNER).await.is_err());
        assert!(Arc::ptr_eq(&before, &indexes.get(7).await.unwrap()));
    }

    #[tokio::test]
    async fn test_ask_rejects_other_owner() {
        let f = fixture();
        f.service.prepare(7, OWNER).await.unwrap();
        assert!(matches!(
            f.service.ask(7, "mallory@example.com", "Revenue?").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_model_change_requires_prepare() {
        let f = fixture();
        f.service.prepare(7, OWNER).await.unwrap();

        let other_model = DeepQaService::new(
            Arc::new(MemoryDatasetStore::default().with_dataset(7, OWNER, &sales_csv(600))),
            Arc::new(HashEmbedder {
                model: "other-model".to_string(),
            }),
            Arc::new(RecordingCompleter::default()),
            f.indexes.clone(),
            test_settings(),
        );
        assert!(matches!(
            other_model.ask(7, OWNER, "Revenue?").await,
            Err(AppError::NotPrepared)
        ));
    }

    #[tokio::test]
    async fn test_evict() {
        let f = fixture();
        f.service.prepare(7, OWNER).await.unwrap();

        assert!(matches!(
            f.service.evict(7, "mallory@example.com").await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.service.evict(7, OWNER).await.unwrap());
        assert!(!f.service.evict(7, OWNER).await.unwrap());
        assert!(matches!(
            f.service.ask(7, OWNER, "Revenue?").await,
            Err(AppError::NotPrepared)
        ));
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::for_tests();
        config.chunk_size = 100;
        config.top_k = 3;
        let settings = DeepQaSettings::from_config(&config);
        assert_eq!(settings.chunking.chunk_size, 100);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.max_tokens, 512);
    }
}
