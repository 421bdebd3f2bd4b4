//! Local sentence embeddings with candle (pure Rust).
//!
//! The BERT model and tokenizer are downloaded from HuggingFace on first use, loaded
//! once, and shared for the process lifetime. Inference is CPU-bound and runs on the
//! blocking pool. Output vectors are mean-pooled and L2-normalised, as
//! sentence-transformers does for these models.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::embeddings::{EmbeddingError, EmbeddingProvider};

/// Map a model name to its HuggingFace repository and output dimension
pub fn resolve_model(model_name: &str) -> Result<(&'static str, usize), EmbeddingError> {
    match model_name {
        "all-minilm-l6-v2" | "all-MiniLM-L6-v2" => Ok(("sentence-transformers/all-MiniLM-L6-v2", 384)),
        "bge-small-en-v1.5" => Ok(("BAAI/bge-small-en-v1.5", 384)),
        "bge-base-en-v1.5" => Ok(("BAAI/bge-base-en-v1.5", 768)),
        _ => Err(EmbeddingError::ConfigError(format!(
            "Unsupported local model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
            model_name
        ))),
    }
}

#[cfg(feature = "embeddings")]
mod backend {
    use super::*;
    use candle_core::{DType, Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::bert::{BertModel, Config as BertConfig};
    use hf_hub::{api::sync::Api, Repo, RepoType};
    use tokenizers::{Tokenizer, TruncationParams};
    use tracing::info;

    /// Longest input in word pieces; longer texts are truncated
    const MAX_SEQUENCE_LENGTH: usize = 256;

    struct LoadedModel {
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
    }

    pub struct LocalEmbeddings {
        inner: Arc<LoadedModel>,
        model_name: String,
        dimension: usize,
    }

    impl LocalEmbeddings {
        pub async fn load(model_name: &str) -> Result<Self, EmbeddingError> {
            let (repo_id, dimension) = resolve_model(model_name)?;
            info!(
                "Loading local embedding model {} ({}D) from {}",
                model_name, dimension, repo_id
            );

            let inner = tokio::task::spawn_blocking(move || load_model(repo_id))
                .await
                .map_err(|e| EmbeddingError::ModelLoad(format!("Task join error: {}", e)))??;

            info!("Local embedding model {} ready", model_name);

            Ok(Self {
                inner: Arc::new(inner),
                model_name: model_name.to_string(),
                dimension,
            })
        }
    }

    fn load_model(repo_id: &str) -> Result<LoadedModel, EmbeddingError> {
        let load_err = |what: &str, e: &dyn std::fmt::Display| {
            EmbeddingError::ModelLoad(format!("Failed to {}: {}", what, e))
        };

        // Download model files from HuggingFace
        let api = Api::new().map_err(|e| load_err("initialize HF API", &e))?;
        let repo = api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            "main".to_string(),
        ));

        let tokenizer_path = repo
            .get("tokenizer.json")
            .map_err(|e| load_err("download tokenizer", &e))?;
        let config_path = repo
            .get("config.json")
            .map_err(|e| load_err("download config", &e))?;

        let mut tokenizer =
            Tokenizer::from_file(tokenizer_path).map_err(|e| load_err("load tokenizer", &e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(|e| load_err("configure truncation", &e))?;
        tokenizer.with_padding(None);

        let config_str =
            std::fs::read_to_string(config_path).map_err(|e| load_err("read config", &e))?;
        let config: BertConfig =
            serde_json::from_str(&config_str).map_err(|e| load_err("parse config", &e))?;

        let device = Device::Cpu;
        let vb = match repo.get("model.safetensors") {
            // SAFETY: the weights file is a read-only download owned by the HF cache
            Ok(weights) => unsafe {
                VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)
            },
            Err(_) => {
                let weights = repo
                    .get("pytorch_model.bin")
                    .map_err(|e| load_err("download model weights", &e))?;
                VarBuilder::from_pth(&weights, DType::F32, &device)
            }
        }
        .map_err(|e| load_err("load model weights", &e))?;

        let model = BertModel::load(vb, &config).map_err(|e| load_err("load BERT model", &e))?;

        Ok(LoadedModel {
            model,
            tokenizer,
            device,
        })
    }

    fn embed_one(loaded: &LoadedModel, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let infer_err = |what: &str, e: &dyn std::fmt::Display| {
            EmbeddingError::Inference(format!("{} failed: {}", what, e))
        };

        let encoding = loaded
            .tokenizer
            .encode(text, true)
            .map_err(|e| infer_err("Tokenization", &e))?;

        let token_ids = Tensor::new(encoding.get_ids(), &loaded.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| infer_err("Token tensor", &e))?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &loaded.device)
            .and_then(|t| t.unsqueeze(0))
            .map_err(|e| infer_err("Type tensor", &e))?;

        let hidden = loaded
            .model
            .forward(&token_ids, &token_type_ids, None)
            .map_err(|e| infer_err("Model forward", &e))?;

        // Mean pooling over tokens
        let pooled = hidden
            .mean(1)
            .and_then(|t| t.squeeze(0))
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| infer_err("Mean pooling", &e))?;

        Ok(normalize(pooled))
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for LocalEmbeddings {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }

            tracing::debug!("Embedding {} texts locally", texts.len());

            let inner = self.inner.clone();
            embed_blocking(texts, move |text| embed_one(&inner, text)).await
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_name(&self) -> &str {
            &self.model_name
        }
    }
}

#[cfg(not(feature = "embeddings"))]
mod backend {
    use super::*;

    pub struct LocalEmbeddings;

    impl LocalEmbeddings {
        pub async fn load(model_name: &str) -> Result<Self, EmbeddingError> {
            resolve_model(model_name)?;
            Err(EmbeddingError::ModelLoad(
                "Local embeddings support not compiled. Enable the 'embeddings' feature or use the openai engine.".to_string(),
            ))
        }
    }

    #[async_trait::async_trait]
    impl EmbeddingProvider for LocalEmbeddings {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Err(EmbeddingError::ModelLoad(
                "Local embeddings support not compiled".to_string(),
            ))
        }

        fn dimension(&self) -> usize {
            0
        }

        fn model_name(&self) -> &str {
            ""
        }
    }
}

pub use backend::LocalEmbeddings;

/// Raises the flag when the future that owns it is dropped
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Embed `texts` one at a time on the blocking pool.
///
/// Dropping the returned future (a timed-out attempt) stops the batch before its
/// next text, so abandoned inference does not compete with the retry.
#[cfg_attr(not(feature = "embeddings"), allow(dead_code))]
async fn embed_blocking<F>(
    texts: Vec<String>,
    embed_text: F,
) -> Result<Vec<Vec<f32>>, EmbeddingError>
where
    F: Fn(&str) -> Result<Vec<f32>, EmbeddingError> + Send + 'static,
{
    let cancelled = Arc::new(AtomicBool::new(false));
    let _guard = CancelOnDrop(cancelled.clone());

    tokio::task::spawn_blocking(move || {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in &texts {
            if cancelled.load(Ordering::Relaxed) {
                return Err(EmbeddingError::Inference(
                    "Embedding batch abandoned".to_string(),
                ));
            }
            vectors.push(embed_text(text)?);
        }
        Ok(vectors)
    })
    .await
    .map_err(|e| EmbeddingError::Inference(format!("Task join error: {}", e)))?
}

/// Scale a vector to unit length; zero vectors are returned unchanged
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}
