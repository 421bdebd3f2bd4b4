use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct AskForm {
    #[validate(length(min = 1, max = 4000))]
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrepareResponse {
    pub message: String,
    pub num_chunks: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    /// Chunk summaries given to the model, nearest first
    pub context_chunks: Vec<String>,
}
