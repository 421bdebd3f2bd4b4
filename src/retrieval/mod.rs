pub mod chunking;
pub mod completion;
pub mod embeddings;
pub mod local_embeddings;
pub mod stats;
pub mod store;
pub mod table;
pub mod vector;

pub use chunking::ChunkingError;
pub use completion::{CompletionError, CompletionProvider, OpenAICompletions};
pub use embeddings::{EmbeddingError, EmbeddingFactory};
pub use store::IndexStore;
pub use table::TableError;
pub use vector::VectorError;
