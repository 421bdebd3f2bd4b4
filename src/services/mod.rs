pub mod dataset;
pub mod deepqa;

pub use dataset::{DatasetStore, SqlDatasetStore};
pub use deepqa::{DeepQaService, DeepQaSettings};
