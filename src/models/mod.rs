pub mod auth;
pub mod dataset;
pub mod deepqa;

pub use auth::Claims;
pub use dataset::{DatasetPreview, PreviewQuery};
pub use deepqa::{Answer, AskForm, PrepareResponse};
