use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

fn default_preview_rows() -> usize {
    10
}

#[derive(Debug, Deserialize, Validate)]
pub struct PreviewQuery {
    #[serde(default = "default_preview_rows")]
    #[validate(range(min = 1, max = 100))]
    pub rows: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetPreview {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}
