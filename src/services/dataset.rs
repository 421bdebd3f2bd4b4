use std::collections::BTreeMap;

use crate::db::Database;
use crate::error::{AppError, AppResult};
use crate::models::DatasetPreview;
use crate::retrieval::stats::{summarize_table, ColumnSummary};
use crate::retrieval::table::Table;

/// Read access to uploaded datasets, scoped to their owner
#[async_trait::async_trait]
pub trait DatasetStore: Send + Sync {
    /// Raw CSV bytes of `dataset_id`, if it exists and belongs to `user`
    async fn get_dataset(&self, dataset_id: i64, user: &str) -> AppResult<Vec<u8>>;

    /// Check the backing store is reachable
    async fn ping(&self) -> AppResult<()>;
}

/// Dataset store over the shared `users`/`datasets` tables
pub struct SqlDatasetStore {
    db: Database,
}

impl SqlDatasetStore {
    pub fn new(db: Database) -> Self {
        SqlDatasetStore { db }
    }
}

#[async_trait::async_trait]
impl DatasetStore for SqlDatasetStore {
    async fn get_dataset(&self, dataset_id: i64, user: &str) -> AppResult<Vec<u8>> {
        let content: Option<Vec<u8>> = sqlx::query_scalar(
            r#"
            SELECT d.content
            FROM datasets d
            JOIN users u ON u.id = d.owner_id
            WHERE d.id = ? AND u.email = ?
            "#,
        )
        .bind(dataset_id)
        .bind(user)
        .fetch_optional(self.db.pool())
        .await?;

        content.ok_or_else(|| AppError::NotFound("Dataset not found".to_string()))
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(self.db.pool()).await?;
        Ok(())
    }
}

/// First `rows` rows of a dataset, missing cells as `null`
pub async fn preview(
    store: &dyn DatasetStore,
    dataset_id: i64,
    user: &str,
    rows: usize,
) -> AppResult<DatasetPreview> {
    let bytes = store.get_dataset(dataset_id, user).await?;
    let table = Table::from_csv(&bytes)?;

    Ok(DatasetPreview {
        columns: table.column_names(),
        rows: table
            .rows
            .iter()
            .take(rows)
            .map(|row| row.iter().map(|cell| cell.to_json()).collect())
            .collect(),
    })
}

/// Descriptive statistics per column
pub async fn summary(
    store: &dyn DatasetStore,
    dataset_id: i64,
    user: &str,
) -> AppResult<BTreeMap<String, ColumnSummary>> {
    let bytes = store.get_dataset(dataset_id, user).await?;
    let table = Table::from_csv(&bytes)?;
    Ok(summarize_table(&table))
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;

    /// In-memory dataset store keyed by (id, owner)
    #[derive(Default)]
    pub struct MemoryDatasetStore {
        datasets: HashMap<(i64, String), Vec<u8>>,
    }

    impl MemoryDatasetStore {
        pub fn with_dataset(mut self, dataset_id: i64, owner: &str, content: &str) -> Self {
            self.datasets
                .insert((dataset_id, owner.to_string()), content.as_bytes().to_vec());
            self
        }
    }

    #[async_trait::async_trait]
    impl DatasetStore for MemoryDatasetStore {
        async fn get_dataset(&self, dataset_id: i64, user: &str) -> AppResult<Vec<u8>> {
            self.datasets
                .get(&(dataset_id, user.to_string()))
                .cloned()
                .ok_or_else(|| AppError::NotFound("Dataset not found".to_string()))
        }

        async fn ping(&self) -> AppResult<()> {
            Ok(())
        }
    }
}
