use super::stats::{format_float, CategoricalStats, NumericStats};
use super::table::{Cell, Column, ColumnKind, Table};

/// Default number of rows per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 250;

/// Error types for chunking operations
#[derive(Debug, thiserror::Error)]
pub enum ChunkingError {
    #[error("Dataset is empty or too small to chunk.")]
    EmptyDataset,

    #[error("Chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Configuration for row chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum rows per chunk
    pub chunk_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// A contiguous block of table rows
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub columns: &'a [Column],
    pub rows: &'a [Vec<Cell>],
}

impl<'a> Chunk<'a> {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn cells(&self, column: usize) -> impl Iterator<Item = &'a Cell> + 'a {
        let rows = self.rows;
        rows.iter().map(move |row| &row[column])
    }
}

/// Split a table into consecutive, non-overlapping blocks of at most `chunk_size` rows.
///
/// The last block may be smaller. A table without rows cannot be chunked.
pub fn chunk_table(table: &Table, chunk_size: usize) -> Result<Vec<Chunk<'_>>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if table.rows.is_empty() {
        return Err(ChunkingError::EmptyDataset);
    }

    Ok(table
        .rows
        .chunks(chunk_size)
        .map(|rows| Chunk {
            columns: &table.columns,
            rows,
        })
        .collect())
}

/// Describe a chunk as text: its row count, then per column either
/// mean/min/max (numeric) or unique count and most frequent value (categorical).
///
/// Every segment, the last one included, ends with `". "`.
pub fn summarize_chunk(chunk: &Chunk<'_>) -> String {
    let mut summary = format!("Chunk rows: {}. ", chunk.row_count());

    for (idx, column) in chunk.columns.iter().enumerate() {
        let part = match column.kind {
            ColumnKind::Numeric => {
                let values: Vec<f64> = chunk.cells(idx).filter_map(Cell::as_number).collect();
                match NumericStats::from_values(&values) {
                    Some(stats) => format!(
                        "{}: mean={}, min={}, max={}. ",
                        column.name,
                        format_float(stats.mean),
                        format_float(stats.min),
                        format_float(stats.max)
                    ),
                    None => format!("{}: mean=n/a, min=n/a, max=n/a. ", column.name),
                }
            }
            ColumnKind::Categorical => {
                let stats = CategoricalStats::from_values(chunk.cells(idx).filter_map(Cell::as_text));
                format!(
                    "{}: unique={}, top={}. ",
                    column.name,
                    stats.unique,
                    stats.top.as_deref().unwrap_or("n/a")
                )
            }
        };
        summary.push_str(&part);
    }

    summary
}

/// Chunk and summarize in one pass
pub fn summarize_table(table: &Table, chunk_size: usize) -> Result<Vec<String>, ChunkingError> {
    Ok(chunk_table(table, chunk_size)?
        .iter()
        .map(summarize_chunk)
        .collect())
}
