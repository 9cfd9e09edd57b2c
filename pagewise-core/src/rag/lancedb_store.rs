//! LanceDB vector index implementation.
//!
//! This module provides integration with LanceDB for embedded, in-process
//! vector storage that persists across runs.

use super::store::{batch_dimension, IndexError, Result, VectorIndex};
use super::types::{IndexEntry, SearchResult};
use anyhow::Context;
use arrow_array::{
    array::{ArrayRef, FixedSizeListArray, Float32Array, StringArray, UInt64Array},
    Array, RecordBatch, RecordBatchIterator,
};
use async_trait::async_trait;
use futures::stream::TryStreamExt;
use lancedb::arrow::arrow_schema::{DataType, Field, Schema};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// A table that exists on disk, with the vector dimension it was created for.
#[derive(Clone)]
struct OpenTable {
    table: Table,
    dimension: usize,
}

/// A search hit with its distance and the row id used to order ties.
struct Hit {
    row_id: u64,
    distance: f32,
    result: SearchResult,
}

/// LanceDB-based vector index for embedded deployment.
///
/// The table is created on the first `add`, sized to the first vector, so an
/// empty or missing directory simply behaves as an empty index. Equal scores
/// are ordered by LanceDB row id, which grows with every committed append,
/// including appends made by other handles on the same directory.
///
/// Writes hold the table lock for their whole duration; searches only clone
/// the handle and run concurrently. Reads always see the latest committed
/// version, so several handles (or processes) may share one directory.
pub struct LanceDbIndex {
    conn: Connection,
    table_name: String,
    state: RwLock<Option<OpenTable>>,
}

#[async_trait]
impl VectorIndex for LanceDbIndex {
    async fn add(&self, entries: Vec<IndexEntry>) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut state = self.state.write().await;
        if state.is_none() {
            *state = Self::open_existing(&self.conn, &self.table_name)
                .await
                .map_err(IndexError::Write)?;
        }

        let existing = state.as_ref().map(|open| open.dimension);
        let dimension = match batch_dimension(&entries, existing)? {
            Some(dimension) => dimension,
            None => return Ok(0),
        };

        let table = match state.as_ref() {
            Some(open) => open.table.clone(),
            None => {
                let open = self
                    .create_table(dimension)
                    .await
                    .map_err(IndexError::Write)?;
                if open.dimension != dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: open.dimension,
                        actual: dimension,
                    });
                }
                let table = open.table.clone();
                *state = Some(open);
                table
            }
        };

        let added = Self::append(&table, &entries, dimension)
            .await
            .map_err(IndexError::Write)?;
        debug!(table = %self.table_name, added, "Appended entries to LanceDB");
        Ok(added)
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let Some(open) = self.current().await.map_err(IndexError::Query)? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != open.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: open.dimension,
                actual: query.len(),
            });
        }

        Self::nearest(&open.table, query, k)
            .await
            .map_err(IndexError::Query)
    }

    async fn count(&self) -> Result<usize> {
        let Some(open) = self.current().await.map_err(IndexError::Query)? else {
            return Ok(0);
        };
        open.table
            .count_rows(None)
            .await
            .context("Failed to count rows")
            .map_err(IndexError::Query)
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        match self.conn.drop_table(&self.table_name, &[]).await {
            Ok(()) | Err(lancedb::Error::TableNotFound { .. }) => {}
            Err(e) => {
                return Err(IndexError::Write(
                    anyhow::Error::new(e).context("Failed to drop table"),
                ));
            }
        }
        // Recreated by the next add, possibly with a different dimension
        *state = None;
        Ok(())
    }
}

impl LanceDbIndex {
    /// Opens the index stored under `path`, using `table_name` for the entries.
    ///
    /// A missing directory or table is not an error: the index starts empty.
    /// Local directories are created on open, remote URIs are passed through.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Open`] if the directory cannot be read or the
    /// existing table is unreadable or was not written by this index.
    pub async fn open(path: &str, table_name: &str) -> Result<Self> {
        if !path.contains("://") {
            tokio::fs::create_dir_all(path)
                .await
                .with_context(|| format!("Failed to create index directory {}", path))
                .map_err(IndexError::Open)?;
        }

        let conn = connect(path)
            .read_consistency_interval(Duration::ZERO)
            .execute()
            .await
            .context("Failed to connect to LanceDB")
            .map_err(IndexError::Open)?;

        let state = Self::open_existing(&conn, table_name)
            .await
            .map_err(IndexError::Open)?;

        debug!(
            path,
            table = table_name,
            existing = state.is_some(),
            "Opened LanceDB index"
        );

        Ok(Self {
            conn,
            table_name: table_name.to_string(),
            state: RwLock::new(state),
        })
    }

    /// Returns the open table, picking up one created by another handle.
    async fn current(&self) -> anyhow::Result<Option<OpenTable>> {
        if let Some(open) = self.state.read().await.clone() {
            return Ok(Some(open));
        }

        let mut state = self.state.write().await;
        if state.is_none() {
            *state = Self::open_existing(&self.conn, &self.table_name).await?;
        }
        Ok(state.clone())
    }

    async fn open_existing(
        conn: &Connection,
        table_name: &str,
    ) -> anyhow::Result<Option<OpenTable>> {
        let table_names = conn
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;

        if !table_names.iter().any(|name| name == table_name) {
            return Ok(None);
        }

        let table = conn
            .open_table(table_name)
            .execute()
            .await
            .context("Failed to open LanceDB table")?;
        let schema = table.schema().await.context("Failed to read table schema")?;
        let dimension = match schema.field_with_name("vector").map(|f| f.data_type()) {
            Ok(DataType::FixedSizeList(_, size)) => *size as usize,
            _ => anyhow::bail!("table '{}' has no fixed-size 'vector' column", table_name),
        };

        Ok(Some(OpenTable { table, dimension }))
    }

    fn create_schema(dimension: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ]))
    }

    /// Creates the table, or opens it if another handle created it first.
    async fn create_table(&self, dimension: usize) -> anyhow::Result<OpenTable> {
        let created = self
            .conn
            .create_empty_table(&self.table_name, Self::create_schema(dimension))
            .execute()
            .await;

        match created {
            Ok(table) => Ok(OpenTable { table, dimension }),
            Err(e) => match Self::open_existing(&self.conn, &self.table_name).await? {
                Some(open) => {
                    debug!(table = %self.table_name, "Table was created concurrently");
                    Ok(open)
                }
                None => Err(e).context("Failed to create LanceDB table"),
            },
        }
    }

    async fn append(
        table: &Table,
        entries: &[IndexEntry],
        dimension: usize,
    ) -> anyhow::Result<usize> {
        let content_array =
            StringArray::from_iter_values(entries.iter().map(|e| e.content.as_str()));

        let metadata = entries
            .iter()
            .map(|e| serde_json::to_string(&e.metadata))
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("Failed to serialize metadata")?;
        let metadata_array = StringArray::from_iter_values(metadata.iter());

        let vector_values =
            Float32Array::from_iter_values(entries.iter().flat_map(|e| e.vector.iter().copied()));
        let vector_array = FixedSizeListArray::try_new(
            Arc::new(Field::new("item", DataType::Float32, true)),
            dimension as i32,
            Arc::new(vector_values),
            None,
        )
        .context("Failed to build vector column")?;

        let batch = RecordBatch::try_new(
            Self::create_schema(dimension),
            vec![
                Arc::new(content_array) as ArrayRef,
                Arc::new(metadata_array) as ArrayRef,
                Arc::new(vector_array) as ArrayRef,
            ],
        )
        .context("Failed to create record batch")?;

        let schema_ref = batch.schema();
        let reader = RecordBatchIterator::new(vec![Ok(batch)], schema_ref);

        table
            .add(reader)
            .execute()
            .await
            .context("Failed to add entries to LanceDB")?;

        Ok(entries.len())
    }

    /// Returns the `k` best hits, ties broken by row id.
    ///
    /// The query limit is applied before ties can be ordered, so the limit is
    /// doubled until every row sharing the k-th distance has been fetched.
    async fn nearest(table: &Table, query: &[f32], k: usize) -> anyhow::Result<Vec<SearchResult>> {
        let total = table.count_rows(None).await.context("Failed to count rows")?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut limit = k.min(total);
        let mut hits = loop {
            let hits = Self::fetch(table, query, limit).await?;
            let boundary_complete = hits.len() < limit
                || limit >= total
                || hits.len() > k && hits[hits.len() - 1].distance > hits[k - 1].distance;
            if boundary_complete {
                break hits;
            }
            limit = (limit * 2).min(total);
        };

        hits.truncate(k);
        Ok(hits.into_iter().map(|hit| hit.result).collect())
    }

    /// Runs one query and returns its hits sorted by distance, then row id.
    async fn fetch(table: &Table, query: &[f32], limit: usize) -> anyhow::Result<Vec<Hit>> {
        let results = table
            .query()
            .limit(limit)
            .nearest_to(query)?
            .distance_type(DistanceType::Cosine)
            .with_row_id()
            .execute()
            .await
            .context("Failed to execute LanceDB query")?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .context("Failed to collect query results")?;

        let mut hits = Vec::new();

        for batch in batches {
            let row_id_array = column::<UInt64Array>(&batch, "_rowid")?;
            let content_array = column::<StringArray>(&batch, "content")?;
            let metadata_array = column::<StringArray>(&batch, "metadata")?;
            let distance_array = column::<Float32Array>(&batch, "_distance")?;

            for i in 0..batch.num_rows() {
                let metadata: HashMap<String, String> =
                    serde_json::from_str(metadata_array.value(i))
                        .context("Failed to parse stored metadata")?;
                let distance = distance_array.value(i);

                hits.push(Hit {
                    row_id: row_id_array.value(i),
                    distance,
                    result: SearchResult {
                        content: content_array.value(i).to_string(),
                        metadata,
                        score: 1.0 - distance,
                    },
                });
            }
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row_id.cmp(&b.row_id)));
        Ok(hits)
    }
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> anyhow::Result<&'a T> {
    batch
        .column_by_name(name)
        .with_context(|| format!("Missing '{}' column", name))?
        .as_any()
        .downcast_ref::<T>()
        .with_context(|| format!("Unexpected type for '{}' column", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(content: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            content: content.to_string(),
            vector,
            metadata: HashMap::from([("source".to_string(), format!("{}.pdf", content))]),
        }
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-yet-created");

        let index = LanceDbIndex::open(path.to_str().unwrap(), "chunks").await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);
        assert!(index.search(&[1.0, 0.0], 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = LanceDbIndex::open(dir.path().to_str().unwrap(), "chunks").await.unwrap();

        let added = index
            .add(vec![
                entry("east", vec![1.0, 0.0]),
                entry("north", vec![0.0, 1.0]),
                entry("north-east", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(added, 3);

        let results = index.search(&[0.0, 1.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "north");
        assert_eq!(results[0].metadata["source"], "north.pdf");
        assert!(results[0].score >= results[1].score);
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap().to_string();

        {
            let index = LanceDbIndex::open(&path, "chunks").await.unwrap();
            index.add(vec![entry("kept", vec![0.5, 0.5])]).await.unwrap();
        }

        let reopened = LanceDbIndex::open(&path, "chunks").await.unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let results = reopened.search(&[0.5, 0.5], 4).await.unwrap();
        assert_eq!(results[0].content, "kept");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = LanceDbIndex::open(dir.path().to_str().unwrap(), "chunks").await.unwrap();
        index.add(vec![entry("a", vec![1.0, 0.0])]).await.unwrap();

        let err = index.add(vec![entry("b", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 3 }));

        let err = index.search(&[1.0], 1).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 1 }));
    }

    #[tokio::test]
    async fn test_clear_allows_new_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let index = LanceDbIndex::open(dir.path().to_str().unwrap(), "chunks").await.unwrap();
        index.add(vec![entry("a", vec![1.0, 0.0])]).await.unwrap();

        index.clear().await.unwrap();
        assert_eq!(index.count().await.unwrap(), 0);

        index.add(vec![entry("b", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let index = LanceDbIndex::open(dir.path().to_str().unwrap(), "chunks").await.unwrap();

        index.add(vec![entry("far", vec![0.0, 1.0])]).await.unwrap();
        for batch in [["t0", "t1"], ["t2", "t3"], ["t4", "t5"]] {
            let entries = batch.iter().map(|c| entry(c, vec![1.0, 0.0])).collect();
            index.add(entries).await.unwrap();
        }

        let results = index.search(&[1.0, 0.0], 3).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["t0", "t1", "t2"]);

        let results = index.search(&[1.0, 0.0], 7).await.unwrap();
        assert_eq!(results.len(), 7);
        assert_eq!(results[5].content, "t5");
        assert_eq!(results[6].content, "far");
    }

    #[tokio::test]
    async fn test_handles_on_same_directory_share_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let first = LanceDbIndex::open(path, "chunks").await.unwrap();
        let second = LanceDbIndex::open(path, "chunks").await.unwrap();

        first
            .add(vec![entry("a0", vec![1.0, 0.0]), entry("a1", vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(second.count().await.unwrap(), 2);

        second.add(vec![entry("b0", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(first.count().await.unwrap(), 3);

        let err = second.add(vec![entry("c", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 2, actual: 3 }));

        let results = first.search(&[1.0, 0.0], 3).await.unwrap();
        let contents: Vec<&str> = results.iter().map(|r| r.content.as_str()).collect();
        assert_eq!(contents, ["a0", "a1", "b0"]);
    }

    #[tokio::test]
    async fn test_unreadable_location_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain-file");
        std::fs::write(&file, b"not a database").unwrap();

        let result = LanceDbIndex::open(file.to_str().unwrap(), "chunks").await;
        assert!(matches!(result, Err(IndexError::Open(_))));
    }
}
