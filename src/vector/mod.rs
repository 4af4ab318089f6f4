use std::{cmp::Ordering, collections::BTreeSet, fs, path::{Path, PathBuf}};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, StoreBackend};
use crate::document::Chunk;
use crate::embedding::l2_normalize;
use crate::{DocQaError, Result};

#[cfg(feature = "vector-qdrant")]
pub mod qdrant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub source: PathBuf,
    pub page: Option<u32>,
    pub start_index: Option<usize>,
    pub vector: Vec<f32>,
}

impl VectorRecord {
    pub fn from_chunk(chunk: Chunk, vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id,
            text: chunk.text,
            source: chunk.source,
            page: chunk.page,
            start_index: chunk.start_index,
            vector,
        }
    }
}

/// A search hit; `similarity` is the cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub similarity: f32,
}

impl ScoredRecord {
    pub fn relevance(&self) -> f32 {
        relevance_score(self.similarity)
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn add(&mut self, records: Vec<VectorRecord>) -> Result<()>;
    /// Up to `k` records, most similar first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>>;
    async fn len(&self) -> Result<usize>;
    async fn sources(&self) -> Result<Vec<PathBuf>>;
    async fn clear(&mut self) -> Result<()>;
    async fn persist(&self) -> Result<()>;

    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// Maps cosine similarity of unit vectors to a `[0, 1]` relevance through
/// their squared Euclidean distance: `1 - d / sqrt(2)` with `d = 2 - 2 cos`.
pub fn relevance_score(cosine: f32) -> f32 {
    let distance = (2.0 - 2.0 * cosine).max(0.0);
    (1.0 - distance / std::f32::consts::SQRT_2).clamp(0.0, 1.0)
}

pub async fn open_store(config: &Config) -> Result<Box<dyn VectorStore>> {
    match config.store.backend {
        StoreBackend::Local => Ok(Box::new(LocalVectorStore::open(&config.paths.store_path)?)),
        StoreBackend::Qdrant => {
            #[cfg(feature = "vector-qdrant")]
            {
                let store = qdrant::QdrantStore::connect(&config.store.qdrant_url, &config.store.collection)?;
                Ok(Box::new(store))
            }
            #[cfg(not(feature = "vector-qdrant"))]
            {
                Err(DocQaError::FeatureDisabled { format: "Qdrant", feature: "vector-qdrant" }.into())
            }
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    dimension: Option<usize>,
    records: Vec<VectorRecord>,
}

/// Brute-force cosine store kept in memory and saved as a JSON snapshot.
#[derive(Debug, Default)]
pub struct LocalVectorStore {
    path: Option<PathBuf>,
    snapshot: Snapshot,
}

impl LocalVectorStore {
    pub fn in_memory() -> Self { Self::default() }

    /// Loads the snapshot at `path` if present; `persist` writes back there.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let data = fs::read_to_string(path).with_context(|| format!("reading store {}", path.display()))?;
            let snapshot: Snapshot = serde_json::from_str(&data)
                .with_context(|| format!("parsing store {}", path.display()))?;
            info!(path = %path.display(), records = snapshot.records.len(), "opened vector store");
            snapshot
        } else {
            Snapshot::default()
        };
        Ok(Self { path: Some(path.to_path_buf()), snapshot })
    }

    pub fn records(&self) -> &[VectorRecord] {
        &self.snapshot.records
    }
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    async fn add(&mut self, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let expected = self.snapshot.dimension.unwrap_or(first.vector.len());
        if let Some(bad) = records.iter().find(|r| r.vector.len() != expected) {
            return Err(DocQaError::DimensionMismatch { expected, actual: bad.vector.len() }.into());
        }
        self.snapshot.dimension = Some(expected);
        self.snapshot.records.extend(records.into_iter().map(|mut record| {
            record.vector = l2_normalize(record.vector);
            record
        }));
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        if let Some(expected) = self.snapshot.dimension {
            if expected != query.len() {
                return Err(DocQaError::DimensionMismatch { expected, actual: query.len() }.into());
            }
        }
        let q = l2_normalize(query.to_vec());
        let mut scores: Vec<ScoredRecord> = self
            .snapshot
            .records
            .iter()
            .map(|r| ScoredRecord { record: r.clone(), similarity: dot(&q, &r.vector) })
            .collect();
        scores.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(Ordering::Equal));
        scores.truncate(k);
        Ok(scores)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.snapshot.records.len())
    }

    async fn sources(&self) -> Result<Vec<PathBuf>> {
        let set: BTreeSet<PathBuf> = self.snapshot.records.iter().map(|r| r.source.clone()).collect();
        Ok(set.into_iter().collect())
    }

    async fn clear(&mut self) -> Result<()> {
        self.snapshot = Snapshot::default();
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_string(&self.snapshot)?;
        fs::write(&tmp, data).with_context(|| format!("writing {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        debug!(path = %path.display(), records = self.snapshot.records.len(), "persisted vector store");
        Ok(())
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, source: &str, vector: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            text: format!("text of {id}"),
            source: PathBuf::from(source),
            page: None,
            start_index: Some(0),
            vector,
        }
    }

    #[test]
    fn relevance_maps_cosine_into_unit_range() {
        assert!((relevance_score(1.0) - 1.0).abs() < 1e-6);
        assert!(relevance_score(0.0).abs() < 1e-6);
        assert_eq!(relevance_score(-1.0), 0.0);
        assert!(relevance_score(0.9) > relevance_score(0.5));
        assert!((relevance_score(0.5) - (1.0 - 1.0 / std::f32::consts::SQRT_2)).abs() < 1e-6);
        assert!(relevance_score(-0.2) == 0.0);
    }

    #[test]
    fn threshold_sits_near_cosine_point_four_three() {
        assert!(relevance_score(0.36) < 0.2);
        assert!(relevance_score(0.43) < 0.2);
        assert!(relevance_score(0.45) > 0.2);
    }

    #[tokio::test]
    async fn rejected_batch_leaves_store_untouched() {
        let mut store = LocalVectorStore::in_memory();
        store.add(vec![record("a", "a.txt", vec![1.0, 0.0])]).await.unwrap();
        let err = store
            .add(vec![record("b", "b.txt", vec![0.0, 1.0]), record("c", "c.txt", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocQaError>(),
            Some(DocQaError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn first_batch_must_agree_on_dimension() {
        let mut store = LocalVectorStore::in_memory();
        let result = store
            .add(vec![record("a", "a.txt", vec![1.0, 0.0]), record("b", "b.txt", vec![1.0, 0.0, 0.0])])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty().await.unwrap());
        store.add(vec![record("c", "c.txt", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let mut store = LocalVectorStore::in_memory();
        store
            .add(vec![
                record("a", "a.txt", vec![1.0, 0.0, 0.0]),
                record("b", "b.txt", vec![0.7, 0.7, 0.0]),
                record("c", "c.txt", vec![0.0, 0.0, 1.0]),
            ])
            .await
            .unwrap();
        let hits = store.search(&[2.0, 0.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimension_is_fixed_by_first_record() {
        let mut store = LocalVectorStore::in_memory();
        store.add(vec![record("a", "a.txt", vec![1.0, 0.0])]).await.unwrap();
        let err = store.add(vec![record("b", "b.txt", vec![1.0, 0.0, 0.0])]).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DocQaError>(),
            Some(DocQaError::DimensionMismatch { expected: 2, actual: 3 })
        ));
        assert!(store.search(&[1.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("index.json");
        let mut store = LocalVectorStore::open(&path).unwrap();
        assert!(store.is_empty().await.unwrap());
        store
            .add(vec![record("a", "docs/a.md", vec![1.0, 0.0]), record("b", "docs/b.md", vec![0.0, 1.0])])
            .await
            .unwrap();
        store.persist().await.unwrap();

        let reopened = LocalVectorStore::open(&path).unwrap();
        assert_eq!(reopened.len().await.unwrap(), 2);
        assert_eq!(
            reopened.sources().await.unwrap(),
            vec![PathBuf::from("docs/a.md"), PathBuf::from("docs/b.md")]
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn clear_resets_dimension() {
        let mut store = LocalVectorStore::in_memory();
        store.add(vec![record("a", "a.txt", vec![1.0, 0.0])]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        store.add(vec![record("b", "b.txt", vec![1.0, 0.0, 0.0])]).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_store_returns_no_hits() {
        let store = LocalVectorStore::in_memory();
        assert!(store.search(&[1.0, 0.0], 3).await.unwrap().is_empty());
    }
}
