use std::{collections::{BTreeSet, HashMap}, path::PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use qdrant_client::qdrant::{
    value::Kind, CountPointsBuilder, CreateCollectionBuilder, DeleteCollectionBuilder, Distance, PointStruct,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::info;

use super::{ScoredRecord, VectorRecord, VectorStore};
use crate::Result;

const SCROLL_PAGE: u32 = 256;

/// Qdrant collection with cosine distance; chunk metadata lives in the payload.
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().with_context(|| format!("connecting to qdrant at {url}"))?;
        Ok(Self { client, collection: collection.to_string() })
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self.client.collection_exists(self.collection.clone()).await?)
    }

    async fn ensure_collection(&self, dim: usize) -> Result<()> {
        if !self.exists().await? {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(self.collection.clone())
                        .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
                )
                .await?;
            info!(collection = %self.collection, dim, "created qdrant collection");
        }
        Ok(())
    }
}

fn payload_str(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_int(payload: &HashMap<String, Value>, key: &str) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(n) => Some(*n),
        _ => None,
    }
}

fn record_from_payload(payload: &HashMap<String, Value>) -> VectorRecord {
    VectorRecord {
        id: payload_str(payload, "id").unwrap_or_default(),
        text: payload_str(payload, "text").unwrap_or_default(),
        source: PathBuf::from(payload_str(payload, "source").unwrap_or_default()),
        page: payload_int(payload, "page").and_then(|p| u32::try_from(p).ok()),
        start_index: payload_int(payload, "start_index").and_then(|s| usize::try_from(s).ok()),
        vector: Vec::new(),
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn add(&mut self, records: Vec<VectorRecord>) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        self.ensure_collection(first.vector.len()).await?;
        let mut points = Vec::with_capacity(records.len());
        for r in records {
            let payload = Payload::try_from(json!({
                "id": r.id,
                "text": r.text,
                "source": r.source.to_string_lossy(),
                "page": r.page,
                "start_index": r.start_index,
            }))?;
            points.push(PointStruct::new(r.id, r.vector, payload));
        }
        self.client
            .upsert_points(UpsertPointsBuilder::new(self.collection.clone(), points).wait(true))
            .await?;
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        if !self.exists().await? {
            return Ok(vec![]);
        }
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(self.collection.clone(), query.to_vec(), k as u64).with_payload(true))
            .await?;
        Ok(response
            .result
            .into_iter()
            .map(|point| ScoredRecord { record: record_from_payload(&point.payload), similarity: point.score })
            .collect())
    }

    async fn len(&self) -> Result<usize> {
        if !self.exists().await? {
            return Ok(0);
        }
        let response = self
            .client
            .count(CountPointsBuilder::new(self.collection.clone()).exact(true))
            .await?;
        Ok(response.result.map(|r| r.count as usize).unwrap_or(0))
    }

    async fn sources(&self) -> Result<Vec<PathBuf>> {
        let mut set = BTreeSet::new();
        if !self.exists().await? {
            return Ok(vec![]);
        }
        let mut offset = None;
        loop {
            let mut request = ScrollPointsBuilder::new(self.collection.clone())
                .limit(SCROLL_PAGE)
                .with_payload(true);
            if let Some(id) = offset.take() {
                request = request.offset(id);
            }
            let response = self.client.scroll(request).await?;
            for point in &response.result {
                if let Some(source) = payload_str(&point.payload, "source") {
                    set.insert(PathBuf::from(source));
                }
            }
            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(set.into_iter().collect())
    }

    async fn clear(&mut self) -> Result<()> {
        if self.exists().await? {
            self.client
                .delete_collection(DeleteCollectionBuilder::new(self.collection.clone()))
                .await?;
        }
        Ok(())
    }

    /// Qdrant writes through on every upsert.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}
