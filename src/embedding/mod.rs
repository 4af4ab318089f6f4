use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::llm::ollama::ensure_success;
use crate::Result;

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn name(&self) -> String;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().context("embedder returned no vector for the query")
    }
}

pub fn from_config(config: &EmbeddingConfig) -> Arc<dyn Embedder> {
    match config.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(&config.base_url, &config.model, config.normalize)),
        EmbeddingBackend::Hash => Arc::new(HashEmbedder::new(config.dimension)),
    }
}

/// Client for Ollama's `/api/embed` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
    normalize: bool,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, normalize: bool) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            normalize,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let url = format!("{}/api/embed", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&EmbedRequest { model: &self.model, input: texts })
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let resp = ensure_success("ollama embed", resp).await?;
        let body: EmbedResponse = resp.json().await.context("decoding embed response")?;
        if body.embeddings.len() != texts.len() {
            anyhow::bail!(
                "ollama embed returned {} vectors for {} inputs",
                body.embeddings.len(),
                texts.len()
            );
        }
        debug!(model = %self.model, count = texts.len(), "embedded batch");
        Ok(if self.normalize {
            body.embeddings.into_iter().map(l2_normalize).collect()
        } else {
            body.embeddings
        })
    }

    fn name(&self) -> String {
        format!("ollama:{}", self.model)
    }
}

/// Offline embedder: lower-cased word tokens hashed into a fixed number of
/// buckets, then L2-normalised. Texts sharing words score high, disjoint
/// vocabularies score zero.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self { Self { dim: 256 } }
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let bucket = (fnv1a(&token.to_lowercase()) % self.dim as u64) as usize;
            v[bucket] += 1.0;
        }
        l2_normalize(v)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn name(&self) -> String {
        format!("hash:{}", self.dim)
    }
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325u64, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3))
}

pub fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let n2: f32 = v.iter().map(|x| x * x).sum();
    if n2 > 0.0 {
        let norm = n2.sqrt();
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalised() {
        let e = HashEmbedder::new(64);
        let texts = vec!["The dragon guards gold".to_string(), "the DRAGON guards gold".to_string()];
        let vs = e.embed(&texts).await.unwrap();
        assert_eq!(vs.len(), 2);
        assert_eq!(vs[0].len(), 64);
        assert_eq!(vs[0], vs[1]);
        assert!((dot(&vs[0], &vs[0]) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn shared_words_score_higher_than_disjoint_ones() {
        let e = HashEmbedder::new(512);
        let doc = e.embed_text("photosynthesis converts sunlight into chemical energy");
        let related = e.embed_text("how does photosynthesis use sunlight");
        let unrelated = e.embed_text("medieval castle tournament");
        assert!(dot(&doc, &related) > dot(&doc, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let v = HashEmbedder::new(8).embed_text("  ...  ");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn normalize_handles_zero() {
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);
    }
}
