use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{DocQaError, Result};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub splitter: SplitterConfig,
    pub rebuild: RebuildConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub store_path: PathBuf,
    /// Uploaded files are staged here before indexing.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { store_path: PathBuf::from("store/index.json"), data_dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self { Self { chunk_size: 800, chunk_overlap: 200 } }
}

/// Settings used when the whole store is rebuilt from a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RebuildConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub extension: String,
}

impl Default for RebuildConfig {
    fn default() -> Self { Self { chunk_size: 1500, chunk_overlap: 150, extension: "md".into() } }
}

impl RebuildConfig {
    pub fn splitter(&self) -> SplitterConfig {
        SplitterConfig { chunk_size: self.chunk_size, chunk_overlap: self.chunk_overlap }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbours inspected by the relevance gate.
    pub gate_k: usize,
    /// Neighbours stuffed into the prompt.
    pub context_k: usize,
    pub relevance_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self { Self { gate_k: 3, context_k: 4, relevance_threshold: 0.2 } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    pub normalize: bool,
    pub batch_size: usize,
    /// Only used by the hash backend.
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            base_url: DEFAULT_OLLAMA_URL.into(),
            model: "all-minilm".into(),
            normalize: true,
            batch_size: 32,
            dimension: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    Ollama,
    Stub,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub base_url: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub num_predict: Option<i32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: LlmBackend::Ollama,
            base_url: DEFAULT_OLLAMA_URL.into(),
            model: "gemma:2b".into(),
            temperature: None,
            num_predict: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            qdrant_url: "http://localhost:6334".into(),
            collection: "docqa".into(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: Config = toml::from_str(&data)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    /// Applies `DOCQA_*` environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DOCQA_OLLAMA_URL") {
            self.embedding.base_url = url.clone();
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("DOCQA_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(model) = lookup("DOCQA_EMBED_MODEL") {
            self.embedding.model = model;
        }
        if let Some(path) = lookup("DOCQA_STORE_PATH") {
            self.paths.store_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_splitter("splitter", self.splitter)?;
        check_splitter("rebuild", self.rebuild.splitter())?;
        let r = &self.retrieval;
        if r.gate_k == 0 || r.context_k == 0 {
            return Err(DocQaError::Config("retrieval.gate_k and retrieval.context_k must be positive".into()).into());
        }
        if !(0.0..=1.0).contains(&r.relevance_threshold) {
            return Err(DocQaError::Config(format!(
                "retrieval.relevance_threshold must lie in [0, 1], got {}",
                r.relevance_threshold
            ))
            .into());
        }
        if self.embedding.batch_size == 0 {
            return Err(DocQaError::Config("embedding.batch_size must be positive".into()).into());
        }
        if self.embedding.backend == EmbeddingBackend::Hash && self.embedding.dimension == 0 {
            return Err(DocQaError::Config("embedding.dimension must be positive".into()).into());
        }
        Ok(())
    }
}

fn check_splitter(section: &str, s: SplitterConfig) -> Result<()> {
    if s.chunk_size == 0 {
        return Err(DocQaError::Config(format!("{section}.chunk_size must be positive")).into());
    }
    if s.chunk_overlap >= s.chunk_size {
        return Err(DocQaError::Config(format!(
            "{section}.chunk_overlap ({}) must be smaller than chunk_size ({})",
            s.chunk_overlap, s.chunk_size
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_settings() {
        let cfg = Config::default();
        assert_eq!(cfg.splitter.chunk_size, 800);
        assert_eq!(cfg.splitter.chunk_overlap, 200);
        assert_eq!(cfg.rebuild.chunk_size, 1500);
        assert_eq!(cfg.retrieval.gate_k, 3);
        assert_eq!(cfg.llm.model, "gemma:2b");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docqa.toml");
        std::fs::write(
            &path,
            "[retrieval]\nrelevance_threshold = 0.5\n\n[llm]\nbackend = \"stub\"\n",
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.retrieval.relevance_threshold, 0.5);
        assert_eq!(cfg.retrieval.context_k, 4);
        assert_eq!(cfg.llm.backend, LlmBackend::Stub);
        assert_eq!(cfg.embedding.model, "all-minilm");
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut cfg = Config::default();
        cfg.splitter.chunk_overlap = 800;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err.downcast_ref::<DocQaError>(), Some(DocQaError::Config(_))));
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let mut cfg = Config::default();
        cfg.retrieval.relevance_threshold = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_overrides(|key| match key {
            "DOCQA_OLLAMA_URL" => Some("http://ollama:11434".to_string()),
            "DOCQA_LLM_MODEL" => Some("llama3".to_string()),
            _ => None,
        });
        assert_eq!(cfg.llm.base_url, "http://ollama:11434");
        assert_eq!(cfg.embedding.base_url, "http://ollama:11434");
        assert_eq!(cfg.llm.model, "llama3");
        assert_eq!(cfg.embedding.model, "all-minilm");
    }
}
