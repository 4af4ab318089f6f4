use std::{path::Path, sync::Arc};

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{Config, RebuildConfig, RetrievalConfig, SplitterConfig};
use crate::document::{self, Chunk, RecursiveSplitter};
use crate::embedding::{self, Embedder};
use crate::llm::LLMEngine;
use crate::smalltalk::SmallTalk;
use crate::vector::{self, VectorRecord, VectorStore};
use crate::{DocQaError, Result};

pub mod prompt;

/// A reply and the file names of the passages it was grounded on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<String>,
}

impl Answer {
    fn canned(text: &str) -> Self {
        Self { text: text.to_string(), sources: vec![] }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: usize,
    pub chunks: usize,
}

/// Ties the store, the embedder and the language model together: indexes
/// documents and answers questions over them.
pub struct Assistant {
    store: Box<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    llm: LLMEngine,
    small_talk: SmallTalk,
    splitter: SplitterConfig,
    rebuild: RebuildConfig,
    retrieval: RetrievalConfig,
    batch_size: usize,
    progress: ProgressBar,
}

impl Assistant {
    pub fn new(store: Box<dyn VectorStore>, embedder: Arc<dyn Embedder>, llm: LLMEngine, config: &Config) -> Self {
        Self {
            store,
            embedder,
            llm,
            small_talk: SmallTalk::new(),
            splitter: config.splitter,
            rebuild: config.rebuild.clone(),
            retrieval: config.retrieval,
            batch_size: config.embedding.batch_size.max(1),
            progress: ProgressBar::hidden(),
        }
    }

    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let store = vector::open_store(config).await?;
        let embedder = embedding::from_config(&config.embedding);
        let llm = LLMEngine::from_config(&config.llm);
        info!(embedder = %embedder.name(), llm = %llm.describe(), "assistant ready");
        Ok(Self::new(store, embedder, llm, config))
    }

    /// Reports embedding progress on `bar` instead of staying silent.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    /// Load, split, embed and store one file, then persist the store.
    pub async fn process_and_store(&mut self, path: &Path) -> Result<IndexReport> {
        let docs = document::load_document(path)?;
        let chunks = RecursiveSplitter::new(self.splitter).split_documents(&docs);
        let stored = self.embed_and_add(chunks).await?;
        self.store.persist().await?;
        info!(path = %path.display(), chunks = stored, "indexed document");
        Ok(IndexReport { documents: docs.len(), chunks: stored })
    }

    /// Drop everything in the store and index every file directly inside `dir`
    /// that has the configured extension. Subdirectories are not searched.
    pub async fn rebuild(&mut self, dir: &Path) -> Result<(IndexReport, Vec<Chunk>)> {
        self.store.clear().await?;
        let wanted = self.rebuild.extension.trim_start_matches('.').to_ascii_lowercase();

        let mut docs = Vec::new();
        for entry in WalkDir::new(dir).max_depth(1).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() || document::extension_of(path) != wanted {
                continue;
            }
            match document::load_document(path) {
                Ok(loaded) => docs.extend(loaded),
                Err(err) => warn!(path = %path.display(), %err, "skipping unreadable file"),
            }
        }

        let chunks = RecursiveSplitter::new(self.rebuild.splitter()).split_documents(&docs);
        info!(documents = docs.len(), chunks = chunks.len(), "split documents for rebuild");
        let stored = self.embed_and_add(chunks.clone()).await?;
        self.store.persist().await?;
        Ok((IndexReport { documents: docs.len(), chunks: stored }, chunks))
    }

    async fn embed_and_add(&mut self, chunks: Vec<Chunk>) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let total = chunks.len();
        self.progress.set_length(total as u64);
        self.progress.set_position(0);

        let mut remaining = chunks.into_iter().peekable();
        while remaining.peek().is_some() {
            let batch: Vec<Chunk> = remaining.by_ref().take(self.batch_size).collect();
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(&texts).await?;
            let records = batch
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| VectorRecord::from_chunk(chunk, vector))
                .collect::<Vec<_>>();
            let n = records.len() as u64;
            self.store.add(records).await?;
            self.progress.inc(n);
        }
        self.progress.finish_and_clear();
        Ok(total)
    }

    pub async fn answer_question(&self, query: &str) -> Result<Answer> {
        if query.trim().is_empty() {
            return Err(DocQaError::EmptyQuery.into());
        }
        if let Some(reply) = self.small_talk.reply(query) {
            debug!("answered with small talk");
            return Ok(Answer::canned(reply));
        }

        let query_vector = self.embedder.embed_query(query).await?;

        let gate = self.store.search(&query_vector, self.retrieval.gate_k).await?;
        let best = gate.iter().map(|h| h.relevance()).fold(f32::NEG_INFINITY, f32::max);
        debug!(hits = gate.len(), best_relevance = best, "relevance gate");
        if best < self.retrieval.relevance_threshold {
            return Ok(Answer::canned(prompt::NOT_FOUND_REPLY));
        }

        let hits = self.store.search(&query_vector, self.retrieval.context_k).await?;
        let answer = self.llm.generate(&prompt::stuff_prompt(query, &hits)).await?;
        if prompt::is_evasive(&answer) {
            return Ok(Answer::canned(prompt::NO_ANSWER_REPLY));
        }

        let sources = prompt::source_names(&hits);
        Ok(Answer { text: prompt::with_sources(answer.trim(), &sources), sources })
    }
}
