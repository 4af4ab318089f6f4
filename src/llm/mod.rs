use crate::config::{LlmBackend, LlmConfig};
use crate::Result;

pub mod ollama;

use ollama::{GenerateOptions, OllamaBackend};

#[derive(Debug, Clone, Default)]
pub struct LLMEngine {
    backend: Backend,
}

#[derive(Debug, Clone, Default)]
enum Backend {
    Ollama(OllamaBackend),
    #[default]
    Stub,
}

impl LLMEngine {
    pub fn new() -> Self { Self { backend: Backend::default() } }

    pub fn with_ollama(base_url: &str, model: &str, options: GenerateOptions) -> Self {
        Self { backend: Backend::Ollama(OllamaBackend::new(base_url, model, options)) }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        match config.backend {
            LlmBackend::Ollama => Self::with_ollama(
                &config.base_url,
                &config.model,
                GenerateOptions { temperature: config.temperature, num_predict: config.num_predict },
            ),
            LlmBackend::Stub => Self::new(),
        }
    }

    pub fn describe(&self) -> String {
        match &self.backend {
            Backend::Ollama(b) => format!("ollama:{}", b.model()),
            Backend::Stub => "stub".to_string(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        match &self.backend {
            Backend::Ollama(b) => b.generate(prompt).await,
            Backend::Stub => Ok(format!("LLM(stub) response for prompt ({} chars).", prompt.chars().count())),
        }
    }
}
