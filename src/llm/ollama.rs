use anyhow::Context;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{DocQaError, Result};

/// Turns a non-2xx response into `DocQaError::Backend`, keeping the body for
/// the error message.
pub(crate) async fn ensure_success(service: &'static str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(DocQaError::Backend { service, status: status.as_u16(), body }.into())
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<i32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Non-streaming client for Ollama's `/api/generate`.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    options: GenerateOptions,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str, options: GenerateOptions) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&GenerateRequest { model: &self.model, prompt, stream: false, options: &self.options })
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;
        let resp = ensure_success("ollama generate", resp).await?;
        let body: GenerateResponse = resp.json().await.context("decoding generate response")?;
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), answer_chars = body.response.chars().count(), "generated");
        Ok(body.response)
    }
}
