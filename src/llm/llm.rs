use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Transport-level retries for a single generation call. The planner never
/// retries beyond this; a generation that still fails is a resolution
/// failure.
const MAX_RETRIES: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(500);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            messages: vec![],
            // Query planning wants determinism, not creativity.
            max_tokens: 700,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

/// The generative text-interpretation capability. Everything that talks to a
/// model goes through this seam so backends stay interchangeable and tests
/// can script replies.
#[async_trait]
pub trait LlmModelTrait: Send + Sync {
    async fn generate_with_options(&self, options: GenerateOptions) -> Result<String>;
}

/// OpenAI chat-completions backend.
#[derive(Clone)]
pub struct OpenAiLlm {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl OpenAiLlm {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    async fn call_api(&self, options: &GenerateOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": &options.messages,
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenAI API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            choices: Vec<Choice>,
        }

        let api_response: ApiResponse = response.json().await?;
        api_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| anyhow!("OpenAI returned no choices"))
    }
}

#[async_trait]
impl LlmModelTrait for OpenAiLlm {
    async fn generate_with_options(&self, options: GenerateOptions) -> Result<String> {
        with_retries(|| self.call_api(&options)).await
    }
}

/// Ollama chat backend for local deployments.
#[derive(Clone)]
pub struct OllamaLlm {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaLlm {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            client: reqwest::Client::new(),
        }
    }

    async fn call_api(&self, options: &GenerateOptions) -> Result<String> {
        let body = serde_json::json!({
            "model": &self.model,
            "messages": &options.messages,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "top_p": options.top_p,
                "num_predict": options.max_tokens,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Ollama API error {}: {}", status, body));
        }

        #[derive(Deserialize)]
        struct Message {
            content: String,
        }
        #[derive(Deserialize)]
        struct ApiResponse {
            message: Message,
        }

        let api_response: ApiResponse = response.json().await?;
        Ok(api_response.message.content)
    }
}

#[async_trait]
impl LlmModelTrait for OllamaLlm {
    async fn generate_with_options(&self, options: GenerateOptions) -> Result<String> {
        with_retries(|| self.call_api(&options)).await
    }
}

async fn with_retries<F, Fut>(mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<String>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(reply) => return Ok(reply),
            Err(e) if attempt < MAX_RETRIES => {
                attempt += 1;
                tracing::warn!("generation attempt {} failed ({}), retrying", attempt, e);
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Scripted model for tests: pops one reply per call, or fails every call.
#[cfg(test)]
pub struct StubLlm {
    replies: std::sync::Mutex<std::collections::VecDeque<String>>,
    fail: bool,
}

#[cfg(test)]
impl StubLlm {
    pub fn scripted(replies: Vec<&str>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().map(String::from).collect()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            replies: std::sync::Mutex::new(std::collections::VecDeque::new()),
            fail: true,
        }
    }
}

#[cfg(test)]
#[async_trait]
impl LlmModelTrait for StubLlm {
    async fn generate_with_options(&self, _options: GenerateOptions) -> Result<String> {
        if self.fail {
            return Err(anyhow!("stub model configured to fail"));
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("stub model script exhausted"))
    }
}
