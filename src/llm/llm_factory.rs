use std::sync::Arc;

use anyhow::Result;

/// Supported generative backends
#[derive(Clone, Debug)]
pub enum LlmBackend {
    /// OpenAI chat completions API
    OpenAi,
    /// Local models via Ollama HTTP API
    Ollama,
}

/// Build a generative backend instance from environment variables
///
/// Environment variables:
/// - LISTINGD_LLM_BACKEND: "openai" (default) or "ollama"
/// - OPENAI_API_KEY: required for the openai backend
/// - LISTINGD_OPENAI_MODEL: model name (optional, defaults to gpt-4o-mini)
/// - LISTINGD_OLLAMA_MODEL: model name (required for ollama backend)
/// - LISTINGD_OLLAMA_URL: server URL (optional, defaults to http://localhost:11434)
///
/// Returns an error if configuration is invalid or missing required variables.
pub fn build_llm_from_env() -> Result<Arc<dyn super::llm::LlmModelTrait>> {
    let backend_str =
        std::env::var("LISTINGD_LLM_BACKEND").unwrap_or_else(|_| "openai".to_string());

    let backend = match backend_str.to_lowercase().as_str() {
        "openai" => LlmBackend::OpenAi,
        "ollama" => LlmBackend::Ollama,
        _ => {
            return Err(anyhow::anyhow!(
                "LISTINGD_LLM_BACKEND must be 'openai' or 'ollama', got: {}",
                backend_str
            ))
        }
    };

    tracing::info!("Selected LLM backend: {:?}", backend);

    match backend {
        LlmBackend::OpenAi => {
            let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
                anyhow::anyhow!("OPENAI_API_KEY is required when using the openai backend")
            })?;
            let model = std::env::var("LISTINGD_OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string());

            tracing::info!("Using OpenAI model {}", model);
            Ok(Arc::new(super::llm::OpenAiLlm::new(api_key, model)))
        }
        LlmBackend::Ollama => {
            let ollama_model = std::env::var("LISTINGD_OLLAMA_MODEL").map_err(|_| {
                anyhow::anyhow!("LISTINGD_OLLAMA_MODEL is required when using the ollama backend")
            })?;
            let ollama_url = std::env::var("LISTINGD_OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string());

            tracing::info!("Connecting to Ollama at {} with model {}", ollama_url, ollama_model);
            Ok(Arc::new(super::llm::OllamaLlm::new(ollama_url, ollama_model)))
        }
    }
}
