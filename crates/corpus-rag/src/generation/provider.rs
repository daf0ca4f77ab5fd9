//! Answer-generation providers with tagged dispatch
//!
//! One variant per provider with a uniform `generate` capability. Provider
//! selection happens at construction from the typed config enum, so an
//! unknown provider is a configuration error, not a runtime branch.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::config::{GenerationConfig, LlmBackend};
use crate::error::{Error, Result};

/// LLM client, one variant per supported provider
pub enum LlmClient {
    Gemini(GeminiClient),
    OpenAi(OpenAiChatClient),
    OpenRouter(OpenAiChatClient),
    HuggingFace(HuggingFaceClient),
}

impl LlmClient {
    /// Build the configured provider client
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(match config.backend {
            LlmBackend::Gemini => Self::Gemini(GeminiClient {
                client,
                base_url: base_url(config, "https://generativelanguage.googleapis.com"),
                api_key: config.api_key.clone().unwrap_or_default(),
                model: config.model.clone(),
                temperature: config.temperature,
            }),
            LlmBackend::OpenAi => Self::OpenAi(OpenAiChatClient {
                client,
                base_url: base_url(config, "https://api.openai.com"),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
            }),
            LlmBackend::OpenRouter => Self::OpenRouter(OpenAiChatClient {
                client,
                base_url: base_url(config, "https://openrouter.ai/api"),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
            }),
            LlmBackend::HuggingFace => Self::HuggingFace(HuggingFaceClient {
                client,
                base_url: base_url(config, "https://api-inference.huggingface.co"),
                api_key: config.api_key.clone(),
                model: config.model.clone(),
                temperature: config.temperature,
            }),
        })
    }

    /// Generate text from a prompt and optional system prompt
    pub async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        match self {
            Self::Gemini(c) => c.generate(prompt, system_prompt).await,
            Self::OpenAi(c) | Self::OpenRouter(c) => c.generate(prompt, system_prompt).await,
            Self::HuggingFace(c) => c.generate(prompt, system_prompt).await,
        }
    }

    /// Provider name for diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Gemini(_) => "gemini",
            Self::OpenAi(_) => "openai",
            Self::OpenRouter(_) => "openrouter",
            Self::HuggingFace(_) => "huggingface",
        }
    }
}

fn base_url(config: &GenerationConfig, default: &str) -> String {
    config
        .base_url
        .clone()
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Google Gemini generateContent client
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    text: String,
}

impl GeminiClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let mut body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": self.temperature },
        });
        if let Some(system) = system_prompt {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Gemini HTTP {}: {}", status, text)));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| Error::Llm("Empty Gemini response".to_string()))
    }
}

/// OpenAI-compatible chat completions client (also used for OpenRouter)
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl OpenAiChatClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("Chat HTTP {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse chat response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Llm("Empty chat response".to_string()))
    }
}

/// Hugging Face inference API client
pub struct HuggingFaceClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
}

#[derive(Deserialize)]
struct HfGenerated {
    generated_text: String,
}

impl HuggingFaceClient {
    async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<String> {
        let url = format!("{}/models/{}", self.base_url, self.model);

        // The inference API has no system role; prepend it to the input
        let input = match system_prompt {
            Some(system) => format!("{}\n\n{}", system, prompt),
            None => prompt.to_string(),
        };

        let body = json!({
            "inputs": input,
            "parameters": { "temperature": self.temperature, "return_full_text": false },
        });

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Llm(format!("HuggingFace HTTP {}: {}", status, text)));
        }

        let parsed: Vec<HfGenerated> = response
            .json()
            .await
            .map_err(|e| Error::Llm(format!("Failed to parse HuggingFace response: {}", e)))?;

        parsed
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or_else(|| Error::Llm("Empty HuggingFace response".to_string()))
    }
}
