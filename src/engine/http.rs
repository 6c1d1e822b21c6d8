//! OpenAI-compatible chat-completions client for a local model server
//! (llama.cpp `server`, or anything speaking the same protocol).

use crate::brain::Brain;
use crate::config::EngineConfig;
use crate::engine::backend::InferenceBackend;
use crate::engine::errors::BackendError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const SYSTEM_PREAMBLE: &str =
    "You are the offline assistant of a local development lab.\nBe precise, helpful, structured, and stable.\n";

/// System message for a brain: coding mode for Scriptor, reasoning mode for Master.
pub fn system_prompt(brain: Brain) -> String {
    let mode = match brain {
        Brain::Scriptor => "Mode: CODING. Generate correct, well-commented code.\n",
        Brain::Master => "Mode: REASONING. Think in clear, layered steps.\n",
    };
    format!("{SYSTEM_PREAMBLE}{mode}")
}

pub struct HttpBackend {
    client: Client,
    brain: Brain,
    endpoint: String,
    model: Option<String>,
    loaded: bool,
    max_tokens: u32,
    temperature: f32,
}

impl HttpBackend {
    pub fn new(brain: Brain, endpoint: impl Into<String>, config: &EngineConfig) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: Client::new(),
            brain,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            loaded: false,
            max_tokens: config.max_tokens,
            temperature: config.temperature_for(brain),
        }
    }

    fn request_body<'a>(&'a self, prompt: &'a str, system: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: self.model.as_deref(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_completion(body: &str) -> Result<String, BackendError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::Response(format!("failed to parse response: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| BackendError::Response("no choices in response".to_string()))
}

fn request_error(e: reqwest::Error) -> BackendError {
    if e.is_connect() {
        BackendError::Request(format!("connection failed: {e}"))
    } else if e.is_timeout() {
        BackendError::Request(format!("request timeout: {e}"))
    } else {
        BackendError::Request(e.to_string())
    }
}

#[async_trait]
impl InferenceBackend for HttpBackend {
    async fn generate(&mut self, prompt: &str, max_context: usize) -> Result<String, BackendError> {
        if !self.loaded {
            return Err(BackendError::NotLoaded);
        }
        let system = system_prompt(self.brain);
        let body = self.request_body(prompt, &system);
        tracing::debug!(
            brain = %self.brain,
            prompt_chars = prompt.len(),
            max_context,
            "sending chat completion"
        );

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        parse_completion(&text)
    }

    async fn load(&mut self, model: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
            .map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }
        if !model.is_empty() {
            self.model = Some(model.to_string());
        }
        self.loaded = true;
        Ok(())
    }

    async fn unload(&mut self) {
        self.loaded = false;
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn describe(&self) -> String {
        format!(
            "{} ({})",
            self.endpoint,
            self.model.as_deref().unwrap_or("server default")
        )
    }
}
