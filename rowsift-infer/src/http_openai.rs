use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{render_user_message, strip_code_fences, CodeGenerator, GenerateError, SYSTEM_PROMPT};

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Generator backed by an OpenAI-compatible chat-completions endpoint.
///
/// Decoding is deterministic (temperature 0) so repeated calls with
/// identical input tend to the same line; nothing is cached and
/// nothing is retried.
pub struct HttpOpenAiGenerator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpOpenAiGenerator {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            model,
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl CodeGenerator for HttpOpenAiGenerator {
    async fn generate(&self, instruction: &str, sample: &str) -> Result<String, GenerateError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: render_user_message(instruction, sample),
                },
            ],
            temperature: 0.0,
            max_tokens: 256,
        };

        // Bounded per-request deadline on the model call.
        let mut req = self.client.post(&url).json(&body).timeout(self.timeout);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await.map_err(|e| GenerateError {
            // reqwest redacts the bearer token from its Display output;
            // the raw error never carries the key.
            message: format!("HTTP error: {e}"),
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(GenerateError {
                message: format!("upstream returned HTTP {status}"),
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| GenerateError {
            message: format!("malformed completion body: {e}"),
        })?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GenerateError {
                message: "completion contained no choices".into(),
            })?;

        let code = strip_code_fences(content);
        tracing::debug!(%code, "generated filter code");
        Ok(code)
    }
}
