use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use kbqa_core::traits::ChatModel;

use crate::types::{ChatMessage, ChatRequest, ChatResponse};

#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Chat API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Chat API returned no message content")]
    EmptyResponse,
}

/// Client for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl OpenAiChatClient {
    /// `timeout` bounds the whole request; callers still apply their own
    /// stage deadline on top.
    pub fn new(base_url: &str, model: &str, temperature: f32, api_key: Option<String>, timeout: Duration) -> Result<Self, ChatClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, ChatClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest { model: self.model.clone(), messages, temperature: self.temperature };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ChatClientError::Api { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        let content = parsed.first_content().ok_or(ChatClientError::EmptyResponse)?.to_string();
        debug!(model = %self.model, chars = content.len(), "chat completion received");
        Ok(content)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> anyhow::Result<String> {
        Ok(self.chat(vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)]).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = OpenAiChatClient::new("http://localhost:11434/v1/", "m", 0.0, None, Duration::from_secs(1)).expect("client");
        assert_eq!(c.base_url, "http://localhost:11434/v1");
        assert_eq!(c.model(), "m");
    }

    #[test]
    fn response_without_choices_has_no_content() {
        let r: ChatResponse = serde_json::from_str(r#"{"id":"x"}"#).expect("json");
        assert!(r.first_content().is_none());
    }

    #[test]
    fn api_error_display_includes_status() {
        let e = ChatClientError::Api { status: 429, body: "slow down".into() };
        assert!(e.to_string().contains("429"));
    }
}
