//! kbqa-llm
//!
//! Chat-completion client for any OpenAI-compatible endpoint (OpenAI, Ollama's
//! `/v1`, vLLM). Replies are returned as raw text; structured parsing belongs
//! to the caller.

pub mod client;
pub mod types;

pub use client::{ChatClientError, OpenAiChatClient};
