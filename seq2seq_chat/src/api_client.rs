//! チャット補完APIクライアント
//!
//! 訓練データ生成用。OpenAI互換の `/chat/completions` エンドポイントを同期的に呼び出す。

use crate::config::ApiConfig;
use crate::error::{ChatError, Result};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
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
}

/// リクエストボディ
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// メッセージ列から1件の返答テキストを得るクライアント
pub trait CompletionClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// OpenAI互換APIのHTTPクライアント
pub struct OpenAiClient {
    config: ApiConfig,
    api_key: Option<String>,
    http: Client,
}

impl OpenAiClient {
    pub fn new(config: ApiConfig, api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            api_key,
            http,
        })
    }

    pub fn request_for(&self, messages: &[ChatMessage]) -> ChatRequest {
        ChatRequest {
            model: self.config.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut request_builder = self.http.post(&url).json(&self.request_for(messages));

        // APIキーがあればBearer認証
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }

        let response = request_builder.send()?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ChatError::Api(format!(
                "HTTP {} - {}",
                status,
                response.text().unwrap_or_default()
            )));
        }

        let body: ChatResponse = response.json()?;
        parse_completion(body)
    }
}

fn parse_completion(body: ChatResponse) -> Result<String> {
    body.choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| ChatError::Api("応答にテキストが含まれていません".to_string()))
}
