use crate::api_client::{ChatMessage, CompletionClient};
use crate::dataset::DialoguePair;
use crate::error::Result;
use log::{info, warn};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

/// API呼び出しに失敗したときに代わりに使う返答
pub const FALLBACK_COMPLETION: &str = "I'm not sure about that, but I'm happy to help with something else.";

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer in one or two short sentences.";

/// 質問ファイルを指定しなかった場合の質問リスト
pub const DEFAULT_PROMPTS: &[&str] = &[
    "What galaxy is Earth in?",
    "How many planets are in the solar system?",
    "What is the largest planet in the solar system?",
    "What is the closest star to Earth?",
    "Why is the sky blue?",
    "What is the speed of light?",
    "How old is the universe?",
    "What is a black hole?",
    "What is the boiling point of water?",
    "Who wrote Romeo and Juliet?",
    "What is the capital of France?",
    "How many continents are there?",
    "What is photosynthesis?",
    "What is the tallest mountain on Earth?",
    "How many days are in a leap year?",
    "What language is spoken in Brazil?",
    "What is the chemical symbol for gold?",
    "How far is the Moon from Earth?",
    "What causes the seasons?",
    "Hello, how are you?",
];

/// 質問ファイル（1行1問、#で始まる行はコメント）を読み込む
pub fn read_prompts(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// 合成データセットの構築
///
/// 質問を1件ずつ順番にAPIへ送り、レート制限のため呼び出しの間に固定時間待つ。
/// 失敗した質問には代替文を入れ、エラーは呼び出し元に伝えない。
pub struct DatasetBuilder<C: CompletionClient> {
    client: C,
    delay: Duration,
    fallback: String,
}

impl<C: CompletionClient> DatasetBuilder<C> {
    pub fn new(client: C, delay: Duration) -> Self {
        Self {
            client,
            delay,
            fallback: FALLBACK_COMPLETION.to_string(),
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = fallback.into();
        self
    }

    /// 1つの質問に対する返答（失敗時は代替文）
    pub fn fetch_response(&self, prompt: &str) -> String {
        let messages = [ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)];

        match self.client.complete(&messages) {
            Ok(text) => text,
            Err(e) => {
                warn!("API呼び出しに失敗したため代替文を使用: {} ({})", prompt, e);
                self.fallback.clone()
            }
        }
    }

    pub fn build(&self, prompts: &[String]) -> Vec<DialoguePair> {
        let mut pairs = Vec::with_capacity(prompts.len());

        for (i, prompt) in prompts.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }

            let response = self.fetch_response(prompt);
            info!("[{}/{}] {} → {}", i + 1, prompts.len(), prompt, response);

            pairs.push(DialoguePair {
                prompt: prompt.clone(),
                response,
            });
        }

        pairs
    }
}
