use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

pub const PAD_TOKEN: &str = "<PAD>";
pub const UNK_TOKEN: &str = "<UNK>";
pub const SOS_TOKEN: &str = "<SOS>";
pub const EOS_TOKEN: &str = "<EOS>";

/// 固定長Lにパディング済みのトークンID列
pub type TokenSequence = Vec<i32>;

/// 単語単位の語彙（入力・出力で共通）
#[derive(Debug, Clone)]
pub struct Vocabulary {
    pub word_to_id: HashMap<String, usize>,
    pub id_to_word: Vec<String>,
    pub pad_id: usize, // Padding
    pub unk_id: usize, // Unknown
    pub sos_id: usize, // Start of Sequence
    pub eos_id: usize, // End of Sequence
}

/// vocab.jsonの形式
#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    words: Vec<String>,
}

impl Vocabulary {
    /// データセットから語彙を構築
    pub fn from_dataset(sentences: &[&str]) -> Self {
        let mut word_set = HashSet::new();
        for sentence in sentences {
            for word in Self::tokenize(sentence) {
                word_set.insert(word);
            }
        }

        // アルファベット順にソート（再現性のため）
        let mut sorted_words: Vec<String> = word_set.into_iter().collect();
        sorted_words.sort();

        Self::from_words(sorted_words)
    }

    /// 特殊トークンの後ろに単語を並べて語彙を作る
    fn from_words(words: Vec<String>) -> Self {
        let mut id_to_word = vec![
            PAD_TOKEN.to_string(), // ID 0
            UNK_TOKEN.to_string(), // ID 1
            SOS_TOKEN.to_string(), // ID 2
            EOS_TOKEN.to_string(), // ID 3
        ];
        id_to_word.extend(
            words
                .into_iter()
                .filter(|w| !matches!(w.as_str(), PAD_TOKEN | UNK_TOKEN | SOS_TOKEN | EOS_TOKEN)),
        );

        let word_to_id = id_to_word
            .iter()
            .enumerate()
            .map(|(id, word)| (word.clone(), id))
            .collect();

        Vocabulary {
            word_to_id,
            id_to_word,
            pad_id: 0,
            unk_id: 1,
            sos_id: 2,
            eos_id: 3,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.id_to_word.len()
    }

    /// 文を単語単位でトークン化（小文字化、句読点処理）
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .replace(",", " , ")
            .replace(".", " . ")
            .replace("!", " ! ")
            .replace("?", " ? ")
            .split_whitespace()
            .map(|s| s.to_string())
            .collect()
    }

    /// 文をトークンIDに変換（特殊トークンなし）
    pub fn encode(&self, text: &str) -> Vec<i32> {
        Self::tokenize(text)
            .iter()
            .map(|word| self.word_to_id.get(word).copied().unwrap_or(self.unk_id) as i32)
            .collect()
    }

    /// [SOS, word1, ..., EOS, PAD, ...] の固定長シーケンスに変換
    ///
    /// 長すぎる文は SOS と EOS が必ず入るように切り詰める。
    pub fn encode_padded(&self, text: &str, seq_len: usize) -> TokenSequence {
        let body_len = seq_len.saturating_sub(2);

        let mut sequence = Vec::with_capacity(seq_len);
        sequence.push(self.sos_id as i32);
        sequence.extend(self.encode(text).into_iter().take(body_len));
        sequence.push(self.eos_id as i32);

        self.pad_sequence(&sequence, seq_len)
    }

    /// トークンIDを文に変換（最初のEOSで打ち切り、特殊トークンは出力しない）
    pub fn decode(&self, token_ids: &[i32]) -> String {
        token_ids
            .iter()
            .take_while(|&&id| id != self.eos_id as i32)
            .filter_map(|&id| {
                if id < 0 || id as usize >= self.vocab_size() {
                    return None;
                }
                let id = id as usize;
                if id == self.pad_id || id == self.sos_id {
                    None
                } else {
                    Some(self.id_to_word[id].as_str())
                }
            })
            .collect::<Vec<&str>>()
            .join(" ")
    }

    /// シーケンスを指定長でパディング
    pub fn pad_sequence(&self, tokens: &[i32], seq_len: usize) -> TokenSequence {
        let mut padded = tokens.to_vec();
        padded.resize(seq_len, self.pad_id as i32);
        padded.truncate(seq_len);
        padded
    }

    /// vocab.jsonとして保存
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = VocabularyFile {
            words: self.id_to_word[4..].to_vec(),
        };
        fs::write(path, serde_json::to_string_pretty(&file)?)?;
        Ok(())
    }

    /// vocab.jsonから読み込み
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: VocabularyFile = serde_json::from_str(&content)?;
        Ok(Self::from_words(file.words))
    }
}
