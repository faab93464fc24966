use crate::error::{ChatError, Result};
use crate::vocabulary::{TokenSequence, Vocabulary};
use burn::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// 対話ペア（JSONLの1行）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DialoguePair {
    pub prompt: String,
    pub response: String,
}

/// JSONL形式のファイルから対話ペアを読み込む
pub fn read_pairs(path: &Path) -> Result<Vec<DialoguePair>> {
    let reader = BufReader::new(fs::File::open(path)?);
    let mut pairs = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();

        // 空行とコメント行をスキップ
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        pairs.push(serde_json::from_str(line)?);
    }

    Ok(pairs)
}

/// 対話ペアをJSONL形式で書き出す
pub fn write_pairs(path: &Path, pairs: &[DialoguePair]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = BufWriter::new(fs::File::create(path)?);
    for pair in pairs {
        serde_json::to_writer(&mut writer, pair)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    Ok(())
}

/// 1ターン分の訓練サンプル（入力・出力ともにL長にパディング済み）
#[derive(Debug, Clone)]
pub struct Example {
    pub input: TokenSequence,
    pub output: TokenSequence,
}

/// ミニバッチ（全シーケンスが同じ長さL）
#[derive(Debug, Clone)]
pub struct Batch {
    pub inputs: Vec<TokenSequence>,
    pub targets: Vec<TokenSequence>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// トークン列のリストを [batch, seq_len] のテンソルに変換
pub fn sequences_to_tensor<B: Backend>(
    sequences: &[TokenSequence],
    seq_len: usize,
    device: &B::Device,
) -> Tensor<B, 2, Int> {
    let batch_size = sequences.len();
    let flattened: Vec<i32> = sequences.iter().flatten().copied().collect();
    Tensor::<B, 1, Int>::from_data(flattened.as_slice(), device).reshape([batch_size, seq_len])
}

pub struct DialogueDataset {
    pub examples: Vec<Example>,
    pub seq_len: usize,
}

impl DialogueDataset {
    pub fn from_pairs(pairs: &[DialoguePair], vocab: &Vocabulary, seq_len: usize) -> Self {
        let examples = pairs
            .iter()
            .map(|pair| Example {
                input: vocab.encode_padded(&pair.prompt, seq_len),
                output: vocab.encode_padded(&pair.response, seq_len),
            })
            .collect();

        Self { examples, seq_len }
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// バッチを生成（rngを渡した場合はエポックごとにシャッフル）
    pub fn batches(&self, batch_size: usize, rng: Option<&mut StdRng>) -> Vec<Batch> {
        let mut order: Vec<usize> = (0..self.examples.len()).collect();
        if let Some(rng) = rng {
            order.shuffle(rng);
        }

        order
            .chunks(batch_size.max(1))
            .map(|chunk| Batch {
                inputs: chunk.iter().map(|&i| self.examples[i].input.clone()).collect(),
                targets: chunk.iter().map(|&i| self.examples[i].output.clone()).collect(),
            })
            .collect()
    }
}

/// バッチ内の全シーケンスが長さLであることを検証
///
/// 形状が崩れたバッチは訓練を継続できないため、呼び出し側で即座に中断する。
pub fn validate_batch(batch: &Batch, seq_len: usize) -> Result<()> {
    if batch.is_empty() {
        return Err(ChatError::EmptyDataset);
    }

    for (index, sequence) in batch.inputs.iter().chain(batch.targets.iter()).enumerate() {
        if sequence.is_empty() {
            return Err(ChatError::EmptySequence { index });
        }
        if sequence.len() != seq_len {
            return Err(ChatError::ShapeMismatch {
                index,
                expected: seq_len,
                found: sequence.len(),
            });
        }
    }

    Ok(())
}
