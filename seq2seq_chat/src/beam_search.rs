//! 推論時のビームサーチ
//!
//! 各ステップで候補ごとに上位`beam_width`個へ展開し、全候補をまとめて
//! スコア（対数尤度の和、長さ正規化なし）の高い順に`beam_width`個へ刈り込む。
//! 刈り込み後の先頭候補がEOSで終わった時点で打ち切る。

use crate::config::{BEAM_WIDTH, MAX_DECODE_LEN};
use crate::error::ChatError; // Config導出が素のResultを参照するためエイリアスは取り込まない
use crate::model::Decoder;
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use serde::{Deserialize, Serialize};

/// 1トークンずつデコードできるもの
pub trait StepDecoder<B: Backend> {
    /// token: 直前のトークン, hidden: [1, hidden_dim]
    /// → (次トークンのロジット [1, vocab], 更新後の隠れ状態)
    fn decode_step(&self, token: usize, hidden: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>);
}

impl<B: Backend> StepDecoder<B> for Decoder<B> {
    fn decode_step(&self, token: usize, hidden: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let device = hidden.device();
        let tokens = Tensor::<B, 1, Int>::from_data([token as i32].as_slice(), &device);
        self.step(tokens, hidden)
    }
}

/// 候補ごとの隠れ状態の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HiddenStateTracking {
    /// 各候補が自分の展開元の隠れ状態を持ち回る
    PerCandidate,
    /// 刈り込み後の先頭候補の隠れ状態を全候補で共有する
    SharedBest,
}

#[derive(Config, Debug)]
pub struct BeamSearchConfig {
    #[config(default = "BEAM_WIDTH")]
    pub beam_width: usize,
    #[config(default = "MAX_DECODE_LEN")]
    pub max_length: usize,
    #[config(default = "HiddenStateTracking::PerCandidate")]
    pub tracking: HiddenStateTracking,
}

/// ビーム内の候補
#[derive(Debug, Clone)]
pub struct BeamCandidate<B: Backend> {
    /// SOSから始まるトークン列
    pub tokens: Vec<usize>,
    /// 累積対数確率
    pub score: f32,
    pub hidden: Tensor<B, 2>,
}

impl<B: Backend> BeamCandidate<B> {
    fn last_token(&self) -> usize {
        // tokensは常にSOSを含む
        self.tokens[self.tokens.len() - 1]
    }

    fn ends_with(&self, token: usize) -> bool {
        self.tokens.last() == Some(&token)
    }
}

/// デコード結果
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeOutput {
    /// 生成トークン列（SOSは除く、EOSで終わった場合はEOSを含む）
    pub tokens: Vec<usize>,
    pub score: f32,
    /// 実行した展開ステップ数
    pub steps: usize,
    /// EOSで終了したか（falseならmax_lengthで打ち切り）
    pub finished: bool,
}

impl DecodeOutput {
    fn from_candidate<B: Backend>(candidate: &BeamCandidate<B>, steps: usize, finished: bool) -> Self {
        Self {
            tokens: candidate.tokens[1..].to_vec(),
            score: candidate.score,
            steps,
            finished,
        }
    }

    /// 語彙のdecodeにそのまま渡せる形式
    pub fn token_ids(&self) -> Vec<i32> {
        self.tokens.iter().map(|&id| id as i32).collect()
    }
}

/// ロジット [1, vocab] を対数確率のベクタに変換
fn log_probabilities<B: Backend>(logits: Tensor<B, 2>) -> crate::error::Result<Vec<f32>> {
    log_softmax(logits, 1)
        .into_data()
        .to_vec::<f32>()
        .map_err(|e| ChatError::TensorData(format!("{:?}", e)))
}

/// 対数確率の高い順に上位k個の (トークン, 対数確率) を返す
///
/// 同点の場合はIDの小さいトークンが先になる。
fn top_k(log_probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = log_probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

/// ビームサーチでデコード
///
/// max_lengthステップ以内に必ず終了し、少なくとも1トークンを返す。
pub fn beam_search<B: Backend, D: StepDecoder<B>>(
    decoder: &D,
    initial_hidden: Tensor<B, 2>,
    sos_id: usize,
    eos_id: usize,
    config: &BeamSearchConfig,
) -> crate::error::Result<DecodeOutput> {
    let beam_width = config.beam_width.max(1);
    let max_length = config.max_length.max(1);

    let mut beam = vec![BeamCandidate {
        tokens: vec![sos_id],
        score: 0.0,
        hidden: initial_hidden,
    }];

    for step in 1..=max_length {
        let mut expanded = Vec::with_capacity(beam.len() * beam_width);

        // 1-2. 各候補を上位beam_width個に展開
        for candidate in &beam {
            let (logits, hidden) =
                decoder.decode_step(candidate.last_token(), candidate.hidden.clone());
            let log_probs = log_probabilities(logits)?;

            for (token, log_prob) in top_k(&log_probs, beam_width) {
                let mut tokens = candidate.tokens.clone();
                tokens.push(token);
                expanded.push(BeamCandidate {
                    tokens,
                    score: candidate.score + log_prob,
                    hidden: hidden.clone(),
                });
            }
        }

        if expanded.is_empty() {
            return Err(ChatError::TensorData("語彙が空のためデコードできません".to_string()));
        }

        // 3. 全候補をまとめてスコア順に刈り込み
        expanded.sort_by(|a, b| b.score.total_cmp(&a.score));
        expanded.truncate(beam_width);

        if config.tracking == HiddenStateTracking::SharedBest {
            let shared = expanded[0].hidden.clone();
            for candidate in expanded.iter_mut().skip(1) {
                candidate.hidden = shared.clone();
            }
        }

        beam = expanded;

        // 4. 先頭候補がEOSで終わっていれば即座に返す
        if beam[0].ends_with(eos_id) {
            return Ok(DecodeOutput::from_candidate(&beam[0], step, true));
        }
    }

    Ok(DecodeOutput::from_candidate(&beam[0], max_length, false))
}

/// 貪欲法でデコード（各ステップで最も確率の高いトークンを選ぶ）
pub fn greedy_decode<B: Backend, D: StepDecoder<B>>(
    decoder: &D,
    initial_hidden: Tensor<B, 2>,
    sos_id: usize,
    eos_id: usize,
    max_length: usize,
) -> crate::error::Result<DecodeOutput> {
    let max_length = max_length.max(1);

    let mut tokens = Vec::new();
    let mut score = 0.0;
    let mut hidden = initial_hidden;
    let mut token = sos_id;

    for step in 1..=max_length {
        let (logits, next_hidden) = decoder.decode_step(token, hidden);
        hidden = next_hidden;

        let (best, log_prob) = top_k(&log_probabilities(logits)?, 1)
            .into_iter()
            .next()
            .ok_or_else(|| ChatError::TensorData("語彙が空のためデコードできません".to_string()))?;

        tokens.push(best);
        score += log_prob;
        token = best;

        if best == eos_id {
            return Ok(DecodeOutput {
                tokens,
                score,
                steps: step,
                finished: true,
            });
        }
    }

    Ok(DecodeOutput {
        tokens,
        score,
        steps: max_length,
        finished: false,
    })
}
