use crate::config::ModelConfig;
use burn::nn::{Embedding, EmbeddingConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use rand::Rng;

// ===== 共通ヘルパー関数 =====

/// [batch, seq_len] のトークン列から時刻tの列を取り出す
fn token_column<B: Backend>(tokens: &Tensor<B, 2, Int>, t: usize) -> Tensor<B, 1, Int> {
    let [batch_size, _] = tokens.dims();
    tokens
        .clone()
        .slice([0..batch_size, t..t + 1])
        .reshape([batch_size])
}

// ===== GRU Cell =====

#[derive(Module, Debug)]
pub struct GruCell<B: Backend> {
    input_gates: Linear<B>,  // x → [r, z, n]
    hidden_gates: Linear<B>, // h → [r, z, n]
}

impl<B: Backend> GruCell<B> {
    pub fn new(device: &B::Device, input_dim: usize, hidden_dim: usize) -> Self {
        let input_gates = LinearConfig::new(input_dim, 3 * hidden_dim).init(device);
        let hidden_gates = LinearConfig::new(hidden_dim, 3 * hidden_dim).init(device);

        Self {
            input_gates,
            hidden_gates,
        }
    }

    pub fn hidden_dim(&self) -> usize {
        self.hidden_gates.weight.val().dims()[0]
    }

    /// 1ステップ分の状態更新
    ///
    /// x: [batch, input_dim], hidden: [batch, hidden_dim] → [batch, hidden_dim]
    pub fn forward(&self, x: Tensor<B, 2>, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, hidden_dim] = hidden.dims();

        let gx = self.input_gates.forward(x);
        let gh = self.hidden_gates.forward(hidden.clone());

        let gate = |g: &Tensor<B, 2>, idx: usize| {
            g.clone()
                .slice([0..batch_size, idx * hidden_dim..(idx + 1) * hidden_dim])
        };

        // リセットゲート・更新ゲート
        let reset = sigmoid(gate(&gx, 0) + gate(&gh, 0));
        let update = sigmoid(gate(&gx, 1) + gate(&gh, 1));

        // 候補状態
        let candidate = (gate(&gx, 2) + reset * gate(&gh, 2)).tanh();

        // h' = (1 - z) * n + z * h
        candidate.clone() + update * (hidden - candidate)
    }
}

// ===== Encoder =====

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    embedding: Embedding<B>,
    cell: GruCell<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(device: &B::Device, config: &ModelConfig) -> Self {
        let embedding = EmbeddingConfig::new(config.vocab_size, config.embed_dim).init(device);
        let cell = GruCell::new(device, config.embed_dim, config.hidden_dim);

        Self { embedding, cell }
    }

    /// ソース列全体を1回の順方向パスで読み、最終隠れ状態を返す
    ///
    /// src_tokens: [batch, seq_len] → [batch, hidden_dim]
    /// パディング位置では隠れ状態を更新しない。
    pub fn forward(&self, src_tokens: Tensor<B, 2, Int>, pad_id: usize) -> Tensor<B, 2> {
        let [batch_size, seq_len] = src_tokens.dims();
        let device = src_tokens.device();

        let keep_mask = src_tokens.clone().not_equal_elem(pad_id as i32).float();
        let embedded = self.embedding.forward(src_tokens);
        let [_, _, embed_dim] = embedded.dims();

        let mut hidden = Tensor::<B, 2>::zeros([batch_size, self.cell.hidden_dim()], &device);

        for t in 0..seq_len {
            let x_t = embedded
                .clone()
                .slice([0..batch_size, t..t + 1, 0..embed_dim])
                .reshape([batch_size, embed_dim]);
            let keep_t = keep_mask.clone().slice([0..batch_size, t..t + 1]);

            let next = self.cell.forward(x_t, hidden.clone());
            hidden = hidden.clone() + (next - hidden) * keep_t;
        }

        hidden
    }
}

// ===== Decoder =====

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    embedding: Embedding<B>,
    cell: GruCell<B>,
    output_projection: Linear<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(device: &B::Device, config: &ModelConfig) -> Self {
        let embedding = EmbeddingConfig::new(config.vocab_size, config.embed_dim).init(device);
        let cell = GruCell::new(device, config.embed_dim, config.hidden_dim);
        let output_projection = LinearConfig::new(config.hidden_dim, config.vocab_size).init(device);

        Self {
            embedding,
            cell,
            output_projection,
        }
    }

    pub fn vocab_size(&self) -> usize {
        self.output_projection.weight.val().dims()[1]
    }

    /// 1トークン分のデコード（推論時に使用）
    ///
    /// tokens: [batch], hidden: [batch, hidden_dim] → (logits [batch, vocab], hidden)
    pub fn step(&self, tokens: Tensor<B, 1, Int>, hidden: Tensor<B, 2>) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let [batch_size] = tokens.dims();

        let embedded = self.embedding.forward(tokens.reshape([batch_size, 1]));
        let [_, _, embed_dim] = embedded.dims();
        let x = embedded.reshape([batch_size, embed_dim]);

        let hidden = self.cell.forward(x, hidden);
        let logits = self.output_projection.forward(hidden.clone());

        (logits, hidden)
    }

    /// 訓練時のフォワードパス（確率的Teacher Forcing）
    ///
    /// tgt_tokens: [batch, seq_len] → logits [batch, seq_len, vocab]
    /// 位置0はSOSの入力位置なので予測を行わずゼロのまま残す。
    pub fn forward_teacher_forced<R: Rng>(
        &self,
        tgt_tokens: Tensor<B, 2, Int>,
        hidden: Tensor<B, 2>,
        teacher_forcing_ratio: f64,
        rng: &mut R,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = tgt_tokens.dims();
        let vocab_size = self.vocab_size();
        let device = tgt_tokens.device();

        let outputs_shape = [batch_size, seq_len, vocab_size];
        if seq_len < 2 {
            return Tensor::<B, 3>::zeros(outputs_shape, &device);
        }

        let mut outputs = Vec::with_capacity(seq_len - 1);
        let mut input = token_column(&tgt_tokens, 0);
        let mut hidden = hidden;

        for t in 1..seq_len {
            let (logits, next_hidden) = self.step(input, hidden);
            hidden = next_hidden;

            let predicted = logits.clone().argmax(1).reshape([batch_size]);
            outputs.push(logits.reshape([batch_size, 1, vocab_size]));

            // 正解トークンを使うか、自分の予測を使うかを時刻ごとに抽選
            input = if rng.gen::<f64>() < teacher_forcing_ratio {
                token_column(&tgt_tokens, t)
            } else {
                predicted
            };
        }

        // 予測したL-1ステップ分を位置1..Lに書き込む（位置0はゼロのまま）
        Tensor::<B, 3>::zeros(outputs_shape, &device).slice_assign(
            [0..batch_size, 1..seq_len, 0..vocab_size],
            Tensor::cat(outputs, 1),
        )
    }
}

// ===== Seq2SeqModel =====

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    encoder: Encoder<B>,
    decoder: Decoder<B>,
}

impl<B: Backend> Seq2SeqModel<B> {
    pub fn new(device: &B::Device, config: &ModelConfig) -> Self {
        let encoder = Encoder::new(device, config);
        let decoder = Decoder::new(device, config);

        Self { encoder, decoder }
    }

    pub fn decoder(&self) -> &Decoder<B> {
        &self.decoder
    }

    /// ソース列を隠れ状態に要約
    pub fn encode(&self, src_tokens: Tensor<B, 2, Int>, pad_id: usize) -> Tensor<B, 2> {
        self.encoder.forward(src_tokens, pad_id)
    }

    /// 訓練時のフォワードパス
    pub fn forward<R: Rng>(
        &self,
        src_tokens: Tensor<B, 2, Int>,
        tgt_tokens: Tensor<B, 2, Int>,
        pad_id: usize,
        teacher_forcing_ratio: f64,
        rng: &mut R,
    ) -> Tensor<B, 3> {
        let hidden = self.encoder.forward(src_tokens, pad_id);
        self.decoder
            .forward_teacher_forced(tgt_tokens, hidden, teacher_forcing_ratio, rng)
    }
}
