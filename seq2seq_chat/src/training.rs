use crate::config::TrainingConfig;
use crate::dataset::{sequences_to_tensor, validate_batch, DialogueDataset};
use crate::error::{ChatError, Result};
use crate::metrics::TrainingMetrics;
use crate::model::Seq2SeqModel;
use crate::vocabulary::Vocabulary;
use burn::backend::wgpu::Wgpu;
use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

pub type TrainingBackend = Autodiff<Wgpu>;

/// ステップ減衰スケジュール（step_epochsごとに学習率をfactor倍する）
#[derive(Debug, Clone, Copy)]
pub struct StepDecay {
    pub base_lr: f64,
    pub factor: f64,
    pub step_epochs: usize,
}

impl StepDecay {
    pub fn new(base_lr: f64, factor: f64, step_epochs: usize) -> Self {
        Self {
            base_lr,
            factor,
            step_epochs,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.learning_rate, config.decay_factor, config.decay_step)
    }

    /// エポック番号（0始まり）に対応する学習率
    pub fn lr_at(&self, epoch: usize) -> f64 {
        let decays = epoch / self.step_epochs.max(1);
        self.base_lr * self.factor.powi(decays as i32)
    }
}

/// パディングを除外したクロスエントロピー損失
///
/// logits: [batch, seq_len, vocab], targets: [batch, seq_len]
/// 位置0（SOS）は予測対象外なので 1..seq_len のみを使う。
/// 全てパディングのバッチでは損失0を返す。
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    pad_id: usize,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, vocab_size] = logits.dims();
    let device = logits.device();

    if seq_len < 2 {
        return Tensor::<B, 1>::zeros([1], &device);
    }

    let num_positions = batch_size * (seq_len - 1);

    let logits = logits
        .slice([0..batch_size, 1..seq_len, 0..vocab_size])
        .reshape([num_positions, vocab_size]);
    let targets = targets
        .slice([0..batch_size, 1..seq_len])
        .reshape([num_positions, 1]);

    let mask = targets
        .clone()
        .not_equal_elem(pad_id as i32)
        .float()
        .reshape([num_positions]);

    let target_log_probs = log_softmax(logits, 1)
        .gather(1, targets)
        .reshape([num_positions]);

    let token_count = mask.clone().sum().clamp_min(1.0);

    (target_log_probs * mask).sum().neg() / token_count
}

/// Seq2Seqモデルの訓練実行
pub fn train<B: AutodiffBackend>(
    model: Seq2SeqModel<B>,
    dataset: &DialogueDataset,
    vocab: &Vocabulary,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<(Seq2SeqModel<B>, TrainingMetrics)> {
    if dataset.is_empty() {
        return Err(ChatError::EmptyDataset);
    }

    let seq_len = dataset.seq_len;
    if seq_len < 2 {
        return Err(ChatError::ShapeMismatch {
            index: 0,
            expected: 2,
            found: seq_len,
        });
    }

    let mut optimizer = AdamConfig::new()
        .with_beta_1(0.9)
        .with_beta_2(0.999)
        .with_epsilon(1e-8)
        .init::<B, Seq2SeqModel<B>>();

    let schedule = StepDecay::from_config(config);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut model = model;
    let mut loss_history = Vec::new();
    let mut lr_history = Vec::new();

    info!(
        "訓練開始: {}エポック, {}サンプル, バッチサイズ{}",
        config.epochs,
        dataset.len(),
        config.batch_size
    );

    for epoch in 0..config.epochs {
        let learning_rate = schedule.lr_at(epoch);
        let mut total_loss = 0.0;
        let mut batch_count = 0;

        let batches = dataset.batches(config.batch_size, config.shuffle.then_some(&mut rng));

        for batch in &batches {
            // 形状が崩れたバッチは致命的エラーとして訓練を中断
            validate_batch(batch, seq_len)?;

            let src_tokens = sequences_to_tensor::<B>(&batch.inputs, seq_len, device);
            let tgt_tokens = sequences_to_tensor::<B>(&batch.targets, seq_len, device);

            // フォワードパス
            let logits = model.forward(
                src_tokens,
                tgt_tokens.clone(),
                vocab.pad_id,
                config.teacher_forcing_ratio,
                &mut rng,
            );

            // 損失計算
            let loss = masked_cross_entropy(logits, tgt_tokens, vocab.pad_id);

            // バックプロパゲーション
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);

            // パラメータ更新（バッチごとに1回）
            model = optimizer.step(learning_rate, model, grads);

            let batch_loss: f32 = loss.into_scalar().elem();
            debug!("Epoch {} Batch {}: Loss = {:.6}", epoch + 1, batch_count + 1, batch_loss);

            total_loss += batch_loss;
            batch_count += 1;
        }

        let avg_loss = total_loss / batch_count.max(1) as f32;
        loss_history.push(avg_loss);
        lr_history.push(learning_rate);

        info!(
            "Epoch {}/{}: Loss = {:.6}, LR = {:.3e}",
            epoch + 1,
            config.epochs,
            avg_loss,
            learning_rate
        );
    }

    let metrics = TrainingMetrics {
        final_loss: loss_history.last().copied().unwrap_or(0.0),
        loss_history,
        lr_history,
        epochs: config.epochs,
        learning_rate: config.learning_rate,
        batch_size: config.batch_size,
        teacher_forcing_ratio: config.teacher_forcing_ratio,
    };

    Ok((model, metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_decay_halves_every_five_epochs() {
        let schedule = StepDecay::new(5e-5, 0.5, 5);
        assert_eq!(schedule.lr_at(0), 5e-5);
        assert_eq!(schedule.lr_at(4), 5e-5);
        assert!((schedule.lr_at(5) - 2.5e-5).abs() < 1e-15);
        assert!((schedule.lr_at(11) - 1.25e-5).abs() < 1e-15);
    }

    #[test]
    fn zero_step_does_not_divide_by_zero() {
        let schedule = StepDecay::new(1e-3, 0.5, 0);
        assert!((schedule.lr_at(2) - 2.5e-4).abs() < 1e-15);
    }
}
