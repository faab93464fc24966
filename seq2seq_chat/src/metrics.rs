use crate::config::ModelConfig;
use crate::error::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 訓練メトリクス
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrainingMetrics {
    /// 訓練曲線（エポックごとの平均損失）
    pub loss_history: Vec<f32>,
    /// エポックごとの学習率（ステップ減衰後）
    pub lr_history: Vec<f64>,
    /// 最終損失
    pub final_loss: f32,
    /// エポック数
    pub epochs: usize,
    /// 基本学習率
    pub learning_rate: f64,
    /// バッチサイズ
    pub batch_size: usize,
    pub teacher_forcing_ratio: f64,
}

/// モデル形状（metrics.json記録用）
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelSummary {
    pub vocab_size: usize,
    pub embed_dim: usize,
    pub hidden_dim: usize,
    pub seq_len: usize,
}

/// メタデータ
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Metadata {
    pub crate_version: String,
    pub trained_at: String,
}

/// 統合メトリクスファイル
#[derive(Serialize, Deserialize, Debug)]
pub struct MetricsFile {
    pub model: ModelSummary,
    pub training: TrainingMetrics,
    pub metadata: Metadata,
}

/// メトリクスを保存
pub fn save_metrics(
    save_dir: &Path,
    training_metrics: &TrainingMetrics,
    model_config: &ModelConfig,
) -> Result<()> {
    fs::create_dir_all(save_dir)?;

    let metrics_file = MetricsFile {
        model: ModelSummary {
            vocab_size: model_config.vocab_size,
            embed_dim: model_config.embed_dim,
            hidden_dim: model_config.hidden_dim,
            seq_len: model_config.seq_len,
        },
        training: training_metrics.clone(),
        metadata: Metadata {
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: chrono::Local::now().to_rfc3339(),
        },
    };

    let metrics_path = save_dir.join("metrics.json");
    fs::write(&metrics_path, serde_json::to_string_pretty(&metrics_file)?)?;
    info!("メトリクスを保存: {}", metrics_path.display());

    Ok(())
}

/// metrics.jsonを読み込み
pub fn load_metrics(save_dir: &Path) -> Result<MetricsFile> {
    let content = fs::read_to_string(save_dir.join("metrics.json"))?;
    Ok(serde_json::from_str(&content)?)
}
