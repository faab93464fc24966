use burn::prelude::*;

// モデルハイパーパラメーター
pub const EMBED_DIM: usize = 128; // 埋め込み次元
pub const HIDDEN_DIM: usize = 256; // GRU隠れ状態の次元数
pub const SEQ_LEN: usize = 32; // 入力・出力共通の最大シーケンス長 L

// 訓練設定
pub const LEARNING_RATE: f64 = 0.00005; // 基本学習率
pub const EPOCHS: usize = 15; // エポック数
pub const BATCH_SIZE: usize = 16; // バッチサイズ
pub const LR_DECAY_FACTOR: f64 = 0.5; // ステップ減衰の倍率
pub const LR_DECAY_STEP: usize = 5; // 何エポックごとに減衰させるか
pub const TEACHER_FORCING_RATIO: f64 = 0.5; // Teacher Forcingを使う確率

// 推論設定
pub const BEAM_WIDTH: usize = 3; // ビーム幅
pub const MAX_DECODE_LEN: usize = 30; // 生成する最大トークン数

/// モデル形状の設定（重みと一緒に保存し、推論時に同じ形状で再構築する）
#[derive(Config, Debug)]
pub struct ModelConfig {
    pub vocab_size: usize,
    #[config(default = "EMBED_DIM")]
    pub embed_dim: usize,
    #[config(default = "HIDDEN_DIM")]
    pub hidden_dim: usize,
    #[config(default = "SEQ_LEN")]
    pub seq_len: usize,
}

/// 訓練設定
#[derive(Config, Debug)]
pub struct TrainingConfig {
    #[config(default = "EPOCHS")]
    pub epochs: usize,
    #[config(default = "BATCH_SIZE")]
    pub batch_size: usize,
    #[config(default = "LEARNING_RATE")]
    pub learning_rate: f64,
    #[config(default = "LR_DECAY_FACTOR")]
    pub decay_factor: f64,
    #[config(default = "LR_DECAY_STEP")]
    pub decay_step: usize,
    #[config(default = "TEACHER_FORCING_RATIO")]
    pub teacher_forcing_ratio: f64,
    #[config(default = true)]
    pub shuffle: bool,
    #[config(default = 42)]
    pub seed: u64,
}

/// チャット補完APIの設定（データセット生成用）
#[derive(Config, Debug)]
pub struct ApiConfig {
    #[config(default = "String::from(\"https://api.openai.com/v1\")")]
    pub base_url: String,
    #[config(default = "String::from(\"gpt-3.5-turbo\")")]
    pub model: String,
    #[config(default = 150)]
    pub max_tokens: u32,
    #[config(default = 0.7)]
    pub temperature: f32,
    /// レート制限対策: リクエスト間の固定待ち時間
    #[config(default = 1000)]
    pub delay_ms: u64,
    #[config(default = 30)]
    pub timeout_secs: u64,
}
