use thiserror::Error;

/// クレート共通のエラー型
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSONエラー: {0}")]
    Json(#[from] serde_json::Error),

    #[error("データセットが空です")]
    EmptyDataset,

    #[error("バッチ内のシーケンス{index}が空です")]
    EmptySequence { index: usize },

    #[error("バッチ内のシーケンス{index}の長さが不正です（期待値: {expected}, 実際: {found}）")]
    ShapeMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("モデル保存/読み込みエラー: {0}")]
    Record(String),

    #[error("設定読み込みエラー: {0}")]
    Config(String),

    #[error("テンソルデータ取得エラー: {0}")]
    TensorData(String),

    #[error("HTTPエラー: {0}")]
    Http(#[from] reqwest::Error),

    #[error("入力エラー: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error("APIエラー: {0}")]
    Api(String),

    #[error("未対応のバックエンド: {0}")]
    UnsupportedBackend(String),
}

pub type Result<T> = std::result::Result<T, ChatError>;
