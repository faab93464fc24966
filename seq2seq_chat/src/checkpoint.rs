use crate::config::ModelConfig;
use crate::error::{ChatError, Result};
use crate::model::Seq2SeqModel;
use crate::vocabulary::Vocabulary;
use burn::prelude::*;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use log::info;
use std::fs;
use std::path::Path;

const MODEL_FILE: &str = "model"; // BinFileRecorderが拡張子.binを付ける
const VOCAB_FILE: &str = "vocab.json";
const CONFIG_FILE: &str = "model_config.json";

/// モデル・語彙・モデル設定を保存
pub fn save_model<B: Backend>(
    model: &Seq2SeqModel<B>,
    vocab: &Vocabulary,
    model_config: &ModelConfig,
    save_dir: &Path,
) -> Result<()> {
    fs::create_dir_all(save_dir)?;

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();

    model
        .clone()
        .save_file(save_dir.join(MODEL_FILE), &recorder)
        .map_err(|e| ChatError::Record(format!("{:?}", e)))?;

    vocab.save(&save_dir.join(VOCAB_FILE))?;
    model_config.save(save_dir.join(CONFIG_FILE))?;

    info!("モデルを保存: {}", save_dir.display());
    Ok(())
}

/// モデルを読み込み（ジェネリックなBackend用）
pub fn load_model<B: Backend>(
    load_dir: &Path,
    device: &B::Device,
) -> Result<(Seq2SeqModel<B>, Vocabulary, ModelConfig)> {
    let model_config = ModelConfig::load(load_dir.join(CONFIG_FILE))
        .map_err(|e| ChatError::Config(format!("{:?}", e)))?;
    let vocab = Vocabulary::load(&load_dir.join(VOCAB_FILE))?;

    if vocab.vocab_size() != model_config.vocab_size {
        return Err(ChatError::Config(format!(
            "語彙サイズが一致しません（vocab.json: {}, model_config.json: {}）",
            vocab.vocab_size(),
            model_config.vocab_size
        )));
    }

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let model = Seq2SeqModel::<B>::new(device, &model_config)
        .load_file(load_dir.join(MODEL_FILE), &recorder, device)
        .map_err(|e| ChatError::Record(format!("{:?}", e)))?;

    info!(
        "モデルを読み込み（{}バックエンド）: {}",
        std::any::type_name::<B>(),
        load_dir.display()
    );
    Ok((model, vocab, model_config))
}
