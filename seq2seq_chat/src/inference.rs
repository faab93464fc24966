use crate::beam_search::{beam_search, greedy_decode, BeamSearchConfig, DecodeOutput};
use crate::checkpoint::load_model;
use crate::dataset::sequences_to_tensor;
use crate::error::{ChatError, Result};
use crate::model::Seq2SeqModel;
use crate::vocabulary::Vocabulary;
use burn::backend::ndarray::NdArray;
use burn::backend::wgpu::{Wgpu, WgpuDevice};
use burn::prelude::*;
use log::{info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// デコードに失敗した、または空文字列になった場合の返答
pub const FALLBACK_RESPONSE: &str = "Sorry, I don't have a good answer for that yet.";

/// テキストを受け取り返答を返すもの（対話フロントエンドから使う）
pub trait Responder {
    fn respond(&self, input_text: &str) -> String;
}

/// 学習済みモデルによる返答生成
pub struct ChatResponder<B: Backend> {
    model: Seq2SeqModel<B>,
    vocab: Vocabulary,
    beam: BeamSearchConfig,
    seq_len: usize,
    device: B::Device,
}

impl<B: Backend> ChatResponder<B> {
    pub fn new(
        model: Seq2SeqModel<B>,
        vocab: Vocabulary,
        beam: BeamSearchConfig,
        seq_len: usize,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            vocab,
            beam,
            seq_len,
            device,
        }
    }

    /// チェックポイントから読み込んで作成
    pub fn load(load_dir: &Path, beam: BeamSearchConfig, device: B::Device) -> Result<Self> {
        let (model, vocab, model_config) = load_model::<B>(load_dir, &device)?;
        Ok(Self::new(model, vocab, beam, model_config.seq_len, device))
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Encoder → ビームサーチでトークン列を生成
    pub fn generate(&self, input_text: &str) -> Result<DecodeOutput> {
        // トークン化とパディング
        let tokens = self.vocab.encode_padded(input_text, self.seq_len);
        let src_tokens = sequences_to_tensor::<B>(&[tokens], self.seq_len, &self.device);

        let hidden = self.model.encode(src_tokens, self.vocab.pad_id);

        // ビーム幅1は貪欲法と同じ結果になる
        if self.beam.beam_width <= 1 {
            return greedy_decode(
                self.model.decoder(),
                hidden,
                self.vocab.sos_id,
                self.vocab.eos_id,
                self.beam.max_length,
            );
        }

        beam_search(
            self.model.decoder(),
            hidden,
            self.vocab.sos_id,
            self.vocab.eos_id,
            &self.beam,
        )
    }
}

impl<B: Backend> Responder for ChatResponder<B> {
    fn respond(&self, input_text: &str) -> String {
        match self.generate(input_text) {
            Ok(output) => {
                let reply = self.vocab.decode(&output.token_ids());
                if reply.trim().is_empty() {
                    FALLBACK_RESPONSE.to_string()
                } else {
                    reply
                }
            }
            Err(e) => {
                warn!("返答生成に失敗: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// バックエンドを選択してチェックポイントを読み込む（wgpu, ndarray, auto）
pub fn load_responder(
    backend_name: &str,
    load_dir: &Path,
    beam: BeamSearchConfig,
) -> Result<Box<dyn Responder>> {
    match backend_name {
        "wgpu" => {
            let responder = ChatResponder::<Wgpu>::load(load_dir, beam, WgpuDevice::default())?;
            Ok(Box::new(responder))
        }
        "ndarray" => {
            let responder = ChatResponder::<NdArray>::load(load_dir, beam, Default::default())?;
            Ok(Box::new(responder))
        }
        "auto" => {
            // autoの場合はWGPUを試し、失敗したらNdArrayにフォールバック
            info!("バックエンド: 自動選択中...");
            let wgpu_beam = beam.clone();
            let wgpu_result = panic::catch_unwind(AssertUnwindSafe(|| {
                ChatResponder::<Wgpu>::load(load_dir, wgpu_beam, WgpuDevice::default())
            }));

            match wgpu_result {
                Ok(Ok(responder)) => {
                    info!("バックエンド: WGPU（自動選択）");
                    Ok(Box::new(responder))
                }
                _ => {
                    info!("バックエンド: NdArray（WGPU利用不可のためフォールバック）");
                    let responder =
                        ChatResponder::<NdArray>::load(load_dir, beam, Default::default())?;
                    Ok(Box::new(responder))
                }
            }
        }
        _ => Err(ChatError::UnsupportedBackend(backend_name.to_string())),
    }
}
