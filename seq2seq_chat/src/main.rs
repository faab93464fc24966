#![recursion_limit = "256"]

use anyhow::{Context, Result};
use burn::backend::wgpu::WgpuDevice;
use burn::prelude::*;
use clap::{Parser, Subcommand};
use seq2seq_chat::api_client::OpenAiClient;
use seq2seq_chat::beam_search::{BeamSearchConfig, HiddenStateTracking};
use seq2seq_chat::chat::ChatSession;
use seq2seq_chat::checkpoint::save_model;
use seq2seq_chat::config::{
    ApiConfig, ModelConfig, TrainingConfig, BATCH_SIZE, BEAM_WIDTH, EPOCHS, LEARNING_RATE,
    LR_DECAY_FACTOR, LR_DECAY_STEP, MAX_DECODE_LEN, SEQ_LEN, TEACHER_FORCING_RATIO,
};
use seq2seq_chat::dataset::{read_pairs, write_pairs, DialogueDataset};
use seq2seq_chat::dataset_builder::{read_prompts, DatasetBuilder, DEFAULT_PROMPTS};
use seq2seq_chat::inference::{load_responder, Responder};
use seq2seq_chat::metrics::save_metrics;
use seq2seq_chat::model::Seq2SeqModel;
use seq2seq_chat::training::{train, TrainingBackend};
use seq2seq_chat::vocabulary::Vocabulary;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// チャットAPIの返答を模倣するSeq2Seq（GRU）モデル
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// チャットAPIを呼び出して訓練データ（JSONL）を生成
    Generate {
        /// 出力するJSONLファイル
        #[arg(long, default_value = "data/dialogues.jsonl")]
        out: PathBuf,

        /// 質問ファイル（1行1問、省略時は組み込みの質問リスト）
        #[arg(long)]
        prompts: Option<PathBuf>,

        /// APIのモデルID
        #[arg(long, default_value = "gpt-3.5-turbo")]
        model: String,

        /// APIのベースURL
        #[arg(long, default_value = "https://api.openai.com/v1")]
        base_url: String,

        /// リクエスト間の待ち時間（ミリ秒）
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,

        #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
        api_key: Option<String>,
    },

    /// 訓練してモデルを保存
    Train {
        /// 訓練データ（JSONL）
        #[arg(long, default_value = "data/dialogues.jsonl")]
        data: PathBuf,

        /// モデルを保存するディレクトリ
        #[arg(long)]
        save: PathBuf,

        #[arg(long, default_value_t = EPOCHS)]
        epochs: usize,

        #[arg(long, default_value_t = BATCH_SIZE)]
        batch_size: usize,

        #[arg(long, default_value_t = LEARNING_RATE)]
        lr: f64,

        /// 学習率の減衰率
        #[arg(long, default_value_t = LR_DECAY_FACTOR)]
        lr_decay: f64,

        /// 学習率を減衰させる間隔（エポック）
        #[arg(long, default_value_t = LR_DECAY_STEP)]
        lr_decay_step: usize,

        /// Teacher Forcingを使う確率
        #[arg(long, default_value_t = TEACHER_FORCING_RATIO)]
        teacher_forcing: f64,

        #[arg(long, default_value_t = SEQ_LEN)]
        seq_len: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },

    /// 1文だけ推論
    Predict {
        /// モデルを読み込むディレクトリ
        #[arg(long)]
        load: PathBuf,

        /// 推論するテキスト
        #[arg(long)]
        text: String,

        /// バックエンドの選択（auto, wgpu, ndarray）
        #[arg(long, default_value = "wgpu")]
        backend: String,

        #[arg(long, default_value_t = BEAM_WIDTH)]
        beam_width: usize,

        #[arg(long, default_value_t = MAX_DECODE_LEN)]
        max_length: usize,

        /// 先頭候補の隠れ状態を全候補で共有する
        #[arg(long)]
        shared_hidden: bool,
    },

    /// 対話モード
    Chat {
        /// モデルを読み込むディレクトリ
        #[arg(long)]
        load: PathBuf,

        /// バックエンドの選択（auto, wgpu, ndarray）
        #[arg(long, default_value = "wgpu")]
        backend: String,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let start_time = Instant::now();
    let args = Args::parse();

    match args.command {
        Command::Generate {
            out,
            prompts,
            model,
            base_url,
            delay_ms,
            api_key,
        } => {
            let prompts = match prompts {
                Some(path) => read_prompts(&path)
                    .with_context(|| format!("質問ファイルが読み込めません: {}", path.display()))?,
                None => DEFAULT_PROMPTS.iter().map(|p| p.to_string()).collect(),
            };

            let api_config = ApiConfig::new()
                .with_model(model)
                .with_base_url(base_url)
                .with_delay_ms(delay_ms);
            let delay = Duration::from_millis(api_config.delay_ms);
            let client = OpenAiClient::new(api_config, api_key)?;

            println!("\n===== データ生成開始 =====");
            let pairs = DatasetBuilder::new(client, delay).build(&prompts);
            write_pairs(&out, &pairs)?;
            println!("{}件の対話を保存: {}", pairs.len(), out.display());
        }

        Command::Train {
            data,
            save,
            epochs,
            batch_size,
            lr,
            lr_decay,
            lr_decay_step,
            teacher_forcing,
            seq_len,
            seed,
        } => {
            let pairs = read_pairs(&data)
                .with_context(|| format!("訓練データが読み込めません: {}", data.display()))?;

            // 入力・出力の両方から語彙を構築
            let texts: Vec<&str> = pairs
                .iter()
                .flat_map(|p| [p.prompt.as_str(), p.response.as_str()])
                .collect();
            let vocab = Vocabulary::from_dataset(&texts);
            let dataset = DialogueDataset::from_pairs(&pairs, &vocab, seq_len);
            println!("訓練サンプル数: {}サンプル, 語彙サイズ: {}", dataset.len(), vocab.vocab_size());

            let model_config = ModelConfig::new(vocab.vocab_size()).with_seq_len(seq_len);
            let training_config = TrainingConfig::new()
                .with_epochs(epochs)
                .with_batch_size(batch_size)
                .with_learning_rate(lr)
                .with_decay_factor(lr_decay)
                .with_decay_step(lr_decay_step)
                .with_teacher_forcing_ratio(teacher_forcing)
                .with_seed(seed);

            let device = WgpuDevice::default();
            TrainingBackend::seed(seed);
            let model = Seq2SeqModel::<TrainingBackend>::new(&device, &model_config);

            println!("\n===== 訓練開始 =====");
            let (model, metrics) = train(model, &dataset, &vocab, &training_config, &device)?;
            println!("訓練完了！ 最終Loss = {:.6}", metrics.final_loss);

            save_model(&model, &vocab, &model_config, &save)?;
            save_metrics(&save, &metrics, &model_config)?;
        }

        Command::Predict {
            load,
            text,
            backend,
            beam_width,
            max_length,
            shared_hidden,
        } => {
            let tracking = if shared_hidden {
                HiddenStateTracking::SharedBest
            } else {
                HiddenStateTracking::PerCandidate
            };
            let beam = BeamSearchConfig::new()
                .with_beam_width(beam_width)
                .with_max_length(max_length)
                .with_tracking(tracking);

            let responder = load_responder(&backend, &load, beam)?;
            println!("入力: {} → 返答: {}", text, responder.respond(&text));
        }

        Command::Chat { load, backend } => {
            let responder = load_responder(&backend, &load, BeamSearchConfig::new())?;
            ChatSession::new(responder.as_ref())?.run()?;
        }
    }

    let duration = start_time.elapsed();
    println!("\n実行時間: {:.2}秒", duration.as_secs_f64());

    Ok(())
}
