use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;
use burn::prelude::*;

use seq2seq_chat::config::{ModelConfig, TrainingConfig};
use seq2seq_chat::dataset::{DialogueDataset, DialoguePair, Example};
use seq2seq_chat::error::ChatError;
use seq2seq_chat::model::Seq2SeqModel;
use seq2seq_chat::training::{train, StepDecay};
use seq2seq_chat::vocabulary::Vocabulary;

type TestAutodiffBackend = Autodiff<NdArray>;

const SEQ_LEN: usize = 8;

fn pairs() -> Vec<DialoguePair> {
    vec![
        DialoguePair {
            prompt: "What galaxy is Earth in?".to_string(),
            response: "The Milky Way.".to_string(),
        },
        DialoguePair {
            prompt: "What is the closest star?".to_string(),
            response: "The Sun.".to_string(),
        },
    ]
}

fn setup() -> (Vocabulary, DialogueDataset, ModelConfig) {
    let pairs = pairs();
    let texts: Vec<&str> = pairs
        .iter()
        .flat_map(|p| [p.prompt.as_str(), p.response.as_str()])
        .collect();
    let vocab = Vocabulary::from_dataset(&texts);
    let dataset = DialogueDataset::from_pairs(&pairs, &vocab, SEQ_LEN);
    let config = ModelConfig::new(vocab.vocab_size())
        .with_embed_dim(16)
        .with_hidden_dim(32)
        .with_seq_len(SEQ_LEN);
    (vocab, dataset, config)
}

#[test]
fn step_decay_at_epoch_eleven() {
    let schedule = StepDecay::from_config(&TrainingConfig::new());
    let expected = 5e-5 * 0.5 * 0.5;
    assert!((schedule.lr_at(11) - expected).abs() < 1e-15);
    assert!((schedule.lr_at(11) - 1.25e-5).abs() < 1e-15);
}

#[test]
fn training_records_loss_and_decayed_lr_per_epoch() {
    let device = Default::default();
    let (vocab, dataset, model_config) = setup();
    TestAutodiffBackend::seed(7);
    let model = Seq2SeqModel::<TestAutodiffBackend>::new(&device, &model_config);

    let config = TrainingConfig::new()
        .with_epochs(3)
        .with_batch_size(2)
        .with_learning_rate(1e-2)
        .with_decay_step(1);

    let (_, metrics) = train(model, &dataset, &vocab, &config, &device).unwrap();

    assert_eq!(metrics.loss_history.len(), 3);
    assert_eq!(metrics.lr_history, vec![1e-2, 5e-3, 2.5e-3]);
    assert!(metrics.loss_history.iter().all(|l| l.is_finite() && *l > 0.0));
    assert_eq!(metrics.final_loss, metrics.loss_history[2]);
}

#[test]
fn training_reduces_loss_on_tiny_dataset() {
    let device = Default::default();
    let (vocab, dataset, model_config) = setup();
    TestAutodiffBackend::seed(11);
    let model = Seq2SeqModel::<TestAutodiffBackend>::new(&device, &model_config);

    let config = TrainingConfig::new()
        .with_epochs(30)
        .with_batch_size(2)
        .with_learning_rate(1e-2)
        .with_decay_step(100)
        .with_teacher_forcing_ratio(1.0);

    let (_, metrics) = train(model, &dataset, &vocab, &config, &device).unwrap();

    let first = metrics.loss_history[0];
    let last = metrics.final_loss;
    assert!(last < first, "損失が減少していません: {} → {}", first, last);
    assert!(last < 0.5 * first, "損失の減少が不十分です: {} → {}", first, last);
}

#[test]
fn empty_dataset_is_fatal() {
    let device = Default::default();
    let (vocab, _, model_config) = setup();
    let model = Seq2SeqModel::<TestAutodiffBackend>::new(&device, &model_config);
    let dataset = DialogueDataset::from_pairs(&[], &vocab, SEQ_LEN);

    let result = train(model, &dataset, &vocab, &TrainingConfig::new(), &device);
    assert!(matches!(result, Err(ChatError::EmptyDataset)));
}

#[test]
fn zero_length_sequence_aborts_training() {
    let device = Default::default();
    let (vocab, mut dataset, model_config) = setup();
    let model = Seq2SeqModel::<TestAutodiffBackend>::new(&device, &model_config);

    dataset.examples.push(Example {
        input: vec![],
        output: vocab.encode_padded("The Sun.", SEQ_LEN),
    });

    let config = TrainingConfig::new().with_epochs(1).with_shuffle(false);
    let result = train(model, &dataset, &vocab, &config, &device);
    assert!(matches!(result, Err(ChatError::EmptySequence { .. })));
}

#[test]
fn wrong_length_sequence_aborts_training() {
    let device = Default::default();
    let (vocab, mut dataset, model_config) = setup();
    let model = Seq2SeqModel::<TestAutodiffBackend>::new(&device, &model_config);

    dataset.examples[0].output.truncate(SEQ_LEN - 1);

    let config = TrainingConfig::new().with_epochs(1);
    let result = train(model, &dataset, &vocab, &config, &device);
    assert!(matches!(
        result,
        Err(ChatError::ShapeMismatch {
            expected: SEQ_LEN,
            found: 7,
            ..
        })
    ));
}
