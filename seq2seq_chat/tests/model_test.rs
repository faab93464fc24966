use burn::backend::ndarray::NdArray;
use burn::prelude::*;
use burn::tensor::Distribution;
use rand::rngs::StdRng;
use rand::SeedableRng;

use seq2seq_chat::config::ModelConfig;
use seq2seq_chat::dataset::sequences_to_tensor;
use seq2seq_chat::model::Seq2SeqModel;
use seq2seq_chat::training::masked_cross_entropy;

type TestBackend = NdArray;

const VOCAB_SIZE: usize = 10;
const PAD_ID: usize = 0;

fn small_config(seq_len: usize) -> ModelConfig {
    ModelConfig::new(VOCAB_SIZE)
        .with_embed_dim(8)
        .with_hidden_dim(12)
        .with_seq_len(seq_len)
}

fn to_vec<const D: usize>(tensor: Tensor<TestBackend, D>) -> Vec<f32> {
    tensor.into_data().to_vec().unwrap()
}

fn scalar(tensor: Tensor<TestBackend, 1>) -> f32 {
    to_vec(tensor)[0]
}

#[test]
fn teacher_forced_logits_have_batch_len_vocab_shape() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(6));

    let src = sequences_to_tensor::<TestBackend>(
        &[vec![2, 4, 5, 3, 0, 0], vec![2, 6, 3, 0, 0, 0]],
        6,
        &device,
    );
    let tgt = sequences_to_tensor::<TestBackend>(
        &[vec![2, 7, 8, 9, 3, 0], vec![2, 5, 3, 0, 0, 0]],
        6,
        &device,
    );

    let mut rng = StdRng::seed_from_u64(0);
    let logits = model.forward(src, tgt, PAD_ID, 0.5, &mut rng);

    assert_eq!(logits.dims(), [2, 6, VOCAB_SIZE]);

    // 位置0（SOS）は予測しないのでゼロ行
    let seed_row = to_vec(logits.clone().slice([0..2, 0..1, 0..VOCAB_SIZE]));
    assert!(seed_row.iter().all(|&v| v == 0.0));

    // 位置1以降は実際に予測している
    let predicted = to_vec(logits.slice([0..2, 1..2, 0..VOCAB_SIZE]));
    assert!(predicted.iter().any(|&v| v != 0.0));
}

#[test]
fn full_teacher_forcing_is_deterministic() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(5));

    let src = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 5, 3, 0]], 5, &device);
    let tgt = sequences_to_tensor::<TestBackend>(&[vec![2, 7, 8, 3, 0]], 5, &device);

    let a = model.forward(src.clone(), tgt.clone(), PAD_ID, 1.0, &mut StdRng::seed_from_u64(1));
    let b = model.forward(src, tgt, PAD_ID, 1.0, &mut StdRng::seed_from_u64(2));

    assert_eq!(to_vec(a), to_vec(b));
}

#[test]
fn encoder_state_ignores_trailing_padding() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(6));

    let short = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 5, 3, 0, 0]], 6, &device);
    let long = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 5, 3, 0, 0, 0, 0, 0, 0]], 10, &device);

    let hidden_short = to_vec(model.encode(short, PAD_ID));
    let hidden_long = to_vec(model.encode(long, PAD_ID));

    assert_eq!(hidden_short.len(), 12);
    for (a, b) in hidden_short.iter().zip(hidden_long.iter()) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[test]
fn loss_ignores_logits_at_padding_positions() {
    let device = Default::default();

    let targets = sequences_to_tensor::<TestBackend>(&[vec![2, 7, 8, 3, 0, 0]], 6, &device);
    let logits = Tensor::<TestBackend, 3>::random([1, 6, VOCAB_SIZE], Distribution::Normal(0.0, 1.0), &device);

    // パディング位置（4, 5）のロジットだけを差し替える
    let noise = Tensor::<TestBackend, 3>::random([1, 2, VOCAB_SIZE], Distribution::Normal(5.0, 3.0), &device);
    let perturbed = logits.clone().slice_assign([0..1, 4..6, 0..VOCAB_SIZE], noise);

    let loss_a = scalar(masked_cross_entropy(logits, targets.clone(), PAD_ID));
    let loss_b = scalar(masked_cross_entropy(perturbed, targets, PAD_ID));

    assert!(loss_a > 0.0);
    assert!((loss_a - loss_b).abs() < 1e-6);
}

#[test]
fn loss_ignores_seed_position() {
    let device = Default::default();

    let targets = sequences_to_tensor::<TestBackend>(&[vec![2, 7, 3, 0]], 4, &device);
    let logits = Tensor::<TestBackend, 3>::random([1, 4, VOCAB_SIZE], Distribution::Normal(0.0, 1.0), &device);
    let noise = Tensor::<TestBackend, 3>::random([1, 1, VOCAB_SIZE], Distribution::Normal(0.0, 4.0), &device);
    let perturbed = logits.clone().slice_assign([0..1, 0..1, 0..VOCAB_SIZE], noise);

    let loss_a = scalar(masked_cross_entropy(logits, targets.clone(), PAD_ID));
    let loss_b = scalar(masked_cross_entropy(perturbed, targets, PAD_ID));

    assert!((loss_a - loss_b).abs() < 1e-6);
}

#[test]
fn all_padding_batch_contributes_zero_loss() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(6));

    let src = sequences_to_tensor::<TestBackend>(&vec![vec![2, 4, 3, 0, 0, 0]; 3], 6, &device);
    let tgt = sequences_to_tensor::<TestBackend>(&vec![vec![0; 6]; 3], 6, &device);

    let mut rng = StdRng::seed_from_u64(0);
    let logits = model.forward(src, tgt.clone(), PAD_ID, 0.5, &mut rng);
    let loss = scalar(masked_cross_entropy(logits, tgt, PAD_ID));

    assert_eq!(loss.abs(), 0.0);
}

#[test]
fn loss_matches_manual_cross_entropy() {
    let device = Default::default();

    // 語彙3、位置1のみが有効（位置2はパディング）
    let logits = Tensor::<TestBackend, 1>::from_floats(
        [0.0_f32, 0.0, 0.0, 1.0, 2.0, 3.0, 9.0, 9.0, 9.0].as_slice(),
        &device,
    )
    .reshape([1, 3, 3]);
    let targets = sequences_to_tensor::<TestBackend>(&[vec![2, 2, 0]], 3, &device);

    let loss = scalar(masked_cross_entropy(logits, targets, PAD_ID));

    let log_sum_exp = (1.0_f32.exp() + 2.0_f32.exp() + 3.0_f32.exp()).ln();
    let expected = log_sum_exp - 3.0;
    assert!((loss - expected).abs() < 1e-5);
}

#[test]
fn without_teacher_forcing_only_the_seed_token_is_read() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(6));

    let src = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 5, 3, 0, 0]], 6, &device);
    let tgt_a = sequences_to_tensor::<TestBackend>(&[vec![2, 7, 8, 9, 3, 0]], 6, &device);
    let tgt_b = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 4, 6, 5, 3]], 6, &device);

    // ratio 0.0 では位置0のSOS以外の正解トークンは入力に使われない
    let a = model.forward(src.clone(), tgt_a, PAD_ID, 0.0, &mut StdRng::seed_from_u64(3));
    let b = model.forward(src, tgt_b, PAD_ID, 0.0, &mut StdRng::seed_from_u64(4));

    assert_eq!(to_vec(a), to_vec(b));
}

#[test]
fn ground_truth_and_own_predictions_give_different_logits() {
    let device = Default::default();
    let model = Seq2SeqModel::<TestBackend>::new(&device, &small_config(5));
    let src = sequences_to_tensor::<TestBackend>(&[vec![2, 4, 5, 3, 0]], 5, &device);

    // 位置1のモデル予測とは異なるトークンを正解に置く
    let seed_only = sequences_to_tensor::<TestBackend>(&[vec![2, 0, 0, 0, 0]], 5, &device);
    let free_running = model.forward(src.clone(), seed_only, PAD_ID, 0.0, &mut StdRng::seed_from_u64(0));
    let step1 = to_vec(free_running.slice([0..1, 1..2, 0..VOCAB_SIZE]));
    let predicted = step1
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(id, _)| id)
        .unwrap();
    let forced = (predicted + 1) % VOCAB_SIZE;

    let tgt = sequences_to_tensor::<TestBackend>(&[vec![2, forced as i32, 3, 0, 0]], 5, &device);
    let without = model.forward(src.clone(), tgt.clone(), PAD_ID, 0.0, &mut StdRng::seed_from_u64(0));
    let with = model.forward(src, tgt, PAD_ID, 1.0, &mut StdRng::seed_from_u64(0));

    // 位置1までは同じ入力（SOS）なので一致し、位置2で分岐する
    let without_step1 = to_vec(without.clone().slice([0..1, 1..2, 0..VOCAB_SIZE]));
    let with_step1 = to_vec(with.clone().slice([0..1, 1..2, 0..VOCAB_SIZE]));
    assert_eq!(without_step1, with_step1);

    let without_step2 = to_vec(without.slice([0..1, 2..3, 0..VOCAB_SIZE]));
    let with_step2 = to_vec(with.slice([0..1, 2..3, 0..VOCAB_SIZE]));
    assert_ne!(without_step2, with_step2);
}
