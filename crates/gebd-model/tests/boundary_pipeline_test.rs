//! End-to-end behaviour of the boundary detector on synthetic clips.
//!
//! All tests run on CPU with the tiny configuration from `gebd-test-utils`.

use std::sync::Arc;

use candle_core::{DType, Device, IndexOp, Tensor};
use gebd_model::{
    aggregate, prepare_gaussian_targets, BilinearMotionWarp, BoundaryError, BoundaryTrainer,
    CompressedBoundaryModel, Gop, GroupSimilarityEncoder, MaskedLoss, MemorySink,
    MotionCompensatedPropagator, StepOutcome, TrainingConfig,
};
use gebd_test_utils::{boundary_labels, tiny_model_config, ClipBuilder};

fn model() -> CompressedBoundaryModel {
    CompressedBoundaryModel::new(
        tiny_model_config(),
        Arc::new(BilinearMotionWarp::new()),
        &Device::Cpu,
    )
    .unwrap()
}

fn variable(model: &CompressedBoundaryModel, name: &str) -> Tensor {
    let vars = model.varmap().data().lock().unwrap();
    vars[name].as_tensor().copy().unwrap()
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> f32 {
    (a - b)
        .unwrap()
        .abs()
        .unwrap()
        .flatten_all()
        .unwrap()
        .max(0)
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

// =============================================================================
// Propagation
// =============================================================================

#[test]
fn test_gop_decode_order_visits_anchor_first() {
    let batch = ClipBuilder::new(1, 8).build(&Device::Cpu);
    let features = Tensor::randn(0f32, 1.0, (1, 8, 3, 8, 8), &Device::Cpu).unwrap();
    let propagator =
        MotionCompensatedPropagator::new(Arc::new(BilinearMotionWarp::new()), Gop::new(4).unwrap());

    let out = propagator
        .propagate(&features, &batch.motion, &batch.decode_order, &batch.frame_mask)
        .unwrap();

    let trace = &out.traces[0];
    assert_eq!(trace.visited, vec![0, 2, 1, 3, 4, 6, 5, 7]);
    assert_eq!(trace.anchors, 2);
    let pos = |f: usize| trace.visited.iter().position(|&v| v == f).unwrap();
    for dependent in [1, 2, 3] {
        assert!(pos(0) < pos(dependent));
    }
    assert_eq!(out.buffer.dims(), &[1, 8, 3, 8, 8]);
}

#[test]
fn test_padding_frames_stay_zero() {
    let batch = ClipBuilder::new(2, 8).absent_tail(3).build(&Device::Cpu);
    let features = Tensor::randn(0f32, 1.0, (2, 8, 3, 8, 8), &Device::Cpu).unwrap();
    let propagator =
        MotionCompensatedPropagator::new(Arc::new(BilinearMotionWarp::new()), Gop::new(4).unwrap());

    let out = propagator
        .propagate(&features, &batch.motion, &batch.decode_order, &batch.frame_mask)
        .unwrap();

    for video in 0..2 {
        assert_eq!(out.traces[video].skipped_absent, 3);
        for frame in 5..8 {
            let slot = out.buffer.i((video, frame)).unwrap();
            let zeros = slot.zeros_like().unwrap();
            assert_eq!(max_abs_diff(&slot, &zeros), 0.0);
        }
    }
}

#[test]
fn test_reference_decoded_later_is_rejected() {
    // Frame 1 references frame 2 on list 1, but 2 is decoded after it here.
    let batch = ClipBuilder::new(1, 4)
        .decode_order(vec![0, 1, 2, 3])
        .build(&Device::Cpu);
    let features = Tensor::randn(0f32, 1.0, (1, 4, 2, 8, 8), &Device::Cpu).unwrap();
    let propagator =
        MotionCompensatedPropagator::new(Arc::new(BilinearMotionWarp::new()), Gop::new(4).unwrap());

    let err = propagator
        .propagate(&features, &batch.motion, &batch.decode_order, &batch.frame_mask)
        .unwrap_err();
    assert!(matches!(err, BoundaryError::DecodeOrder { .. }));
}

// =============================================================================
// Temporal aggregation
// =============================================================================

#[test]
fn test_aggregation_twenty_frames_half_size_eight() {
    let config = tiny_model_config();
    let varmap = candle_nn::VarMap::new();
    let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let sink = Arc::new(MemorySink::new());
    let encoder = GroupSimilarityEncoder::new(&config, vb)
        .unwrap()
        .with_sink(sink.clone());

    let sequence = Tensor::randn(0f32, 1.0, (2, config.dim, 20), &Device::Cpu).unwrap();
    let out = aggregate(&sequence, 8, &encoder, false).unwrap();
    assert_eq!(out.dims(), &[2, config.dim, 20]);

    let recorded = sink.recorded();
    assert_eq!(recorded.len(), 8, "one scorer call per offset");
    for (offset, map) in recorded.iter().enumerate() {
        let len = 2 * (8 - offset) + 1;
        // 2 videos x 3 windows (20 frames padded to 24).
        assert_eq!(map.offset, offset);
        assert_eq!(map.map.dims(), &[6, config.group, len, len]);
    }
}

// =============================================================================
// Inference
// =============================================================================

#[test]
fn test_detect_scores_are_probabilities() {
    let model = model();
    let batch = ClipBuilder::new(2, 10).absent_tail(2).build(&Device::Cpu);

    let result = model.detect(&batch).unwrap();
    assert_eq!(result.scores.dims(), &[2, 10]);
    for row in result.to_rows().unwrap() {
        assert!(row.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}

#[test]
fn test_detect_rejects_misaligned_motion() {
    let model = model();
    let mut batch = ClipBuilder::new(1, 4).build(&Device::Cpu);
    batch.motion = Tensor::zeros((1, 4, 6, 5, 5), DType::F32, &Device::Cpu).unwrap();

    let err = model.detect(&batch).unwrap_err();
    assert!(matches!(err, BoundaryError::ShapeMismatch { .. }));
}

// =============================================================================
// Training
// =============================================================================

#[test]
fn test_all_masked_batch_reports_no_valid_frames() {
    let model = model();
    let batch = ClipBuilder::new(1, 8)
        .mask(vec![vec![false; 8]])
        .build(&Device::Cpu);
    let labels = boundary_labels(&[vec![0, 0, 1, 0, 0, 0, 1, 0]], &Device::Cpu);
    let targets = prepare_gaussian_targets(&labels, 1.0).unwrap();

    let loss = model.loss(&batch, &targets, false).unwrap();
    assert!(matches!(loss, MaskedLoss::NoValidFrames));

    let mut trainer = BoundaryTrainer::new(&model, &TrainingConfig::default()).unwrap();
    assert_eq!(trainer.step(&model, &batch, &labels).unwrap(), StepOutcome::Skipped);
    assert_eq!(trainer.steps(), 0);
}

#[test]
fn test_training_step_updates_parameters() {
    let model = model();
    let batch = ClipBuilder::new(1, 8).build(&Device::Cpu);
    let labels = boundary_labels(&[vec![0, 0, 0, 1, 0, 0, 0, 0]], &Device::Cpu);

    let before = variable(&model, "head.out.weight");

    let config = TrainingConfig {
        learning_rate: 1e-3,
        ..Default::default()
    };
    let mut trainer = BoundaryTrainer::new(&model, &config).unwrap();
    let outcome = trainer.step(&model, &batch, &labels).unwrap();

    match outcome {
        StepOutcome::Updated { loss, valid_frames } => {
            assert!(loss.is_finite());
            assert_eq!(valid_frames, 8);
        }
        StepOutcome::Skipped => panic!("expected an update"),
    }
    assert_eq!(trainer.steps(), 1);
    assert!(max_abs_diff(&before, &variable(&model, "head.out.weight")) > 0.0);
}

#[test]
fn test_training_step_reaches_propagation_embedding() {
    // The 1x1 embedding only feeds the warp, so its gradient comes through
    // the straight-through bridge.
    let model = model();
    let batch = ClipBuilder::new(2, 8).build(&Device::Cpu);
    let labels = boundary_labels(
        &[vec![0, 0, 1, 0, 0, 0, 0, 0], vec![0, 0, 0, 0, 0, 1, 0, 0]],
        &Device::Cpu,
    );
    let before = variable(&model, "embedding.weight");

    let config = TrainingConfig {
        learning_rate: 1e-3,
        ..Default::default()
    };
    let mut trainer = BoundaryTrainer::new(&model, &config).unwrap();
    let outcome = trainer.step(&model, &batch, &labels).unwrap();

    assert!(matches!(outcome, StepOutcome::Updated { valid_frames: 16, .. }));
    assert!(max_abs_diff(&before, &variable(&model, "embedding.weight")) > 0.0);
}

#[test]
fn test_mask_is_read_in_decode_order() {
    let batch = ClipBuilder::new(1, 4)
        .mask(vec![vec![true, false, true, true]])
        .build(&Device::Cpu);
    let features = Tensor::randn(0f32, 1.0, (1, 4, 3, 8, 8), &Device::Cpu).unwrap();
    let propagator =
        MotionCompensatedPropagator::new(Arc::new(BilinearMotionWarp::new()), Gop::new(4).unwrap());

    let out = propagator
        .propagate(&features, &batch.motion, &batch.decode_order, &batch.frame_mask)
        .unwrap();

    // Decode order [0, 2, 1, 3]: the masked step 1 decodes frame 2.
    assert_eq!(out.traces[0].visited, vec![0, 1, 3]);
    let slot = out.buffer.i((0, 2)).unwrap();
    assert_eq!(max_abs_diff(&slot, &slot.zeros_like().unwrap()), 0.0);
}

#[test]
fn test_masked_frames_excluded_from_loss() {
    let model = model();
    let batch = ClipBuilder::new(1, 8).absent_tail(3).build(&Device::Cpu);
    let labels = boundary_labels(&[vec![0, 1, 0, 0, 0, 0, 0, 0]], &Device::Cpu);
    let targets = prepare_gaussian_targets(&labels, 1.0).unwrap();

    let loss = model.loss(&batch, &targets, false).unwrap();
    assert_eq!(loss.valid_frames(), 5);
    assert!(loss.value().unwrap().unwrap().is_finite());
}

// =============================================================================
// Checkpoints
// =============================================================================

#[test]
fn test_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.safetensors");
    let batch = ClipBuilder::new(1, 8).build(&Device::Cpu);

    let original = model();
    original.save_weights(&path).unwrap();
    let expected = original.detect(&batch).unwrap().scores;

    let mut restored = model();
    restored.load_weights(&path).unwrap();
    let actual = restored.detect(&batch).unwrap().scores;

    assert!(max_abs_diff(&expected, &actual) < 1e-6);
}

#[test]
fn test_load_missing_checkpoint_fails() {
    let mut model = model();
    assert!(model.load_weights("/nonexistent/weights.safetensors").is_err());
}
