use std::sync::Arc;
use std::thread;

use vizij_animation_blend::{
    AnimationBlender, BlendConfig, BlendError, BlendInstruction, BlendOperation, BlendPools, Clip,
    CompressedTime, Curve, EvaluatorState, InterpolationMode, RepeatMode, SampledValue,
};

fn scalar_clip(name: &str, props: &[(&str, f32)]) -> Arc<Clip> {
    let mut clip = Clip::new(name, CompressedTime(1_000), RepeatMode::Loop);
    for (p, v) in props {
        clip.add_curve(
            *p,
            Curve::from_keys(InterpolationMode::Linear, [(0, *v), (1_000, *v * 2.0)]).unwrap(),
        )
        .unwrap();
    }
    Arc::new(clip)
}

fn two_clip_program(time: i64) -> [BlendInstruction; 3] {
    [
        BlendInstruction::push(0, CompressedTime(time)),
        BlendInstruction::push(1, CompressedTime(time)),
        BlendInstruction::blend(BlendOperation::Linear, 0.5),
    ]
}

#[test]
fn offsets_never_move_when_later_clips_register() {
    let mut blender = AnimationBlender::default();
    let a = scalar_clip("a", &[("m", 1.0), ("n", 2.0)]);
    blender.register_clip(&a).unwrap();
    let before: Vec<_> = ["m", "n"]
        .iter()
        .map(|p| blender.layout().find(p).unwrap().offset)
        .collect();
    let size_before = blender.layout().buffer_size();
    let version_before = blender.layout().version();

    // Names sorting before and between the existing ones.
    let b = scalar_clip("b", &[("a", 0.0), ("m", 5.0), ("mm", 0.0)]);
    blender.register_clip(&b).unwrap();

    let after: Vec<_> = ["m", "n"]
        .iter()
        .map(|p| blender.layout().find(p).unwrap().offset)
        .collect();
    assert_eq!(before, after);
    assert!(blender.layout().find("a").unwrap().offset >= size_before);
    assert!(blender.layout().find("mm").unwrap().offset >= size_before);
    assert_eq!(blender.layout().len(), 4);
    assert!(blender.layout().version() > version_before);

    // Re-registering a known clip does not bump the version.
    let version = blender.layout().version();
    blender.register_clip(&a).unwrap();
    assert_eq!(blender.layout().version(), version);
}

#[test]
fn conflicting_kinds_leave_the_layout_untouched() {
    let mut blender = AnimationBlender::default();
    blender.register_clip(&scalar_clip("a", &[("x", 1.0)])).unwrap();

    let mut other = Clip::new("b", CompressedTime(10), RepeatMode::Loop);
    other
        .add_curve("new", Curve::from_keys(InterpolationMode::Linear, [(0, 1.0f32)]).unwrap())
        .unwrap();
    other
        .add_curve(
            "x",
            Curve::from_keys(InterpolationMode::Linear, [(0, [1.0f32, 2.0, 3.0])]).unwrap(),
        )
        .unwrap();
    let err = blender.register_clip(&Arc::new(other)).unwrap_err();
    assert!(matches!(err, BlendError::KindMismatch { ref property, .. } if property == "x"));
    assert_eq!(err.category(), "precondition");
    assert_eq!(blender.layout().len(), 1);
    assert!(blender.layout().find("new").is_none());
}

#[test]
fn steady_state_frames_reuse_pooled_storage() {
    let mut blender = AnimationBlender::default();
    let a = scalar_clip("a", &[("x", 1.0), ("y", 2.0)]);
    let b = scalar_clip("b", &[("x", 3.0), ("z", 4.0)]);
    let mut evals = vec![
        blender.register_clip(&a).unwrap(),
        blender.register_clip(&b).unwrap(),
    ];

    let mut out = None;
    blender.compute(&mut evals, &two_clip_program(0), &mut out).unwrap();
    let first = out.take().unwrap();
    let ptr = first.buffer().as_ptr();
    blender.free_intermediate_result(first);
    let stats = blender.pools().stats();

    for frame in 0..200 {
        blender
            .compute(&mut evals, &two_clip_program(frame * 5), &mut out)
            .unwrap();
        let result = out.take().unwrap();
        assert_eq!(result.buffer().as_ptr(), ptr, "frame {frame}");
        blender.free_intermediate_result(result);
    }
    let after = blender.pools().stats();
    assert_eq!(after.results_created, stats.results_created);
    assert_eq!(after.evaluators_created, stats.evaluators_created);

    // Evaluators go back to the pool and come out again without allocating.
    for eval in evals.drain(..) {
        blender.release_evaluator(eval);
    }
    assert_eq!(blender.pools().stats().pooled_evaluators, 2);
    let again = blender.register_clip(&a).unwrap();
    assert_eq!(again.state(), EvaluatorState::Initialized);
    assert_eq!(blender.pools().stats().evaluators_created, 2);
}

#[test]
fn unloading_a_clip_lets_it_drop() {
    let mut blender = AnimationBlender::default();
    let a = scalar_clip("a", &[("x", 1.0)]);
    let b = scalar_clip("b", &[("y", 2.0)]);
    for clip in [&a, &b] {
        let eval = blender.register_clip(clip).unwrap();
        blender.release_evaluator(eval);
    }
    assert_eq!(blender.pools().stats().pooled_clips, 2);

    assert_eq!(blender.unload_clip(&a), 1);
    assert_eq!(Arc::strong_count(&a), 1);
    assert_eq!(blender.unload_clip(&a), 0);
    let stats = blender.pools().stats();
    assert_eq!((stats.pooled_clips, stats.pooled_evaluators), (1, 1));
    assert!(blender.layout().find("x").is_some());
}

#[test]
fn layout_growth_grows_results_and_refresh_rebinds() {
    let mut blender = AnimationBlender::default();
    let a = scalar_clip("a", &[("x", 1.0)]);
    let mut eval_a = blender.register_clip(&a).unwrap();
    let small = blender.acquire_result();
    let small_len = small.buffer().len();
    blender.free_intermediate_result(small);

    let b = scalar_clip("b", &[("x", 3.0), ("y", 4.0), ("z", 5.0)]);
    let eval_b = blender.register_clip(&b).unwrap();
    assert_eq!(eval_a.bound_channels(), 1);
    assert_eq!(eval_b.bound_channels(), 3);

    let grown = blender.acquire_result();
    assert!(grown.buffer().len() >= blender.layout().buffer_size());
    assert!(grown.buffer().len() > small_len);
    blender.free_intermediate_result(grown);

    // A stale evaluator still writes its channels and reports the rest absent.
    let mut evals = vec![eval_a, eval_b];
    let program = [
        BlendInstruction::push(0, CompressedTime(0)),
        BlendInstruction::push(1, CompressedTime(0)),
        BlendInstruction::blend(BlendOperation::Linear, 0.25),
    ];
    let mut out = None;
    blender.compute(&mut evals, &program, &mut out).unwrap();
    let out = out.unwrap();
    assert_eq!(out.value_by_name("x"), Some(SampledValue::Scalar(1.5)));
    assert_eq!(out.value_by_name("y"), Some(SampledValue::Scalar(4.0)));

    eval_a = evals.remove(0);
    let stale_version = eval_a.layout_version();
    blender.refresh_evaluator(&mut eval_a).unwrap();
    assert!(eval_a.layout_version() > stale_version);
    assert_eq!(eval_a.bound_channels(), 3);
}

#[test]
fn registered_clips_are_frozen() {
    let mut blender = AnimationBlender::default();
    let mut clip = scalar_clip("a", &[("x", 1.0)]);
    let eval = blender.register_clip(&clip).unwrap();
    assert!(clip.is_frozen());

    blender.release_evaluator(eval);
    assert_eq!(blender.pools().purge_clip(&clip), 1);
    let clip_mut = Arc::get_mut(&mut clip).unwrap();
    let err = clip_mut
        .add_curve("y", Curve::from_keys(InterpolationMode::Linear, [(0, 1.0f32)]).unwrap())
        .unwrap_err();
    assert_eq!(err, BlendError::ClipFrozen { clip: "a".into() });
    assert!(matches!(clip_mut.optimize(), Err(BlendError::ClipFrozen { .. })));

    // A copy is editable again.
    let mut copy = (*clip).clone();
    assert!(!copy.is_frozen());
    copy.add_curve("y", Curve::from_keys(InterpolationMode::Linear, [(0, 1.0f32)]).unwrap())
        .unwrap();
}

#[test]
fn blenders_on_many_threads_share_pools() {
    let pools = Arc::new(BlendPools::new(BlendConfig {
        initial_result_pool: 0,
        ..Default::default()
    }));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let pools = pools.clone();
            thread::spawn(move || {
                let mut blender = AnimationBlender::with_pools(pools);
                let base = i as f32;
                let a = scalar_clip("a", &[("x", base)]);
                let b = scalar_clip("b", &[("x", base + 2.0)]);
                let mut evals = vec![
                    blender.register_clip(&a).unwrap(),
                    blender.register_clip(&b).unwrap(),
                ];
                let mut out = None;
                for _ in 0..100 {
                    blender.compute(&mut evals, &two_clip_program(0), &mut out).unwrap();
                    let result = out.take().unwrap();
                    assert_eq!(result.value_by_name("x"), Some(SampledValue::Scalar(base + 1.0)));
                    blender.free_intermediate_result(result);
                }
                for eval in evals {
                    blender.release_evaluator(eval);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let stats = pools.stats();
    // At most two snapshots are live per thread at any time.
    assert!(stats.results_created <= 8, "{stats:?}");
    assert_eq!(stats.pooled_results, stats.results_created);
    assert_eq!(stats.evaluators_created, 8);
    assert_eq!(stats.pooled_evaluators, 8);
}
