use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vizij_animation_blend::{
    AnimationBlender, BlendInstruction, BlendOperation, Clip, ClipEvaluator, CompressedTime, Curve,
    InterpolationMode, Quat, RepeatMode,
};

const DURATION: i64 = 10_000;

fn bench_clip(name: &str, phase: f32, optimized: bool) -> Arc<Clip> {
    let mut clip = Clip::new(name, CompressedTime(DURATION), RepeatMode::Loop);
    for i in 0..32 {
        let keys: Vec<(i64, f32)> = (0..=40)
            .map(|k| (k * DURATION / 40, ((k as f32 + phase) * 0.3 + i as f32).sin()))
            .collect();
        clip.add_curve(
            format!("weight{i}"),
            Curve::from_keys(InterpolationMode::Cubic, keys).unwrap(),
        )
        .unwrap();

        let keys: Vec<(i64, Quat)> = (0..=20)
            .map(|k| {
                let half = (k as f32 + phase) * 0.05;
                (k * DURATION / 20, Quat::from_xyzw(0.0, half.sin(), 0.0, half.cos()))
            })
            .collect();
        clip.add_curve(
            format!("bone{i}"),
            Curve::from_keys(InterpolationMode::Linear, keys).unwrap(),
        )
        .unwrap();
    }
    if optimized {
        clip.optimize().unwrap();
    }
    Arc::new(clip)
}

fn setup(optimized: bool) -> (AnimationBlender, Vec<ClipEvaluator>) {
    let mut blender = AnimationBlender::default();
    let evals = vec![
        blender.register_clip(&bench_clip("a", 0.0, optimized)).unwrap(),
        blender.register_clip(&bench_clip("b", 1.5, optimized)).unwrap(),
    ];
    (blender, evals)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    for (label, optimized) in [("direct", false), ("optimized", true)] {
        let (mut blender, mut evals) = setup(optimized);
        let mut out = None;
        let mut time = 0i64;
        c.bench_function(&format!("blend_step/{label}"), |b| {
            b.iter(|| {
                time = (time + 167) % DURATION;
                let program = [
                    BlendInstruction::push(0, CompressedTime(time)),
                    BlendInstruction::push(1, CompressedTime(time)),
                    BlendInstruction::blend(BlendOperation::Linear, 0.3),
                ];
                blender.compute(&mut evals, &program, &mut out).unwrap();
                black_box(&out);
            })
        });
    }
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
