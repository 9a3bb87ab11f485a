use std::sync::Arc;

use vizij_animation_blend::{
    parse_clip_json, AnimationBlender, BlendConfig, BlendError, BlendInstruction, BlendOperation,
    CompressedTime, ElementKind, RepeatMode, SampledValue, TICKS_PER_SECOND,
};

const WAVE: &str = r#"{
    "name": "wave",
    "duration": 10000,
    "repeatMode": "loop",
    "curves": [
        { "property": "arm/weight", "interpolation": "linear",
          "keys": [ { "time": 0, "value": 0.0 }, { "time": 10000, "value": 1.0 } ] },
        { "property": "arm/offset",
          "keys": [ { "time": 0, "value": { "x": 0, "y": 0, "z": 0 } },
                    { "time": 5000, "value": { "x": 1, "y": 2, "z": 3 } } ] },
        { "property": "face/sprite", "interpolation": "constant",
          "keys": [ { "time": 0, "value": { "blob": [0, 1] } },
                    { "time": 5000, "value": { "blob": [2, 3] } } ] }
    ]
}"#;

const IDLE: &str = r#"{
    "name": "idle",
    "duration": 20000,
    "curves": [
        { "property": "arm/weight", "keys": [ { "time": 0, "value": 0.5 } ] },
        { "property": "tail/wag", "keys": [ { "time": 0, "value": { "rotation": [0, 0, 0, 1] } } ] }
    ]
}"#;

#[test]
fn loaded_clips_register_and_blend() {
    let wave = parse_clip_json(WAVE).unwrap();
    assert_eq!(wave.duration(), CompressedTime(TICKS_PER_SECOND));
    assert_eq!(wave.repeat_mode(), RepeatMode::Loop);
    let mut wave_optimized = wave.clone();
    wave_optimized.optimize().unwrap();

    let idle = parse_clip_json(IDLE).unwrap();
    assert_eq!(idle.repeat_mode(), RepeatMode::default());

    let mut blender = AnimationBlender::new(BlendConfig::default());
    let mut evals = vec![
        blender.register_clip(&Arc::new(wave_optimized)).unwrap(),
        blender.register_clip(&Arc::new(idle)).unwrap(),
    ];
    assert_eq!(blender.layout().len(), 4);
    assert_eq!(
        blender.layout().find("tail/wag").map(|c| c.kind),
        Some(ElementKind::Rotation)
    );

    // 1.25 s into a looping 1 s clip samples its local time 0.25 s.
    let local = evals[0].clip().local_time(CompressedTime(12_500));
    assert_eq!(local.time, CompressedTime(2_500));

    let program = [
        BlendInstruction::push(0, local.time),
        BlendInstruction::push(1, CompressedTime(0)),
        BlendInstruction::blend(BlendOperation::Linear, 0.5),
    ];
    let mut out = None;
    blender.compute(&mut evals, &program, &mut out).unwrap();
    let out = out.unwrap();

    // 0.25 blended with 0.5.
    assert_eq!(out.value_by_name("arm/weight"), Some(SampledValue::Scalar(0.375)));
    // Only the wave drives these.
    assert_eq!(
        out.value_by_name("arm/offset"),
        Some(SampledValue::Vec3([0.5, 1.0, 1.5]))
    );
    assert_eq!(out.value_by_name("face/sprite"), Some(SampledValue::Blob(&[0u8, 1][..])));
    assert!(matches!(out.value_by_name("tail/wag"), Some(SampledValue::Rotation(_))));

    let err = blender.layout().require("leg/weight").unwrap_err();
    assert_eq!(err, BlendError::UnknownProperty { property: "leg/weight".into() });
    assert!(!err.is_fatal());
}

#[test]
fn curves_without_keys_are_rejected() {
    let json = r#"{ "name": "empty", "duration": 10, "curves": [ { "property": "p", "keys": [] } ] }"#;
    let err = parse_clip_json(json).unwrap_err();
    assert_eq!(err.category(), "data");
    assert!(err.to_string().contains("no keys"), "{err}");
}

#[test]
fn unsorted_keys_are_rejected() {
    let json = r#"{ "name": "bad", "duration": 10, "curves": [
        { "property": "p", "keys": [ { "time": 5, "value": 1 }, { "time": 2, "value": 2 } ] }
    ] }"#;
    assert_eq!(parse_clip_json(json).unwrap_err().category(), "data");
}
