use serde::Deserialize;

use crate::clip::Clip;
use crate::curve::{AnyCurve, Curve, KeyFrame};
use crate::error::BlendError;
use crate::time::{CompressedTime, RepeatMode};
use crate::value::{Blob, CurveElement, InterpolationMode, Quat};

/// Public API: parse a stored-clip JSON document into a [`Clip`].
///
/// Notes:
/// - `duration` and every key `time` are in ticks (see [`crate::TICKS_PER_SECOND`]).
/// - Key values are untagged shapes: number, `{x,y}`, `{x,y,z}`, `{x,y,z,w}`,
///   `{"rotation": [x,y,z,w]}` or `{"blob": [bytes]}`.
/// - All keys of one curve must have the same shape.
pub fn parse_clip_json(s: &str) -> Result<Clip, BlendError> {
    let sc: StoredClip = serde_json::from_str(s)?;
    let mut clip = Clip::new(sc.name, CompressedTime(sc.duration), sc.repeat_mode);
    for curve in sc.curves {
        let any = to_curve(&curve)?;
        if curve.user_custom {
            clip.add_user_curve(curve.property, any)?;
        } else {
            clip.add_curve(curve.property, any)?;
        }
    }
    Ok(clip)
}

fn to_curve(sc: &ScCurve) -> Result<AnyCurve, BlendError> {
    let Some(first) = sc.keys.first() else {
        return Err(BlendError::ClipParse {
            reason: format!("curve '{}' has no keys", sc.property),
        });
    };
    let mode = sc.interpolation;
    Ok(match first.value {
        RawValue::Number(_) => typed_curve(sc, mode, |v| match v {
            RawValue::Number(n) => Some(*n as f32),
            _ => None,
        })?
        .into(),
        RawValue::Vector2 { .. } => typed_curve(sc, mode, |v| match v {
            RawValue::Vector2 { x, y } => Some([*x as f32, *y as f32]),
            _ => None,
        })?
        .into(),
        RawValue::Vector3 { .. } => typed_curve(sc, mode, |v| match v {
            RawValue::Vector3 { x, y, z } => Some([*x as f32, *y as f32, *z as f32]),
            _ => None,
        })?
        .into(),
        RawValue::Vector4 { .. } => typed_curve(sc, mode, |v| match v {
            RawValue::Vector4 { x, y, z, w } => {
                Some([*x as f32, *y as f32, *z as f32, *w as f32])
            }
            _ => None,
        })?
        .into(),
        RawValue::Rotation { .. } => typed_curve(sc, mode, |v| match v {
            RawValue::Rotation { rotation: [x, y, z, w] } => {
                Some(Quat::from_xyzw(*x as f32, *y as f32, *z as f32, *w as f32))
            }
            _ => None,
        })?
        .into(),
        RawValue::Blob { .. } => typed_curve(sc, mode, |v| match v {
            RawValue::Blob { blob } => Some(Blob::new(blob.clone())),
            _ => None,
        })?
        .into(),
    })
}

fn typed_curve<T: CurveElement>(
    sc: &ScCurve,
    mode: InterpolationMode,
    convert: impl Fn(&RawValue) -> Option<T>,
) -> Result<Curve<T>, BlendError> {
    let keys = sc
        .keys
        .iter()
        .enumerate()
        .map(|(i, k)| {
            convert(&k.value)
                .map(|value| KeyFrame::new(CompressedTime(k.time), value))
                .ok_or_else(|| BlendError::ClipParse {
                    reason: format!(
                        "curve '{}' key {i} is not a {} value",
                        sc.property,
                        T::KIND
                    ),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Curve::new(mode, keys)
}

// ----- JSON schema (serde) -----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredClip {
    pub name: String,
    pub duration: i64, // ticks
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub curves: Vec<ScCurve>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScCurve {
    pub property: String,
    #[serde(default)]
    pub interpolation: InterpolationMode,
    #[serde(default)]
    pub user_custom: bool,
    pub keys: Vec<ScKey>,
}

#[derive(Debug, Deserialize)]
struct ScKey {
    pub time: i64, // ticks
    pub value: RawValue,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawValue {
    Number(f64),
    Rotation { rotation: [f64; 4] },
    Blob { blob: Vec<u8> },
    // Wider vectors first: untagged structs ignore extra fields.
    Vector4 { x: f64, y: f64, z: f64, w: f64 },
    Vector3 { x: f64, y: f64, z: f64 },
    Vector2 { x: f64, y: f64 },
}
