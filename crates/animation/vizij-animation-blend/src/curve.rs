//! Keyframe curves and the monotonic cursor used to sample them.
//!
//! Model:
//! - A curve holds keys with non-decreasing tick times. Equal consecutive times
//!   form a discontinuity; sampling at that time resolves to the later key.
//! - Samples at or before the first key return the first value, samples at or
//!   after the last key return the last value.
//! - Between keys the curve's kernel is applied to the window
//!   `(i-1, i, i+1, i+2)`, indices clamped to the key range.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::BlendError;
use crate::interp::{segment_factor, Kernel};
use crate::time::CompressedTime;
use crate::value::{Blob, CurveElement, ElementKind, InterpolationMode, ObjectRef, Quat};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame<T> {
    pub time: CompressedTime,
    pub value: T,
}

impl<T> KeyFrame<T> {
    #[inline]
    pub fn new(time: CompressedTime, value: T) -> Self {
        Self { time, value }
    }
}

/// Per-binding position hint into a curve's key list.
///
/// Queries are expected to move forward; a backward seek rewinds to the first key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CurveCursor {
    index: usize,
}

impl CurveCursor {
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

/// Where a sample time falls on a curve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Segment {
    /// Outside the keyed range (or a single-key curve): hold this key.
    Clamped(usize),
    /// Strictly inside `[keys[left].time, keys[left + 1].time)`.
    Between { left: usize, factor: f32 },
}

/// Ordered keys plus the kernel resolved for their kind and interpolation mode.
#[derive(Clone, Debug)]
pub struct Curve<T: CurveElement> {
    keys: Vec<KeyFrame<T>>,
    mode: InterpolationMode,
    element_size: usize,
    kernel: Kernel<T>,
}

impl<T: CurveElement> Curve<T> {
    /// Build a curve, validating that it has keys, that key times never
    /// decrease, and that every key has the same byte size.
    pub fn new(mode: InterpolationMode, keys: Vec<KeyFrame<T>>) -> Result<Self, BlendError> {
        let Some(first) = keys.first() else {
            return Err(BlendError::InvalidCurve {
                reason: "curve has no keys".into(),
            });
        };
        let element_size = first.value.byte_size();
        for (i, pair) in keys.windows(2).enumerate() {
            if pair[1].time < pair[0].time {
                return Err(BlendError::InvalidCurve {
                    reason: format!(
                        "key {} at {} precedes key {} at {}",
                        i + 1,
                        pair[1].time,
                        i,
                        pair[0].time
                    ),
                });
            }
        }
        if let Some(bad) = keys.iter().position(|k| k.value.byte_size() != element_size) {
            return Err(BlendError::InvalidCurve {
                reason: format!(
                    "key {bad} is {} bytes, expected {element_size}",
                    keys[bad].value.byte_size()
                ),
            });
        }
        Ok(Self {
            keys,
            mode,
            element_size,
            kernel: T::kernel(mode),
        })
    }

    /// Convenience constructor from `(ticks, value)` pairs.
    pub fn from_keys(
        mode: InterpolationMode,
        keys: impl IntoIterator<Item = (i64, T)>,
    ) -> Result<Self, BlendError> {
        Self::new(
            mode,
            keys.into_iter()
                .map(|(t, v)| KeyFrame::new(CompressedTime(t), v))
                .collect(),
        )
    }

    #[inline]
    pub fn keys(&self) -> &[KeyFrame<T>] {
        &self.keys
    }

    #[inline]
    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        T::KIND
    }

    #[inline]
    pub fn element_size(&self) -> usize {
        self.element_size
    }

    #[inline]
    pub(crate) fn kernel(&self) -> Kernel<T> {
        self.kernel
    }

    pub fn first_time(&self) -> CompressedTime {
        self.keys[0].time
    }

    pub fn last_time(&self) -> CompressedTime {
        self.keys[self.keys.len() - 1].time
    }

    pub(crate) fn locate(&self, cursor: &mut CurveCursor, time: CompressedTime) -> Segment {
        let n = self.keys.len();
        if n == 1 || time <= self.keys[0].time {
            return Segment::Clamped(0);
        }
        if time >= self.keys[n - 1].time {
            return Segment::Clamped(n - 1);
        }
        if cursor.index >= n - 1 || self.keys[cursor.index].time > time {
            trace!(from = cursor.index, %time, "curve cursor rewind");
            cursor.index = 0;
        }
        while self.keys[cursor.index + 1].time <= time {
            cursor.index += 1;
        }
        let left = cursor.index;
        Segment::Between {
            left,
            factor: segment_factor(self.keys[left].time, self.keys[left + 1].time, time),
        }
    }

    /// Sample at `time`, borrowing the key when no interpolation is needed.
    pub fn evaluate_ref(&self, cursor: &mut CurveCursor, time: CompressedTime) -> Cow<'_, T> {
        match self.locate(cursor, time) {
            Segment::Clamped(i) => Cow::Borrowed(&self.keys[i].value),
            Segment::Between { left, factor } => {
                let right = left + 1;
                match self.kernel {
                    Kernel::Numeric(f) => {
                        let prev = left.saturating_sub(1);
                        let next = (left + 2).min(self.keys.len() - 1);
                        Cow::Owned(f(
                            &self.keys[prev].value,
                            &self.keys[left].value,
                            &self.keys[right].value,
                            &self.keys[next].value,
                            factor,
                        ))
                    }
                    Kernel::Discrete(pick_right) => {
                        let i = if pick_right(factor) { right } else { left };
                        Cow::Borrowed(&self.keys[i].value)
                    }
                }
            }
        }
    }

    #[inline]
    pub fn evaluate(&self, cursor: &mut CurveCursor, time: CompressedTime) -> T {
        self.evaluate_ref(cursor, time).into_owned()
    }

    /// Stateless sample; scans from the first key.
    pub fn evaluate_at(&self, time: CompressedTime) -> T {
        self.evaluate(&mut CurveCursor::default(), time)
    }
}

/// A curve of any supported element kind.
#[derive(Clone, Debug)]
pub enum AnyCurve {
    Scalar(Curve<f32>),
    Vec2(Curve<[f32; 2]>),
    Vec3(Curve<[f32; 3]>),
    Vec4(Curve<[f32; 4]>),
    Rotation(Curve<Quat>),
    Blob(Curve<Blob>),
    Object(Curve<ObjectRef>),
}

macro_rules! any_curve_dispatch {
    ($self:expr, $c:ident => $body:expr) => {
        match $self {
            AnyCurve::Scalar($c) => $body,
            AnyCurve::Vec2($c) => $body,
            AnyCurve::Vec3($c) => $body,
            AnyCurve::Vec4($c) => $body,
            AnyCurve::Rotation($c) => $body,
            AnyCurve::Blob($c) => $body,
            AnyCurve::Object($c) => $body,
        }
    };
}

impl AnyCurve {
    pub fn kind(&self) -> ElementKind {
        any_curve_dispatch!(self, c => c.kind())
    }

    pub fn element_size(&self) -> usize {
        any_curve_dispatch!(self, c => c.element_size())
    }

    pub fn mode(&self) -> InterpolationMode {
        any_curve_dispatch!(self, c => c.mode())
    }

    pub fn key_count(&self) -> usize {
        any_curve_dispatch!(self, c => c.keys().len())
    }

    pub fn last_time(&self) -> CompressedTime {
        any_curve_dispatch!(self, c => c.last_time())
    }
}

macro_rules! any_curve_from {
    ($ty:ty, $variant:ident) => {
        impl From<Curve<$ty>> for AnyCurve {
            fn from(curve: Curve<$ty>) -> Self {
                AnyCurve::$variant(curve)
            }
        }
    };
}

any_curve_from!(f32, Scalar);
any_curve_from!([f32; 2], Vec2);
any_curve_from!([f32; 3], Vec3);
any_curve_from!([f32; 4], Vec4);
any_curve_from!(Quat, Rotation);
any_curve_from!(Blob, Blob);
any_curve_from!(ObjectRef, Object);

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    fn ramp(mode: InterpolationMode) -> Curve<f32> {
        Curve::from_keys(mode, [(0, 0.0), (1_000, 1.0), (2_000, 4.0), (3_000, 9.0)]).unwrap()
    }

    #[test]
    fn rejects_empty_and_unordered_keys() {
        assert!(matches!(
            Curve::<f32>::new(InterpolationMode::Linear, vec![]),
            Err(BlendError::InvalidCurve { .. })
        ));
        assert!(Curve::from_keys(InterpolationMode::Linear, [(10, 0.0f32), (5, 1.0)]).is_err());
        let blobs = vec![
            KeyFrame::new(CompressedTime(0), Blob::new(vec![1u8, 2])),
            KeyFrame::new(CompressedTime(1), Blob::new(vec![1u8])),
        ];
        assert!(Curve::new(InterpolationMode::Constant, blobs).is_err());
    }

    #[test]
    fn clamps_outside_key_range_for_every_mode() {
        for mode in [
            InterpolationMode::Constant,
            InterpolationMode::Linear,
            InterpolationMode::Cubic,
        ] {
            let c = ramp(mode);
            assert_eq!(c.evaluate_at(CompressedTime(-50)), 0.0);
            assert_eq!(c.evaluate_at(CompressedTime(0)), 0.0);
            assert_eq!(c.evaluate_at(CompressedTime(3_000)), 9.0);
            assert_eq!(c.evaluate_at(CompressedTime(9_999)), 9.0);
        }
    }

    #[test]
    fn linear_and_constant_between_keys() {
        let linear = ramp(InterpolationMode::Linear);
        assert!(approx(linear.evaluate_at(CompressedTime(1_500)), 2.5, 1e-6));
        let constant = ramp(InterpolationMode::Constant);
        assert_eq!(constant.evaluate_at(CompressedTime(1_999)), 1.0);
    }

    #[test]
    fn cursor_rewinds_on_backward_seek() {
        let c = ramp(InterpolationMode::Linear);
        let mut cursor = CurveCursor::default();
        assert!(approx(c.evaluate(&mut cursor, CompressedTime(2_500)), 6.5, 1e-6));
        assert_eq!(cursor.index(), 2);
        assert!(approx(c.evaluate(&mut cursor, CompressedTime(500)), 0.5, 1e-6));
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn duplicate_times_resolve_to_later_key() {
        let c = Curve::from_keys(
            InterpolationMode::Linear,
            [(0, 0.0f32), (100, 1.0), (100, 5.0), (200, 6.0)],
        )
        .unwrap();
        assert_eq!(c.evaluate_at(CompressedTime(100)), 5.0);
        assert!(approx(c.evaluate_at(CompressedTime(150)), 5.5, 1e-6));
        assert!(approx(c.evaluate_at(CompressedTime(50)), 0.5, 1e-6));
    }

    #[test]
    fn blob_linear_picks_nearest_endpoint() {
        let c = Curve::from_keys(
            InterpolationMode::Linear,
            [(0, Blob::new(vec![0u8])), (100, Blob::new(vec![1u8]))],
        )
        .unwrap();
        let mut cursor = CurveCursor::default();
        assert!(matches!(
            c.evaluate_ref(&mut cursor, CompressedTime(49)),
            Cow::Borrowed(b) if b.as_bytes() == [0]
        ));
        assert_eq!(c.evaluate(&mut cursor, CompressedTime(50)).as_bytes(), &[1]);
    }

    #[test]
    fn any_curve_reports_kind_and_size() {
        let c: AnyCurve = Curve::from_keys(InterpolationMode::Cubic, [(0, [0.0f32; 3])])
            .unwrap()
            .into();
        assert_eq!(c.kind(), ElementKind::Vec3);
        assert_eq!(c.element_size(), 12);
        assert_eq!(c.key_count(), 1);
    }
}
