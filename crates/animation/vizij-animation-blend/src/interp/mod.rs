//! Interpolation kernels and the per-kind kernel table.
//!
//! Every numeric kernel takes the four-key window `(prev, left, right, next)` and a
//! normalized factor; constant and linear kernels simply ignore the outer keys. Both
//! the direct curve path and the optimized stream path call the same kernel, so the
//! two produce identical samples for identical windows.

pub mod functions;

use bytemuck::Pod;

use crate::time::CompressedTime;
use crate::value::{CurveElement, InterpolationMode, Quat};
use functions::{
    add_array, cubic_array, cubic_f32, cubic_quat, lerp_array, lerp_f32, normalize_quat,
    quat_conjugate, quat_mul, slerp_quat, sub_array,
};

/// Four-point numeric kernel over `(prev, left, right, next)`.
pub type NumericKernel<T> = fn(&T, &T, &T, &T, f32) -> T;

/// Endpoint selection for payloads that cannot be interpolated; `true` picks the right key.
pub type DiscreteKernel = fn(f32) -> bool;

/// Kernel resolved once per curve from its element kind and interpolation mode.
#[derive(Debug)]
pub enum Kernel<T> {
    Numeric(NumericKernel<T>),
    Discrete(DiscreteKernel),
}

impl<T> Clone for Kernel<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Kernel<T> {}

/// Numeric element with interpolation and blend arithmetic.
pub trait Interpolate: CurveElement + Copy + Pod {
    /// Lerp (slerp for rotations) from `a` at 0 to `b` at 1.
    fn linear(a: &Self, b: &Self, t: f32) -> Self;
    fn cubic(p0: &Self, p1: &Self, p2: &Self, p3: &Self, t: f32) -> Self;
    /// `a ⊕ b`: vector sum, or normalized quaternion product.
    fn combine(a: &Self, b: &Self) -> Self;
    /// `a ⊕ b⁻¹`: vector difference, or normalized product with the conjugate.
    fn combine_inverse(a: &Self, b: &Self) -> Self;
}

impl Interpolate for f32 {
    #[inline]
    fn linear(a: &Self, b: &Self, t: f32) -> Self {
        lerp_f32(*a, *b, t)
    }
    #[inline]
    fn cubic(p0: &Self, p1: &Self, p2: &Self, p3: &Self, t: f32) -> Self {
        cubic_f32(*p0, *p1, *p2, *p3, t)
    }
    #[inline]
    fn combine(a: &Self, b: &Self) -> Self {
        a + b
    }
    #[inline]
    fn combine_inverse(a: &Self, b: &Self) -> Self {
        a - b
    }
}

macro_rules! vector_interpolate {
    ($n:literal) => {
        impl Interpolate for [f32; $n] {
            #[inline]
            fn linear(a: &Self, b: &Self, t: f32) -> Self {
                lerp_array(a, b, t)
            }
            #[inline]
            fn cubic(p0: &Self, p1: &Self, p2: &Self, p3: &Self, t: f32) -> Self {
                cubic_array(p0, p1, p2, p3, t)
            }
            #[inline]
            fn combine(a: &Self, b: &Self) -> Self {
                add_array(a, b)
            }
            #[inline]
            fn combine_inverse(a: &Self, b: &Self) -> Self {
                sub_array(a, b)
            }
        }
    };
}

vector_interpolate!(2);
vector_interpolate!(3);
vector_interpolate!(4);

impl Interpolate for Quat {
    #[inline]
    fn linear(a: &Self, b: &Self, t: f32) -> Self {
        Quat(slerp_quat(&a.0, &b.0, t))
    }
    #[inline]
    fn cubic(p0: &Self, p1: &Self, p2: &Self, p3: &Self, t: f32) -> Self {
        Quat(cubic_quat(&p0.0, &p1.0, &p2.0, &p3.0, t))
    }
    #[inline]
    fn combine(a: &Self, b: &Self) -> Self {
        Quat(normalize_quat(quat_mul(&a.0, &b.0)))
    }
    #[inline]
    fn combine_inverse(a: &Self, b: &Self) -> Self {
        Quat(normalize_quat(quat_mul(&a.0, &quat_conjugate(&b.0))))
    }
}

fn constant_kernel<T: Interpolate>(_p0: &T, p1: &T, _p2: &T, _p3: &T, _t: f32) -> T {
    *p1
}

fn linear_kernel<T: Interpolate>(_p0: &T, p1: &T, p2: &T, _p3: &T, t: f32) -> T {
    T::linear(p1, p2, t)
}

fn cubic_kernel<T: Interpolate>(p0: &T, p1: &T, p2: &T, p3: &T, t: f32) -> T {
    T::cubic(p0, p1, p2, p3, t)
}

/// Kernel table lookup for numeric kinds.
pub fn numeric_kernel<T: Interpolate>(mode: InterpolationMode) -> NumericKernel<T> {
    match mode {
        InterpolationMode::Constant => constant_kernel::<T>,
        InterpolationMode::Linear => linear_kernel::<T>,
        InterpolationMode::Cubic => cubic_kernel::<T>,
    }
}

fn pick_left(_t: f32) -> bool {
    false
}

fn pick_nearest(t: f32) -> bool {
    t >= 0.5
}

/// Kernel table lookup for blob and object payloads: "linear" and "cubic" pick
/// whichever endpoint lies on the factor's side of the midpoint.
pub fn discrete_kernel(mode: InterpolationMode) -> DiscreteKernel {
    match mode {
        InterpolationMode::Constant => pick_left,
        InterpolationMode::Linear | InterpolationMode::Cubic => pick_nearest,
    }
}

/// Normalized position of `time` between two key times; 0 for degenerate segments.
#[inline]
pub fn segment_factor(t0: CompressedTime, t1: CompressedTime, time: CompressedTime) -> f32 {
    if t1 <= t0 {
        return 0.0;
    }
    ((time.0 - t0.0) as f64 / (t1.0 - t0.0) as f64) as f32
}
