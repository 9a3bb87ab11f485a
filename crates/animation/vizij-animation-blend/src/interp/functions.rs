//! Interpolation helpers:
//! - lerp over scalars and fixed-size arrays (exact at both endpoints)
//! - unit-interval Hermite (Catmull-Rom) basis for four-point cubic sampling
//! - quaternion slerp with shortest-arc correction, product and conjugate

/// Linear interpolation of scalars. `t = 0` returns `a` and `t = 1` returns `b` exactly.
#[inline]
pub fn lerp_f32(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

#[inline]
pub fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], t: f32) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = lerp_f32(a[i], b[i], t);
    }
    out
}

#[inline]
pub fn add_array<const N: usize>(a: &[f32; N], b: &[f32; N]) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = a[i] + b[i];
    }
    out
}

#[inline]
pub fn sub_array<const N: usize>(a: &[f32; N], b: &[f32; N]) -> [f32; N] {
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = a[i] - b[i];
    }
    out
}

/// Weights for `(p0, p1, p2, p3)` on the unit interval; the curve passes through
/// `p1` at `t = 0` and `p2` at `t = 1`.
#[inline]
pub fn hermite_weights(t: f32) -> [f32; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        0.5 * (-t3 + 2.0 * t2 - t),
        0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
        0.5 * (-3.0 * t3 + 4.0 * t2 + t),
        0.5 * (t3 - t2),
    ]
}

#[inline]
pub fn cubic_f32(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let w = hermite_weights(t);
    p0 * w[0] + p1 * w[1] + p2 * w[2] + p3 * w[3]
}

#[inline]
pub fn cubic_array<const N: usize>(
    p0: &[f32; N],
    p1: &[f32; N],
    p2: &[f32; N],
    p3: &[f32; N],
    t: f32,
) -> [f32; N] {
    let w = hermite_weights(t);
    let mut out = [0.0f32; N];
    for i in 0..N {
        out[i] = p0[i] * w[0] + p1[i] * w[1] + p2[i] * w[2] + p3[i] * w[3];
    }
    out
}

#[inline]
fn dot4(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3]
}

#[inline]
fn negate4(q: &[f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], -q[3]]
}

/// Normalize a quaternion represented as [x,y,z,w]; degenerate input maps to identity.
#[inline]
pub fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len2 = dot4(&q, &q);
    if len2 > 0.0 {
        let inv_len = len2.sqrt().recip();
        [q[0] * inv_len, q[1] * inv_len, q[2] * inv_len, q[3] * inv_len]
    } else {
        [0.0, 0.0, 0.0, 1.0]
    }
}

/// Flip `q` into the hemisphere of `reference`.
#[inline]
pub fn align_quat(reference: &[f32; 4], q: &[f32; 4]) -> [f32; 4] {
    if dot4(reference, q) < 0.0 {
        negate4(q)
    } else {
        *q
    }
}

/// Slerp between two unit quaternions along the shortest arc.
pub fn slerp_quat(a: &[f32; 4], b: &[f32; 4], t: f32) -> [f32; 4] {
    if t <= 0.0 {
        return *a;
    }
    if t >= 1.0 {
        return *b;
    }
    let qa = normalize_quat(*a);
    let mut qb = normalize_quat(*b);

    let mut dot = dot4(&qa, &qb);
    if dot < 0.0 {
        qb = negate4(&qb);
        dot = -dot;
    }

    // Nearly parallel: fall back to normalized lerp.
    const DOT_THRESHOLD: f32 = 0.9995;
    if dot > DOT_THRESHOLD {
        return normalize_quat(lerp_array(&qa, &qb, t));
    }

    let theta_0 = dot.clamp(-1.0, 1.0).acos();
    let theta = theta_0 * t;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    [
        s0 * qa[0] + s1 * qb[0],
        s0 * qa[1] + s1 * qb[1],
        s0 * qa[2] + s1 * qb[2],
        s0 * qa[3] + s1 * qb[3],
    ]
}

/// Four-point cubic over quaternions: neighbours are aligned to a common hemisphere,
/// blended component-wise with the Hermite basis and renormalized.
pub fn cubic_quat(p0: &[f32; 4], p1: &[f32; 4], p2: &[f32; 4], p3: &[f32; 4], t: f32) -> [f32; 4] {
    let q0 = align_quat(p1, p0);
    let q2 = align_quat(p1, p2);
    let q3 = align_quat(&q2, p3);
    normalize_quat(cubic_array(&q0, p1, &q2, &q3, t))
}

/// Hamilton product `a * b` (apply `b` first, then `a`).
#[inline]
pub fn quat_mul(a: &[f32; 4], b: &[f32; 4]) -> [f32; 4] {
    let [ax, ay, az, aw] = *a;
    let [bx, by, bz, bw] = *b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}

#[inline]
pub fn quat_conjugate(q: &[f32; 4]) -> [f32; 4] {
    [-q[0], -q[1], -q[2], q[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx4(a: [f32; 4], b: [f32; 4]) {
        for i in 0..4 {
            assert!((a[i] - b[i]).abs() < 1e-5, "left={a:?} right={b:?}");
        }
    }

    #[test]
    fn lerp_is_exact_at_endpoints() {
        assert_eq!(lerp_f32(0.1, 0.3, 0.0), 0.1);
        assert_eq!(lerp_f32(0.1, 0.3, 1.0), 0.3);
        assert_eq!(lerp_f32(0.0, 1.0, 0.5), 0.5);
    }

    #[test]
    fn hermite_weights_sum_to_one() {
        for i in 0..=10 {
            let w = hermite_weights(i as f32 / 10.0);
            assert!((w.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        }
        assert_eq!(hermite_weights(0.0)[1], 1.0);
    }

    #[test]
    fn cubic_passes_through_inner_points() {
        assert_eq!(cubic_f32(5.0, 1.0, 2.0, 9.0, 0.0), 1.0);
        assert!((cubic_f32(5.0, 1.0, 2.0, 9.0, 1.0) - 2.0).abs() < 1e-6);
        // Collinear points reproduce the line.
        assert!((cubic_f32(0.0, 1.0, 2.0, 3.0, 0.5) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn slerp_half_way_about_z() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let half = std::f32::consts::FRAC_PI_4;
        let b = [0.0, 0.0, half.sin(), half.cos()];
        let quarter = std::f32::consts::FRAC_PI_8;
        approx4(slerp_quat(&a, &b, 0.5), [0.0, 0.0, quarter.sin(), quarter.cos()]);
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = [0.0, 0.0, 0.0, 1.0];
        let b = [0.0, 0.0, 0.0, -1.0];
        approx4(slerp_quat(&a, &b, 0.5), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn product_with_conjugate_is_identity() {
        let s = (0.3f32).sin();
        let q = normalize_quat([s, 0.0, 0.0, (0.3f32).cos()]);
        approx4(quat_mul(&q, &quat_conjugate(&q)), [0.0, 0.0, 0.0, 1.0]);
    }
}
