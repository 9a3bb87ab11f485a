//! Fixed-point clip time and repeat-mode mapping.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// Number of ticks in one second (100 µs resolution).
pub const TICKS_PER_SECOND: i64 = 10_000;

/// Integer tick count used for every key time and sample time.
///
/// Comparisons and cursor advancement are exact; floating seconds only appear at
/// the edges (`from_seconds` / `as_seconds`).
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CompressedTime(pub i64);

impl CompressedTime {
    pub const ZERO: CompressedTime = CompressedTime(0);

    #[inline]
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Convert seconds to ticks, rounding to the nearest tick.
    #[inline]
    pub fn from_seconds(seconds: f64) -> Self {
        Self((seconds * TICKS_PER_SECOND as f64).round() as i64)
    }

    #[inline]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    #[inline]
    pub fn as_seconds(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }
}

impl Add for CompressedTime {
    type Output = CompressedTime;
    #[inline]
    fn add(self, rhs: Self) -> Self::Output {
        CompressedTime(self.0 + rhs.0)
    }
}

impl Sub for CompressedTime {
    type Output = CompressedTime;
    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        CompressedTime(self.0 - rhs.0)
    }
}

impl fmt::Display for CompressedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

/// How a clip maps elapsed playback time onto its own time range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepeatMode {
    /// Play to the end, clamp, and report completion.
    Once,
    /// Wrap around the duration forever.
    #[default]
    Loop,
    /// Play to the end and keep holding the last pose without completing.
    OnceThenHold,
}

/// Clip-local time produced by [`map_clip_time`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ClipTime {
    pub time: CompressedTime,
    /// True once a [`RepeatMode::Once`] clip has reached its end.
    pub finished: bool,
}

/// Map elapsed playback time into `[0, duration]` under `mode`.
pub fn map_clip_time(
    elapsed: CompressedTime,
    duration: CompressedTime,
    mode: RepeatMode,
) -> ClipTime {
    if duration.0 <= 0 {
        return ClipTime {
            time: CompressedTime::ZERO,
            finished: matches!(mode, RepeatMode::Once),
        };
    }
    match mode {
        RepeatMode::Loop => ClipTime {
            time: CompressedTime(elapsed.0.rem_euclid(duration.0)),
            finished: false,
        },
        RepeatMode::Once => ClipTime {
            time: CompressedTime(elapsed.0.clamp(0, duration.0)),
            finished: elapsed >= duration,
        },
        RepeatMode::OnceThenHold => ClipTime {
            time: CompressedTime(elapsed.0.clamp(0, duration.0)),
            finished: false,
        },
    }
}
