//! Time-merged multi-channel keyframe streams.
//!
//! All same-kind curves of a clip are flattened into one stream ordered by the
//! time at which each key becomes needed. Entry `k` of a channel carries key
//! `min(k, n - 1)` and becomes required at `key[k - 2].time`, so a cubic window
//! `(prev, left, right, next)` always holds the two keys on each side of the
//! sample time. Sampling walks the stream forward only; a backward seek rewinds
//! to the initial windows.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use hashbrown::HashMap;
use tracing::{debug, trace};

use crate::curve::{AnyCurve, Curve, KeyFrame};
use crate::error::BlendError;
use crate::interp::{numeric_kernel, segment_factor, Interpolate, NumericKernel};
use crate::time::CompressedTime;
use crate::value::{ElementKind, InterpolationMode, Quat};

#[derive(Clone, Copy, Debug)]
struct OptimizedEntry<T> {
    required_time: CompressedTime,
    channel: usize,
    key: KeyFrame<T>,
}

/// Per-channel metadata of an optimized stream.
#[derive(Clone, Debug)]
pub struct OptimizedChannel<T> {
    pub property: String,
    pub mode: InterpolationMode,
    key_count: usize,
    kernel: NumericKernel<T>,
    initial: [KeyFrame<T>; 4],
    last: KeyFrame<T>,
}

impl<T> OptimizedChannel<T> {
    #[inline]
    pub fn key_count(&self) -> usize {
        self.key_count
    }
}

/// Merged stream for one element kind of one clip.
#[derive(Clone, Debug)]
pub struct OptimizedData<T> {
    channels: Vec<OptimizedChannel<T>>,
    index: HashMap<String, usize>,
    pages: Vec<Vec<OptimizedEntry<T>>>,
    page_size: usize,
    len: usize,
}

impl<T: Interpolate> OptimizedData<T> {
    /// Merge `curves` into one stream, paged by `page_size` entries.
    pub fn build<'a>(
        curves: impl IntoIterator<Item = (&'a str, &'a Curve<T>)>,
        page_size: usize,
    ) -> Self {
        let page_size = page_size.max(1);
        let mut channels = Vec::new();
        let mut sources: Vec<&'a [KeyFrame<T>]> = Vec::new();
        let mut index = HashMap::new();
        for (property, curve) in curves {
            let keys = curve.keys();
            let n = keys.len();
            let at = |i: usize| keys[i.min(n - 1)];
            index.insert(property.to_string(), channels.len());
            channels.push(OptimizedChannel {
                property: property.to_string(),
                mode: curve.mode(),
                key_count: n,
                kernel: numeric_kernel::<T>(curve.mode()),
                initial: [at(0), at(0), at(1), at(2)],
                last: keys[n - 1],
            });
            sources.push(keys);
        }

        // Heap items: (required time, channel, entry k).
        let mut heap = BinaryHeap::new();
        for (ch, keys) in sources.iter().enumerate() {
            if keys.len() >= 3 {
                heap.push(Reverse((keys[1].time, ch, 3usize)));
            }
        }

        let mut pages: Vec<Vec<OptimizedEntry<T>>> = Vec::new();
        let mut len = 0usize;
        while let Some(Reverse((required_time, ch, k))) = heap.pop() {
            let keys = sources[ch];
            let n = keys.len();
            if len % page_size == 0 {
                pages.push(Vec::with_capacity(page_size));
            }
            if let Some(page) = pages.last_mut() {
                page.push(OptimizedEntry {
                    required_time,
                    channel: ch,
                    key: keys[k.min(n - 1)],
                });
            }
            len += 1;
            if k < n {
                heap.push(Reverse((keys[k - 1].time, ch, k + 1)));
            }
        }

        debug!(
            kind = %T::KIND,
            channels = channels.len(),
            entries = len,
            pages = pages.len(),
            "optimized stream built"
        );
        Self {
            channels,
            index,
            pages,
            page_size,
            len,
        }
    }

    #[inline]
    pub fn kind(&self) -> ElementKind {
        T::KIND
    }

    #[inline]
    pub fn channels(&self) -> &[OptimizedChannel<T>] {
        &self.channels
    }

    pub fn channel_index(&self, property: &str) -> Option<usize> {
        self.index.get(property).copied()
    }

    /// Total merged entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    fn entry(&self, i: usize) -> &OptimizedEntry<T> {
        &self.pages[i / self.page_size][i % self.page_size]
    }

    /// Rebuild the original key list of channel `slot` from the stream.
    pub fn channel_keys(&self, slot: usize) -> Vec<KeyFrame<T>> {
        let ch = &self.channels[slot];
        let n = ch.key_count;
        let mut keys = Vec::with_capacity(n);
        keys.extend(ch.initial[1..].iter().take(n.min(3)).copied());
        if n > 3 {
            // The final entry of each channel repeats the last key.
            keys.extend(
                (0..self.len)
                    .map(|i| self.entry(i))
                    .filter(|e| e.channel == slot)
                    .take(n - 3)
                    .map(|e| e.key),
            );
        }
        keys
    }
}

/// Sliding windows over one [`OptimizedData`] stream.
#[derive(Clone, Debug, Default)]
pub struct OptimizedEvaluator<T> {
    windows: Vec<[KeyFrame<T>; 4]>,
    position: usize,
    last_time: Option<CompressedTime>,
}

impl<T: Interpolate> OptimizedEvaluator<T> {
    pub fn new(data: &OptimizedData<T>) -> Self {
        let mut eval = Self {
            windows: Vec::with_capacity(data.channels.len()),
            position: 0,
            last_time: None,
        };
        eval.reset(data);
        eval
    }

    /// Rewind every window to its initial state.
    pub fn reset(&mut self, data: &OptimizedData<T>) {
        self.windows.clear();
        self.windows.extend(data.channels.iter().map(|c| c.initial));
        self.position = 0;
        self.last_time = None;
    }

    /// Consume every entry required at or before `time`.
    pub fn advance(&mut self, data: &OptimizedData<T>, time: CompressedTime) {
        if self.last_time.is_some_and(|last| time < last) {
            trace!(kind = %T::KIND, %time, "optimized stream rewind");
            self.reset(data);
        }
        while self.position < data.len {
            let entry = data.entry(self.position);
            if entry.required_time > time {
                break;
            }
            let window = &mut self.windows[entry.channel];
            window.rotate_left(1);
            window[3] = entry.key;
            self.position += 1;
        }
        self.last_time = Some(time);
    }

    /// Sample channel `slot` at `time`; `advance` must have been called with `time`.
    pub fn sample(&self, data: &OptimizedData<T>, slot: usize, time: CompressedTime) -> T {
        let ch = &data.channels[slot];
        if time <= ch.initial[1].time {
            return ch.initial[1].value;
        }
        if time >= ch.last.time {
            return ch.last.value;
        }
        let w = &self.windows[slot];
        let factor = segment_factor(w[1].time, w[2].time, time);
        (ch.kernel)(&w[0].value, &w[1].value, &w[2].value, &w[3].value, factor)
    }
}

macro_rules! any_optimized {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        /// Optimized stream of any numeric kind.
        #[derive(Clone, Debug)]
        pub enum AnyOptimizedData {
            $($variant(OptimizedData<$ty>),)*
        }

        /// Evaluator matching an [`AnyOptimizedData`] variant.
        #[derive(Clone, Debug)]
        pub enum AnyOptimizedEvaluator {
            $($variant(OptimizedEvaluator<$ty>),)*
        }

        impl AnyOptimizedData {
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(AnyOptimizedData::$variant(d) => d.kind(),)*
                }
            }

            pub fn channel_index(&self, property: &str) -> Option<usize> {
                match self {
                    $(AnyOptimizedData::$variant(d) => d.channel_index(property),)*
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(AnyOptimizedData::$variant(d) => d.len(),)*
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            pub fn page_count(&self) -> usize {
                match self {
                    $(AnyOptimizedData::$variant(d) => d.page_count(),)*
                }
            }

            pub fn channel_count(&self) -> usize {
                match self {
                    $(AnyOptimizedData::$variant(d) => d.channels().len(),)*
                }
            }

            /// Rebuild the direct curve of channel `slot`.
            pub fn restore_curve(&self, slot: usize) -> Result<AnyCurve, BlendError> {
                match self {
                    $(AnyOptimizedData::$variant(d) => {
                        let mode = d.channels()[slot].mode;
                        Ok(AnyCurve::$variant(Curve::new(mode, d.channel_keys(slot))?))
                    })*
                }
            }

            pub(crate) fn evaluator(&self) -> AnyOptimizedEvaluator {
                match self {
                    $(AnyOptimizedData::$variant(d) => {
                        AnyOptimizedEvaluator::$variant(OptimizedEvaluator::new(d))
                    })*
                }
            }
        }

        $(
            impl From<OptimizedData<$ty>> for AnyOptimizedData {
                fn from(data: OptimizedData<$ty>) -> Self {
                    AnyOptimizedData::$variant(data)
                }
            }
        )*

        impl AnyOptimizedEvaluator {
            pub fn kind(&self) -> ElementKind {
                match self {
                    $(AnyOptimizedEvaluator::$variant(_) => {
                        <$ty as crate::value::CurveElement>::KIND
                    })*
                }
            }

            /// Rewind against `data`; false when the kinds differ.
            pub(crate) fn reset(&mut self, data: &AnyOptimizedData) -> bool {
                match (self, data) {
                    $((AnyOptimizedEvaluator::$variant(e), AnyOptimizedData::$variant(d)) => {
                        e.reset(d);
                        true
                    })*
                    #[allow(unreachable_patterns)]
                    _ => false,
                }
            }

            pub(crate) fn advance(&mut self, data: &AnyOptimizedData, time: CompressedTime) {
                match (self, data) {
                    $((AnyOptimizedEvaluator::$variant(e), AnyOptimizedData::$variant(d)) => {
                        e.advance(d, time)
                    })*
                    #[allow(unreachable_patterns)]
                    _ => {}
                }
            }
        }
    };
}

any_optimized! {
    Scalar => f32,
    Vec2 => [f32; 2],
    Vec3 => [f32; 3],
    Vec4 => [f32; 4],
    Rotation => Quat,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveCursor;

    fn curve(keys: &[(i64, f32)], mode: InterpolationMode) -> Curve<f32> {
        Curve::from_keys(mode, keys.iter().copied()).unwrap()
    }

    #[test]
    fn stream_is_time_ordered_and_counts_entries() {
        let a = curve(&[(0, 0.0), (10, 1.0), (20, 2.0), (30, 3.0)], InterpolationMode::Linear);
        let b = curve(&[(0, 5.0), (5, 6.0), (40, 7.0)], InterpolationMode::Cubic);
        let c = curve(&[(0, 1.0)], InterpolationMode::Constant);
        let data = OptimizedData::build([("a", &a), ("b", &b), ("c", &c)], 2);
        // n - 2 entries for channels with at least three keys.
        assert_eq!(data.len(), 2 + 1);
        assert_eq!(data.page_count(), 2);
        let times: Vec<_> = (0..data.len()).map(|i| data.entry(i).required_time).collect();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn channel_keys_reconstruct_every_curve() {
        let a = curve(
            &[(0, 0.0), (10, 1.0), (20, 2.0), (30, 3.0), (45, 9.0)],
            InterpolationMode::Linear,
        );
        let b = curve(&[(3, 5.0), (7, 6.0)], InterpolationMode::Cubic);
        let data = OptimizedData::build([("a", &a), ("b", &b)], 3);
        assert_eq!(data.channel_keys(0), a.keys());
        assert_eq!(data.channel_keys(1), b.keys());
    }

    #[test]
    fn samples_match_direct_curve_with_rewind() {
        let a = curve(
            &[(0, 0.0), (10, 1.0), (10, 4.0), (30, 3.0), (45, 9.0), (50, -1.0)],
            InterpolationMode::Cubic,
        );
        let data = OptimizedData::build([("a", &a)], 4);
        let mut eval = OptimizedEvaluator::new(&data);
        let mut cursor = CurveCursor::default();
        for t in [0, 3, 10, 12, 31, 49, 55, 7, 20, 44] {
            let time = CompressedTime(t);
            eval.advance(&data, time);
            assert_eq!(
                eval.sample(&data, 0, time).to_bits(),
                a.evaluate(&mut cursor, time).to_bits(),
                "t={t}"
            );
        }
    }
}
