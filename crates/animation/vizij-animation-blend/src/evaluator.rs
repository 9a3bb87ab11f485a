//! Per-clip evaluator: samples one clip into a snapshot at a given time.
//!
//! Lifecycle: `Uninitialized -> Initialized -> (Computing) -> Initialized`, and
//! back to `Uninitialized` through [`ClipEvaluator::cleanup`] when it returns to
//! the pool. Bindings are built once per channel list so each frame is a flat
//! walk over channels with no lookups by name.

use std::sync::Arc;

use crate::buffer::StoreMode;
use crate::clip::Clip;
use crate::curve::{AnyCurve, CurveCursor};
use crate::error::BlendError;
use crate::layout::{storage_extent, Channel, ChannelList};
use crate::optimized::{AnyOptimizedData, AnyOptimizedEvaluator};
use crate::result::BlendResult;
use crate::time::CompressedTime;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorState {
    Uninitialized,
    Initialized,
    Computing,
}

#[derive(Clone, Debug)]
enum Binding {
    Direct { curve: usize, cursor: CurveCursor },
    Optimized { stream: usize, slot: usize },
    /// The clip does not drive this channel.
    Missing,
}

#[derive(Debug)]
pub struct ClipEvaluator {
    clip: Arc<Clip>,
    channels: Option<ChannelList>,
    layout_version: u64,
    bindings: Vec<Binding>,
    // Storage the bound channel list needs: (buffer bytes, object slots).
    extent: (usize, usize),
    // One per optimized stream of the clip; kept across cleanup.
    streams: Vec<AnyOptimizedEvaluator>,
    state: EvaluatorState,
}

impl ClipEvaluator {
    pub fn new(clip: Arc<Clip>) -> Self {
        Self {
            clip,
            channels: None,
            layout_version: 0,
            bindings: Vec::new(),
            extent: (0, 0),
            streams: Vec::new(),
            state: EvaluatorState::Uninitialized,
        }
    }

    #[inline]
    pub fn clip(&self) -> &Arc<Clip> {
        &self.clip
    }

    #[inline]
    pub fn state(&self) -> EvaluatorState {
        self.state
    }

    /// Layout version of the channel list this evaluator was bound against.
    #[inline]
    pub fn layout_version(&self) -> u64 {
        self.layout_version
    }

    /// Number of channels bound; later channels are written as absent.
    #[inline]
    pub fn bound_channels(&self) -> usize {
        self.bindings.len()
    }

    /// Bind every channel of `channels` to a curve, an optimized stream slot, or nothing.
    pub fn initialize(
        &mut self,
        channels: &ChannelList,
        layout_version: u64,
    ) -> Result<(), BlendError> {
        let clip = &self.clip;
        self.bindings.clear();
        for channel in channels.iter() {
            let binding = match clip.channel(&channel.property) {
                None => Binding::Missing,
                Some(cc) if cc.kind != channel.kind => {
                    self.bindings.clear();
                    return Err(BlendError::KindMismatch {
                        property: channel.property.clone(),
                        expected: channel.kind,
                        found: cc.kind,
                    });
                }
                Some(cc) => match cc.curve_index {
                    Some(curve) => Binding::Direct {
                        curve,
                        cursor: CurveCursor::default(),
                    },
                    None => clip
                        .optimized()
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.kind() == cc.kind)
                        .find_map(|(stream, s)| {
                            s.channel_index(&channel.property)
                                .map(|slot| Binding::Optimized { stream, slot })
                        })
                        .unwrap_or(Binding::Missing),
                },
            };
            self.bindings.push(binding);
        }

        let optimized = clip.optimized();
        self.streams.truncate(optimized.len());
        for (i, data) in optimized.iter().enumerate() {
            match self.streams.get_mut(i) {
                Some(eval) => {
                    if !eval.reset(data) {
                        *eval = data.evaluator();
                    }
                }
                None => self.streams.push(data.evaluator()),
            }
        }

        self.extent = storage_extent(channels);
        self.channels = Some(channels.clone());
        self.layout_version = layout_version;
        self.state = EvaluatorState::Initialized;
        Ok(())
    }

    /// Sample every bound channel at `time`, overwriting `result`.
    ///
    /// `result` is grown to fit the bound channels if it is smaller.
    pub fn compute(
        &mut self,
        time: CompressedTime,
        result: &mut BlendResult,
    ) -> Result<(), BlendError> {
        self.run(time, result, StoreMode::Overwrite)
    }

    /// Accumulate sampled numeric values into `result`: a value already present is
    /// combined with the sample (vector add, quaternion product), otherwise the
    /// sample is stored. Blob and object channels, and channels the clip does not
    /// drive, are left untouched.
    pub fn add_curve_values(
        &mut self,
        time: CompressedTime,
        result: &mut BlendResult,
    ) -> Result<(), BlendError> {
        self.run(time, result, StoreMode::Accumulate)
    }

    /// Drop bindings and return to `Uninitialized`. Stream evaluators are kept.
    pub fn cleanup(&mut self) {
        self.bindings.clear();
        self.extent = (0, 0);
        self.channels = None;
        self.layout_version = 0;
        self.state = EvaluatorState::Uninitialized;
    }

    fn run(
        &mut self,
        time: CompressedTime,
        result: &mut BlendResult,
        mode: StoreMode,
    ) -> Result<(), BlendError> {
        let Some(channels) = self.channels.as_ref() else {
            return Err(BlendError::EvaluatorNotInitialized);
        };
        if self.state == EvaluatorState::Uninitialized {
            return Err(BlendError::EvaluatorNotInitialized);
        }
        self.state = EvaluatorState::Computing;

        let (bytes, slots) = self.extent;
        result.ensure_storage(bytes, slots);
        result.attach_channels(channels);

        let clip = &self.clip;
        let optimized = clip.optimized();
        for (eval, data) in self.streams.iter_mut().zip(optimized) {
            eval.advance(data, time);
        }

        for (binding, channel) in self.bindings.iter_mut().zip(channels.iter()) {
            match binding {
                Binding::Missing => {
                    if mode == StoreMode::Overwrite {
                        result.set_flag(channel, 0.0);
                    }
                }
                Binding::Direct { curve, cursor } => {
                    if let Some(curve) = clip.curve_at(*curve) {
                        write_direct(curve, cursor, channel, time, result, mode);
                    } else if mode == StoreMode::Overwrite {
                        result.set_flag(channel, 0.0);
                    }
                }
                Binding::Optimized { stream, slot } => {
                    write_optimized(
                        &self.streams[*stream],
                        &optimized[*stream],
                        *slot,
                        channel,
                        time,
                        result,
                        mode,
                    );
                }
            }
        }

        // Channels registered after this evaluator was initialized.
        if mode == StoreMode::Overwrite {
            if let Some(current) = result.channels().cloned() {
                for channel in current.iter().skip(self.bindings.len()) {
                    result.set_flag(channel, 0.0);
                }
            }
        }

        self.state = EvaluatorState::Initialized;
        Ok(())
    }
}

fn write_direct(
    curve: &AnyCurve,
    cursor: &mut CurveCursor,
    channel: &Channel,
    time: CompressedTime,
    result: &mut BlendResult,
    mode: StoreMode,
) {
    let offset = channel.offset;
    match curve {
        AnyCurve::Scalar(c) => result
            .buffer_mut()
            .store_numeric(offset, c.evaluate(cursor, time), mode),
        AnyCurve::Vec2(c) => result
            .buffer_mut()
            .store_numeric(offset, c.evaluate(cursor, time), mode),
        AnyCurve::Vec3(c) => result
            .buffer_mut()
            .store_numeric(offset, c.evaluate(cursor, time), mode),
        AnyCurve::Vec4(c) => result
            .buffer_mut()
            .store_numeric(offset, c.evaluate(cursor, time), mode),
        AnyCurve::Rotation(c) => result
            .buffer_mut()
            .store_numeric(offset, c.evaluate(cursor, time), mode),
        AnyCurve::Blob(c) => {
            if mode == StoreMode::Overwrite {
                let value = c.evaluate_ref(cursor, time);
                let buffer = result.buffer_mut();
                buffer.write_bytes(channel.value_offset(), value.as_bytes());
                buffer.set_flag(offset, 1.0);
            }
        }
        AnyCurve::Object(c) => {
            if mode == StoreMode::Overwrite {
                if let Some(slot) = result.objects_mut().get_mut(offset) {
                    slot.value = Some(c.evaluate_ref(cursor, time).into_owned());
                    slot.flag = 1.0;
                }
            }
        }
    }
}

fn write_optimized(
    eval: &AnyOptimizedEvaluator,
    data: &AnyOptimizedData,
    slot: usize,
    channel: &Channel,
    time: CompressedTime,
    result: &mut BlendResult,
    mode: StoreMode,
) {
    let buffer = result.buffer_mut();
    let offset = channel.offset;
    match (eval, data) {
        (AnyOptimizedEvaluator::Scalar(e), AnyOptimizedData::Scalar(d)) => {
            buffer.store_numeric(offset, e.sample(d, slot, time), mode)
        }
        (AnyOptimizedEvaluator::Vec2(e), AnyOptimizedData::Vec2(d)) => {
            buffer.store_numeric(offset, e.sample(d, slot, time), mode)
        }
        (AnyOptimizedEvaluator::Vec3(e), AnyOptimizedData::Vec3(d)) => {
            buffer.store_numeric(offset, e.sample(d, slot, time), mode)
        }
        (AnyOptimizedEvaluator::Vec4(e), AnyOptimizedData::Vec4(d)) => {
            buffer.store_numeric(offset, e.sample(d, slot, time), mode)
        }
        (AnyOptimizedEvaluator::Rotation(e), AnyOptimizedData::Rotation(d)) => {
            buffer.store_numeric(offset, e.sample(d, slot, time), mode)
        }
        _ => {
            if mode == StoreMode::Overwrite {
                buffer.set_flag(offset, 0.0);
            }
        }
    }
}
