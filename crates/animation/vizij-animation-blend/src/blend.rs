//! Blend stack machine.
//!
//! A frame is a linear program of push/pop/blend instructions:
//! - `Push` samples an evaluator into a fresh (pooled) snapshot and pushes it.
//! - `Pop` pops the top snapshot, accumulates an evaluator's values into it and
//!   releases it.
//! - `Blend` pops `right` then `left`, blends `right` into `left` channel by
//!   channel, releases `right` and pushes `left` back.
//!
//! Exactly one snapshot must remain at the end. Per channel, the existence flags
//! decide the outcome before any arithmetic happens:
//!
//! | left | right | result                       |
//! |------|-------|------------------------------|
//! | 0    | 0     | flag 0, value untouched      |
//! | >0   | 0     | left value, flag 1           |
//! | 0    | >0    | right value copied, flag 1   |
//! | >0   | >0    | operation applied, flag 1    |

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::clip::Clip;
use crate::config::BlendConfig;
use crate::error::BlendError;
use crate::evaluator::ClipEvaluator;
use crate::interp::Interpolate;
use crate::layout::{storage_extent, Channel, ChannelLayout};
use crate::pool::BlendPools;
use crate::result::BlendResult;
use crate::time::CompressedTime;
use crate::value::{ElementKind, Quat};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BlendOperation {
    /// Lerp/slerp from left (factor 0) to right (factor 1).
    #[default]
    Linear,
    /// Lerp from left towards `left ⊕ right`.
    Add,
    /// Lerp from left towards `left ⊕ right⁻¹`.
    Subtract,
}

impl BlendOperation {
    pub fn name(self) -> &'static str {
        match self {
            BlendOperation::Linear => "linear",
            BlendOperation::Add => "add",
            BlendOperation::Subtract => "subtract",
        }
    }
}

/// One step of a blend program. Evaluators are referenced by index into the
/// slice passed to [`AnimationBlender::compute`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BlendInstruction {
    Push {
        evaluator: usize,
        time: CompressedTime,
    },
    Pop {
        evaluator: usize,
        time: CompressedTime,
    },
    Blend {
        operation: BlendOperation,
        factor: f32,
    },
}

impl BlendInstruction {
    pub fn push(evaluator: usize, time: CompressedTime) -> Self {
        Self::Push { evaluator, time }
    }

    pub fn pop(evaluator: usize, time: CompressedTime) -> Self {
        Self::Pop { evaluator, time }
    }

    pub fn blend(operation: BlendOperation, factor: f32) -> Self {
        Self::Blend { operation, factor }
    }
}

#[derive(Debug)]
struct StackEntry {
    result: BlendResult,
    /// This is the caller-supplied destination.
    destination: bool,
}

/// Per-object-graph blending façade: owns the channel layout and evaluation
/// stack, and shares pools with other blenders.
#[derive(Debug)]
pub struct AnimationBlender {
    layout: ChannelLayout,
    pools: Arc<BlendPools>,
    stack: Vec<StackEntry>,
}

impl Default for AnimationBlender {
    fn default() -> Self {
        Self::new(BlendConfig::default())
    }
}

impl AnimationBlender {
    pub fn new(config: BlendConfig) -> Self {
        Self::with_pools(Arc::new(BlendPools::new(config)))
    }

    pub fn with_pools(pools: Arc<BlendPools>) -> Self {
        Self {
            layout: ChannelLayout::new(),
            pools,
            stack: Vec::new(),
        }
    }

    #[inline]
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    #[inline]
    pub fn pools(&self) -> &Arc<BlendPools> {
        &self.pools
    }

    /// Register `clip`'s properties, freeze it, and hand out an initialized evaluator.
    pub fn register_clip(&mut self, clip: &Arc<Clip>) -> Result<ClipEvaluator, BlendError> {
        self.layout.register_clip(clip)?;
        clip.freeze();
        let mut evaluator = self.pools.acquire_evaluator(clip);
        if let Err(err) = evaluator.initialize(self.layout.channels(), self.layout.version()) {
            self.pools.release_evaluator(evaluator);
            return Err(err);
        }
        Ok(evaluator)
    }

    /// Rebind an evaluator to the current layout so it drives newly registered channels.
    pub fn refresh_evaluator(&self, evaluator: &mut ClipEvaluator) -> Result<(), BlendError> {
        if evaluator.layout_version() == self.layout.version() {
            return Ok(());
        }
        evaluator.initialize(self.layout.channels(), self.layout.version())
    }

    pub fn release_evaluator(&self, evaluator: ClipEvaluator) {
        self.pools.release_evaluator(evaluator);
    }

    /// Drop pooled evaluators of `clip` so the pools stop holding it.
    ///
    /// Its channels stay in the layout; offsets never move.
    pub fn unload_clip(&self, clip: &Arc<Clip>) -> usize {
        self.pools.purge_clip(clip)
    }

    /// Pooled snapshot sized for the current layout.
    pub fn acquire_result(&self) -> BlendResult {
        let mut result = self.pools.acquire_result();
        result.ensure_layout(&self.layout);
        result
    }

    pub fn free_intermediate_result(&self, result: BlendResult) {
        self.pools.release_result(result);
    }

    /// Run `instructions` and leave the final snapshot in `result`.
    ///
    /// When `result` holds a snapshot on entry it is used by the first push and
    /// must be the survivor. On error, the supplied snapshot is handed back in
    /// `result` and every intermediate snapshot returns to the pool.
    pub fn compute(
        &mut self,
        evaluators: &mut [ClipEvaluator],
        instructions: &[BlendInstruction],
        result: &mut Option<BlendResult>,
    ) -> Result<(), BlendError> {
        let supplied = result.is_some();
        let mut destination = result.take();
        self.stack.clear();

        if let Err(err) = self.execute(evaluators, instructions, &mut destination) {
            self.unwind(&mut destination);
            *result = destination;
            return Err(err);
        }

        if self.stack.len() != 1 {
            let depth = self.stack.len();
            self.unwind(&mut destination);
            *result = destination;
            return Err(BlendError::FinalStackDepth { depth });
        }
        let Some(last) = self.stack.pop() else {
            return Err(BlendError::FinalStackDepth { depth: 0 });
        };
        if supplied && !last.destination {
            self.pools.release_result(last.result);
            *result = destination;
            return Err(BlendError::DestinationMismatch);
        }
        *result = Some(last.result);
        Ok(())
    }

    fn execute(
        &mut self,
        evaluators: &mut [ClipEvaluator],
        instructions: &[BlendInstruction],
        destination: &mut Option<BlendResult>,
    ) -> Result<(), BlendError> {
        if !matches!(instructions.first(), Some(BlendInstruction::Push { .. })) {
            return Err(BlendError::FirstInstructionNotPush);
        }

        for (index, instruction) in instructions.iter().enumerate() {
            match *instruction {
                BlendInstruction::Push { evaluator, time } => {
                    let evaluator = evaluators
                        .get_mut(evaluator)
                        .ok_or(BlendError::UnknownEvaluator { index: evaluator })?;
                    // Only the first push may take the caller's snapshot.
                    let supplied = if index == 0 { destination.take() } else { None };
                    let (mut result, is_destination) = match supplied {
                        Some(result) => (result, true),
                        None => (self.pools.acquire_result(), false),
                    };
                    result.ensure_layout(&self.layout);
                    self.stack.push(StackEntry {
                        result,
                        destination: is_destination,
                    });
                    if let Some(top) = self.stack.last_mut() {
                        evaluator.compute(time, &mut top.result)?;
                    }
                }
                BlendInstruction::Pop { evaluator, time } => {
                    let evaluator = evaluators
                        .get_mut(evaluator)
                        .ok_or(BlendError::UnknownEvaluator { index: evaluator })?;
                    let mut entry = self
                        .stack
                        .pop()
                        .ok_or(BlendError::StackUnderflow { instruction: index })?;
                    let outcome = evaluator.add_curve_values(time, &mut entry.result);
                    self.release_entry(entry, destination);
                    outcome?;
                }
                BlendInstruction::Blend { operation, factor } => {
                    if self.stack.len() < 2 {
                        return Err(BlendError::StackUnderflow { instruction: index });
                    }
                    let Some(right) = self.stack.pop() else {
                        return Err(BlendError::StackUnderflow { instruction: index });
                    };
                    let outcome = match self.stack.last_mut() {
                        Some(left) => {
                            blend_results(&mut left.result, &right.result, operation, factor)
                        }
                        None => Err(BlendError::StackUnderflow { instruction: index }),
                    };
                    self.release_entry(right, destination);
                    outcome?;
                }
            }
        }
        Ok(())
    }

    /// Pool an entry that left the stack, or set the destination aside for the caller.
    fn release_entry(&self, entry: StackEntry, destination: &mut Option<BlendResult>) {
        if entry.destination {
            *destination = Some(entry.result);
        } else {
            self.pools.release_result(entry.result);
        }
    }

    fn unwind(&mut self, destination: &mut Option<BlendResult>) {
        trace!(depth = self.stack.len(), "blend stack unwind");
        for entry in self.stack.drain(..) {
            if entry.destination {
                *destination = Some(entry.result);
            } else {
                self.pools.release_result(entry.result);
            }
        }
    }
}

/// Blend `right` into `left` for every channel of `left`'s channel list.
pub fn blend_results(
    left: &mut BlendResult,
    right: &BlendResult,
    operation: BlendOperation,
    factor: f32,
) -> Result<(), BlendError> {
    let Some(channels) = left.channels().cloned() else {
        return Ok(());
    };
    let (bytes, slots) = storage_extent(&channels);
    left.ensure_storage(bytes, slots);
    for channel in channels.iter() {
        let left_present = left.flag(channel) > 0.0;
        let right_present = right.flag(channel) > 0.0;
        match (left_present, right_present) {
            (false, false) => left.set_flag(channel, 0.0),
            (true, false) => left.set_flag(channel, 1.0),
            (false, true) => {
                left.copy_channel_from(right, channel);
                left.set_flag(channel, 1.0);
            }
            (true, true) => blend_channel(left, right, channel, operation, factor)?,
        }
    }
    Ok(())
}

fn blend_channel(
    left: &mut BlendResult,
    right: &BlendResult,
    channel: &Channel,
    operation: BlendOperation,
    factor: f32,
) -> Result<(), BlendError> {
    match channel.kind {
        ElementKind::Scalar => blend_numeric::<f32>(left, right, channel, operation, factor),
        ElementKind::Vec2 => blend_numeric::<[f32; 2]>(left, right, channel, operation, factor),
        ElementKind::Vec3 => blend_numeric::<[f32; 3]>(left, right, channel, operation, factor),
        ElementKind::Vec4 => blend_numeric::<[f32; 4]>(left, right, channel, operation, factor),
        ElementKind::Rotation => blend_numeric::<Quat>(left, right, channel, operation, factor),
        ElementKind::Blob | ElementKind::ObjectRef => {
            if operation != BlendOperation::Linear {
                return Err(BlendError::UnsupportedBlend {
                    kind: channel.kind,
                    operation: operation.name(),
                });
            }
            if factor >= 0.5 {
                left.copy_channel_from(right, channel);
            }
            left.set_flag(channel, 1.0);
        }
    }
    Ok(())
}

fn blend_numeric<T: Interpolate>(
    left: &mut BlendResult,
    right: &BlendResult,
    channel: &Channel,
    operation: BlendOperation,
    factor: f32,
) {
    let at = channel.value_offset();
    let a: T = left.buffer().read_at(at);
    let b: T = right.buffer().read_at(at);
    let blended = match operation {
        BlendOperation::Linear => T::linear(&a, &b, factor),
        BlendOperation::Add => T::linear(&a, &T::combine(&a, &b), factor),
        BlendOperation::Subtract => T::linear(&a, &T::combine_inverse(&a, &b), factor),
    };
    let buffer = left.buffer_mut();
    buffer.write_at(at, &blended);
    buffer.set_flag(channel.offset, 1.0);
}
