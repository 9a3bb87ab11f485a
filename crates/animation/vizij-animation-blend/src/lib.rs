//! Vizij Animation Blend (engine-agnostic)
//!
//! Samples time-keyed clips into flat, typed snapshots and combines several
//! snapshots through a small push/pop/blend stack program. The final snapshot is
//! written back onto a host object graph through a compiled write plan.
//!
//! Frame flow:
//! - [`AnimationBlender::register_clip`] grows the shared [`ChannelLayout`] and
//!   hands out a pooled [`ClipEvaluator`] bound to it.
//! - [`AnimationBlender::compute`] runs a list of [`BlendInstruction`]s and leaves
//!   one [`BlendResult`].
//! - [`ResultWriter::apply`] copies that result onto the target through a
//!   [`WritePlanResolver`].

pub mod blend;
pub mod buffer;
pub mod clip;
pub mod config;
pub mod curve;
pub mod error;
pub mod evaluator;
pub mod interp;
pub mod layout;
pub mod optimized;
pub mod pool;
pub mod result;
pub mod stored_clip;
pub mod time;
pub mod value;
pub mod writeback;

// Re-exports for consumers (adapters)
pub use blend::{AnimationBlender, BlendInstruction, BlendOperation};
pub use buffer::ValueBuffer;
pub use clip::{Clip, ClipChannel};
pub use config::BlendConfig;
pub use curve::{AnyCurve, Curve, CurveCursor, KeyFrame};
pub use error::BlendError;
pub use evaluator::{ClipEvaluator, EvaluatorState};
pub use interp::Interpolate;
pub use layout::{Channel, ChannelLayout, ChannelList};
pub use optimized::{AnyOptimizedData, OptimizedData};
pub use pool::{BlendPools, PoolStats};
pub use result::{BlendResult, ObjectSlot};
pub use stored_clip::parse_clip_json;
pub use time::{ClipTime, CompressedTime, RepeatMode, TICKS_PER_SECOND};
pub use value::{Blob, ElementKind, InterpolationMode, ObjectRef, Quat, SampledValue};
pub use writeback::{CompiledWritePlan, ResultWriter, SetterRegistry, WritePlanResolver};

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, BlendError>;
