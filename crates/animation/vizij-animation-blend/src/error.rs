//! Error types for sampling and blending

use crate::value::ElementKind;

/// Errors raised by clip construction, blend programs and the clip loader.
///
/// Missing channels are never errors: they surface as a zero existence flag.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum BlendError {
    /// Blend programs must start by pushing a sampled clip
    #[error("first blend instruction must be a push")]
    FirstInstructionNotPush,

    /// Pop or blend with too few results on the stack
    #[error("blend stack underflow at instruction {instruction}")]
    StackUnderflow { instruction: usize },

    /// Program ended with anything other than one result on the stack
    #[error("blend program left {depth} results on the stack (expected 1)")]
    FinalStackDepth { depth: usize },

    /// The surviving result is not the destination supplied by the caller
    #[error("final blend result is not the supplied destination")]
    DestinationMismatch,

    /// Clip mutated after an evaluator was created against it
    #[error("clip '{clip}' is frozen")]
    ClipFrozen { clip: String },

    /// Same property registered with two different element kinds or sizes
    #[error("property '{property}' is {expected} but was given {found}")]
    KindMismatch {
        property: String,
        expected: ElementKind,
        found: ElementKind,
    },

    /// Arithmetic blend requested on a non-numeric channel
    #[error("{operation} blend is not supported for {kind} channels")]
    UnsupportedBlend {
        kind: ElementKind,
        operation: &'static str,
    },

    /// Instruction references an evaluator index outside the supplied slice
    #[error("instruction references unknown evaluator {index}")]
    UnknownEvaluator { index: usize },

    /// Evaluator used before `initialize` or after `cleanup`
    #[error("evaluator is not initialized")]
    EvaluatorNotInitialized,

    #[error("invalid curve: {reason}")]
    InvalidCurve { reason: String },

    #[error("unknown property '{property}'")]
    UnknownProperty { property: String },

    /// Stored clip document could not be read
    #[error("clip parse error: {reason}")]
    ClipParse { reason: String },

    /// Blender configuration document could not be read
    #[error("config error: {reason}")]
    Config { reason: String },
}

impl BlendError {
    /// Short category string for logging.
    #[inline]
    pub fn category(&self) -> &'static str {
        match self {
            Self::FirstInstructionNotPush
            | Self::StackUnderflow { .. }
            | Self::FinalStackDepth { .. }
            | Self::DestinationMismatch
            | Self::ClipFrozen { .. }
            | Self::KindMismatch { .. }
            | Self::UnknownEvaluator { .. }
            | Self::EvaluatorNotInitialized => "precondition",
            Self::UnsupportedBlend { .. } => "unsupported",
            Self::InvalidCurve { .. }
            | Self::UnknownProperty { .. }
            | Self::ClipParse { .. }
            | Self::Config { .. } => "data",
        }
    }

    /// Caller or instruction-generation bugs; the frame must be aborted.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self.category(), "precondition" | "unsupported")
    }
}

impl From<serde_json::Error> for BlendError {
    fn from(err: serde_json::Error) -> Self {
        Self::ClipParse {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(BlendError::FirstInstructionNotPush.category(), "precondition");
        let unsupported = BlendError::UnsupportedBlend {
            kind: ElementKind::Blob,
            operation: "add",
        };
        assert_eq!(unsupported.category(), "unsupported");
        assert_eq!(
            unsupported.to_string(),
            "add blend is not supported for Blob channels"
        );
        let data = BlendError::InvalidCurve {
            reason: "empty".into(),
        };
        assert_eq!(data.category(), "data");
    }

    #[test]
    fn test_error_fatality() {
        assert!(BlendError::DestinationMismatch.is_fatal());
        assert!(BlendError::FinalStackDepth { depth: 2 }.is_fatal());
        assert!(!BlendError::ClipParse {
            reason: "eof".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(BlendError::from(err), BlendError::ClipParse { .. }));
    }
}
