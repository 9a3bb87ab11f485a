//! Pool sizing and stream layout configuration.

use serde::{Deserialize, Serialize};

use crate::error::BlendError;

/// Sizing knobs for a blender and its pools. Missing JSON fields take defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    /// Results allocated up front when a blender is constructed.
    pub initial_result_pool: usize,
    /// Entries per page of a merged optimized stream.
    pub optimized_page_size: usize,
    /// Free-list cap for results; surplus releases are dropped.
    pub max_pooled_results: usize,
    pub max_pooled_evaluators_per_clip: usize,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            initial_result_pool: 4,
            optimized_page_size: 4096,
            max_pooled_results: 64,
            max_pooled_evaluators_per_clip: 16,
        }
    }
}

impl BlendConfig {
    /// Parse a JSON object; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, BlendError> {
        let value: serde_json::Value = serde_json::from_str(json).map_err(config_error)?;
        if !value.is_object() {
            return Err(BlendError::Config {
                reason: "expected a JSON object".into(),
            });
        }
        serde_json::from_value(value).map_err(config_error)
    }
}

fn config_error(err: serde_json::Error) -> BlendError {
    BlendError::Config {
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = BlendConfig::from_json(r#"{ "optimizedPageSize": 1, "max_pooled_results": 2 }"#)
            .unwrap();
        // Field names are snake_case; unknown keys are ignored.
        assert_eq!(cfg.optimized_page_size, 4096);
        assert_eq!(cfg.max_pooled_results, 2);
        assert_eq!(cfg.initial_result_pool, 4);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = BlendConfig::from_json("{").unwrap_err();
        assert!(matches!(err, BlendError::Config { .. }));
        assert_eq!(err.category(), "data");
        assert!(err.to_string().starts_with("config error"));
    }

    #[test]
    fn non_object_documents_are_rejected() {
        for json in ["[1,2]", "3", "null"] {
            assert!(
                matches!(BlendConfig::from_json(json), Err(BlendError::Config { .. })),
                "{json}"
            );
        }
    }

    #[test]
    fn field_type_errors_are_config_errors() {
        let err = BlendConfig::from_json(r#"{ "initial_result_pool": "many" }"#).unwrap_err();
        assert!(
            matches!(err, BlendError::Config { ref reason } if reason.contains("invalid type"))
        );
    }
}
