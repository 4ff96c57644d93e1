//! Hydrated-object validation.
//!
//! The hydrated case object's schema (court, parties, causes of action,
//! damages, timeline, counsel) is owned by the external consolidator and
//! renderer, not this engine, which retains it as an opaque document. This
//! module only enforces the one thing the engine is responsible for: the
//! document is syntactically valid JSON shaped like an object, not an
//! arbitrary scalar or array. Anything deeper is the collaborator's job.

use crate::core::error::EngineError;
use serde_json::Value;

/// Validates that `raw` parses as JSON and is a top-level object. Returns
/// the parsed value so the caller doesn't re-parse it.
pub fn validate_hydrated_object(raw: &[u8]) -> Result<Value, EngineError> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| EngineError::Validation(format!("invalid JSON: {e}")))?;
    if !value.is_object() {
        return Err(EngineError::Validation(
            "hydrated object must be a JSON object".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_object_passes() {
        let value = validate_hydrated_object(br#"{"court": {}}"#).unwrap();
        assert!(value.is_object());
    }

    #[test]
    fn scalar_top_level_is_rejected() {
        let err = validate_hydrated_object(b"42").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn invalid_json_is_rejected() {
        let err = validate_hydrated_object(b"{not json").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }
}
