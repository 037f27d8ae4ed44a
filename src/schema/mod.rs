//! Schema validation capability.
//!
//! The scheduler treats validation as opaque: a [`SchemaCompiler`] turns a
//! JSON schema into a [`SchemaValidator`], and the validator reports a
//! [`ValidationOutcome`]. Validators must be safe to run on data that another
//! validator already accepted, because a job's input is validated against every
//! schema in its `extends` chain in turn.

pub mod basic;

use std::sync::Arc;

use serde_json::Value;

use crate::core::JobError;

pub use basic::BasicSchemaCompiler;

/// Result of validating a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Whether the value was accepted.
    pub success: bool,
    /// Validated data. May differ from the input (for example filled defaults).
    pub data: Value,
    /// Human-readable errors when `success` is false.
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    /// Accepted outcome carrying `data`.
    pub const fn accepted(data: Value) -> Self {
        Self {
            success: true,
            data,
            errors: Vec::new(),
        }
    }

    /// Rejected outcome.
    pub const fn rejected(data: Value, errors: Vec<String>) -> Self {
        Self {
            success: false,
            data,
            errors,
        }
    }
}

/// A compiled schema.
pub trait SchemaValidator: Send + Sync {
    /// Validate `value`.
    fn validate(&self, value: &Value) -> ValidationOutcome;
}

/// Compiles JSON schemas into validators.
pub trait SchemaCompiler: Send + Sync {
    /// Compile `schema`.
    fn compile(&self, schema: &Value) -> Result<Arc<dyn SchemaValidator>, JobError>;
}

/// Run `value` through every validator in order, feeding each validator the
/// data produced by the previous one. The first rejection wins.
pub(crate) fn validate_chain(
    chain: &[Arc<dyn SchemaValidator>],
    value: Value,
    on_error: fn(Vec<String>) -> JobError,
) -> Result<Value, JobError> {
    let mut current = value;
    for validator in chain {
        let outcome = validator.validate(&current);
        if !outcome.success {
            return Err(on_error(outcome.errors));
        }
        current = outcome.data;
    }
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chain_short_circuits_on_first_failure() {
        let compiler = BasicSchemaCompiler::new();
        let chain = vec![
            compiler.compile(&json!({"type": "array"})).unwrap(),
            compiler.compile(&json!({"type": "array", "items": {"type": "number"}})).unwrap(),
        ];

        let err = validate_chain(&chain, json!("nope"), JobError::JobInputSchemaValidationError)
            .unwrap_err();
        match err {
            JobError::JobInputSchemaValidationError(errors) => assert_eq!(errors.len(), 1),
            other => panic!("unexpected error: {other}"),
        }

        let ok = validate_chain(&chain, json!([1, 2]), JobError::JobInputSchemaValidationError);
        assert_eq!(ok.unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_chain_feeds_data_forward() {
        let compiler = BasicSchemaCompiler::new();
        let chain = vec![
            compiler
                .compile(&json!({"type": "object", "properties": {"mode": {"default": "fast"}}}))
                .unwrap(),
            compiler
                .compile(&json!({"type": "object", "required": ["mode"]}))
                .unwrap(),
        ];
        let data =
            validate_chain(&chain, json!({}), JobError::JobInputSchemaValidationError).unwrap();
        assert_eq!(data, json!({"mode": "fast"}));
    }
}
