//! Tool-argument validation against each tool's JSON Schema.

use serde_json::Value;
use std::fmt;

use crate::types::{Tool, ToolCall};
use crate::Error;

/// Whether a tool schema can be enforced in this build.
#[derive(Debug)]
pub enum SchemaSupport {
    Supported(ToolValidator),
    Unsupported { reason: String },
}

/// A compiled tool schema.
pub struct ToolValidator {
    #[cfg(feature = "validation")]
    inner: jsonschema::Validator,
}

impl fmt::Debug for ToolValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolValidator").finish_non_exhaustive()
    }
}

impl ToolValidator {
    /// Every failing location as `path: message`; empty when valid.
    pub fn errors(&self, arguments: &Value) -> Vec<String> {
        #[cfg(feature = "validation")]
        {
            self.inner
                .iter_errors(arguments)
                .map(|err| {
                    let path = err.instance_path.to_string();
                    let path = if path.is_empty() { "/".to_string() } else { path };
                    format!("{path}: {err}")
                })
                .collect()
        }
        #[cfg(not(feature = "validation"))]
        {
            let _ = arguments;
            Vec::new()
        }
    }
}

/// Compile `schema` if this build can enforce it.
pub fn detect_schema_support(schema: &Value) -> SchemaSupport {
    #[cfg(feature = "validation")]
    {
        match jsonschema::validator_for(schema) {
            Ok(inner) => SchemaSupport::Supported(ToolValidator { inner }),
            Err(e) => SchemaSupport::Unsupported {
                reason: format!("schema does not compile: {e}"),
            },
        }
    }
    #[cfg(not(feature = "validation"))]
    {
        let _ = schema;
        SchemaSupport::Unsupported {
            reason: "built without the `validation` feature".to_string(),
        }
    }
}

/// Check a model-issued call against the declared tools.
///
/// Returns every failing path at once. When the schema cannot be compiled
/// the check is skipped with a warning.
pub fn validate_tool_call(tools: &[Tool], call: &ToolCall) -> Result<(), Error> {
    let Some(tool) = tools.iter().find(|t| t.name == call.name) else {
        return Err(Error::ToolValidation {
            tool: call.name.clone(),
            errors: vec![format!("tool \"{}\" is not declared", call.name)],
            arguments: call.arguments.clone(),
        });
    };

    match detect_schema_support(&tool.parameters) {
        SchemaSupport::Supported(validator) => {
            let errors = validator.errors(&call.arguments);
            if errors.is_empty() {
                Ok(())
            } else {
                Err(Error::ToolValidation {
                    tool: tool.name.clone(),
                    errors,
                    arguments: call.arguments.clone(),
                })
            }
        }
        SchemaSupport::Unsupported { reason } => {
            tracing::warn!(tool = %tool.name, %reason, "skipping tool argument validation");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_tool() -> Tool {
        Tool::new(
            "read",
            "Read a file",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string"},
                    "limit": {"type": "integer"}
                },
                "required": ["path"]
            }),
        )
    }

    fn call(arguments: Value) -> ToolCall {
        ToolCall {
            id: "c1".to_string(),
            name: "read".to_string(),
            arguments,
            thought_signature: None,
        }
    }

    #[test]
    fn test_valid_call() {
        assert!(validate_tool_call(&[read_tool()], &call(json!({"path": "a.rs"}))).is_ok());
    }

    #[test]
    fn test_unknown_tool() {
        let mut unknown = call(json!({}));
        unknown.name = "write".to_string();
        let err = validate_tool_call(&[read_tool()], &unknown).unwrap_err();
        assert!(matches!(err, Error::ToolValidation { ref tool, .. } if tool == "write"));
    }

    #[cfg(feature = "validation")]
    #[test]
    fn test_every_failing_path_is_listed() {
        let err = validate_tool_call(&[read_tool()], &call(json!({"limit": "ten"}))).unwrap_err();
        match err {
            Error::ToolValidation { tool, errors, arguments } => {
                assert_eq!(tool, "read");
                assert_eq!(errors.len(), 2, "{errors:?}");
                assert!(errors.iter().any(|e| e.starts_with("/limit")));
                assert!(errors.iter().any(|e| e.starts_with("/:") && e.contains("path")));
                assert_eq!(arguments, json!({"limit": "ten"}));
            }
            other => panic!("Expected validation error, got {other:?}"),
        }
    }

    #[cfg(feature = "validation")]
    #[test]
    fn test_uncompilable_schema_is_skipped() {
        let broken = Tool::new("read", "Read", json!({"type": 12}));
        assert!(matches!(
            detect_schema_support(&broken.parameters),
            SchemaSupport::Unsupported { .. }
        ));
        assert!(validate_tool_call(&[broken], &call(json!({"anything": true}))).is_ok());
    }
}
