use serde::Serialize;
use serde_json::Value;

/// Structured error payload returned to agents inside a tool envelope.
/// Every error carries enough information for an agent to decide whether to
/// retry, ask the user, or give up.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    /// Machine-readable error code (see [`codes`])
    pub error: String,
    /// Human/agent-readable description of what went wrong
    pub message: String,
    /// Which tool argument caused the error (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// Hint about how to recover
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs_hint: Option<String>,
    /// Extra machine-readable context (upstream status, ids, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorPayload {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            field: None,
            docs_hint: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_docs_hint(mut self, docs_hint: impl Into<String>) -> Self {
        self.docs_hint = Some(docs_hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "error": self.error, "message": self.message })
        })
    }
}

/// Error codes used across the tool surface
pub mod codes {
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const NOT_FOUND: &str = "not_found";
    pub const CONFIG_MISSING: &str = "config_missing";
    pub const AUTH_MISSING: &str = "auth_missing";
    pub const CONNECTION_ERROR: &str = "connection_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const RESPONSE_ERROR: &str = "response_error";
    pub const MATCHER_ERROR: &str = "matcher_error";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
    pub const INTERNAL_ERROR: &str = "internal_error";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_fields_are_omitted_when_unset() {
        let payload = ErrorPayload::new(codes::NOT_FOUND, "nothing here").to_value();
        assert_eq!(
            payload,
            json!({ "error": "not_found", "message": "nothing here" })
        );
    }

    #[test]
    fn builder_fields_serialize() {
        let payload = ErrorPayload::new(codes::VALIDATION_FAILED, "bad url")
            .with_field("drive_folder_url")
            .with_docs_hint("Pass a folder URL")
            .with_details(json!({ "received": "x" }))
            .to_value();
        assert_eq!(payload["field"], "drive_folder_url");
        assert_eq!(payload["docs_hint"], "Pass a folder URL");
        assert_eq!(payload["details"]["received"], "x");
    }
}
