//! Caller-facing result of every operation: success flag, message, and the
//! structured reason a caller can act on (prompt for settings or credentials).

use serde::Serialize;
use serde_json::Value;

use crate::manager::ManagerError;
use crate::models::ConfigSchema;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_config: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<ConfigSchema>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub requires_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Response {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn from_error(err: &ManagerError) -> Self {
        let mut response = Self::failure(err.to_string());
        match err {
            ManagerError::RequiresConfiguration(missing) => {
                response.requires_config = true;
                response.config_schema = Some(missing.schema.clone());
                response.required_fields = missing.missing.clone();
            }
            ManagerError::RequiresCredentials(tool_id) => {
                response.requires_credentials = true;
                response.tool_id = Some(tool_id.clone());
            }
            _ => {}
        }
        response
    }

    /// Attach a payload. Values that fail to serialize are dropped with a log line.
    pub fn with_data(mut self, data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => self.data = Some(value),
            Err(e) => tracing::warn!(error = %e, "Response payload not serializable"),
        }
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MissingConfiguration;

    #[test]
    fn configuration_failure_carries_schema_and_fields() {
        let err = ManagerError::RequiresConfiguration(MissingConfiguration {
            schema: ConfigSchema {
                required: vec!["apiKey".to_string()],
                ..Default::default()
            },
            missing: vec!["apiKey".to_string()],
        });

        let response = Response::from_error(&err);
        assert!(!response.success);
        assert!(response.requires_config);
        assert_eq!(response.required_fields, vec!["apiKey".to_string()]);

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["requiresConfig"], true);
        assert_eq!(json["configSchema"]["required"][0], "apiKey");
        assert!(json.get("requiresCredentials").is_none());
    }

    #[test]
    fn credential_failure_names_tool() {
        let response = Response::from_error(&ManagerError::RequiresCredentials("claude".to_string()));
        assert!(response.requires_credentials);
        assert_eq!(response.tool_id.as_deref(), Some("claude"));
    }

    #[test]
    fn success_serializes_compactly() {
        let json = serde_json::to_value(Response::ok("Installed demo")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "message": "Installed demo"}));
    }
}
