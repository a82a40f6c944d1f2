//! Data structures for package records, manifests, and configuration schemas.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Id of the reserved record that is reset rather than deleted on uninstall.
pub const DEFAULT_PACKAGE_ID: &str = "default-mcp";

/// Normalized entry point every installed package converges to, relative to its directory.
pub const CANONICAL_ENTRY: &str = "bin/index.js";

/// Runtime shape of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageType {
    /// `manifest.json` plus a single script.
    #[serde(rename = "simple")]
    Simple,
    /// `package.json` plus an optional compile step.
    #[serde(rename = "nodejs")]
    NodeJs,
}

impl PackageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageType::Simple => "simple",
            PackageType::NodeJs => "nodejs",
        }
    }
}

impl std::fmt::Display for PackageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external AI tool integration a package may be exposed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiTool {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub requires_credentials: bool,
}

impl AiTool {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            connected: false,
            requires_credentials: true,
        }
    }
}

/// Tools offered when a package declares none.
pub fn default_ai_tools() -> Vec<AiTool> {
    vec![AiTool::new("claude", "Claude"), AiTool::new("cursor", "Cursor")]
}

/// Configuration values a package declares it needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSchema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, ConfigProperty>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigProperty {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// Flattened view of one schema property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigField {
    pub name: String,
    pub title: String,
    pub description: Option<String>,
    pub required: bool,
}

impl ConfigSchema {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Declared properties plus any required name that has no property entry.
    pub fn fields(&self) -> Vec<ConfigField> {
        let mut fields: Vec<ConfigField> = self
            .properties
            .iter()
            .map(|(name, prop)| ConfigField {
                name: name.clone(),
                title: prop.title.clone().unwrap_or_else(|| name.clone()),
                description: prop.description.clone(),
                required: self.is_required(name),
            })
            .collect();
        for name in &self.required {
            if !self.properties.contains_key(name) {
                fields.push(ConfigField {
                    name: name.clone(),
                    title: name.clone(),
                    description: None,
                    required: true,
                });
            }
        }
        fields
    }
}

/// Persisted record of one managed package (`mcpServers[]` in the registry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub main_script: Option<String>,
    #[serde(default)]
    pub installed: bool,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub is_typescript: bool,
    #[serde(default)]
    pub needs_compilation: bool,
    #[serde(default)]
    pub has_config: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<ConfigSchema>,
    #[serde(default)]
    pub ai_tools: Vec<AiTool>,
}

impl PackageRecord {
    /// The reserved record seeded into an empty registry.
    pub fn default_package() -> Self {
        Self {
            id: DEFAULT_PACKAGE_ID.to_string(),
            name: "Default MCP Server".to_string(),
            description: "Pre-installed MCP server for demonstration".to_string(),
            version: Some("1.0.0".to_string()),
            package_type: PackageType::Simple,
            path: None,
            main_script: None,
            installed: false,
            running: false,
            is_typescript: false,
            needs_compilation: false,
            has_config: false,
            config_schema: None,
            ai_tools: default_ai_tools(),
        }
    }

    pub fn is_default(&self) -> bool {
        self.id == DEFAULT_PACKAGE_ID
    }

    /// Absolute path of the entry file, when materialized.
    pub fn entry_path(&self) -> Option<PathBuf> {
        let dir = self.path.as_ref()?;
        let main = self.main_script.as_deref()?;
        Some(dir.join(main))
    }

    pub fn has_connected_tool(&self) -> bool {
        self.ai_tools.iter().any(|t| t.connected)
    }

    /// Schema that gates install and start, if the package declares one.
    pub fn required_config(&self) -> Option<&ConfigSchema> {
        if self.has_config {
            self.config_schema.as_ref()
        } else {
            None
        }
    }
}

/// `manifest.json` of a simple package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleManifest {
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main: Option<String>,
    #[serde(default)]
    pub ai_tools: Option<Vec<AiTool>>,
    #[serde(default)]
    pub config_schema: Option<ConfigSchema>,
}

/// The subset of `package.json` the inspector and installer read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageJson {
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main: Option<String>,
    /// Either a single path or a map of alias -> path, in declaration order.
    #[serde(default)]
    pub bin: Option<serde_json::Value>,
    #[serde(rename = "type", default)]
    pub module_type: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,
}

impl PackageJson {
    /// First declared executable alias, if any.
    pub fn first_bin(&self) -> Option<String> {
        match self.bin.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) => map
                .values()
                .find_map(|v| v.as_str())
                .map(String::from),
            _ => None,
        }
    }

    pub fn is_esm(&self) -> bool {
        self.module_type.as_deref() == Some("module")
    }

    pub fn has_build_script(&self) -> bool {
        self.scripts.contains_key("build")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_uses_registry_field_names() {
        let record = PackageRecord::default_package();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "simple");
        assert_eq!(json["mainScript"], serde_json::Value::Null);
        assert_eq!(json["aiTools"][0]["requiresCredentials"], true);
        assert!(json.get("configSchema").is_none());
    }

    #[test]
    fn record_parses_minimal_entry() {
        let record: PackageRecord = serde_json::from_str(
            r#"{"id":"demo","name":"Demo","type":"nodejs","mainScript":"bin/index.js"}"#,
        )
        .unwrap();
        assert_eq!(record.package_type, PackageType::NodeJs);
        assert!(!record.installed);
        assert!(record.ai_tools.is_empty());
    }

    #[test]
    fn first_bin_prefers_declared_order() {
        let pkg: PackageJson =
            serde_json::from_str(r#"{"bin":{"zeta":"z.js","alpha":"a.js"}}"#).unwrap();
        assert_eq!(pkg.first_bin().as_deref(), Some("z.js"));

        let pkg: PackageJson = serde_json::from_str(r#"{"bin":"cli.js"}"#).unwrap();
        assert_eq!(pkg.first_bin().as_deref(), Some("cli.js"));
    }

    #[test]
    fn schema_fields_include_undeclared_required() {
        let schema: ConfigSchema = serde_json::from_str(
            r#"{"type":"object","required":["apiKey"],"properties":{"region":{"title":"Region"}}}"#,
        )
        .unwrap();
        let fields = schema.fields();
        assert_eq!(fields.len(), 2);
        assert!(fields.iter().any(|f| f.name == "apiKey" && f.required));
        assert!(fields.iter().any(|f| f.name == "region" && !f.required && f.title == "Region"));
    }
}
