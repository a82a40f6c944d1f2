//! Classification of an extracted package directory.
//!
//! Checks, first match wins:
//! 1. `package.json` -> `nodejs` (plus `tsconfig.json` and `smithery.yaml` probes)
//! 2. `manifest.json` -> `simple`
//! 3. otherwise unknown
//!
//! A malformed file is an error for that file only; the next file is still
//! consulted, and the error is returned if nothing classifies.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{AiTool, ConfigSchema, PackageJson, PackageType, SimpleManifest};

pub const PACKAGE_JSON: &str = "package.json";
pub const MANIFEST_JSON: &str = "manifest.json";
pub const TSCONFIG_JSON: &str = "tsconfig.json";
pub const SMITHERY_YAML: &str = "smithery.yaml";

/// Entry used when a dependency manifest declares neither `bin` nor `main`.
pub const DEFAULT_MAIN: &str = "index.js";

/// Directory whose absence (or emptiness) means a TypeScript package still needs a build.
const COMPILED_OUTPUT_DIR: &str = "dist";

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Malformed JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Malformed YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// Everything the inspector learned about a package.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    pub package_type: PackageType,
    pub id: Option<String>,
    pub name: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub main_script: String,
    pub dependencies: BTreeMap<String, String>,
    pub is_typescript: bool,
    pub needs_compilation: bool,
    pub config_schema: Option<ConfigSchema>,
    pub ai_tools: Option<Vec<AiTool>>,
}

impl PackageDescriptor {
    pub fn has_config(&self) -> bool {
        self.config_schema.is_some()
    }
}

/// Classify `dir`. `Ok(None)` means the package type is unknown.
pub fn classify(dir: &Path) -> Result<Option<PackageDescriptor>, InspectError> {
    let mut first_error = None;

    match inspect_nodejs(dir) {
        Ok(Some(descriptor)) => return Ok(Some(descriptor)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Dependency manifest unreadable, checking simple manifest");
            first_error = Some(e);
        }
    }

    match inspect_simple(dir) {
        Ok(Some(descriptor)) => return Ok(Some(descriptor)),
        Ok(None) => {}
        Err(e) => {
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(None),
    }
}

/// Read `package.json` at the root of `dir`, if present.
pub fn read_package_json(dir: &Path) -> Result<Option<PackageJson>, InspectError> {
    read_json(&dir.join(PACKAGE_JSON))
}

/// Whether the TypeScript build-config file is present.
pub fn has_build_config(dir: &Path) -> bool {
    dir.join(TSCONFIG_JSON).is_file()
}

fn inspect_nodejs(dir: &Path) -> Result<Option<PackageDescriptor>, InspectError> {
    let Some(pkg) = read_package_json(dir)? else {
        return Ok(None);
    };

    let is_typescript = has_build_config(dir);
    let needs_compilation = is_typescript && dir_is_empty(&dir.join(COMPILED_OUTPUT_DIR));
    let main_script = pkg
        .first_bin()
        .or_else(|| pkg.main.clone())
        .unwrap_or_else(|| DEFAULT_MAIN.to_string());
    let config_schema = read_smithery_schema(dir)?;

    tracing::debug!(
        dir = %dir.display(),
        name = ?pkg.name,
        is_typescript,
        needs_compilation,
        "Classified nodejs package"
    );

    Ok(Some(PackageDescriptor {
        package_type: PackageType::NodeJs,
        id: None,
        name: pkg.name,
        version: pkg.version,
        description: pkg.description,
        main_script,
        dependencies: pkg.dependencies,
        is_typescript,
        needs_compilation,
        config_schema,
        ai_tools: None,
    }))
}

fn inspect_simple(dir: &Path) -> Result<Option<PackageDescriptor>, InspectError> {
    let Some(manifest) = read_json::<SimpleManifest>(&dir.join(MANIFEST_JSON))? else {
        return Ok(None);
    };

    tracing::debug!(dir = %dir.display(), id = ?manifest.id, "Classified simple package");

    Ok(Some(PackageDescriptor {
        package_type: PackageType::Simple,
        id: manifest.id,
        name: manifest.name,
        version: manifest.version,
        description: manifest.description,
        main_script: manifest.main.unwrap_or_else(|| DEFAULT_MAIN.to_string()),
        dependencies: BTreeMap::new(),
        is_typescript: false,
        needs_compilation: false,
        config_schema: manifest.config_schema,
        ai_tools: manifest.ai_tools,
    }))
}

/// `startCommand.configSchema` from `smithery.yaml`, if the file declares one.
fn read_smithery_schema(dir: &Path) -> Result<Option<ConfigSchema>, InspectError> {
    let path = dir.join(SMITHERY_YAML);
    let content = match std::fs::read_to_string(&path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(InspectError::Read { path, source: e }),
    };

    let doc: serde_yaml::Value = serde_yaml::from_str(&content)
        .map_err(|e| InspectError::Yaml { path: path.clone(), source: e })?;
    let Some(schema) = doc.get("startCommand").and_then(|s| s.get("configSchema")) else {
        return Ok(None);
    };

    serde_yaml::from_value(schema.clone())
        .map(Some)
        .map_err(|e| InspectError::Yaml { path, source: e })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, InspectError> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(InspectError::Read {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| InspectError::Json {
            path: path.to_path_buf(),
            source: e,
        })
}

fn dir_is_empty(dir: &Path) -> bool {
    match std::fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
