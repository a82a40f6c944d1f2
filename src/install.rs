//! Install pipeline: dependencies, optional build, entry-point normalization.
//!
//! Every package ends up launchable through `bin/index.js`. Dependency and
//! build failures only produce warnings; when nothing runnable can be found a
//! placeholder server is written so the entry file always exists.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use serde_json::Value;
use thiserror::Error;
use tokio::process::Command;

use crate::config::{check_required, MissingConfiguration, Settings};
use crate::events::EventBus;
use crate::inspect::{self, MANIFEST_JSON};
use crate::models::{PackageJson, PackageRecord, PackageType, CANONICAL_ENTRY, DEFAULT_PACKAGE_ID};
use crate::stream::{spawn_stream_reader, StreamKind};
use crate::sync::ConfigSync;
use crate::toolchain::Toolchain;

/// Directory holding the canonical entry file.
const BIN_DIR: &str = "bin";
const ENTRY_FILE: &str = "index.js";

/// Where build tools conventionally put compiled output, in search order.
const OUTPUT_DIRS: &[&str] = &["dist", "build", "lib", "out"];

/// Entry script of the synthesized default package.
const DEFAULT_SERVER_FILE: &str = "server.js";

const DEFAULT_SERVER_SCRIPT: &str = r#"// Default MCP server: logs a heartbeat until stopped.
console.log('Default MCP Server starting up...');

setTimeout(() => {
  console.log('MCP Server started successfully');
  console.log('Ready to process requests...');
}, 1000);

let counter = 0;
const interval = setInterval(() => {
  counter++;
  console.log(`MCP Server heartbeat #${counter}`);
  if (counter % 5 === 0) {
    console.log('System status: normal');
  }
  if (counter >= 100) {
    clearInterval(interval);
    console.log('MCP Server shutting down normally...');
    process.exit(0);
  }
}, 3000);

for (const signal of ['SIGINT', 'SIGTERM']) {
  process.on(signal, () => {
    clearInterval(interval);
    console.log(`MCP Server received ${signal}, shutting down...`);
    process.exit(0);
  });
}
"#;

const FALLBACK_SCRIPT: &str = r#"#!/usr/bin/env node
// Placeholder entry: no runnable entry point was found at install time.
console.log('MCP Server (placeholder) starting...');
console.error('No entry point was found for this package; running a placeholder server.');

let beats = 0;
const interval = setInterval(() => {
  beats++;
  console.log(`MCP Server placeholder heartbeat #${beats}`);
}, 5000);

for (const signal of ['SIGINT', 'SIGTERM']) {
  process.on(signal, () => {
    clearInterval(interval);
    console.log('MCP Server placeholder shutting down...');
    process.exit(0);
  });
}
"#;

const EMERGENCY_SCRIPT: &str = r#"#!/usr/bin/env node
console.log('MCP Server (emergency placeholder) running');
setInterval(() => {}, 60000);
process.on('SIGTERM', () => process.exit(0));
process.on('SIGINT', () => process.exit(0));
"#;

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("Package requires configuration: {0}")]
    RequiresConfiguration(MissingConfiguration),

    #[error("Package directory for {0} does not exist")]
    MissingDirectory(String),

    #[error("Failed to prepare default package: {0}")]
    DefaultPackage(io::Error),

    #[error("Failed to write entry file {}: {source}", path.display())]
    EntryUnwritable { path: PathBuf, source: io::Error },
}

/// How the canonical entry file came to exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryResolution {
    /// `bin/index.js` was already there.
    Existing,
    /// Forwards to compiled output (path relative to the package root).
    Compiled(PathBuf),
    /// Forwards to the declared main script.
    Source(PathBuf),
    /// Placeholder heartbeat server.
    Fallback,
    /// Written by the final check after every other step failed.
    Emergency,
}

impl EntryResolution {
    /// Whether the package got a placeholder instead of its own code.
    pub fn degraded(&self) -> bool {
        matches!(self, EntryResolution::Fallback | EntryResolution::Emergency)
    }
}

#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub record: PackageRecord,
    pub entry: EntryResolution,
    pub warnings: Vec<String>,
}

pub struct Installer {
    packages_dir: PathBuf,
    toolchain: Toolchain,
    sync: ConfigSync,
    events: EventBus,
}

impl Installer {
    pub fn new(packages_dir: PathBuf, toolchain: Toolchain, sync: ConfigSync, events: EventBus) -> Self {
        Self {
            packages_dir,
            toolchain,
            sync,
            events,
        }
    }

    /// Install `record` and expose it to `selected_tools`.
    ///
    /// Fails without side effects when required configuration is missing.
    pub async fn install(
        &self,
        mut record: PackageRecord,
        settings: &Settings,
        selected_tools: &[String],
    ) -> Result<InstallOutcome, InstallError> {
        check_required(&record, settings).map_err(InstallError::RequiresConfiguration)?;

        if record.is_default() && record.path.is_none() {
            let dir = self.synthesize_default()?;
            record.path = Some(dir);
            record.main_script = Some(DEFAULT_SERVER_FILE.to_string());
        }
        let dir = match record.path.clone() {
            Some(dir) if dir.is_dir() => dir,
            _ => return Err(InstallError::MissingDirectory(record.id.clone())),
        };

        let id = record.id.clone();
        let mut warnings = Vec::new();
        tracing::info!(package_id = %id, dir = %dir.display(), "Installing package");

        if !record.is_typescript && inspect::has_build_config(&dir) {
            tracing::debug!(package_id = %id, "Build config found, treating package as TypeScript");
            record.is_typescript = true;
        }

        let package_json = match inspect::read_package_json(&dir) {
            Ok(pkg) => pkg,
            Err(e) => {
                self.warn(&id, &mut warnings, format!("Could not read package.json: {e}"));
                None
            }
        };

        match record.package_type {
            PackageType::NodeJs => {
                self.events.output(&id, "Installing dependencies...");
                self.run_step(
                    &id,
                    "Dependency install",
                    &self.toolchain.package_manager,
                    &["install"],
                    &dir,
                    &mut warnings,
                )
                .await;
            }
            PackageType::Simple => {}
        }

        let bin_dir = dir.join(BIN_DIR);
        if let Err(e) = std::fs::create_dir_all(&bin_dir) {
            self.warn(&id, &mut warnings, format!("Could not create {}: {e}", bin_dir.display()));
        }

        if record.is_typescript {
            self.events.output(&id, "Compiling TypeScript...");
            if package_json.as_ref().is_some_and(PackageJson::has_build_script) {
                self.run_step(
                    &id,
                    "Build script",
                    &self.toolchain.package_manager,
                    &["run", "build"],
                    &dir,
                    &mut warnings,
                )
                .await;
            } else {
                self.run_step(&id, "TypeScript compiler", &self.toolchain.runner, &["tsc"], &dir, &mut warnings)
                    .await;
            }
        }

        let esm = package_json.as_ref().is_some_and(PackageJson::is_esm);
        let mut entry = match normalize_entry(&dir, record.main_script.as_deref(), esm) {
            Ok(entry) => entry,
            Err(e) => {
                self.warn(&id, &mut warnings, format!("Entry point normalization failed: {e}"));
                EntryResolution::Emergency
            }
        };

        let canonical = dir.join(CANONICAL_ENTRY);
        if !canonical.is_file() {
            write_file(&canonical, EMERGENCY_SCRIPT).map_err(|source| InstallError::EntryUnwritable {
                path: canonical.clone(),
                source,
            })?;
            entry = EntryResolution::Emergency;
        }
        if entry.degraded() {
            self.warn(
                &id,
                &mut warnings,
                "No runnable entry point found, installed a placeholder server".to_string(),
            );
        }

        record.main_script = Some(CANONICAL_ENTRY.to_string());
        record.installed = true;
        for tool in record.ai_tools.iter_mut() {
            if selected_tools.contains(&tool.id) {
                tool.connected = true;
            }
        }

        match self.sync.sync(&record, settings, selected_tools) {
            Ok(report) => {
                for warning in report.warnings {
                    self.warn(&id, &mut warnings, warning);
                }
            }
            Err(e) => self.warn(&id, &mut warnings, format!("External config not updated: {e}")),
        }

        tracing::info!(package_id = %id, ?entry, warnings = warnings.len(), "Package installed");
        Ok(InstallOutcome {
            record,
            entry,
            warnings,
        })
    }

    fn synthesize_default(&self) -> Result<PathBuf, InstallError> {
        let dir = self.packages_dir.join(DEFAULT_PACKAGE_ID);
        let manifest = serde_json::json!({
            "id": DEFAULT_PACKAGE_ID,
            "name": "Default MCP Server",
            "version": "1.0.0",
            "description": "Pre-installed MCP server for demonstration",
            "main": DEFAULT_SERVER_FILE,
            "aiTools": [
                { "id": "claude", "name": "Claude", "requiresCredentials": true },
                { "id": "cursor", "name": "Cursor", "requiresCredentials": true }
            ]
        });
        let manifest = serde_json::to_string_pretty(&manifest)
            .map_err(|e| InstallError::DefaultPackage(io::Error::other(e)))?;

        write_file(&dir.join(DEFAULT_SERVER_FILE), DEFAULT_SERVER_SCRIPT).map_err(InstallError::DefaultPackage)?;
        write_file(&dir.join(MANIFEST_JSON), &manifest).map_err(InstallError::DefaultPackage)?;

        tracing::debug!(dir = %dir.display(), "Synthesized default package");
        Ok(dir)
    }

    /// Run an external command, streaming its output. Failures become warnings.
    async fn run_step(
        &self,
        package_id: &str,
        label: &str,
        program: &str,
        args: &[&str],
        cwd: &Path,
        warnings: &mut Vec<String>,
    ) {
        match self.run_streamed(package_id, program, args, cwd).await {
            Ok(status) if status.success() => {
                tracing::debug!(package_id = %package_id, program, "{} finished", label);
            }
            Ok(status) => {
                self.warn(package_id, warnings, format!("{label} failed ({status})"));
            }
            Err(e) => {
                self.warn(package_id, warnings, format!("{label} could not run `{program}`: {e}"));
            }
        }
    }

    async fn run_streamed(
        &self,
        package_id: &str,
        program: &str,
        args: &[&str],
        cwd: &Path,
    ) -> io::Result<ExitStatus> {
        let mut child = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let readers: Vec<_> = [
            child
                .stdout
                .take()
                .map(|s| spawn_stream_reader(s, package_id.to_string(), StreamKind::Stdout, self.events.clone())),
            child
                .stderr
                .take()
                .map(|s| spawn_stream_reader(s, package_id.to_string(), StreamKind::Stderr, self.events.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        let status = child.wait().await?;
        for reader in readers {
            let _ = reader.await;
        }
        Ok(status)
    }

    fn warn(&self, package_id: &str, warnings: &mut Vec<String>, message: String) {
        self.events.warn(package_id, message.clone());
        warnings.push(message);
    }
}

/// Make `bin/index.js` exist under `dir`, trying progressively weaker sources.
fn normalize_entry(dir: &Path, main_script: Option<&str>, esm: bool) -> io::Result<EntryResolution> {
    let canonical = dir.join(CANONICAL_ENTRY);
    if canonical.is_file() {
        return Ok(EntryResolution::Existing);
    }

    let main = main_script.map(clean_relative).filter(|m| !m.as_os_str().is_empty());
    let mut names = vec![ENTRY_FILE.to_string()];
    if let Some(stem) = main.as_deref().and_then(Path::file_stem).and_then(|s| s.to_str()) {
        let candidate = format!("{stem}.js");
        if candidate != ENTRY_FILE {
            names.push(candidate);
        }
    }

    for out_dir in OUTPUT_DIRS {
        for name in &names {
            let rel = Path::new(out_dir).join(name);
            if dir.join(&rel).is_file() {
                write_file(&canonical, &forwarding_source(&rel, esm))?;
                return Ok(EntryResolution::Compiled(rel));
            }
        }
    }

    if let Some(main) = main {
        if main != Path::new(CANONICAL_ENTRY) && dir.join(&main).is_file() {
            write_file(&canonical, &forwarding_source(&main, esm))?;
            return Ok(EntryResolution::Source(main));
        }
    }

    write_file(&canonical, FALLBACK_SCRIPT)?;
    Ok(EntryResolution::Fallback)
}

/// Contents of a `bin/index.js` that loads `target` (relative to the package root).
fn forwarding_source(target: &Path, esm: bool) -> String {
    let parts: Vec<String> = target
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let module_ref = format!("../{}", parts.join("/"));
    let dynamic = module_ref.ends_with(".mjs");
    // A JSON string is a valid JS string literal, quotes and backslashes escaped.
    let literal = Value::String(module_ref).to_string();

    let load = if dynamic {
        format!("import({literal});")
    } else if esm {
        format!("import {literal};")
    } else {
        format!("require({literal});")
    };
    format!("#!/usr/bin/env node\n{load}\n")
}

/// `main_script` as a plain relative path: no `./`, no root, no `..`.
fn clean_relative(main: &str) -> PathBuf {
    Path::new(&main.replace('\\', "/"))
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn write_file(path: &Path, content: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
}
