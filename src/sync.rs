//! Reconciles exposed packages with the external AI-tool config file.
//!
//! The file is `{ "mcpServers": { <key>: { command, args, env } } }` and is
//! owned by other programs: every key this module does not manage is kept
//! as-is, in its original order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::config::{credential_env, Settings, CONNECTION_URL_KEY};
use crate::models::PackageRecord;

const SERVERS_KEY: &str = "mcpServers";

/// Ids exposed through the fixed database-connector entry.
const DATABASE_CONNECTOR_IDS: &[&str] = &["mongodb-mcp", "mongo-mcp"];
const DATABASE_CONNECTOR_KEY: &str = "mongodb";
const DATABASE_CONNECTOR_PACKAGE: &str = "mongo-mcp";
const DATABASE_CONNECTOR_URL_TEMPLATE: &str =
    "mongodb://<username>:<password>@<host>:<port>/<database>?authSource=admin";

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to read external config: {0}")]
    Read(std::io::Error),

    #[error("Failed to serialize external config: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to write external config: {0}")]
    Write(std::io::Error),

    #[error("Package {0} has no entry file to expose")]
    NoEntry(String),
}

/// What a sync did to the package's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Upserted,
    Removed,
    Unchanged,
}

/// Result of one change to the external config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub action: SyncAction,
    /// Problems found in the existing file, such as unparseable content.
    pub warnings: Vec<String>,
}

impl SyncReport {
    fn new(action: SyncAction, doc: &Document) -> Self {
        Self {
            action,
            warnings: doc.notice.iter().cloned().collect(),
        }
    }

    fn unchanged() -> Self {
        Self {
            action: SyncAction::Unchanged,
            warnings: Vec::new(),
        }
    }
}

/// Reader/writer for the external config file.
///
/// Clones share one lock, so read-modify-write cycles from this process never interleave.
#[derive(Debug, Clone)]
pub struct ConfigSync {
    path: PathBuf,
    runtime: String,
    write_lock: Arc<Mutex<()>>,
}

impl ConfigSync {
    /// `runtime` is the command external tools use to launch entry files.
    pub fn new(path: impl Into<PathBuf>, runtime: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            runtime: runtime.into(),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Key under `mcpServers` that belongs to package `id`.
    pub fn entry_key(id: &str) -> &str {
        if is_database_connector(id) {
            DATABASE_CONNECTOR_KEY
        } else {
            id
        }
    }

    /// Expose the package if it is installed and connected (or tools were just
    /// selected); otherwise drop its entry.
    pub fn sync(
        &self,
        record: &PackageRecord,
        settings: &Settings,
        selected_tools: &[String],
    ) -> Result<SyncReport, SyncError> {
        let exposed =
            record.installed && (record.has_connected_tool() || !selected_tools.is_empty());
        if exposed {
            self.upsert(record, settings)
        } else {
            self.remove(&record.id)
        }
    }

    /// Write (or overwrite) the package's entry.
    pub fn upsert(&self, record: &PackageRecord, settings: &Settings) -> Result<SyncReport, SyncError> {
        let entry = self.server_entry(record, settings)?;
        let _guard = self.exclusive();
        let mut doc = self.read_document()?;
        doc.servers
            .insert(Self::entry_key(&record.id).to_string(), entry);
        let report = SyncReport::new(SyncAction::Upserted, &doc);
        self.write_document(doc)?;

        tracing::info!(package_id = %record.id, path = %self.path.display(), "External config entry written");
        Ok(report)
    }

    /// Remove the package's entry. The action is `Removed` only if one existed.
    pub fn remove(&self, id: &str) -> Result<SyncReport, SyncError> {
        if !self.path.exists() {
            return Ok(SyncReport::unchanged());
        }
        let _guard = self.exclusive();
        let mut doc = self.read_document()?;
        if doc.servers.shift_remove(Self::entry_key(id)).is_none() {
            return Ok(SyncReport::new(SyncAction::Unchanged, &doc));
        }
        let report = SyncReport::new(SyncAction::Removed, &doc);
        self.write_document(doc)?;
        tracing::info!(package_id = %id, "External config entry removed");
        Ok(report)
    }

    /// Refresh only the `env` of an existing entry after settings changed.
    ///
    /// The action is `Upserted` when an entry was updated. `args` and `command`
    /// stay untouched, and the database-connector entry (which takes no env) is left alone.
    pub fn update_env(&self, id: &str, settings: &Settings) -> Result<SyncReport, SyncError> {
        if is_database_connector(id) || !self.path.exists() {
            return Ok(SyncReport::unchanged());
        }
        let _guard = self.exclusive();
        let mut doc = self.read_document()?;
        let Some(entry) = doc.servers.get_mut(id).and_then(Value::as_object_mut) else {
            return Ok(SyncReport::new(SyncAction::Unchanged, &doc));
        };
        entry.insert("env".to_string(), env_value(&credential_env(settings)));
        let report = SyncReport::new(SyncAction::Upserted, &doc);
        self.write_document(doc)?;

        tracing::debug!(package_id = %id, "External config env refreshed");
        Ok(report)
    }

    /// Current entry for `id`, if any.
    pub fn entry(&self, id: &str) -> Result<Option<Value>, SyncError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let doc = self.read_document()?;
        Ok(doc.servers.get(Self::entry_key(id)).cloned())
    }

    fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn server_entry(&self, record: &PackageRecord, settings: &Settings) -> Result<Value, SyncError> {
        if is_database_connector(&record.id) {
            let url = settings
                .get(CONNECTION_URL_KEY)
                .filter(|u| !u.is_empty())
                .map_or(DATABASE_CONNECTOR_URL_TEMPLATE, String::as_str);
            return Ok(json!({
                "command": "npx",
                "args": [DATABASE_CONNECTOR_PACKAGE, url],
                "env": {}
            }));
        }

        let entry = record
            .entry_path()
            .ok_or_else(|| SyncError::NoEntry(record.id.clone()))?;
        Ok(json!({
            "command": self.runtime,
            "args": [entry.to_string_lossy()],
            "env": env_value(&credential_env(settings)),
        }))
    }

    /// Parse the file; a missing, empty, or unparseable file reads as an empty
    /// document. The last two carry a notice for the caller's warnings.
    fn read_document(&self) -> Result<Document, SyncError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
            Err(e) => return Err(SyncError::Read(e)),
        };
        if content.trim().is_empty() {
            return Ok(Document::default());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(root)) => Ok(Document::from_root(root)),
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "External config root is not an object, replacing it");
                Ok(Document::with_notice(format!(
                    "External config {} is not a JSON object; its content is discarded",
                    self.path.display()
                )))
            }
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "External config unparseable, replacing it");
                Ok(Document::with_notice(format!(
                    "External config {} is not valid JSON ({e}); its content is discarded",
                    self.path.display()
                )))
            }
        }
    }

    fn write_document(&self, doc: Document) -> Result<(), SyncError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(SyncError::Write)?;
        }
        let output =
            serde_json::to_string_pretty(&doc.into_value()).map_err(SyncError::Serialize)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, output).map_err(SyncError::Write)?;
        std::fs::rename(&tmp, &self.path).map_err(SyncError::Write)
    }
}

/// The parsed file, with `mcpServers` split out for editing.
///
/// The servers slot stays in place inside `root` (as `null`) so writing it back
/// keeps the key's original position.
#[derive(Debug, Default)]
struct Document {
    root: Map<String, Value>,
    servers: Map<String, Value>,
    notice: Option<String>,
}

impl Document {
    fn from_root(mut root: Map<String, Value>) -> Self {
        let servers = match root.get_mut(SERVERS_KEY).map(std::mem::take) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            root,
            servers,
            notice: None,
        }
    }

    fn with_notice(notice: String) -> Self {
        Self {
            notice: Some(notice),
            ..Self::default()
        }
    }

    fn into_value(mut self) -> Value {
        self.root
            .insert(SERVERS_KEY.to_string(), Value::Object(self.servers));
        Value::Object(self.root)
    }
}

fn is_database_connector(id: &str) -> bool {
    DATABASE_CONNECTOR_IDS.contains(&id)
}

fn env_value(env: &BTreeMap<String, String>) -> Value {
    Value::Object(
        env.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PackageType, CANONICAL_ENTRY};
    use std::fs;
    use tempfile::TempDir;

    fn installed_record(id: &str, dir: &Path) -> PackageRecord {
        let mut record = PackageRecord::default_package();
        record.id = id.to_string();
        record.package_type = PackageType::NodeJs;
        record.path = Some(dir.join(id));
        record.main_script = Some(CANONICAL_ENTRY.to_string());
        record.installed = true;
        record
    }

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn env_contains_only_credentials() {
        let temp = TempDir::new().unwrap();
        let sync = ConfigSync::new(temp.path().join("mcp.json"), "node");
        let record = installed_record("demo", temp.path());

        sync.upsert(&record, &settings(&[("api_key", "x"), ("region", "y")]))
            .unwrap();

        let entry = sync.entry("demo").unwrap().unwrap();
        assert_eq!(entry["command"], "node");
        assert_eq!(entry["env"], json!({"API_KEY": "x"}));
        let arg = entry["args"][0].as_str().unwrap();
        assert!(arg.ends_with("bin/index.js"));
        assert!(Path::new(arg).is_absolute());
    }

    #[test]
    fn unrelated_keys_preserved_in_order() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mcp.json");
        fs::write(
            &path,
            r#"{"theme":"dark","mcpServers":{"zeta":{"command":"z"},"alpha":{"command":"a"}}}"#,
        )
        .unwrap();
        let sync = ConfigSync::new(&path, "node");

        sync.upsert(&installed_record("demo", temp.path()), &Settings::new())
            .unwrap();

        let doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["theme"], "dark");
        let keys: Vec<&String> = doc["mcpServers"].as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "demo"]);
    }

    #[test]
    fn repeated_sync_is_byte_identical() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mcp.json");
        fs::write(&path, r#"{"mcpServers":{"other":{"command":"x","args":[],"env":{}}}}"#).unwrap();
        let sync = ConfigSync::new(&path, "node");
        let record = installed_record("demo", temp.path());
        let s = settings(&[("token", "t"), ("apiKey", "k")]);

        sync.sync(&record, &s, &["claude".to_string()]).unwrap();
        let first = fs::read(&path).unwrap();
        sync.sync(&record, &s, &["claude".to_string()]).unwrap();
        let second = fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn unparseable_file_is_replaced() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mcp.json");
        fs::write(&path, "{ broken").unwrap();
        let sync = ConfigSync::new(&path, "node");

        let report = sync
            .upsert(&installed_record("demo", temp.path()), &Settings::new())
            .unwrap();

        assert_eq!(report.action, SyncAction::Upserted);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("not valid JSON"));
        assert!(sync.entry("demo").unwrap().is_some());

        let report = sync.remove("demo").unwrap();
        assert_eq!(report.action, SyncAction::Removed);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn non_object_root_reported_on_remove() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mcp.json");
        fs::write(&path, "[1, 2]").unwrap();
        let sync = ConfigSync::new(&path, "node");

        let report = sync.remove("demo").unwrap();

        assert_eq!(report.action, SyncAction::Unchanged);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "[1, 2]");
    }

    #[test]
    fn not_exposed_without_tools() {
        let temp = TempDir::new().unwrap();
        let sync = ConfigSync::new(temp.path().join("mcp.json"), "node");
        let record = installed_record("demo", temp.path());

        assert_eq!(
            sync.sync(&record, &Settings::new(), &[]).unwrap().action,
            SyncAction::Unchanged
        );
        assert!(!sync.path().exists());
    }

    #[test]
    fn disconnect_removes_whole_key() {
        let temp = TempDir::new().unwrap();
        let sync = ConfigSync::new(temp.path().join("mcp.json"), "node");
        let mut record = installed_record("demo", temp.path());
        record.ai_tools[0].connected = true;

        assert_eq!(
            sync.sync(&record, &Settings::new(), &[]).unwrap().action,
            SyncAction::Upserted
        );

        record.ai_tools[0].connected = false;
        assert_eq!(
            sync.sync(&record, &Settings::new(), &[]).unwrap().action,
            SyncAction::Removed
        );
        let doc: Value = serde_json::from_str(&fs::read_to_string(sync.path()).unwrap()).unwrap();
        assert!(doc["mcpServers"].get("demo").is_none());
    }

    #[test]
    fn database_connector_uses_fixed_entry() {
        let temp = TempDir::new().unwrap();
        let sync = ConfigSync::new(temp.path().join("mcp.json"), "node");
        let record = installed_record("mongo-mcp", temp.path());

        sync.upsert(
            &record,
            &settings(&[(CONNECTION_URL_KEY, "mongodb://db:27017/app"), ("password", "p")]),
        )
        .unwrap();

        let entry = sync.entry("mongo-mcp").unwrap().unwrap();
        assert_eq!(entry["command"], "npx");
        assert_eq!(entry["args"], json!(["mongo-mcp", "mongodb://db:27017/app"]));
        assert_eq!(entry["env"], json!({}));

        let doc: Value = serde_json::from_str(&fs::read_to_string(sync.path()).unwrap()).unwrap();
        assert!(doc["mcpServers"].get("mongodb").is_some());
        assert!(doc["mcpServers"].get("mongo-mcp").is_none());

        assert_eq!(sync.remove("mongo-mcp").unwrap().action, SyncAction::Removed);
        assert!(sync.entry("mongo-mcp").unwrap().is_none());
    }

    #[test]
    fn update_env_keeps_args() {
        let temp = TempDir::new().unwrap();
        let sync = ConfigSync::new(temp.path().join("mcp.json"), "node");
        let record = installed_record("demo", temp.path());
        sync.upsert(&record, &Settings::new()).unwrap();
        let before = sync.entry("demo").unwrap().unwrap();

        assert_eq!(
            sync.update_env("demo", &settings(&[("secretKey", "s")])).unwrap().action,
            SyncAction::Upserted
        );

        let after = sync.entry("demo").unwrap().unwrap();
        assert_eq!(after["args"], before["args"]);
        assert_eq!(after["env"], json!({"SECRETKEY": "s"}));
        assert_eq!(
            sync.update_env("missing", &Settings::new()).unwrap().action,
            SyncAction::Unchanged
        );
    }
}
