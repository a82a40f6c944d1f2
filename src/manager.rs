//! Registry manager: the public operations over the package registry.
//!
//! Owns the registry store and composes the inspector, installer, external
//! config sync and supervisor. Callers are expected to issue operations one at
//! a time; only process exit notifications arrive concurrently.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::archive::{self, ArchiveError};
use crate::config::{MissingConfiguration, Settings};
use crate::events::EventBus;
use crate::fsutil::{self, REMOVE_ATTEMPTS, REMOVE_BACKOFF};
use crate::inspect::{self, InspectError};
use crate::install::{InstallError, InstallOutcome, Installer};
use crate::models::{default_ai_tools, PackageRecord, PackageType};
use crate::paths::Paths;
use crate::store::{JsonFileStore, RegistryStore, StoreError};
use crate::supervisor::{Supervisor, SupervisorError};
use crate::sync::{ConfigSync, SyncError, SyncReport};
use crate::toolchain::Toolchain;

const SERVERS_KEY: &str = "mcpServers";
const SETTINGS_KEY: &str = "mcpSettings";
const CREDENTIALS_KEY: &str = "credentials";

/// Pause between stopping a package and deleting its directory.
const UNINSTALL_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Package not found: {0}")]
    NotFound(String),

    #[error("Package {id} has no AI tool {tool_id}")]
    UnknownTool { id: String, tool_id: String },

    #[error("Package requires configuration: {0}")]
    RequiresConfiguration(MissingConfiguration),

    #[error("Credentials required for {0}")]
    RequiresCredentials(String),

    #[error("Unsupported package: no package.json or manifest.json found")]
    UnknownPackageType,

    #[error("Package declares neither an id nor a usable name")]
    MissingIdentity,

    #[error("Package id {0:?} is not a plain directory name")]
    InvalidId(String),

    #[error("Package {0} is running; stop it before replacing it")]
    Busy(String),

    #[error("Corrupt registry entry: {0}")]
    Corrupt(serde_json::Error),

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Install(InstallError),

    #[error(transparent)]
    Supervisor(SupervisorError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Filesystem error: {0}")]
    Io(#[from] io::Error),
}

impl From<InstallError> for ManagerError {
    fn from(e: InstallError) -> Self {
        match e {
            InstallError::RequiresConfiguration(missing) => ManagerError::RequiresConfiguration(missing),
            other => ManagerError::Install(other),
        }
    }
}

impl From<SupervisorError> for ManagerError {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::RequiresConfiguration(missing) => ManagerError::RequiresConfiguration(missing),
            other => ManagerError::Supervisor(other),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub id: String,
    pub has_config: bool,
    #[serde(rename = "type")]
    pub package_type: PackageType,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UninstallOutcome {
    pub id: String,
    /// False for the reserved default package, which is reset in place.
    pub removed_from_list: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolToggle {
    pub id: String,
    pub tool_id: String,
    pub connected: bool,
    pub warnings: Vec<String>,
}

pub struct Manager<S: RegistryStore = JsonFileStore> {
    paths: Paths,
    store: Arc<Mutex<S>>,
    installer: Installer,
    supervisor: Supervisor,
    sync: ConfigSync,
    events: EventBus,
}

impl Manager<JsonFileStore> {
    /// Open the registry file under `paths`.
    pub fn open(paths: Paths, toolchain: Toolchain) -> Result<Self, ManagerError> {
        let store = JsonFileStore::open(paths.store_path())?;
        Self::with_store(paths, toolchain, store)
    }
}

impl<S: RegistryStore> Manager<S> {
    /// Seeds the default package into an empty registry and clears `running`
    /// flags left over from a previous session.
    pub fn with_store(paths: Paths, toolchain: Toolchain, mut store: S) -> Result<Self, ManagerError> {
        let mut records = load_records(&store)?;
        if records.is_empty() {
            tracing::info!("Registry empty, seeding default package");
            records.push(PackageRecord::default_package());
            save_records(&mut store, &records)?;
        } else if records.iter().any(|r| r.running) {
            for record in records.iter_mut() {
                record.running = false;
            }
            save_records(&mut store, &records)?;
            tracing::debug!("Cleared stale running flags");
        }

        let store = Arc::new(Mutex::new(store));
        let events = EventBus::new();
        let sync = ConfigSync::new(paths.external_config(), toolchain.runtime.clone());

        let hook_store = Arc::clone(&store);
        let supervisor = Supervisor::new(toolchain.runtime.clone(), events.clone())
            .with_exit_hook(Arc::new(move |id: &str| {
                if let Err(e) = mark_stopped(&hook_store, id) {
                    tracing::warn!(package_id = %id, error = %e, "Failed to record package exit");
                }
            }));
        let installer = Installer::new(
            paths.packages_dir().to_path_buf(),
            toolchain,
            sync.clone(),
            events.clone(),
        );

        Ok(Self {
            paths,
            store,
            installer,
            supervisor,
            sync,
            events,
        })
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn list_packages(&self) -> Result<Vec<PackageRecord>, ManagerError> {
        load_records(&*self.lock())
    }

    pub fn get_package(&self, id: &str) -> Result<PackageRecord, ManagerError> {
        find_record(&*self.lock(), id)
    }

    /// Saved settings for `id`; empty when none were saved.
    pub fn get_settings(&self, id: &str) -> Result<Settings, ManagerError> {
        Ok(read_settings(&*self.lock(), id))
    }

    /// Replace the package's settings and refresh the `env` of its external
    /// config entry. Returns sync warnings.
    pub fn save_settings(&self, id: &str, settings: Settings) -> Result<Vec<String>, ManagerError> {
        {
            let mut store = self.lock();
            let value = serde_json::to_value(&settings).map_err(StoreError::Serialize)?;
            set_member(&mut *store, SETTINGS_KEY, id, Some(value))?;
        }
        tracing::info!(package_id = %id, keys = settings.len(), "Settings saved");

        let mut warnings = Vec::new();
        self.record_sync(id, self.sync.update_env(id, &settings), &mut warnings);
        Ok(warnings)
    }

    /// Extract, classify and register a package archive. The package is left uninstalled.
    pub async fn import_package(&self, archive_path: &Path) -> Result<ImportOutcome, ManagerError> {
        std::fs::create_dir_all(&self.paths.data_dir)?;
        let scratch = tempfile::Builder::new()
            .prefix("import-")
            .tempdir_in(&self.paths.data_dir)?;

        archive::extract_zip(archive_path, scratch.path())?;
        let root = archive::package_root(scratch.path())?;
        let descriptor = inspect::classify(&root)?.ok_or(ManagerError::UnknownPackageType)?;

        let id = descriptor
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .or_else(|| descriptor.name.as_deref().map(slugify))
            .filter(|id| id.chars().any(|c| c.is_ascii_alphanumeric()))
            .ok_or(ManagerError::MissingIdentity)?;
        let Some(target) = self.paths.package_dir(&id) else {
            return Err(ManagerError::InvalidId(id));
        };
        if self.supervisor.is_running(&id) {
            return Err(ManagerError::Busy(id));
        }

        // The old files go away below, so the old record must stop claiming them first.
        let mut warnings = Vec::new();
        self.retire(&id, &mut warnings)?;
        fsutil::remove_dir_with_retry(&target, REMOVE_ATTEMPTS, REMOVE_BACKOFF).await?;
        fsutil::move_dir(&root, &target)?;

        let has_config = descriptor.has_config();
        let record = PackageRecord {
            id: id.clone(),
            name: descriptor.name.clone().unwrap_or_else(|| id.clone()),
            description: descriptor.description.clone().unwrap_or_default(),
            version: descriptor.version.clone(),
            package_type: descriptor.package_type,
            path: Some(target.clone()),
            main_script: Some(descriptor.main_script.clone()),
            installed: false,
            running: false,
            is_typescript: descriptor.is_typescript,
            needs_compilation: descriptor.needs_compilation,
            has_config,
            config_schema: descriptor.config_schema.clone(),
            ai_tools: descriptor.ai_tools.clone().unwrap_or_else(default_ai_tools),
        };
        self.upsert(record)?;
        tracing::info!(package_id = %id, package_type = %descriptor.package_type, dir = %target.display(), "Package imported");

        Ok(ImportOutcome {
            id,
            has_config,
            package_type: descriptor.package_type,
            warnings,
        })
    }

    /// Run the install pipeline and expose the package to `selected_tools`.
    pub async fn install(&self, id: &str, selected_tools: &[String]) -> Result<InstallOutcome, ManagerError> {
        let record = self.get_package(id)?;
        let settings = self.get_settings(id)?;

        let outcome = self.installer.install(record, &settings, selected_tools).await?;

        let mut store = self.lock();
        let mut records = load_records(&*store)?;
        let slot = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        let running = slot.running;
        *slot = outcome.record.clone();
        slot.running = running;
        save_records(&mut *store, &records)?;

        Ok(outcome)
    }

    /// Stop, delete files, drop the external entry and settings. File removal
    /// failures become warnings.
    pub async fn uninstall(&self, id: &str) -> Result<UninstallOutcome, ManagerError> {
        let record = self.get_package(id)?;
        let mut warnings = Vec::new();

        if self.supervisor.is_running(id) {
            if let Err(e) = self.supervisor.stop(id) {
                tracing::debug!(package_id = %id, error = %e, "Stop before uninstall failed");
            }
            tokio::time::sleep(UNINSTALL_GRACE).await;
        }

        if let Some(dir) = &record.path {
            self.remove_package_dir(id, dir, &mut warnings).await;
        }

        self.record_sync(id, self.sync.remove(id), &mut warnings);

        let removed_from_list = !record.is_default();
        {
            let mut store = self.lock();
            let mut records = load_records(&*store)?;
            if removed_from_list {
                records.retain(|r| r.id != id);
            } else if let Some(default) = records.iter_mut().find(|r| r.id == id) {
                default.installed = false;
                default.running = false;
                default.path = None;
                default.main_script = None;
            }
            save_records(&mut *store, &records)?;
            set_member(&mut *store, SETTINGS_KEY, id, None)?;
        }

        tracing::info!(package_id = %id, removed_from_list, warnings = warnings.len(), "Package uninstalled");
        Ok(UninstallOutcome {
            id: id.to_string(),
            removed_from_list,
            warnings,
        })
    }

    /// Launch an installed package. Must be called from within a Tokio runtime.
    pub fn start(&self, id: &str) -> Result<Option<u32>, ManagerError> {
        // Held across the launch so a fast exit cannot clear `running` before it is set.
        let mut store = self.lock();
        let mut records = load_records(&*store)?;
        let settings = read_settings(&*store, id);
        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        let pid = self.supervisor.start(record, &settings)?;
        record.running = true;
        save_records(&mut *store, &records)?;
        Ok(pid)
    }

    /// Request termination. The registry is updated once the process exits.
    pub fn stop(&self, id: &str) -> Result<(), ManagerError> {
        self.get_package(id)?;
        self.supervisor.stop(id)?;
        Ok(())
    }

    /// Request termination of every running package.
    pub fn stop_all(&self) -> Vec<String> {
        self.supervisor.stop_all()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.supervisor.is_running(id)
    }

    /// Flip one AI tool's connection and reconcile the external config.
    ///
    /// Connecting a tool that requires credentials fails until credentials for it are saved.
    pub fn toggle_tool_connection(&self, id: &str, tool_id: &str) -> Result<ToolToggle, ManagerError> {
        let (record, settings, connected) = {
            let mut store = self.lock();
            let mut records = load_records(&*store)?;
            let has_credentials = get_member(&*store, CREDENTIALS_KEY, tool_id).is_some();
            let record = records
                .iter_mut()
                .find(|r| r.id == id)
                .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
            let tool = record
                .ai_tools
                .iter_mut()
                .find(|t| t.id == tool_id)
                .ok_or_else(|| ManagerError::UnknownTool {
                    id: id.to_string(),
                    tool_id: tool_id.to_string(),
                })?;

            if !tool.connected && tool.requires_credentials && !has_credentials {
                return Err(ManagerError::RequiresCredentials(tool_id.to_string()));
            }
            tool.connected = !tool.connected;
            let connected = tool.connected;
            let record = record.clone();
            save_records(&mut *store, &records)?;
            (record, read_settings(&*store, id), connected)
        };
        tracing::info!(package_id = %id, tool_id, connected, "AI tool toggled");

        let mut warnings = Vec::new();
        self.record_sync(id, self.sync.sync(&record, &settings, &[]), &mut warnings);
        Ok(ToolToggle {
            id: id.to_string(),
            tool_id: tool_id.to_string(),
            connected,
            warnings,
        })
    }

    /// Store an opaque credential blob for an AI tool.
    pub fn save_credentials(&self, tool_id: &str, credentials: Value) -> Result<(), ManagerError> {
        set_member(&mut *self.lock(), CREDENTIALS_KEY, tool_id, Some(credentials))?;
        tracing::info!(tool_id, "Credentials saved");
        Ok(())
    }

    /// Mark an existing record as not installed and drop its external entry.
    fn retire(&self, id: &str, warnings: &mut Vec<String>) -> Result<(), ManagerError> {
        {
            let mut store = self.lock();
            let mut records = load_records(&*store)?;
            match records.iter_mut().find(|r| r.id == id) {
                Some(record) if record.installed => {
                    record.installed = false;
                    save_records(&mut *store, &records)?;
                }
                _ => {}
            }
        }
        self.record_sync(id, self.sync.remove(id), warnings);
        Ok(())
    }

    fn upsert(&self, record: PackageRecord) -> Result<(), ManagerError> {
        let mut store = self.lock();
        let mut records = load_records(&*store)?;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        save_records(&mut *store, &records)
    }

    async fn remove_package_dir(&self, id: &str, dir: &Path, warnings: &mut Vec<String>) {
        if !self.paths.is_managed(dir) {
            self.warn(
                id,
                warnings,
                format!("{} is outside the managed directory, left in place", dir.display()),
            );
            return;
        }
        if let Err(e) = fsutil::remove_dir_with_retry(dir, REMOVE_ATTEMPTS, REMOVE_BACKOFF).await {
            self.warn(id, warnings, format!("Could not remove {}: {e}", dir.display()));
        }
    }

    fn record_sync(&self, id: &str, result: Result<SyncReport, SyncError>, warnings: &mut Vec<String>) {
        match result {
            Ok(report) => {
                for warning in report.warnings {
                    self.warn(id, warnings, warning);
                }
            }
            Err(e) => self.warn(id, warnings, format!("External config not updated: {e}")),
        }
    }

    fn warn(&self, id: &str, warnings: &mut Vec<String>, message: String) {
        self.events.warn(id, message.clone());
        warnings.push(message);
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: RegistryStore> Drop for Manager<S> {
    fn drop(&mut self) {
        let stopped = self.supervisor.stop_all();
        if !stopped.is_empty() {
            tracing::debug!(count = stopped.len(), "Manager dropped with running packages");
        }
    }
}

/// Lower-case id derived from a display name. Characters other than ASCII
/// alphanumerics, `-` and `_` become `-`.
pub fn slugify(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

fn load_records<S: RegistryStore>(store: &S) -> Result<Vec<PackageRecord>, ManagerError> {
    match store.get(SERVERS_KEY) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(ManagerError::Corrupt),
    }
}

fn save_records<S: RegistryStore>(store: &mut S, records: &[PackageRecord]) -> Result<(), ManagerError> {
    let value = serde_json::to_value(records).map_err(StoreError::Serialize)?;
    store.set(SERVERS_KEY, value)?;
    Ok(())
}

fn find_record<S: RegistryStore>(store: &S, id: &str) -> Result<PackageRecord, ManagerError> {
    load_records(store)?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| ManagerError::NotFound(id.to_string()))
}

fn mark_stopped<S: RegistryStore>(store: &Mutex<S>, id: &str) -> Result<(), ManagerError> {
    let mut store = store.lock().unwrap_or_else(PoisonError::into_inner);
    let mut records = load_records(&*store)?;
    match records.iter_mut().find(|r| r.id == id) {
        Some(record) if record.running => {
            record.running = false;
            save_records(&mut *store, &records)
        }
        _ => Ok(()),
    }
}

/// Settings are stored as strings; other JSON scalars are read back in their text form.
fn read_settings<S: RegistryStore>(store: &S, id: &str) -> Settings {
    let Some(Value::Object(map)) = get_member(store, SETTINGS_KEY, id) else {
        return Settings::new();
    };
    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect()
}

/// `group[member]`. Members are addressed inside the group object so ids may contain dots.
fn get_member<S: RegistryStore>(store: &S, group: &str, member: &str) -> Option<Value> {
    match store.get(group)? {
        Value::Object(mut map) => map.remove(member),
        _ => None,
    }
}

/// Set (`Some`) or delete (`None`) `group[member]`.
fn set_member<S: RegistryStore>(
    store: &mut S,
    group: &str,
    member: &str,
    value: Option<Value>,
) -> Result<(), StoreError> {
    let mut map = match store.get(group) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    match value {
        Some(value) => {
            map.insert(member.to_string(), value);
        }
        None => {
            if map.shift_remove(member).is_none() {
                return Ok(());
            }
        }
    }
    store.set(group, Value::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use tempfile::TempDir;

    fn manager(temp: &TempDir) -> Manager<JsonFileStore> {
        Manager::with_store(Paths::under(temp.path()), Toolchain::default(), JsonFileStore::in_memory()).unwrap()
    }

    #[test]
    fn slug_replaces_and_lowercases() {
        assert_eq!(slugify("My Server v2"), "my-server-v2");
        assert_eq!(slugify("weather_api"), "weather_api");
        assert_eq!(slugify("@scope/pkg"), "-scope-pkg");
    }

    #[test]
    fn empty_registry_seeded_with_default() {
        let temp = TempDir::new().unwrap();
        let packages = manager(&temp).list_packages().unwrap();
        assert_eq!(packages.len(), 1);
        assert!(packages[0].is_default());
        assert!(!packages[0].installed);
    }

    #[test]
    fn stale_running_flags_cleared() {
        let temp = TempDir::new().unwrap();
        let mut store = JsonFileStore::in_memory();
        let mut record = PackageRecord::default_package();
        record.running = true;
        store
            .set(SERVERS_KEY, serde_json::to_value(vec![record]).unwrap())
            .unwrap();

        let manager = Manager::with_store(Paths::under(temp.path()), Toolchain::default(), store).unwrap();
        assert!(!manager.list_packages().unwrap()[0].running);
    }

    #[test]
    fn settings_saved_wholesale_for_dotted_ids() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let mut settings = Settings::new();
        settings.insert("apiKey".to_string(), "k".to_string());

        manager.save_settings("acme.weather", settings.clone()).unwrap();
        assert_eq!(manager.get_settings("acme.weather").unwrap(), settings);

        manager.save_settings("acme.weather", Settings::new()).unwrap();
        assert!(manager.get_settings("acme.weather").unwrap().is_empty());
        assert!(manager.get_settings("other").unwrap().is_empty());
    }

    #[test]
    fn connecting_tool_requires_credentials() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        let id = crate::models::DEFAULT_PACKAGE_ID;

        let err = manager.toggle_tool_connection(id, "claude").unwrap_err();
        assert!(matches!(err, ManagerError::RequiresCredentials(ref t) if t == "claude"));

        manager
            .save_credentials("claude", serde_json::json!({"token": "t"}))
            .unwrap();
        let toggled = manager.toggle_tool_connection(id, "claude").unwrap();
        assert!(toggled.connected);

        let toggled = manager.toggle_tool_connection(id, "claude").unwrap();
        assert!(!toggled.connected);
    }

    #[test]
    fn unknown_package_and_tool_reported() {
        let temp = TempDir::new().unwrap();
        let manager = manager(&temp);
        assert!(matches!(manager.get_package("nope"), Err(ManagerError::NotFound(_))));
        assert!(matches!(
            manager.toggle_tool_connection(crate::models::DEFAULT_PACKAGE_ID, "vim"),
            Err(ManagerError::UnknownTool { .. })
        ));
    }

    #[tokio::test]
    async fn unmanaged_directories_survive_uninstall_with_warning() {
        let temp = TempDir::new().unwrap();
        let paths = Paths::under(temp.path());
        let outside = temp.path().join("elsewhere");
        let escaped = paths.packages_dir().join("../victim");

        let mut records = vec![PackageRecord::default_package()];
        for (id, dir) in [("stray", &outside), ("sneaky", &escaped)] {
            std::fs::create_dir_all(dir).unwrap();
            std::fs::write(dir.join("notes.txt"), "keep").unwrap();
            let mut record = PackageRecord::default_package();
            record.id = id.to_string();
            record.path = Some(dir.clone());
            record.installed = true;
            records.push(record);
        }
        let mut store = JsonFileStore::in_memory();
        store
            .set(SERVERS_KEY, serde_json::to_value(records).unwrap())
            .unwrap();
        let manager = Manager::with_store(paths, Toolchain::default(), store).unwrap();

        for id in ["stray", "sneaky"] {
            let mut settings = Settings::new();
            settings.insert("apiKey".to_string(), "k".to_string());
            manager.save_settings(id, settings).unwrap();

            let outcome = manager.uninstall(id).await.unwrap();

            assert!(outcome.removed_from_list);
            assert_eq!(outcome.warnings.len(), 1, "{:?}", outcome.warnings);
            assert!(outcome.warnings[0].contains("outside the managed directory"));
            assert!(matches!(manager.get_package(id), Err(ManagerError::NotFound(_))));
            assert!(manager.get_settings(id).unwrap().is_empty());
        }
        assert!(outside.join("notes.txt").is_file());
        assert!(escaped.join("notes.txt").is_file());
    }

    #[test]
    fn configuration_errors_lifted() {
        let missing = MissingConfiguration {
            schema: Default::default(),
            missing: vec!["apiKey".to_string()],
        };
        let err: ManagerError = InstallError::RequiresConfiguration(missing.clone()).into();
        assert!(matches!(err, ManagerError::RequiresConfiguration(_)));
        let err: ManagerError = SupervisorError::RequiresConfiguration(missing).into();
        assert!(matches!(err, ManagerError::RequiresConfiguration(_)));
    }
}
