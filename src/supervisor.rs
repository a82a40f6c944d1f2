//! Child process lifecycle for installed packages.
//!
//! Each package id has at most one live handle. A watcher task owns the child,
//! relays its output, and on exit (natural or requested) releases the handle and
//! publishes [`PackageEvent::Stopped`].

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::config::{check_required, launch_args, MissingConfiguration, Settings};
use crate::events::{EventBus, PackageEvent};
use crate::models::PackageRecord;
use crate::stream::{spawn_stream_reader, StreamKind};

/// How long the watcher waits for output readers after the child exits.
const READER_DRAIN: Duration = Duration::from_secs(1);

/// Called with the package id once its process has exited.
pub type ExitHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Package {0} is not installed")]
    NotInstalled(String),

    #[error("Package {0} is already running")]
    AlreadyRunning(String),

    #[error("Package {0} is not running")]
    NotRunning(String),

    #[error("Package requires configuration: {0}")]
    RequiresConfiguration(MissingConfiguration),

    #[error("Entry file not found: {}", .0.display())]
    MissingEntry(PathBuf),

    #[error("Failed to start {id}: {source}")]
    Spawn { id: String, source: io::Error },
}

struct ProcessHandle {
    pid: Option<u32>,
    stop_tx: mpsc::Sender<()>,
}

pub struct Supervisor {
    runtime: String,
    events: EventBus,
    processes: Arc<Mutex<HashMap<String, ProcessHandle>>>,
    on_exit: Option<ExitHook>,
}

impl Supervisor {
    /// `runtime` is the interpreter that runs entry files.
    pub fn new(runtime: impl Into<String>, events: EventBus) -> Self {
        Self {
            runtime: runtime.into(),
            events,
            processes: Arc::new(Mutex::new(HashMap::new())),
            on_exit: None,
        }
    }

    pub fn with_exit_hook(mut self, hook: ExitHook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    /// Launch the package's entry file. Returns the OS pid when known.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, record: &PackageRecord, settings: &Settings) -> Result<Option<u32>, SupervisorError> {
        let id = record.id.clone();
        if !record.installed {
            return Err(SupervisorError::NotInstalled(id));
        }

        let mut table = self.table();
        if table.contains_key(&id) {
            return Err(SupervisorError::AlreadyRunning(id));
        }
        check_required(record, settings).map_err(SupervisorError::RequiresConfiguration)?;

        let entry = record
            .entry_path()
            .filter(|p| p.is_file())
            .ok_or_else(|| SupervisorError::MissingEntry(record.entry_path().unwrap_or_default()))?;
        let args = launch_args(record, settings);

        let mut cmd = Command::new(&self.runtime);
        cmd.arg(&entry)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &record.path {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
            id: id.clone(),
            source,
        })?;

        let pid = child.id();
        let (stop_tx, stop_rx) = mpsc::channel(1);
        table.insert(id.clone(), ProcessHandle { pid, stop_tx });
        drop(table);

        tracing::info!(package_id = %id, ?pid, entry = %entry.display(), extra_args = args.len(), "Package started");
        self.spawn_watcher(id, child, stop_rx);
        Ok(pid)
    }

    /// Request termination. Does not wait for the process to exit.
    pub fn stop(&self, id: &str) -> Result<(), SupervisorError> {
        let table = self.table();
        let handle = table
            .get(id)
            .ok_or_else(|| SupervisorError::NotRunning(id.to_string()))?;

        // A full channel means a request is already pending.
        let _ = handle.stop_tx.try_send(());
        tracing::info!(package_id = %id, pid = ?handle.pid, "Stop requested");
        Ok(())
    }

    /// Request termination of every live process. Returns the affected ids.
    pub fn stop_all(&self) -> Vec<String> {
        let table = self.table();
        for handle in table.values() {
            let _ = handle.stop_tx.try_send(());
        }
        let ids: Vec<String> = table.keys().cloned().collect();
        if !ids.is_empty() {
            tracing::info!(count = ids.len(), "Stopping all packages");
        }
        ids
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.table().contains_key(id)
    }

    pub fn running_ids(&self) -> Vec<String> {
        self.table().keys().cloned().collect()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, ProcessHandle>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_watcher(&self, id: String, mut child: Child, mut stop_rx: mpsc::Receiver<()>) {
        let readers: Vec<_> = [
            child
                .stdout
                .take()
                .map(|s| spawn_stream_reader(s, id.clone(), StreamKind::Stdout, self.events.clone())),
            child
                .stderr
                .take()
                .map(|s| spawn_stream_reader(s, id.clone(), StreamKind::Stderr, self.events.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        // Held open for the life of the process; some servers exit on stdin EOF.
        let stdin = child.stdin.take();
        let processes = Arc::clone(&self.processes);
        let events = self.events.clone();
        let on_exit = self.on_exit.clone();

        tokio::spawn(async move {
            let status = loop {
                tokio::select! {
                    status = child.wait() => break status,
                    Some(()) = stop_rx.recv() => terminate(&mut child, &id),
                }
            };
            drop(stdin);

            for reader in readers {
                if tokio::time::timeout(READER_DRAIN, reader).await.is_err() {
                    tracing::debug!(package_id = %id, "Output reader still open after exit");
                }
            }

            let code = match status {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!(package_id = %id, error = %e, "Failed to wait for package process");
                    None
                }
            };
            processes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            if let Some(hook) = on_exit {
                hook(&id);
            }

            tracing::info!(package_id = %id, ?code, "Package stopped");
            events.emit(PackageEvent::Stopped { package_id: id, code });
        });
    }
}

/// Send SIGTERM. No escalation.
#[cfg(unix)]
fn terminate(child: &mut Child, id: &str) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    match signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
        Err(e) => tracing::warn!(package_id = %id, pid, error = %e, "Failed to send SIGTERM"),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, id: &str) {
    if let Err(e) = child.start_kill() {
        tracing::warn!(package_id = %id, error = %e, "Failed to terminate process");
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::models::{default_ai_tools, PackageType, CANONICAL_ENTRY};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    fn script_package(dir: &Path, script: &str) -> PackageRecord {
        let entry = dir.join(CANONICAL_ENTRY);
        std::fs::create_dir_all(entry.parent().unwrap()).unwrap();
        std::fs::write(&entry, script).unwrap();
        PackageRecord {
            id: "demo".to_string(),
            name: "Demo".to_string(),
            description: String::new(),
            version: None,
            package_type: PackageType::Simple,
            path: Some(dir.to_path_buf()),
            main_script: Some(CANONICAL_ENTRY.to_string()),
            installed: true,
            running: false,
            is_typescript: false,
            needs_compilation: false,
            has_config: false,
            config_schema: None,
            ai_tools: default_ai_tools(),
        }
    }

    async fn wait_stopped(rx: &mut broadcast::Receiver<PackageEvent>, lines: &mut Vec<String>) -> Option<i32> {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for exit")
                .unwrap();
            match event {
                PackageEvent::Output { line, .. } => lines.push(line),
                PackageEvent::Stopped { code, .. } => return code,
                _ => {}
            }
        }
    }

    #[tokio::test]
    async fn output_relayed_and_exit_reported() {
        let temp = TempDir::new().unwrap();
        let record = script_package(temp.path(), "echo hello\n");
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);
        let supervisor = Supervisor::new("sh", bus).with_exit_hook(Arc::new(move |id: &str| {
            assert_eq!(id, "demo");
            flag.store(true, Ordering::SeqCst);
        }));

        supervisor.start(&record, &Settings::new()).unwrap();
        let mut lines = Vec::new();
        let code = wait_stopped(&mut rx, &mut lines).await;

        assert_eq!(code, Some(0));
        assert_eq!(lines, vec!["hello".to_string()]);
        assert!(exited.load(Ordering::SeqCst));
        assert!(!supervisor.is_running("demo"));
    }

    #[tokio::test]
    async fn stop_terminates_and_releases_handle() {
        let temp = TempDir::new().unwrap();
        let record = script_package(temp.path(), "exec sleep 30\n");
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let supervisor = Supervisor::new("sh", bus);

        supervisor.start(&record, &Settings::new()).unwrap();
        assert!(supervisor.is_running("demo"));
        assert!(matches!(
            supervisor.start(&record, &Settings::new()),
            Err(SupervisorError::AlreadyRunning(_))
        ));

        supervisor.stop("demo").unwrap();
        let code = wait_stopped(&mut rx, &mut Vec::new()).await;

        assert_eq!(code, None);
        assert!(!supervisor.is_running("demo"));
        assert!(matches!(supervisor.stop("demo"), Err(SupervisorError::NotRunning(_))));
    }

    #[tokio::test]
    async fn not_installed_rejected_without_spawning() {
        let temp = TempDir::new().unwrap();
        let mut record = script_package(temp.path(), "echo never\n");
        record.installed = false;
        let supervisor = Supervisor::new("sh", EventBus::new());

        assert!(matches!(
            supervisor.start(&record, &Settings::new()),
            Err(SupervisorError::NotInstalled(_))
        ));
        assert!(supervisor.running_ids().is_empty());
    }

    #[tokio::test]
    async fn stop_all_reaches_every_process() {
        let temp = TempDir::new().unwrap();
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let supervisor = Supervisor::new("sh", bus);

        let mut first = script_package(&temp.path().join("a"), "exec sleep 30\n");
        first.id = "a".to_string();
        let mut second = script_package(&temp.path().join("b"), "exec sleep 30\n");
        second.id = "b".to_string();
        supervisor.start(&first, &Settings::new()).unwrap();
        supervisor.start(&second, &Settings::new()).unwrap();

        let mut ids = supervisor.stop_all();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        wait_stopped(&mut rx, &mut Vec::new()).await;
        wait_stopped(&mut rx, &mut Vec::new()).await;
        assert!(supervisor.running_ids().is_empty());
    }
}
