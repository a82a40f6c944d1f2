//! mcpdesk - MCP package manager
//!
//! Imports MCP server packages from zip archives, installs them behind a
//! canonical `bin/index.js` entry point, exposes them to AI tools through an
//! external `mcp.json`, and supervises their processes.

pub mod archive;
pub mod config;
pub mod events;
pub mod fsutil;
pub mod inspect;
pub mod install;
pub mod manager;
pub mod models;
pub mod paths;
pub mod response;
pub mod store;
pub mod stream;
pub mod supervisor;
pub mod sync;
pub mod toolchain;

pub use config::{MissingConfiguration, Settings};
pub use events::{EventBus, PackageEvent};
pub use install::{EntryResolution, InstallError, InstallOutcome, Installer};
pub use manager::{ImportOutcome, Manager, ManagerError, ToolToggle, UninstallOutcome};
pub use models::{AiTool, ConfigSchema, PackageRecord, PackageType};
pub use paths::Paths;
pub use response::Response;
pub use store::{JsonFileStore, RegistryStore, StoreError};
pub use supervisor::{Supervisor, SupervisorError};
pub use sync::{ConfigSync, SyncAction, SyncError, SyncReport};
pub use toolchain::Toolchain;
