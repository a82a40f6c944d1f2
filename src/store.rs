//! Durable key-value registry with dotted-path keys (`group.subkey`).

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read registry: {0}")]
    Read(std::io::Error),

    #[error("Failed to parse registry: {0}")]
    Parse(serde_json::Error),

    #[error("Failed to serialize registry value: {0}")]
    Serialize(serde_json::Error),

    #[error("Failed to write registry: {0}")]
    Write(std::io::Error),

    #[error("Registry key is empty")]
    EmptyKey,

    #[error("Registry key does not address an object: {0}")]
    NotAnObject(String),
}

/// Mapping from string keys to JSON values that survives restarts.
pub trait RegistryStore: Send + 'static {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;

    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError>;
}

/// Registry backed by one pretty-printed JSON document.
///
/// Without a path the store lives only in memory.
#[derive(Debug, Clone, Default)]
pub struct JsonFileStore {
    path: Option<PathBuf>,
    root: Map<String, Value>,
}

impl JsonFileStore {
    /// Open (or lazily create) the registry file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let root = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => match serde_json::from_str::<Value>(&content).map_err(StoreError::Parse)? {
                Value::Object(map) => map,
                _ => {
                    tracing::warn!(path = %path.display(), "Registry root is not an object, starting empty");
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(StoreError::Read(e)),
        };

        Ok(Self {
            path: Some(path.to_path_buf()),
            root,
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Write `root` to disk, then adopt it. On failure the previous state is kept.
    fn commit(&mut self, root: Map<String, Value>) -> Result<(), StoreError> {
        self.persist(&root)?;
        self.root = root;
        Ok(())
    }

    fn persist(&self, root: &Map<String, Value>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
        }
        let output =
            serde_json::to_string_pretty(root).map_err(StoreError::Serialize)?;
        let temp = path.with_extension("json.tmp");
        std::fs::write(&temp, output).map_err(StoreError::Write)?;
        std::fs::rename(&temp, path).map_err(StoreError::Write)?;
        Ok(())
    }
}

fn segments(key: &str) -> Result<Vec<&str>, StoreError> {
    let parts: Vec<&str> = key.split('.').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Err(StoreError::EmptyKey);
    }
    Ok(parts)
}

impl RegistryStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Value> {
        let parts = segments(key).ok()?;
        let (first, rest) = parts.split_first()?;
        let mut current = self.root.get(*first)?;
        for part in rest {
            current = current.get(*part)?;
        }
        Some(current.clone())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        let parts = segments(key)?;
        let (last, parents) = parts.split_last().ok_or(StoreError::EmptyKey)?;

        let mut root = self.root.clone();
        let mut current = &mut root;
        for part in parents {
            let slot = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            current = slot
                .as_object_mut()
                .ok_or_else(|| StoreError::NotAnObject(key.to_string()))?;
        }
        current.insert(last.to_string(), value);

        self.commit(root)
    }

    fn delete(&mut self, key: &str) -> Result<(), StoreError> {
        let parts = segments(key)?;
        let (last, parents) = parts.split_last().ok_or(StoreError::EmptyKey)?;

        let mut root = self.root.clone();
        let mut current = &mut root;
        for part in parents {
            current = match current.get_mut(*part) {
                Some(Value::Object(map)) => map,
                _ => return Ok(()),
            };
        }
        if current.shift_remove(*last).is_none() {
            return Ok(());
        }
        self.commit(root)
    }
}
