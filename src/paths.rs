//! Path resolution for the data directory and the external config file.
//!
//! Uses env vars when set, otherwise platform defaults.

use std::path::{Component, Path, PathBuf};

/// Directory name of managed packages, below the data directory.
const PACKAGES_DIR_NAME: &str = "mcp-servers";

/// File name of the registry store, below the data directory.
const STORE_FILE_NAME: &str = "mcp-manager-config.json";

/// Resolved paths for managed packages and external configuration.
#[derive(Debug, Clone)]
pub struct Paths {
    pub data_dir: PathBuf,
    pub packages_dir: PathBuf,
    pub store_path: PathBuf,
    pub external_config: PathBuf,
}

impl Paths {
    /// Resolve paths from environment, falling back to platform defaults.
    pub fn resolve() -> Self {
        let data_dir = resolve_path(
            "MCPDESK_DATA_DIR",
            dirs::data_local_dir().map(|p| p.join("mcpdesk")),
            "~/.local/share/mcpdesk",
        );
        let external_config = resolve_path(
            "MCPDESK_EXTERNAL_CONFIG",
            dirs::home_dir().map(|p| p.join(".cursor").join("mcp.json")),
            "~/.cursor/mcp.json",
        );

        Self::with_data_dir(data_dir, external_config)
    }

    /// Place everything below `root`. The external config lands at `root/external/mcp.json`.
    pub fn under(root: &Path) -> Self {
        Self::with_data_dir(
            root.join("data"),
            root.join("external").join("mcp.json"),
        )
    }

    fn with_data_dir(data_dir: PathBuf, external_config: PathBuf) -> Self {
        Self {
            packages_dir: data_dir.join(PACKAGES_DIR_NAME),
            store_path: data_dir.join(STORE_FILE_NAME),
            data_dir,
            external_config,
        }
    }

    /// Directory holding one managed subdirectory per package id.
    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    /// Managed directory of a single package. `None` unless `id` is a plain
    /// directory name.
    pub fn package_dir(&self, id: &str) -> Option<PathBuf> {
        is_valid_package_id(id).then(|| self.packages_dir.join(id))
    }

    /// Whether `dir` is exactly one level below the packages directory.
    pub fn is_managed(&self, dir: &Path) -> bool {
        dir.strip_prefix(&self.packages_dir)
            .ok()
            .and_then(Path::to_str)
            .is_some_and(is_valid_package_id)
    }

    /// Registry store file.
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// JSON file read by external AI tools.
    pub fn external_config(&self) -> &Path {
        &self.external_config
    }
}

/// A package id must name a single directory: no separators, no `.`/`..`,
/// no root, no drive prefix (`:`).
pub fn is_valid_package_id(id: &str) -> bool {
    if id.is_empty() || id.contains(['/', '\\', ':']) {
        return false;
    }
    let mut components = Path::new(id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(name)), None) if name == id
    )
}

fn resolve_path(env_var: &str, platform_default: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Ok(val) = std::env::var(env_var) {
        let trimmed = val.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }
    platform_default.unwrap_or_else(|| expand_tilde(fallback))
}

fn expand_tilde(path: &str) -> PathBuf {
    let expanded = shellexpand::tilde(path);
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_keeps_everything_below_root() {
        let paths = Paths::under(Path::new("/tmp/mcpdesk-test"));
        assert!(paths.packages_dir().starts_with("/tmp/mcpdesk-test"));
        assert!(paths.store_path().starts_with("/tmp/mcpdesk-test"));
        assert!(paths.external_config().starts_with("/tmp/mcpdesk-test"));
        assert_eq!(
            paths.package_dir("demo"),
            Some(PathBuf::from("/tmp/mcpdesk-test/data/mcp-servers/demo"))
        );
    }

    #[test]
    fn package_dir_rejects_paths() {
        let paths = Paths::under(Path::new("/tmp/mcpdesk-test"));
        for id in ["", ".", "..", "../victim", "/etc", "a/b", "a\\b", "C:evil"] {
            assert_eq!(paths.package_dir(id), None, "{id:?}");
        }
        assert!(paths.package_dir("weather.api-v2").is_some());
    }

    #[test]
    fn managed_means_one_level_below_packages() {
        let paths = Paths::under(Path::new("/tmp/mcpdesk-test"));
        assert!(paths.is_managed(&paths.packages_dir().join("demo")));
        assert!(!paths.is_managed(&paths.packages_dir().join("../victim")));
        assert!(!paths.is_managed(&paths.packages_dir().join("demo/nested")));
        assert!(!paths.is_managed(paths.packages_dir()));
        assert!(!paths.is_managed(Path::new("/tmp/elsewhere")));
    }

    #[test]
    fn tilde_is_expanded() {
        let expanded = expand_tilde("~/x");
        assert!(!expanded.to_string_lossy().starts_with('~'));
    }
}
