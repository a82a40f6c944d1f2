//! External commands the installer and supervisor shell out to.

/// Runtime interpreter, dependency installer, and package runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    /// Interpreter that runs entry files (`node`).
    pub runtime: String,
    /// Dependency installer (`npm`). Also runs declared build scripts.
    pub package_manager: String,
    /// Package runner used for the direct compiler fallback (`npx tsc`).
    pub runner: String,
}

impl Toolchain {
    /// Resolve commands from `MCPDESK_NODE`, `MCPDESK_NPM`, `MCPDESK_NPX`.
    pub fn resolve() -> Self {
        let defaults = Self::default();
        Self {
            runtime: env_or("MCPDESK_NODE", defaults.runtime),
            package_manager: env_or("MCPDESK_NPM", defaults.package_manager),
            runner: env_or("MCPDESK_NPX", defaults.runner),
        }
    }
}

impl Default for Toolchain {
    fn default() -> Self {
        let (npm, npx) = if cfg!(windows) {
            ("npm.cmd", "npx.cmd")
        } else {
            ("npm", "npx")
        };
        Self {
            runtime: "node".to_string(),
            package_manager: npm.to_string(),
            runner: npx.to_string(),
        }
    }
}

fn env_or(var: &str, default: String) -> String {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => default,
    }
}
