use std::{
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use tracing::debug;

use crate::{env_subst::substitute_env, schema::SandboxedConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "sandboxed.toml",
    "sandboxed.yaml",
    "sandboxed.yml",
    "sandboxed.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

/// Set a custom config directory. When set, config discovery only looks in
/// this directory (project-local and user-global paths are skipped).
pub fn set_config_dir(path: PathBuf) {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
}

fn config_dir_override() -> Option<PathBuf> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<SandboxedConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path).map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./sandboxed.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/sandboxed/sandboxed.{toml,yaml,yml,json}` (user-global)
///
/// Returns `SandboxedConfig::default()` if no config file is found. A file
/// that exists but fails to load is an error.
pub fn discover_and_load() -> anyhow::Result<SandboxedConfig> {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return Ok(SandboxedConfig::default());
    };
    debug!(path = %path.display(), "loading config");
    load_config(&path)
}

/// Find the first config file in standard locations.
///
/// When a config dir override is set, only that directory is searched.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }

    if let Some(path) = first_existing(Path::new("")) {
        return Some(path);
    }

    user_config_dir().and_then(|dir| first_existing(&dir))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

fn user_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("sandboxed"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<SandboxedConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
