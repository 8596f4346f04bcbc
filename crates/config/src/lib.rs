//! Configuration loading for sandboxed.
//!
//! Config files are discovered as `sandboxed.{toml,yaml,yml,json}` in the
//! working directory, then under `~/.config/sandboxed/`. `${VAR}` placeholders
//! are expanded from the environment before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{clear_config_dir, discover_and_load, load_config, set_config_dir},
    schema::{Backend, ClusterConfig, LifecycleConfig, SandboxedConfig, ServerConfig},
};
