//! Command handler modules for cem-cli.
//!
//! Shared utilities used by multiple command paths live here; command-
//! specific logic lives in the submodules.

pub mod db;
pub mod jobs;
pub mod reconciler;
pub mod review;
pub mod worker;

use anyhow::{Context, Result};
use cem_config::AppConfig;

/// Loads `AppConfig` the same way `cem-daemon::main` does: layered YAML
/// from `CEM_CONFIG_PATHS` (comma-separated) when set, bare defaults
/// otherwise, both overlaid with `CEM_*` secrets from the environment.
pub fn load_config() -> Result<AppConfig> {
    let paths = config_paths_from_env();
    if paths.is_empty() {
        return Ok(AppConfig::default().overlay_env());
    }
    let path_refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = cem_config::load_layered_yaml(&path_refs).context("loading layered config")?;
    Ok(AppConfig::from_loaded(&loaded)?.overlay_env())
}

fn config_paths_from_env() -> Vec<String> {
    std::env::var("CEM_CONFIG_PATHS")
        .ok()
        .map(|v| v.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}
