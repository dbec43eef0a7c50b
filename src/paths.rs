use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) const CONFIG_ENV: &str = "WATCHTRACK_CONFIG";

fn data_root() -> Result<PathBuf> {
    let base = dirs::data_dir().context("unable to resolve data directory")?;
    Ok(base.join("watchtrack"))
}

pub(crate) fn database_file_path() -> Result<PathBuf> {
    Ok(data_root()?.join("watchtrack.db"))
}

pub(crate) fn session_file_path() -> Result<PathBuf> {
    Ok(data_root()?.join("session.json"))
}

pub(crate) fn config_file_path() -> Result<PathBuf> {
    if let Ok(custom) = env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(custom));
    }
    let base = dirs::config_dir().context("unable to resolve config directory")?;
    Ok(base.join("watchtrack").join("config.toml"))
}
