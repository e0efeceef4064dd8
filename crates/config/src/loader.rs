use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    schema::ParleyConfig,
};

/// Config file name, checked in `./` then in the config directory.
const CONFIG_FILENAME: &str = "parley.toml";

/// Resolve the config directory.
///
/// Resolution order:
/// 1. explicit override (`--config-dir` / `PARLEY_CONFIG_DIR`)
/// 2. the platform config dir (`~/.config/parley` on Linux)
/// 3. `./.config/parley`
pub fn config_dir(override_dir: Option<&Path>) -> PathBuf {
    if let Some(dir) = override_dir {
        return dir.to_path_buf();
    }
    directories::ProjectDirs::from("", "", "parley")
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".config/parley"))
}

/// Load `.env` from the working directory, if present.
///
/// Variables already set in the process environment win.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(e) if e.not_found() => debug!("no .env file found"),
        Err(e) => warn!(error = %e, "failed to load .env"),
    }
}

/// Load config from the given TOML file.
pub fn load_config(path: &Path) -> Result<ParleyConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| Error::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and load the config file.
///
/// Returns `ParleyConfig::default()` when no file exists. A file that
/// exists but cannot be parsed is an error rather than silently ignored,
/// since it usually carries the bot token.
pub fn discover_and_load(config_dir: &Path) -> Result<ParleyConfig> {
    match find_config_file(config_dir) {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path)
        },
        None => {
            debug!("no config file found, using defaults");
            Ok(ParleyConfig::default())
        },
    }
}

fn find_config_file(config_dir: &Path) -> Option<PathBuf> {
    let local = PathBuf::from(CONFIG_FILENAME);
    if local.exists() {
        return Some(local);
    }
    let global = config_dir.join(CONFIG_FILENAME);
    global.exists().then_some(global)
}
