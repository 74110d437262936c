use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::SkillforgeConfig,
};

/// Project config file names, checked in order in every directory.
pub const CONFIG_FILENAMES: &[&str] = &[".skillforge.yaml", ".skillforge.yml"];

/// Search `start` and then each ancestor directory for a project config file.
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    start.ancestors().find_map(|dir| {
        CONFIG_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.is_file())
    })
}

/// Load and parse a config file. An empty file yields the defaults.
pub fn load_config(path: &Path) -> Result<SkillforgeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    if raw.trim().is_empty() {
        return Ok(SkillforgeConfig::default());
    }

    let parsed: Option<SkillforgeConfig> =
        serde_yaml::from_str(&raw).map_err(|source| Error::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(parsed.unwrap_or_default())
}

/// Find and load the project config starting from `start`.
///
/// Returns `SkillforgeConfig::default()` when no file is found or the file
/// cannot be loaded.
pub fn discover_and_load(start: &Path) -> SkillforgeConfig {
    let Some(path) = find_config_file(start) else {
        debug!(start = %start.display(), "no config file found, using defaults");
        return SkillforgeConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            SkillforgeConfig::default()
        },
    }
}
