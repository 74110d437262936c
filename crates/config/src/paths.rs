use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Environment variable overriding the user-level state directory.
pub const HOME_ENV: &str = "SKILLFORGE_HOME";

const STATE_DIRNAME: &str = ".skillforge";
const MANIFEST_FILENAME: &str = "manifest.json";
const REGISTRY_FILENAME: &str = "marketplaces.json";
const CACHE_DIRNAME: &str = "cache";

/// Filesystem locations every component is constructed from.
///
/// Nothing in the core reads the working directory or the home directory on
/// its own; callers resolve these once and pass them down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillforgePaths {
    /// Project whose installed skills are tracked.
    pub project_root: PathBuf,
    /// User-level state directory holding the marketplace registry.
    pub config_dir: PathBuf,
    /// Clone cache for remote marketplaces.
    pub cache_dir: PathBuf,
}

impl SkillforgePaths {
    pub fn new(project_root: impl Into<PathBuf>, config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        Self {
            project_root: project_root.into(),
            cache_dir: config_dir.join(CACHE_DIRNAME),
            config_dir,
        }
    }

    #[must_use]
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    /// Resolve `config_dir` from `$SKILLFORGE_HOME`, falling back to
    /// `~/.skillforge`.
    pub fn from_env_or_defaults(project_root: impl Into<PathBuf>) -> Result<Self> {
        Self::from_lookup(project_root, |name| std::env::var(name).ok())
    }

    fn from_lookup(
        project_root: impl Into<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let config_dir = match lookup(HOME_ENV).filter(|v| !v.trim().is_empty()) {
            Some(dir) => expand_tilde(Path::new(dir.trim())),
            None => default_config_dir()?,
        };
        Ok(Self::new(project_root, config_dir))
    }

    /// `<project_root>/.skillforge/manifest.json`
    pub fn manifest_file(&self) -> PathBuf {
        manifest_file(&self.project_root)
    }

    /// `<config_dir>/marketplaces.json`
    pub fn registry_file(&self) -> PathBuf {
        registry_file(&self.config_dir)
    }
}

pub fn manifest_file(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIRNAME).join(MANIFEST_FILENAME)
}

pub fn registry_file(config_dir: &Path) -> PathBuf {
    config_dir.join(REGISTRY_FILENAME)
}

/// `~/.skillforge`
pub fn default_config_dir() -> Result<PathBuf> {
    home_dir()
        .map(|home| home.join(STATE_DIRNAME))
        .ok_or(Error::NoHomeDir)
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Make `path` absolute against `base` and fold `.`/`..` components without
/// touching the filesystem.
pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                out.pop();
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
