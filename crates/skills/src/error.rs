use std::path::PathBuf;

/// Broad failure category, for callers that branch on the kind of failure
/// rather than on a specific variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    NotFound,
    AlreadyExists,
    Fetch,
    InvalidSpec,
    Io,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("skill directory not found: {}", path.display())]
    SkillDirNotFound { path: PathBuf },

    #[error("failed to parse skill at {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("skill '{name}' not found. Available skills: {}", list_or_none(available))]
    SkillNotFound { name: String, available: Vec<String> },

    #[error(
        "skill '{name}' is already installed at {path}. Uninstall it first with \
         'skillforge uninstall {name}', or reinstall with --force."
    )]
    SkillAlreadyInstalled { name: String, path: String },

    #[error("skill '{name}' is not installed. Installed skills: {}", list_or_none(installed))]
    SkillNotInstalled { name: String, installed: Vec<String> },

    #[error(
        "marketplace '{name}' not found. Configured marketplaces: {}. Add one with \
         'skillforge marketplace add <source>'.",
        list_or_none(available)
    )]
    MarketplaceNotFound { name: String, available: Vec<String> },

    #[error(
        "marketplace '{name}' already exists. Remove it first with \
         'skillforge marketplace remove {name}'."
    )]
    MarketplaceExists { name: String },

    #[error(
        "skill '{skill}' not found in marketplace '{marketplace}'. Available skills: {}",
        marketplace_skills(available)
    )]
    SkillNotInMarketplace {
        skill: String,
        marketplace: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Fetch(String),

    #[error("invalid skill spec: {0}")]
    InvalidSpec(String),

    #[error(
        "unrecognized marketplace source '{input}'. Expected one of: owner/repo, \
         github:owner/repo, https://host/owner/repo.git, git@host:owner/repo.git, \
         ./path, /path, ~/path"
    )]
    InvalidSource { input: String },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::SkillDirNotFound { .. }
            | Self::SkillNotFound { .. }
            | Self::SkillNotInstalled { .. }
            | Self::MarketplaceNotFound { .. }
            | Self::SkillNotInMarketplace { .. } => ErrorKind::NotFound,
            Self::SkillAlreadyInstalled { .. } | Self::MarketplaceExists { .. } => {
                ErrorKind::AlreadyExists
            },
            Self::Fetch(_) => ErrorKind::Fetch,
            Self::InvalidSpec(_) | Self::InvalidSource { .. } => ErrorKind::InvalidSpec,
            Self::Io { .. } | Self::Json { .. } => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

fn list_or_none(names: &[String]) -> String {
    if names.is_empty() {
        "(none)".into()
    } else {
        names.join(", ")
    }
}

fn marketplace_skills(names: &[String]) -> String {
    if names.is_empty() {
        "(none - run 'skillforge marketplace update' first)".into()
    } else {
        names.join(", ")
    }
}
