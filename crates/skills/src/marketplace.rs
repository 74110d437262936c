//! Marketplace model and source-string parsing.
//!
//! A marketplace is one of three kinds of skill source. Each kind carries only
//! the location it needs: a clone URL for GitHub and plain git sources, a
//! directory for local ones. Remote marketplaces additionally remember their
//! cache checkout once cloned.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    skillforge_config::paths::{absolutize, expand_tilde},
};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    #[serde(rename = "github")]
    Github,
    #[serde(rename = "git")]
    GitUrl,
    #[serde(rename = "local")]
    Local,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::GitUrl => "git",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a marketplace's skills come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketplaceLocation {
    Github { remote_url: String },
    GitUrl { remote_url: String },
    Local { path: PathBuf },
}

impl MarketplaceLocation {
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Github { .. } => SourceKind::Github,
            Self::GitUrl { .. } => SourceKind::GitUrl,
            Self::Local { .. } => SourceKind::Local,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Github { remote_url } | Self::GitUrl { remote_url } => Some(remote_url),
            Self::Local { .. } => None,
        }
    }
}

/// Skill metadata advertised by a marketplace. No instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceSkill {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Breadcrumb such as `github:owner/repo/skills/name`.
    pub source: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marketplace {
    /// Registry key, derived from `source`.
    pub name: String,
    /// The string the user added, kept for display.
    pub source: String,
    pub location: MarketplaceLocation,
    /// Empty until the first metadata refresh.
    pub skills: Vec<MarketplaceSkill>,
    /// Cache clone of a remote marketplace. Always `None` for local ones.
    pub checkout: Option<PathBuf>,
}

impl Marketplace {
    pub fn new(parsed: ParsedSource) -> Self {
        Self {
            name: parsed.name,
            source: parsed.source,
            location: parsed.location,
            skills: Vec::new(),
            checkout: None,
        }
    }

    pub fn kind(&self) -> SourceKind {
        self.location.kind()
    }

    /// Directory holding the marketplace's files, if there is one yet.
    pub fn local_path(&self) -> Option<&Path> {
        match &self.location {
            MarketplaceLocation::Local { path } => Some(path),
            _ => self.checkout.as_deref(),
        }
    }

    pub fn find_skill(&self, name: &str) -> Option<&MarketplaceSkill> {
        self.skills.iter().find(|s| s.name == name)
    }

    /// Sorted names of the cached skills.
    pub fn skill_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.skills.iter().map(|s| s.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// `<kind>:<marketplace>/<rel>`, or `<kind>:<marketplace>` at the root.
    pub fn breadcrumb(&self, relative: &Path) -> String {
        let rel = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        if rel.is_empty() {
            format!("{}:{}", self.kind(), self.name)
        } else {
            format!("{}:{}/{rel}", self.kind(), self.name)
        }
    }
}

/// On-disk shape of a marketplace inside `marketplaces.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketplaceRecord {
    pub name: String,
    pub source: String,
    pub source_type: SourceKind,
    #[serde(default)]
    pub skills: Vec<MarketplaceSkill>,
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    #[serde(default)]
    pub remote_url: Option<String>,
}

impl TryFrom<MarketplaceRecord> for Marketplace {
    type Error = String;

    fn try_from(record: MarketplaceRecord) -> std::result::Result<Self, String> {
        let (location, checkout) = match record.source_type {
            SourceKind::Local => {
                let path = record
                    .local_path
                    .ok_or_else(|| format!("local marketplace '{}' has no local_path", record.name))?;
                (MarketplaceLocation::Local { path }, None)
            },
            kind @ (SourceKind::Github | SourceKind::GitUrl) => {
                let remote_url = record
                    .remote_url
                    .filter(|url| !url.trim().is_empty())
                    .ok_or_else(|| format!("{kind} marketplace '{}' has no remote_url", record.name))?;
                let location = if kind == SourceKind::Github {
                    MarketplaceLocation::Github { remote_url }
                } else {
                    MarketplaceLocation::GitUrl { remote_url }
                };
                (location, record.local_path)
            },
        };

        if !is_safe_name(&record.name) {
            return Err(format!("marketplace name '{}' is not usable as a directory", record.name));
        }

        Ok(Self {
            name: record.name,
            source: record.source,
            location,
            skills: record.skills,
            checkout,
        })
    }
}

impl From<&Marketplace> for MarketplaceRecord {
    fn from(marketplace: &Marketplace) -> Self {
        let (local_path, remote_url) = match &marketplace.location {
            MarketplaceLocation::Local { path } => (Some(path.clone()), None),
            MarketplaceLocation::Github { remote_url } | MarketplaceLocation::GitUrl { remote_url } => {
                (marketplace.checkout.clone(), Some(remote_url.clone()))
            },
        };
        Self {
            name: marketplace.name.clone(),
            source: marketplace.source.clone(),
            source_type: marketplace.kind(),
            skills: marketplace.skills.clone(),
            local_path,
            remote_url,
        }
    }
}

/// Result of recognising a marketplace source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSource {
    pub name: String,
    pub source: String,
    pub location: MarketplaceLocation,
}

/// Parse a source string, resolving relative local paths against the current
/// directory.
pub fn parse_source(source: &str) -> Result<ParsedSource> {
    let cwd = std::env::current_dir().map_err(|e| Error::io(".", e))?;
    parse_source_in(source, &cwd)
}

/// Parse a source string, resolving relative local paths against `base_dir`.
///
/// Recognised in order: `github:owner/repo`, `git:<url>` / `git@host:path`,
/// `http(s)://` URLs, local paths (`./`, `/`, `~`), then bare `owner/repo`.
pub fn parse_source_in(source: &str, base_dir: &Path) -> Result<ParsedSource> {
    let trimmed = source.trim();
    let invalid = || Error::InvalidSource {
        input: source.to_string(),
    };

    if let Some(repo) = trimmed.strip_prefix("github:") {
        let repo = repo.trim().trim_end_matches('/');
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if !is_owner_repo(repo) {
            return Err(invalid());
        }
        return checked(github(repo, trimmed));
    }

    if trimmed.starts_with("git:") || trimmed.starts_with("git@") {
        // `git://` is a URL scheme, not the `git:` prefix.
        let url = match trimmed.strip_prefix("git:") {
            Some(rest) if !rest.starts_with("//") => rest.trim(),
            _ => trimmed,
        };
        if url.is_empty() {
            return Err(invalid());
        }
        return checked(git_url(url, trimmed));
    }

    if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
        return checked(git_url(trimmed, trimmed));
    }

    if trimmed.starts_with("./") || trimmed.starts_with('/') || trimmed.starts_with('~') {
        let path = absolutize(&expand_tilde(Path::new(trimmed)), base_dir);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(invalid)?;
        return Ok(ParsedSource {
            name,
            source: trimmed.to_string(),
            location: MarketplaceLocation::Local { path },
        });
    }

    if trimmed.contains('/') && !trimmed.starts_with('.') && is_owner_repo(trimmed) {
        return checked(github(trimmed.trim_end_matches('/'), trimmed));
    }

    Err(invalid())
}

/// Marketplace names key the clone cache, so `.`/`..` segments are refused.
fn checked(parsed: ParsedSource) -> Result<ParsedSource> {
    if is_safe_name(&parsed.name) {
        Ok(parsed)
    } else {
        Err(Error::InvalidSource {
            input: parsed.source,
        })
    }
}

fn is_safe_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name
            .split(['/', '\\'])
            .all(|segment| !matches!(segment.trim(), "" | "." | ".."))
}

fn is_owner_repo(repo: &str) -> bool {
    let mut parts = repo.splitn(2, '/');
    matches!(
        (parts.next(), parts.next()),
        (Some(owner), Some(name)) if !owner.is_empty() && !name.is_empty() && !repo.contains(char::is_whitespace)
    )
}

fn github(repo: &str, source: &str) -> ParsedSource {
    ParsedSource {
        name: repo.to_string(),
        source: source.to_string(),
        location: MarketplaceLocation::Github {
            remote_url: format!("https://github.com/{repo}.git"),
        },
    }
}

fn git_url(url: &str, source: &str) -> ParsedSource {
    ParsedSource {
        name: name_from_git_url(url),
        source: source.to_string(),
        location: MarketplaceLocation::GitUrl {
            remote_url: url.to_string(),
        },
    }
}

/// `owner/repo` from an HTTPS or SSH clone URL.
pub fn name_from_git_url(url: &str) -> String {
    let url = url.trim_end_matches('/');
    let url = url.strip_suffix(".git").unwrap_or(url);

    if url.contains('@') && url.contains(':') {
        let mut parts = url.split(':');
        if let (Some(_), Some(path), None) = (parts.next(), parts.next(), parts.next()) {
            return path.to_string();
        }
    }

    let segments: Vec<&str> = url.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., owner, repo] => format!("{owner}/{repo}"),
        [only] => (*only).to_string(),
        [] => url.to_string(),
    }
}
