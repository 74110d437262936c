use std::{
    collections::{BTreeMap, btree_map::Entry},
    path::{Path, PathBuf},
};

use {
    glob::{MatchOptions, Pattern},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    parse::load_skill,
    types::{SKILL_FILENAME, SkillDocument},
};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

/// A candidate that discovery skipped, kept so callers can report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryIssue {
    InvalidPattern { pattern: String, reason: String },
    ParseFailed { path: PathBuf, reason: String },
    /// `dropped` declared the same name as the earlier `kept`.
    DuplicateName {
        name: String,
        kept: PathBuf,
        dropped: PathBuf,
    },
}

/// Discovers skills from glob patterns and caches the result.
///
/// Patterns are expanded in order. Matches of a single pattern are sorted
/// before use, so when two directories declare the same name the winner is
/// the first in (pattern order, path order).
pub struct SkillLoader {
    patterns: Vec<String>,
    base_dir: PathBuf,
    skills: BTreeMap<String, SkillDocument>,
    issues: Vec<DiscoveryIssue>,
    discovered: bool,
}

impl SkillLoader {
    /// Relative patterns are resolved against `base_dir`.
    pub fn new(patterns: Vec<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            patterns,
            base_dir: base_dir.into(),
            skills: BTreeMap::new(),
            issues: Vec::new(),
            discovered: false,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn discover(&mut self) -> &BTreeMap<String, SkillDocument> {
        self.skills.clear();
        self.issues.clear();

        for pattern in self.patterns.clone() {
            let full = resolve_pattern(&pattern, &self.base_dir);
            let paths = match glob::glob_with(&full, MATCH_OPTIONS) {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(pattern = %pattern, error = %e, "invalid skill path pattern, skipping");
                    self.issues.push(DiscoveryIssue::InvalidPattern {
                        pattern,
                        reason: e.to_string(),
                    });
                    continue;
                },
            };

            let mut candidates: Vec<PathBuf> = paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        debug!(error = %e, "unreadable glob entry");
                        None
                    },
                })
                .filter(|path| path.is_dir() && path.join(SKILL_FILENAME).is_file())
                .collect();
            candidates.sort();

            for dir in candidates {
                self.accept(&dir);
            }
        }

        self.discovered = true;
        info!(
            count = self.skills.len(),
            skipped = self.issues.len(),
            "skill discovery complete"
        );
        &self.skills
    }

    fn accept(&mut self, dir: &Path) {
        let skill = match load_skill(dir) {
            Ok(skill) => skill,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to load skill, skipping");
                self.issues.push(DiscoveryIssue::ParseFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                });
                return;
            },
        };

        match self.skills.entry(skill.name.clone()) {
            Entry::Vacant(slot) => {
                debug!(name = %skill.name, path = %skill.path.display(), "discovered skill");
                slot.insert(skill);
            },
            // Overlapping patterns can reach the same directory twice.
            Entry::Occupied(existing) if existing.get().path == skill.path => {},
            Entry::Occupied(existing) => {
                warn!(
                    name = %skill.name,
                    kept = %existing.get().path.display(),
                    dropped = %skill.path.display(),
                    "duplicate skill name, keeping the first"
                );
                self.issues.push(DiscoveryIssue::DuplicateName {
                    name: skill.name,
                    kept: existing.get().path.clone(),
                    dropped: skill.path,
                });
            },
        }
    }

    /// Look up a skill by name, running discovery first if needed.
    pub fn get(&mut self, name: &str) -> Result<&SkillDocument> {
        if !self.discovered {
            self.discover();
        }
        self.skills.get(name).ok_or_else(|| Error::SkillNotFound {
            name: name.to_string(),
            available: self.skills.keys().cloned().collect(),
        })
    }

    /// Sorted names of all discovered skills.
    pub fn list_skills(&mut self) -> Vec<String> {
        if !self.discovered {
            self.discover();
        }
        self.skills.keys().cloned().collect()
    }

    /// Drop cached state and discover again.
    pub fn reload(&mut self) -> &BTreeMap<String, SkillDocument> {
        self.discovered = false;
        self.discover()
    }

    /// Candidates skipped by the last discovery run.
    pub fn issues(&self) -> &[DiscoveryIssue] {
        &self.issues
    }
}

/// One-shot discovery.
pub fn discover_skills(
    patterns: Vec<String>,
    base_dir: impl Into<PathBuf>,
) -> BTreeMap<String, SkillDocument> {
    let mut loader = SkillLoader::new(patterns, base_dir);
    loader.discover();
    loader.skills
}

/// Find one skill among the direct subdirectories of `from_dir`.
pub fn read_skill(name: &str, from_dir: &Path) -> Result<SkillDocument> {
    let mut loader = SkillLoader::new(vec!["*".into()], from_dir);
    loader.get(name).cloned()
}

fn resolve_pattern(pattern: &str, base_dir: &Path) -> String {
    let pattern = pattern.trim();
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    if pattern.starts_with('~') {
        return skillforge_config::paths::expand_tilde(Path::new(pattern))
            .to_string_lossy()
            .into_owned();
    }
    if Path::new(pattern).is_absolute() {
        return pattern.to_string();
    }
    // The base directory is literal; only the pattern part may glob.
    let base = Pattern::escape(&base_dir.to_string_lossy());
    Path::new(&base).join(pattern).to_string_lossy().into_owned()
}
