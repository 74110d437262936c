use std::{
    fmt,
    path::{Component, Path, PathBuf},
    str::FromStr,
};

use {
    skillforge_config::{SkillforgePaths, paths::absolutize},
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    fetch::MarketplaceFetcher,
    manifest::SkillManifest,
    registry::MarketplaceRegistry,
    types::InstalledSkill,
};

/// `skill@marketplace`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillSpec {
    pub skill: String,
    pub marketplace: String,
}

impl SkillSpec {
    pub fn parse(spec: &str) -> Result<Self> {
        let Some((skill, marketplace)) = spec.split_once('@') else {
            return Err(Error::InvalidSpec(format!(
                "'{spec}' must have the form skill@marketplace"
            )));
        };
        let (skill, marketplace) = (skill.trim(), marketplace.trim());
        if skill.is_empty() || marketplace.is_empty() {
            return Err(Error::InvalidSpec(format!(
                "'{spec}' needs both a skill name and a marketplace (skill@marketplace)"
            )));
        }
        Ok(Self {
            skill: skill.to_string(),
            marketplace: marketplace.to_string(),
        })
    }
}

impl FromStr for SkillSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SkillSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.skill, self.marketplace)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallOptions {
    /// Replace an already installed skill of the same name.
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub name: String,
    pub marketplace: String,
    /// Absolute location of the installed copy.
    pub path: PathBuf,
    /// Path as written to the manifest.
    pub recorded_path: String,
    pub version: Option<String>,
    /// A previous installation was replaced.
    pub replaced: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UninstallOptions {
    /// Stop tracking the skill but leave its files on disk.
    pub keep_files: bool,
    /// Skip the confirmation callback.
    pub force: bool,
}

/// What an uninstall is about to do, shown to the confirmation callback.
#[derive(Debug)]
pub struct UninstallPlan<'a> {
    pub name: &'a str,
    pub record: &'a InstalledSkill,
    pub path: &'a Path,
    pub delete_files: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed {
        name: String,
        record: InstalledSkill,
        path: PathBuf,
        files_deleted: bool,
    },
    Cancelled,
}

/// Installs skills from registered marketplaces into a project.
pub struct SkillInstaller {
    project_root: PathBuf,
    registry: MarketplaceRegistry,
    fetcher: MarketplaceFetcher,
    manifest: SkillManifest,
}

impl SkillInstaller {
    pub fn new(paths: &SkillforgePaths) -> Self {
        Self::from_parts(
            paths.project_root.clone(),
            MarketplaceRegistry::load(&paths.config_dir),
            MarketplaceFetcher::new(&paths.cache_dir),
            SkillManifest::load(&paths.project_root),
        )
    }

    pub fn from_parts(
        project_root: impl Into<PathBuf>,
        registry: MarketplaceRegistry,
        fetcher: MarketplaceFetcher,
        manifest: SkillManifest,
    ) -> Self {
        Self {
            project_root: project_root.into(),
            registry,
            fetcher,
            manifest,
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn registry(&self) -> &MarketplaceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut MarketplaceRegistry {
        &mut self.registry
    }

    pub fn fetcher(&self) -> &MarketplaceFetcher {
        &self.fetcher
    }

    pub fn installed(&self) -> &SkillManifest {
        &self.manifest
    }

    /// Install `spec` into `destination/<skill>`.
    ///
    /// A relative `destination` is taken from the project root. Nothing is
    /// recorded unless the download succeeds; with `force`, the previous
    /// manifest record is swapped for the new one in a single save.
    pub fn install(
        &mut self,
        spec: &SkillSpec,
        destination: &Path,
        options: InstallOptions,
    ) -> Result<InstallOutcome> {
        if !options.force
            && let Ok(existing) = self.manifest.get(&spec.skill)
        {
            return Err(Error::SkillAlreadyInstalled {
                name: spec.skill.clone(),
                path: existing.path,
            });
        }

        if self.registry.get(&spec.marketplace)?.skills.is_empty() {
            info!(marketplace = %spec.marketplace, "no cached skill list, fetching metadata");
            self.registry.refresh(&spec.marketplace, &self.fetcher)?;
        }

        let skill = self
            .registry
            .find_skill(&spec.skill, &spec.marketplace)?
            .clone();

        let destination = absolutize(destination, &self.project_root);
        let marketplace = self.registry.get_mut(&spec.marketplace)?;
        let checkout_before = marketplace.checkout.clone();
        let target = self
            .fetcher
            .download_skill(marketplace, &skill, &destination)?;
        if marketplace.checkout != checkout_before
            && let Err(e) = self.registry.save()
        {
            warn!(error = %e, "failed to record marketplace checkout");
        }

        let recorded_path = self.record_path(&target);
        let replaced = if options.force {
            self.manifest
                .replace(
                    &spec.skill,
                    recorded_path.clone(),
                    spec.marketplace.clone(),
                    skill.version.clone(),
                )?
                .is_some()
        } else {
            self.manifest.add(
                &spec.skill,
                recorded_path.clone(),
                spec.marketplace.clone(),
                skill.version.clone(),
            )?;
            false
        };

        info!(skill = %spec.skill, marketplace = %spec.marketplace, path = %recorded_path, replaced, "installed skill");
        Ok(InstallOutcome {
            name: spec.skill.clone(),
            marketplace: spec.marketplace.clone(),
            path: target,
            recorded_path,
            version: skill.version,
            replaced,
        })
    }

    /// Stop tracking `name` and, unless `keep_files`, delete its directory.
    ///
    /// `confirm` is consulted unless `force` is set; returning `false`
    /// cancels with no changes.
    pub fn uninstall(
        &mut self,
        name: &str,
        options: UninstallOptions,
        confirm: impl FnOnce(&UninstallPlan<'_>) -> bool,
    ) -> Result<UninstallOutcome> {
        let record = self.manifest.get(name)?;
        let path = record.resolve(&self.project_root);

        if !options.force {
            let plan = UninstallPlan {
                name,
                record: &record,
                path: &path,
                delete_files: !options.keep_files,
            };
            if !confirm(&plan) {
                info!(skill = name, "uninstall cancelled");
                return Ok(UninstallOutcome::Cancelled);
            }
        }

        let record = self.manifest.remove(name)?;

        let mut files_deleted = false;
        if !options.keep_files {
            if path.is_dir() {
                match std::fs::remove_dir_all(&path) {
                    Ok(()) => files_deleted = true,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to delete skill files")
                    },
                }
            } else {
                warn!(path = %path.display(), "skill directory not found, nothing to delete");
            }
        }

        info!(skill = name, files_deleted, "uninstalled skill");
        Ok(UninstallOutcome::Removed {
            name: name.to_string(),
            record,
            path,
            files_deleted,
        })
    }

    /// `./<relative>` inside the project, otherwise the absolute path.
    fn record_path(&self, target: &Path) -> String {
        if let Some(relative) = relative_to(target, &self.project_root) {
            return relative;
        }
        if let (Ok(target), Ok(root)) = (target.canonicalize(), self.project_root.canonicalize())
            && let Some(relative) = relative_to(&target, &root)
        {
            return relative;
        }
        target.to_string_lossy().into_owned()
    }
}

fn relative_to(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    Some(format!("./{}", parts.join("/")))
}
