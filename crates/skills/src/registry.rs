use std::path::{Path, PathBuf};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, info, warn},
};

use crate::{
    error::{Error, Result},
    fetch::{MarketplaceFetcher, ScanFailure},
    manifest::write_atomic,
    marketplace::{Marketplace, MarketplaceRecord, MarketplaceSkill, parse_source},
};

const REGISTRY_VERSION: &str = "1.0";

#[derive(Deserialize)]
struct RegistryFileIn {
    #[serde(default)]
    marketplaces: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct RegistryFileOut {
    version: &'static str,
    marketplaces: Vec<MarketplaceRecord>,
}

/// Outcome of refreshing one marketplace during [`MarketplaceRegistry::update`].
#[derive(Debug)]
pub enum UpdateResult {
    Refreshed {
        skills: usize,
        failures: Vec<ScanFailure>,
    },
    Failed(Error),
}

/// Per-marketplace results of an update, in name order.
#[derive(Debug, Default)]
pub struct UpdateReport {
    pub results: Vec<(String, UpdateResult)>,
}

impl UpdateReport {
    pub fn refreshed(&self) -> usize {
        self.results
            .iter()
            .filter(|(_, r)| matches!(r, UpdateResult::Refreshed { .. }))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.results.iter().filter_map(|(name, r)| match r {
            UpdateResult::Failed(e) => Some((name.as_str(), e)),
            UpdateResult::Refreshed { .. } => None,
        })
    }
}

/// Configured marketplaces, persisted at `<config_dir>/marketplaces.json`.
///
/// Like the project manifest this assumes a single writer.
#[derive(Debug)]
pub struct MarketplaceRegistry {
    path: PathBuf,
    marketplaces: Vec<Marketplace>,
}

impl MarketplaceRegistry {
    pub fn load(config_dir: &Path) -> Self {
        Self::load_from(skillforge_config::paths::registry_file(config_dir))
    }

    /// A missing or corrupt file yields an empty registry. Individual records
    /// that cannot be understood are dropped with a warning.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let raw = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<RegistryFileIn>(&data) {
                Ok(file) => file.marketplaces,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt marketplace registry, starting empty");
                    Vec::new()
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable marketplace registry, starting empty");
                Vec::new()
            },
        };

        let mut marketplaces = Vec::with_capacity(raw.len());
        for value in raw {
            let parsed = serde_json::from_value::<MarketplaceRecord>(value)
                .map_err(|e| e.to_string())
                .and_then(Marketplace::try_from);
            match parsed {
                Ok(m) if marketplaces.iter().any(|x: &Marketplace| x.name == m.name) => {
                    warn!(name = %m.name, "duplicate marketplace record, keeping the first");
                },
                Ok(m) => marketplaces.push(m),
                Err(reason) => warn!(path = %path.display(), %reason, "dropping invalid marketplace record"),
            }
        }

        debug!(path = %path.display(), count = marketplaces.len(), "loaded marketplace registry");
        Self { path, marketplaces }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a marketplace without fetching its metadata.
    pub fn add(&mut self, source: &str) -> Result<&Marketplace> {
        let parsed = parse_source(source)?;
        self.insert(Marketplace::new(parsed))
    }

    /// Register an already-parsed marketplace.
    pub fn insert(&mut self, marketplace: Marketplace) -> Result<&Marketplace> {
        if self.position(&marketplace.name).is_some() {
            return Err(Error::MarketplaceExists {
                name: marketplace.name,
            });
        }
        info!(name = %marketplace.name, kind = %marketplace.kind(), "adding marketplace");
        self.marketplaces.push(marketplace);
        if let Err(e) = self.save() {
            self.marketplaces.pop();
            return Err(e);
        }
        let index = self.marketplaces.len() - 1;
        Ok(&self.marketplaces[index])
    }

    pub fn remove(&mut self, name: &str) -> Result<Marketplace> {
        let index = self.position(name).ok_or_else(|| self.not_found(name))?;
        let removed = self.marketplaces.remove(index);
        if let Err(e) = self.save() {
            self.marketplaces.insert(index, removed);
            return Err(e);
        }
        info!(name, "removed marketplace");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Result<&Marketplace> {
        self.marketplaces
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| self.not_found(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut Marketplace> {
        match self.position(name) {
            Some(index) => Ok(&mut self.marketplaces[index]),
            None => Err(self.not_found(name)),
        }
    }

    /// All marketplaces sorted by name.
    pub fn list(&self) -> Vec<&Marketplace> {
        let mut all: Vec<&Marketplace> = self.marketplaces.iter().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn names(&self) -> Vec<String> {
        self.list().into_iter().map(|m| m.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.marketplaces.is_empty()
    }

    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.marketplaces);
        if let Err(e) = self.save() {
            self.marketplaces = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let file = RegistryFileOut {
            version: REGISTRY_VERSION,
            marketplaces: self.list().into_iter().map(MarketplaceRecord::from).collect(),
        };
        let data = serde_json::to_string_pretty(&file).map_err(|source| Error::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &data)
    }

    /// Refresh one marketplace's skill list and persist. Fetch errors are
    /// returned to the caller.
    pub fn refresh(&mut self, name: &str, fetcher: &MarketplaceFetcher) -> Result<usize> {
        let count = self.refresh_one(name, fetcher)?.skills;
        self.save()?;
        Ok(count)
    }

    fn refresh_one(&mut self, name: &str, fetcher: &MarketplaceFetcher) -> Result<RefreshCount> {
        let marketplace = self.get_mut(name)?;
        let report = fetcher.fetch_metadata(marketplace)?;
        let count = report.skills.len();
        marketplace.skills = report.skills;
        Ok(RefreshCount {
            skills: count,
            failures: report.failures,
        })
    }

    /// Refresh `name`, or every marketplace when `None`.
    ///
    /// A failing marketplace is recorded in the report and does not stop the
    /// others. The registry is saved once at the end.
    pub fn update(&mut self, name: Option<&str>, fetcher: &MarketplaceFetcher) -> Result<UpdateReport> {
        let targets = match name {
            Some(name) => vec![self.get(name)?.name.clone()],
            None => self.names(),
        };

        let mut report = UpdateReport::default();
        for target in targets {
            let result = match self.refresh_one(&target, fetcher) {
                Ok(RefreshCount { skills, failures }) => {
                    info!(marketplace = %target, skills, "updated marketplace");
                    UpdateResult::Refreshed { skills, failures }
                },
                Err(e) => {
                    warn!(marketplace = %target, error = %e, "failed to update marketplace");
                    UpdateResult::Failed(e)
                },
            };
            report.results.push((target, result));
        }

        self.save()?;
        Ok(report)
    }

    /// Look up a skill in one marketplace's cached skill list.
    pub fn find_skill(&self, skill: &str, marketplace: &str) -> Result<&MarketplaceSkill> {
        let market = self.get(marketplace)?;
        market
            .find_skill(skill)
            .ok_or_else(|| Error::SkillNotInMarketplace {
                skill: skill.to_string(),
                marketplace: marketplace.to_string(),
                available: market.skill_names(),
            })
    }

    /// Every (marketplace, skill) pair whose skill is named `skill`.
    pub fn search_skill(&self, skill: &str) -> Vec<(&Marketplace, &MarketplaceSkill)> {
        self.list()
            .into_iter()
            .flat_map(|m| {
                m.skills
                    .iter()
                    .filter(move |s| s.name == skill)
                    .map(move |s| (m, s))
            })
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.marketplaces.iter().position(|m| m.name == name)
    }

    fn not_found(&self, name: &str) -> Error {
        Error::MarketplaceNotFound {
            name: name.to_string(),
            available: self.names(),
        }
    }
}

struct RefreshCount {
    skills: usize,
    failures: Vec<ScanFailure>,
}
