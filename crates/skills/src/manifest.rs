use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use {
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    types::InstalledSkill,
};

const MANIFEST_VERSION: &str = "1.0";

#[derive(Serialize, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    skills: BTreeMap<String, InstalledSkill>,
}

/// Skills installed into one project, persisted at
/// `<project>/.skillforge/manifest.json`.
///
/// Every mutation is written back immediately. Writes go through a temp file
/// and a rename, but there is no locking: one writer at a time is assumed.
#[derive(Debug)]
pub struct SkillManifest {
    path: PathBuf,
    skills: BTreeMap<String, InstalledSkill>,
}

impl SkillManifest {
    pub fn load(project_root: &Path) -> Self {
        Self::load_from(skillforge_config::paths::manifest_file(project_root))
    }

    /// A missing or unreadable file yields an empty manifest.
    pub fn load_from(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let skills = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<ManifestFile>(&data) {
                Ok(file) => file.skills,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt skill manifest, starting empty");
                    BTreeMap::new()
                },
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable skill manifest, starting empty");
                BTreeMap::new()
            },
        };
        debug!(path = %path.display(), count = skills.len(), "loaded skill manifest");
        Self { path, skills }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a newly installed skill.
    pub fn add(
        &mut self,
        name: &str,
        path: impl Into<String>,
        marketplace: impl Into<String>,
        version: Option<String>,
    ) -> Result<()> {
        if let Some(existing) = self.skills.get(name) {
            return Err(Error::SkillAlreadyInstalled {
                name: name.to_string(),
                path: existing.path.clone(),
            });
        }

        self.skills.insert(name.to_string(), InstalledSkill {
            path: path.into(),
            marketplace: marketplace.into(),
            version,
        });
        if let Err(e) = self.save() {
            self.skills.remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a record, returning it.
    pub fn remove(&mut self, name: &str) -> Result<InstalledSkill> {
        let Some(removed) = self.skills.remove(name) else {
            return Err(self.not_installed(name));
        };
        if let Err(e) = self.save() {
            self.skills.insert(name.to_string(), removed);
            return Err(e);
        }
        Ok(removed)
    }

    /// Swap the record for `name` in a single save, returning the previous
    /// one. The in-memory state is unchanged when the save fails.
    pub fn replace(
        &mut self,
        name: &str,
        path: impl Into<String>,
        marketplace: impl Into<String>,
        version: Option<String>,
    ) -> Result<Option<InstalledSkill>> {
        let previous = self.skills.insert(name.to_string(), InstalledSkill {
            path: path.into(),
            marketplace: marketplace.into(),
            version,
        });
        if let Err(e) = self.save() {
            match previous {
                Some(record) => self.skills.insert(name.to_string(), record),
                None => self.skills.remove(name),
            };
            return Err(e);
        }
        Ok(previous)
    }

    pub fn get(&self, name: &str) -> Result<InstalledSkill> {
        self.skills
            .get(name)
            .cloned()
            .ok_or_else(|| self.not_installed(name))
    }

    pub fn list(&self) -> BTreeMap<String, InstalledSkill> {
        self.skills.clone()
    }

    pub fn has(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.skills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skills.is_empty()
    }

    /// Drop every record and persist the empty manifest.
    pub fn clear(&mut self) -> Result<()> {
        let previous = std::mem::take(&mut self.skills);
        if let Err(e) = self.save() {
            self.skills = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let file = ManifestFile {
            version: MANIFEST_VERSION.into(),
            skills: self.skills.clone(),
        };
        let data = serde_json::to_string_pretty(&file).map_err(|source| Error::Json {
            path: self.path.clone(),
            source,
        })?;
        write_atomic(&self.path, &data)
    }

    fn not_installed(&self, name: &str) -> Error {
        Error::SkillNotInstalled {
            name: name.to_string(),
            installed: self.skills.keys().cloned().collect(),
        }
    }
}

/// Write via a sibling temp file and rename, creating parent directories.
pub(crate) fn write_atomic(path: &Path, data: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).map_err(|e| Error::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| Error::io(path, e))?;
    Ok(())
}
