use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// File holding a skill's frontmatter and instructions.
pub const SKILL_FILENAME: &str = "SKILL.md";

/// Optional sibling file with callable tools bundled with a skill.
pub const TOOLS_FILENAME: &str = "tools.py";

/// A fully resolved skill: frontmatter fields plus the markdown body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillDocument {
    /// From frontmatter `name`, or the directory name when absent.
    pub name: String,
    pub description: String,
    /// Markdown body with the frontmatter block stripped.
    pub instructions: String,
    /// Absolute path of the skill directory.
    pub path: PathBuf,
    pub allowed_tools: Vec<String>,
    pub version: Option<String>,
    pub author: Option<String>,
}

impl SkillDocument {
    pub fn tools_path(&self) -> PathBuf {
        self.path.join(TOOLS_FILENAME)
    }

    /// Whether a `tools.py` sits next to `SKILL.md`.
    pub fn has_tools(&self) -> bool {
        self.tools_path().is_file()
    }

    pub fn skill_file(&self) -> PathBuf {
        self.path.join(SKILL_FILENAME)
    }
}

/// One record of the project manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledSkill {
    /// `./`-prefixed path relative to the project root, or absolute when the
    /// skill lives outside it.
    pub path: String,
    pub marketplace: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl InstalledSkill {
    /// Resolve the recorded path against `project_root`.
    pub fn resolve(&self, project_root: &Path) -> PathBuf {
        let recorded = Path::new(&self.path);
        if recorded.is_absolute() {
            recorded.to_path_buf()
        } else {
            let relative = recorded.strip_prefix(".").unwrap_or(recorded);
            project_root.join(relative)
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> InstalledSkill {
        InstalledSkill {
            path: path.into(),
            marketplace: "local-market".into(),
            version: None,
        }
    }

    #[test]
    fn resolves_dot_relative_path() {
        assert_eq!(
            record("./skills/greeting").resolve(Path::new("/work/app")),
            PathBuf::from("/work/app/skills/greeting")
        );
    }

    #[test]
    fn resolves_bare_relative_and_absolute_paths() {
        let root = Path::new("/work/app");
        assert_eq!(
            record("vendor/greeting").resolve(root),
            PathBuf::from("/work/app/vendor/greeting")
        );
        assert_eq!(
            record("/opt/skills/greeting").resolve(root),
            PathBuf::from("/opt/skills/greeting")
        );
    }

    #[test]
    fn missing_version_deserializes_as_none() {
        let parsed: InstalledSkill =
            serde_json::from_str(r#"{"path":"./skills/a","marketplace":"m"}"#).unwrap();
        assert!(parsed.version.is_none());
    }

    #[test]
    fn detects_bundled_tools() {
        let tmp = tempfile::tempdir().unwrap();
        let doc = SkillDocument {
            name: "greeting".into(),
            description: String::new(),
            instructions: String::new(),
            path: tmp.path().to_path_buf(),
            allowed_tools: vec![],
            version: None,
            author: None,
        };
        assert!(!doc.has_tools());
        std::fs::write(tmp.path().join(TOOLS_FILENAME), "def greet(): pass\n").unwrap();
        assert!(doc.has_tools());
    }
}
