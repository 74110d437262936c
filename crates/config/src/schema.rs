use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};

/// How skills reach the agent prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillMode {
    /// Only a directory of skills plus the meta-skill is injected; full
    /// instructions are fetched on demand.
    #[default]
    Progressive,
    /// Full instructions are embedded when the agent is built.
    Inject,
}

impl FromStr for SkillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "progressive" => Ok(Self::Progressive),
            // `eager` is the older spelling still found in project configs.
            "inject" | "eager" => Ok(Self::Inject),
            other => Err(format!(
                "invalid skill_mode '{other}': must be one of progressive, inject"
            )),
        }
    }
}

impl<'de> Deserialize<'de> for SkillMode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for SkillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Progressive => f.write_str("progressive"),
            Self::Inject => f.write_str("inject"),
        }
    }
}

/// Root project configuration (`.skillforge.yaml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkillforgeConfig {
    /// Glob patterns for discovering skill directories.
    pub skill_paths: Vec<String>,
    /// Path to a custom meta-skill, if any.
    pub meta_skill: Option<String>,
    pub skill_mode: SkillMode,
}

impl Default for SkillforgeConfig {
    fn default() -> Self {
        Self {
            skill_paths: vec!["./skills/*".into()],
            meta_skill: None,
            skill_mode: SkillMode::default(),
        }
    }
}
