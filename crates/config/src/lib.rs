//! Configuration loading and path resolution.
//!
//! Project config lives in `.skillforge.yaml` (or `.skillforge.yml`), searched
//! in the starting directory and then each of its ancestors.
//!
//! Supports `${ENV_VAR}` substitution in the raw file before parsing.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod paths;
pub mod schema;

pub use {
    error::{Error, Result},
    loader::{CONFIG_FILENAMES, discover_and_load, find_config_file, load_config},
    paths::SkillforgePaths,
    schema::{SkillMode, SkillforgeConfig},
};
