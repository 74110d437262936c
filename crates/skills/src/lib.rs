//! Skill resolution and marketplace pipeline.
//!
//! Skills are directories containing a `SKILL.md` file: optional YAML
//! frontmatter (`name`, `description`, `allowed-tools`, `version`, `author`)
//! followed by markdown instructions.
//!
//! - [`discover`] finds skills through glob patterns.
//! - [`marketplace`], [`registry`] and [`fetch`] manage skill sources and
//!   copy skills out of them.
//! - [`install`] ties the registry and fetcher to the per-project
//!   [`manifest`].

pub mod discover;
pub mod error;
pub mod fetch;
pub mod install;
pub mod manifest;
pub mod marketplace;
pub mod parse;
pub mod registry;
pub mod types;

pub use {
    discover::{DiscoveryIssue, SkillLoader, discover_skills, read_skill},
    error::{Error, ErrorKind, Result},
    fetch::{GitCli, MarketplaceFetcher, RepoCloner, ScanReport},
    install::{
        InstallOptions, InstallOutcome, SkillInstaller, SkillSpec, UninstallOptions,
        UninstallOutcome, UninstallPlan,
    },
    manifest::SkillManifest,
    marketplace::{Marketplace, MarketplaceLocation, MarketplaceSkill, SourceKind, parse_source},
    parse::load_skill,
    registry::{MarketplaceRegistry, UpdateReport, UpdateResult},
    types::{InstalledSkill, SkillDocument},
};
