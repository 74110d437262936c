//! Listing, discovering and reading skills.

use std::path::Path;

use {
    skillforge_config::{SkillforgePaths, discover_and_load, paths::absolutize},
    skillforge_skills::{DiscoveryIssue, SkillLoader, SkillManifest, read_skill},
};

pub fn handle_list(paths: &SkillforgePaths, json: bool) -> anyhow::Result<()> {
    let manifest = SkillManifest::load(&paths.project_root);
    let installed = manifest.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&installed)?);
        return Ok(());
    }

    if installed.is_empty() {
        println!("No skills installed. Install one with 'skillforge install <skill>@<marketplace>'.");
        return Ok(());
    }
    for (name, record) in &installed {
        let version = record
            .version
            .as_deref()
            .map(|v| format!(" v{v}"))
            .unwrap_or_default();
        println!(
            "  {name}{version} [{marketplace}] {path}",
            marketplace = record.marketplace,
            path = record.path,
        );
    }
    Ok(())
}

pub fn handle_discover(paths: &SkillforgePaths, json: bool) -> anyhow::Result<()> {
    let config = discover_and_load(&paths.project_root);
    let mut loader = SkillLoader::new(config.skill_paths, &paths.project_root);
    let skills = loader.discover().clone();

    if json {
        let entries: Vec<serde_json::Value> = skills
            .values()
            .map(|skill| {
                serde_json::json!({
                    "name": skill.name,
                    "description": skill.description,
                    "path": skill.path,
                    "allowed_tools": skill.allowed_tools,
                    "version": skill.version,
                    "has_tools": skill.has_tools(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if skills.is_empty() {
        println!("No skills found for patterns: {}", loader.patterns().join(", "));
    }
    for skill in skills.values() {
        println!("  {} - {}", skill.name, skill.description);
        println!("    ↳ {}", skill.path.display());
    }
    for issue in loader.issues() {
        match issue {
            DiscoveryIssue::InvalidPattern { pattern, reason } => {
                eprintln!("  skipped pattern '{pattern}': {reason}");
            },
            DiscoveryIssue::ParseFailed { path, reason } => {
                eprintln!("  skipped {}: {reason}", path.display());
            },
            DiscoveryIssue::DuplicateName {
                name,
                kept,
                dropped,
            } => {
                eprintln!(
                    "  duplicate skill '{name}': kept {}, ignored {}",
                    kept.display(),
                    dropped.display()
                );
            },
        }
    }
    Ok(())
}

pub fn handle_read(paths: &SkillforgePaths, name: &str, from: &Path) -> anyhow::Result<()> {
    let from_dir = absolutize(from, &paths.project_root);
    let skill = read_skill(name, &from_dir)?;

    println!("Name:        {}", skill.name);
    println!("Description: {}", skill.description);
    if let Some(ref version) = skill.version {
        println!("Version:     {version}");
    }
    if !skill.allowed_tools.is_empty() {
        println!("Tools:       {}", skill.allowed_tools.join(", "));
    }
    println!("Path:        {}", skill.path.display());
    println!("\n{}", skill.instructions);
    Ok(())
}
