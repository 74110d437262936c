//! CLI commands for marketplace management.

use {
    clap::Subcommand,
    skillforge_config::SkillforgePaths,
    skillforge_skills::{Marketplace, MarketplaceFetcher, MarketplaceRegistry, UpdateResult},
};

use crate::install_commands::confirm;

/// Skills shown after `add` before the list is cut short.
const PREVIEW_LIMIT: usize = 5;

#[derive(Subcommand)]
pub enum MarketplaceAction {
    /// Add a marketplace (owner/repo, github:owner/repo, git URL or local path).
    Add { source: String },
    /// List configured marketplaces.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Fetch skill metadata for one marketplace, or all of them.
    Update { name: Option<String> },
    /// Remove a marketplace. Installed skills are not touched.
    Remove {
        name: String,
        /// Do not ask for confirmation.
        #[arg(long, short)]
        force: bool,
    },
    /// Delete every cached marketplace clone.
    ClearCache,
}

pub fn handle_marketplace(paths: &SkillforgePaths, action: MarketplaceAction) -> anyhow::Result<()> {
    let mut registry = MarketplaceRegistry::load(&paths.config_dir);

    match action {
        MarketplaceAction::Add { source } => {
            let marketplace = registry.add(&source)?;
            println!("Added marketplace: {}", marketplace.name);
            println!("  Source: {}", marketplace.source);
            println!("  Type:   {}", marketplace.kind());
            print_skill_preview(marketplace);
        },
        MarketplaceAction::List { json } => {
            let marketplaces = registry.list();
            if json {
                let entries: Vec<serde_json::Value> = marketplaces
                    .iter()
                    .map(|mp| {
                        serde_json::json!({
                            "name": mp.name,
                            "type": mp.kind().as_str(),
                            "source": mp.source,
                            "skills": mp.skill_names(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if marketplaces.is_empty() {
                print_no_marketplaces();
            } else {
                for mp in marketplaces {
                    let count = if mp.skills.is_empty() {
                        "-".to_string()
                    } else {
                        mp.skills.len().to_string()
                    };
                    println!("  {:<24} {:<7} {:>5}  {}", mp.name, mp.kind(), count, mp.source);
                }
            }
        },
        MarketplaceAction::Update { name } => {
            if registry.is_empty() {
                print_no_marketplaces();
                return Ok(());
            }
            let fetcher = MarketplaceFetcher::new(&paths.cache_dir);
            let report = registry.update(name.as_deref(), &fetcher)?;

            for (market, result) in &report.results {
                match result {
                    UpdateResult::Refreshed { skills, failures } => {
                        println!("{market}: found {skills} skill(s)");
                        for failure in failures {
                            eprintln!("  skipped {}: {}", failure.path.display(), failure.reason);
                        }
                    },
                    UpdateResult::Failed(e) => eprintln!("{market}: {e}"),
                }
            }

            // A named update that failed is a failed command.
            if let Some(name) = name {
                if report.failed().next().is_some() {
                    anyhow::bail!("failed to update marketplace '{name}'");
                }
                print_skill_list(registry.get(&name)?);
            }
        },
        MarketplaceAction::Remove { name, force } => {
            let count = registry.get(&name)?.skills.len();
            if !force && !confirm(&format!("Remove marketplace '{name}'? ({count} skills)")) {
                println!("Cancelled.");
                return Ok(());
            }
            registry.remove(&name)?;
            println!("Removed marketplace: {name}");
        },
        MarketplaceAction::ClearCache => {
            let fetcher = MarketplaceFetcher::new(&paths.cache_dir);
            if fetcher.clear_cache()? {
                println!("Cleared cache at {}", fetcher.cache_dir().display());
            } else {
                println!("Cache is already empty.");
            }
        },
    }

    Ok(())
}

fn print_no_marketplaces() {
    println!("No marketplaces configured.");
    println!("Add one with: skillforge marketplace add <source>");
}

fn print_skill_preview(marketplace: &Marketplace) {
    if marketplace.skills.is_empty() {
        println!("Run 'skillforge marketplace update {}' to fetch skills.", marketplace.name);
        return;
    }
    println!("  Skills: {}", marketplace.skills.len());
    for skill in marketplace.skills.iter().take(PREVIEW_LIMIT) {
        println!("    - {}: {}", skill.name, skill.description);
    }
    if marketplace.skills.len() > PREVIEW_LIMIT {
        println!("    ... and {} more", marketplace.skills.len() - PREVIEW_LIMIT);
    }
}

fn print_skill_list(marketplace: &Marketplace) {
    for skill in &marketplace.skills {
        let version = skill
            .version
            .as_deref()
            .map(|v| format!(" v{v}"))
            .unwrap_or_default();
        let description = if skill.description.is_empty() {
            "(no description)"
        } else {
            &skill.description
        };
        println!("  - {}{version}: {description}", skill.name);
    }
}
