use std::{
    io::{BufRead, Write},
    path::Path,
};

use {
    anyhow::Result,
    skillforge_config::SkillforgePaths,
    skillforge_skills::{
        InstallOptions, SkillInstaller, SkillSpec, UninstallOptions, UninstallOutcome,
        UninstallPlan,
    },
};

pub fn handle_install(paths: &SkillforgePaths, spec: &str, to: &Path, force: bool) -> Result<()> {
    let spec: SkillSpec = spec.parse()?;
    let mut installer = SkillInstaller::new(paths);

    let outcome = installer.install(&spec, to, InstallOptions { force })?;
    let verb = if outcome.replaced {
        "Reinstalled"
    } else {
        "Installed"
    };
    println!(
        "{verb} '{}' from '{}' to {}",
        outcome.name, outcome.marketplace, outcome.recorded_path
    );
    Ok(())
}

pub fn handle_uninstall(
    paths: &SkillforgePaths,
    name: &str,
    keep_files: bool,
    force: bool,
) -> Result<()> {
    let mut installer = SkillInstaller::new(paths);
    let outcome = installer.uninstall(
        name,
        UninstallOptions { keep_files, force },
        confirm_uninstall,
    )?;

    match outcome {
        UninstallOutcome::Cancelled => println!("Uninstall cancelled."),
        UninstallOutcome::Removed {
            name,
            path,
            files_deleted,
            ..
        } => {
            if files_deleted {
                println!("Uninstalled '{name}' and deleted {}", path.display());
            } else {
                println!("Uninstalled '{name}'; files left at {}", path.display());
            }
        },
    }
    Ok(())
}

/// Ask on stdin; a closed or broken stdin counts as "no".
pub(crate) fn confirm(prompt: &str) -> bool {
    let stdin = std::io::stdin();
    prompt_yes_no(prompt, false, &mut stdin.lock(), &mut std::io::stdout()).unwrap_or(false)
}

fn confirm_uninstall(plan: &UninstallPlan<'_>) -> bool {
    let prompt = if plan.delete_files {
        format!(
            "Uninstall '{}' and delete {}?",
            plan.name,
            plan.path.display()
        )
    } else {
        format!("Stop tracking '{}' (files are kept)?", plan.name)
    };
    confirm(&prompt)
}

fn prompt_yes_no(
    prompt: &str,
    default_yes: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<bool> {
    loop {
        let default = if default_yes {
            "Y/n"
        } else {
            "y/N"
        };
        write!(output, "{prompt} [{default}]: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(default_yes);
        }
        let answer = line.trim().to_ascii_lowercase();
        if answer.is_empty() {
            return Ok(default_yes);
        }
        match answer.as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" => return Ok(false),
            _ => writeln!(output, "Please answer with 'y' or 'n'.")?,
        }
    }
}
