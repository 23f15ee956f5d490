//! Prompt library commands

use anyhow::{Context, Result};
use homewatt_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};

/// List the agent prompts and whether each is overridden
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!("{:<20} {:<12} {:>7}  SOURCE", "ID", "ROLE", "VERSION");
    for info in library.list() {
        let source = match &info.override_path {
            Some(path) => format!("override ({})", path.display()),
            None => "embedded".to_string(),
        };
        println!(
            "{:<20} {:<12} {:>7}  {}",
            info.id, info.role, info.version, source
        );
    }

    println!();
    println!("Copy a prompt into `homewatt prompts path` and edit it to override.");
    println!("Keep the frontmatter id and role; the {{{{placeholders}}}} are filled per call.");
    Ok(())
}

/// Print a prompt's metadata and both sections
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let Some(id) = PromptId::parse(prompt_id) else {
        let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
        eprintln!("Unknown prompt ID: {}", prompt_id);
        eprintln!("Available prompts: {}", known.join(", "));
        return Ok(());
    };

    let mut library = PromptLibrary::new();
    let prompt = library
        .get(id)
        .with_context(|| format!("Failed to load prompt {}", prompt_id))?;

    println!(
        "{} v{} ({})",
        prompt.metadata.id, prompt.metadata.version, prompt.metadata.role
    );
    match &prompt.override_path {
        Some(path) => println!("Source: {}", path.display()),
        None => println!("Source: embedded default"),
    }

    for (title, body) in [
        ("System", prompt.system_section()),
        ("User", prompt.user_section()),
    ] {
        println!();
        println!("--- {} ---", title);
        println!("{}", body.unwrap_or("(missing)"));
    }

    Ok(())
}

/// Print the directory overrides are read from
pub fn cmd_prompts_path() -> Result<()> {
    let Some(path) = default_prompts_dir() else {
        anyhow::bail!("No data directory on this system; prompt overrides are unavailable");
    };

    println!("{}", path.display());
    if !path.exists() {
        eprintln!("(does not exist yet; create it to add overrides)");
    }
    Ok(())
}
