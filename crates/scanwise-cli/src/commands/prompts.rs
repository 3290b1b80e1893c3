//! Prompt library commands

use anyhow::{anyhow, Result};
use scanwise_core::prompts::{default_prompts_dir, PromptId, PromptLibrary};
use scanwise_core::Config;

fn lookup(prompt_id: &str) -> Result<PromptId> {
    PromptId::from_name(prompt_id).ok_or_else(|| {
        let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
        anyhow!("Unknown prompt ID: {} (known: {})", prompt_id, known.join(", "))
    })
}

/// List prompts with their sampling settings and override status
pub fn cmd_prompts_list() -> Result<()> {
    let config = Config::load().unwrap_or_default();
    let mut library = PromptLibrary::new();

    println!();
    println!(
        "   {:<18} {:>4}  {:<16} {:>5} {:>6}  SOURCE",
        "PROMPT", "VER", "STAGE", "TEMP", "TOKENS"
    );
    for info in library.list() {
        let settings = PromptId::from_name(&info.id)
            .map(|id| (id.stage().as_str(), config.settings(id.stage())));
        let (stage, temperature, max_tokens) = match settings {
            Some((stage, s)) => (stage, format!("{:.1}", s.temperature), s.max_tokens.to_string()),
            None => ("-", "-".to_string(), "-".to_string()),
        };
        println!(
            "   {:<18} {:>4}  {:<16} {:>5} {:>6}  {}",
            info.id,
            info.version,
            stage,
            temperature,
            max_tokens,
            if info.has_override { "override" } else { "built-in" }
        );
    }

    println!();
    match default_prompts_dir() {
        Some(dir) => println!("   Overrides: {}/<prompt>.md", dir.display()),
        None => println!("   Overrides: unavailable (no data directory)"),
    }
    println!("   Sampling settings come from the [stages] table of scanwise.toml.");
    Ok(())
}

/// Print one prompt, as it would be sent
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let id = lookup(prompt_id)?;
    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;

    let source = match &prompt.override_path {
        Some(path) if prompt.is_override => format!("override ({})", path.display()),
        _ => "built-in".to_string(),
    };
    println!(
        "# {} v{} [{}] from {}",
        prompt.metadata.id, prompt.metadata.version, prompt.metadata.task_type, source
    );
    println!();
    println!("{}", prompt.content);
    Ok(())
}

/// Print the override directory
pub fn cmd_prompts_path() -> Result<()> {
    let dir = default_prompts_dir().ok_or_else(|| anyhow!("No data directory on this system"))?;
    println!("{}", dir.display());
    if !dir.exists() {
        eprintln!("(not created yet; copy a prompt there as <prompt>.md to override it)");
    }
    Ok(())
}
