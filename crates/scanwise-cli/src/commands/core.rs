//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` / `require_ai` - Pipeline config and model backend
//! - `read_input` - File or stdin input
//! - `cmd_init` - Initialize the database

use std::io::Read;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use scanwise_core::{AIClient, Config, Database, LanguageModel};

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .context("Database path must be valid UTF-8")?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

/// Load the pipeline config (user override first, then embedded defaults)
pub fn load_config() -> Result<Config> {
    let config = Config::load().context("Failed to load config")?;
    if let Some(path) = config.config_path() {
        tracing::debug!(path = %path.display(), "Using config override");
    }
    Ok(config)
}

/// Model backend from the environment, or an error explaining how to set one up
pub fn require_ai(config: &Config) -> Result<AIClient> {
    let ai = AIClient::from_env(config).ok_or_else(|| {
        anyhow!(
            "No language model configured. Set OPENAI_API_KEY (or OPENAI_COMPATIBLE_HOST \
             for a self-hosted server), or AI_BACKEND=mock to try things out."
        )
    })?;
    tracing::debug!(backend = ai.backend_name(), model = ai.model(), host = ai.host(), "Model backend ready");
    Ok(ai)
}

/// Raw input read from a file or stdin
#[derive(Debug, Clone)]
pub struct Input {
    pub bytes: Vec<u8>,
    /// File name, when read from a file
    pub source_name: Option<String>,
}

impl Input {
    pub fn from_text(text: &str, source_name: Option<&str>) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            source_name: source_name.map(str::to_string),
        }
    }
}

/// Read a file, or stdin when the path is "-"
pub fn read_input(path: &Path) -> Result<Input> {
    if path.as_os_str() == "-" {
        let mut bytes = Vec::new();
        std::io::stdin()
            .read_to_end(&mut bytes)
            .context("Failed to read stdin")?;
        return Ok(Input {
            bytes,
            source_name: None,
        });
    }

    if !path.exists() {
        return Err(anyhow!("File not found: {}", path.display()));
    }
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;

    Ok(Input {
        bytes,
        source_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()),
    })
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database at {}...", db_path.display());

    let db = open_db(db_path, no_encrypt)?;

    if db.is_encrypted() {
        println!("   🔒 Encryption: ENABLED");
    } else {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Analyze a receipt: scanwise receipt --file receipt.txt");
    println!("  2. Start web API: scanwise serve");

    Ok(())
}
