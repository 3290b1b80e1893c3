//! Status command implementation

use std::path::Path;

use anyhow::Result;
use scanwise_core::config::{default_config_path, StageKind};
use scanwise_core::db::DB_KEY_ENV;
use scanwise_core::{AIClient, Config, LanguageModel};

use super::open_db;

pub async fn cmd_status(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!();
    println!("📊 Scanwise Status");
    println!("   ─────────────────────────────────────────────────────────────");

    println!("   Database: {}", db_path.display());

    if db_path.exists() {
        if let Ok(metadata) = std::fs::metadata(db_path) {
            let size_kb = metadata.len() as f64 / 1024.0;
            if size_kb < 1024.0 {
                println!("   Size: {:.1} KB", size_kb);
            } else {
                println!("   Size: {:.1} MB", size_kb / 1024.0);
            }
        }
    } else {
        println!("   Size: (database not initialized)");
    }

    let has_key = std::env::var(DB_KEY_ENV).is_ok();
    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else if has_key {
        println!("   🔒 Encryption: ENABLED ({}=***)", DB_KEY_ENV);
    } else {
        println!("   ❌ Encryption: REQUIRED but {} not set", DB_KEY_ENV);
    }

    if db_path.exists() {
        match open_db(db_path, no_encrypt) {
            Ok(db) => {
                if let Ok(stats) = db.get_system_stats() {
                    println!();
                    println!("   Users: {}", stats.total_users);
                    println!("   Analyses: {}", stats.total_analyses);
                    println!("   Tokens used: {}", stats.total_tokens);
                }
            }
            Err(e) => {
                println!();
                println!("   ❌ Error opening database: {}", e);
                if !no_encrypt && !has_key {
                    println!("      Set {} or use --no-encrypt", DB_KEY_ENV);
                } else if has_key {
                    println!("      (Check if {} is correct)", DB_KEY_ENV);
                }
            }
        }
    }

    // Pipeline config
    println!();
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            println!("   ❌ Config error: {}", e);
            println!(
                "      (fix or remove {})",
                default_config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "the config override".to_string())
            );
            Config::default()
        }
    };
    match config.config_path() {
        Some(path) => println!("   Config: {}", path.display()),
        None => println!("   Config: built-in defaults"),
    }
    println!("   Anomaly threshold: {:.1}%", config.threshold_pct);
    for kind in StageKind::all() {
        let settings = config.settings(*kind);
        println!(
            "     {:<16} temperature {:.1}, max {} tokens",
            kind.as_str(),
            settings.temperature,
            settings.max_tokens
        );
    }

    // Model backend
    println!();
    match AIClient::from_env(&config) {
        Some(client) => {
            let info = client.info();
            if client.health_check().await {
                println!(
                    "   ✅ Model backend: {} at {} (model {})",
                    info.backend, info.host, info.model
                );
            } else {
                println!(
                    "   ⚠️  Model backend configured but not responding: {} (model {})",
                    info.host, info.model
                );
            }
        }
        None => {
            println!("   ℹ️  Model backend not configured (set OPENAI_API_KEY or OPENAI_COMPATIBLE_HOST)");
        }
    }

    println!();
    Ok(())
}
