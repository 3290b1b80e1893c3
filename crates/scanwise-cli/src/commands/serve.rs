//! Server command implementation

use std::path::Path;

use anyhow::Result;

use super::open_db;

/// Comma-separated API keys, ignoring blanks
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub async fn cmd_serve(
    db_path: &Path,
    host: &str,
    port: u16,
    no_auth: bool,
    no_encrypt: bool,
) -> Result<()> {
    println!("🚀 Starting Scanwise web server...");
    println!("   Database: {}", db_path.display());
    println!("   Listening: http://{}:{}", host, port);

    let api_keys = parse_api_keys(&std::env::var("SCANWISE_API_KEYS").unwrap_or_default());

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else if api_keys.is_empty() {
        println!();
        println!("   ⚠️  No API keys configured (SCANWISE_API_KEYS); every request will be rejected");
    } else {
        println!(
            "   🔑 API keys: {} configured (SCANWISE_API_KEYS)",
            api_keys.len()
        );
    }
    if no_encrypt {
        println!("   ⚠️  Encryption DISABLED (--no-encrypt)");
    }
    println!();
    println!("   Press Ctrl+C to stop");

    let db = open_db(db_path, no_encrypt)?;

    let config = scanwise_server::ServerConfig {
        require_auth: !no_auth,
        allowed_origins: vec![],
        api_keys,
    };

    scanwise_server::serve_with_config(db, host, port, config).await?;

    Ok(())
}
