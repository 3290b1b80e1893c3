//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `analyze` - Model-backed commands (receipt, summarize, review)
//! - `core` - Init and shared utilities (open_db, load_config, read_input)
//! - `history` - History browsing, statistics and CSV export
//! - `prompts` - Prompt library management commands
//! - `serve` - Web server command
//! - `status` - Database, config and backend status

pub mod analyze;
pub mod core;
pub mod history;
pub mod prompts;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use analyze::*;
pub use self::core::*;
pub use history::*;
pub use prompts::*;
pub use serve::*;
pub use status::*;

/// Truncate a string to at most `max` characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
