//! HTTP request handlers organized by domain
//!
//! Each submodule contains handlers for a specific API area.

pub mod analysis;
pub mod export;
pub mod history;
pub mod stats;

// Re-export all handlers for use in router
pub use analysis::*;
pub use export::*;
pub use history::*;
pub use stats::*;
