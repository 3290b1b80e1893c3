//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Scanwise - Receipt insights, summaries and code review from your terminal
#[derive(Parser)]
#[command(name = "scanwise")]
#[command(about = "Receipt spending analysis and document assistant", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "scanwise.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set SCANWISE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    /// User the history is recorded under
    #[arg(long, default_value = "local", global = true)]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Analyze receipt text: categories, anomalies and advice
    Receipt {
        /// Text file with the receipt ("-" reads stdin)
        #[arg(short, long, default_value = "-")]
        file: PathBuf,

        /// Anomaly threshold in percent (defaults to the configured value)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// OCR language the text was captured in
        #[arg(long, default_value = "English")]
        language: String,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,

        /// Do not record the analysis in history
        #[arg(long)]
        no_save: bool,
    },

    /// Summarize a text document
    Summarize {
        /// Text file to summarize ("-" reads stdin)
        #[arg(short, long, default_value = "-")]
        file: PathBuf,

        /// Summary length: short, medium, detailed
        #[arg(short, long, default_value = "medium")]
        length: String,

        /// Language to write the summary in
        #[arg(long, default_value = "English")]
        language: String,

        /// Do not record the summary in history
        #[arg(long)]
        no_save: bool,
    },

    /// Analyze source code
    Review {
        /// Source file to analyze ("-" reads stdin)
        #[arg(short, long, default_value = "-")]
        file: PathBuf,

        /// Analysis type: full_analysis, bug_detection, code_review, explanation
        #[arg(short = 't', long = "type", default_value = "full_analysis")]
        analysis_type: String,

        /// Also ask the model which language the code is written in
        #[arg(long)]
        detect_language: bool,

        /// Do not record the analysis in history
        #[arg(long)]
        no_save: bool,
    },

    /// Browse analysis history (list, search, show, delete)
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Show usage statistics and spending per category
    Stats {
        /// Include whole-system statistics
        #[arg(long)]
        system: bool,
    },

    /// Export history as CSV
    Export {
        /// Output file (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Only rows of this kind: receipt, summary, code
        #[arg(short, long)]
        kind: Option<String>,

        /// Most recent N rows only
        #[arg(short, long)]
        limit: Option<i64>,
    },

    /// Manage AI prompts (list, show, path)
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },

    /// Show database, config and model backend status
    Status,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Disable authentication (for local development only)
        ///
        /// WARNING: Do not use this flag when exposing the server to a network.
        /// By default, the server requires an API key from SCANWISE_API_KEYS.
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
pub enum HistoryAction {
    /// List recent analyses
    List {
        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Search extracted text, output and file names
    Search {
        /// Search term
        term: String,

        /// Number of rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show one analysis in full
    Show {
        /// Analysis ID
        id: i64,
    },
    /// Delete an analysis
    Delete {
        /// Analysis ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,
    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., parse_receipt, spending_advice)
        prompt_id: String,
    },
    /// Show the override directory path
    Path,
}
