//! Scanwise CLI - Receipt spending analysis and document assistant
//!
//! Usage:
//!   scanwise init                         Initialize database
//!   scanwise receipt --file receipt.txt   Analyze receipt text
//!   scanwise summarize --file notes.txt   Summarize a document
//!   scanwise serve --port 3000            Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Receipt {
            file,
            threshold,
            language,
            json,
            no_save,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            let ai = commands::require_ai(&config)?;
            let input = commands::read_input(&file)?;
            let options = commands::ReceiptOptions {
                threshold,
                language,
                json,
                save: !no_save,
            };
            commands::cmd_receipt(&db, &cli.user, ai, &config, &input, &options)
                .await
                .map(|_| ())
        }
        Commands::Summarize {
            file,
            length,
            language,
            no_save,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            let ai = commands::require_ai(&config)?;
            let input = commands::read_input(&file)?;
            commands::cmd_summarize(
                &db, &cli.user, ai, &config, &input, &length, &language, !no_save,
            )
            .await
            .map(|_| ())
        }
        Commands::Review {
            file,
            analysis_type,
            detect_language,
            no_save,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            let ai = commands::require_ai(&config)?;
            let input = commands::read_input(&file)?;
            commands::cmd_review(
                &db,
                &cli.user,
                ai,
                &config,
                &input,
                &analysis_type,
                detect_language,
                !no_save,
            )
            .await
            .map(|_| ())
        }
        Commands::History { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                None => commands::cmd_history_list(&db, &cli.user, 20),
                Some(HistoryAction::List { limit }) => {
                    commands::cmd_history_list(&db, &cli.user, limit)
                }
                Some(HistoryAction::Search { term, limit }) => {
                    commands::cmd_history_search(&db, &cli.user, &term, limit)
                }
                Some(HistoryAction::Show { id }) => commands::cmd_history_show(&db, &cli.user, id),
                Some(HistoryAction::Delete { id }) => {
                    commands::cmd_history_delete(&db, &cli.user, id)
                }
            }
        }
        Commands::Stats { system } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_stats(&db, &cli.user, system)
        }
        Commands::Export {
            output,
            kind,
            limit,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_export(&db, &cli.user, output.as_deref(), kind.as_deref(), limit)
        }
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
        Commands::Status => commands::cmd_status(&cli.db, cli.no_encrypt).await,
        Commands::Serve {
            port,
            host,
            no_auth,
        } => commands::cmd_serve(&cli.db, &host, port, no_auth, cli.no_encrypt).await,
    }
}
