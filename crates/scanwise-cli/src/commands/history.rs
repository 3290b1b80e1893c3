//! History, statistics and export commands

use std::path::Path;

use anyhow::{anyhow, Result};
use scanwise_core::models::{Analysis, AnalysisKind};
use scanwise_core::{Database, HistoryExportOptions};

use super::{print_report, truncate};

fn print_history_table(rows: &[Analysis]) {
    println!(
        "   {:>5}  {:<16}  {:<8}  {:<20}  {:>6}  {}",
        "ID", "CREATED", "KIND", "SOURCE", "TOKENS", "PREVIEW"
    );
    println!("   {}", "─".repeat(90));

    for row in rows {
        let preview = row
            .output_text
            .as_deref()
            .unwrap_or(&row.extracted_text)
            .replace('\n', " ");
        println!(
            "   {:>5}  {:<16}  {:<8}  {:<20}  {:>6}  {}",
            row.id,
            row.created_at.format("%Y-%m-%d %H:%M"),
            row.kind.as_str(),
            truncate(row.source_name.as_deref().unwrap_or("-"), 20),
            row.tokens_used,
            truncate(&preview, 40)
        );
    }
}

pub fn cmd_history_list(db: &Database, user: &str, limit: i64) -> Result<()> {
    let rows = db.list_history(user, limit)?;

    if rows.is_empty() {
        println!("No analyses yet. Try:");
        println!("  scanwise receipt --file receipt.txt");
        return Ok(());
    }

    println!();
    println!("📚 History ({} most recent)", rows.len());
    print_history_table(&rows);
    println!();
    Ok(())
}

pub fn cmd_history_search(db: &Database, user: &str, term: &str, limit: i64) -> Result<()> {
    if term.trim().is_empty() {
        return Err(anyhow!("Search term cannot be empty"));
    }

    let rows = db.search_history(user, term, limit)?;

    if rows.is_empty() {
        println!("No analyses matching '{}'", term);
        return Ok(());
    }

    println!();
    println!("🔍 {} result(s) for '{}'", rows.len(), term);
    print_history_table(&rows);
    println!();
    Ok(())
}

pub fn cmd_history_show(db: &Database, user: &str, id: i64) -> Result<()> {
    let analysis = db
        .get_analysis(id, user)?
        .ok_or_else(|| anyhow!("Analysis #{} not found", id))?;

    println!();
    println!(
        "#{} {} ({})",
        analysis.id,
        analysis.kind.as_str(),
        analysis.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(ref source) = analysis.source_name {
        println!("   Source: {}", source);
    }
    if let Some(ref options) = analysis.options {
        println!("   Options: {}", options);
    }
    println!(
        "   Tokens: {}  Time: {} ms",
        analysis.tokens_used, analysis.processing_ms
    );

    if analysis.kind == AnalysisKind::Receipt {
        if let Some(stored) = db.get_receipt_report(id, user)? {
            let threshold = analysis
                .options
                .as_deref()
                .and_then(|o| o.strip_prefix("threshold="))
                .and_then(|t| t.parse().ok())
                .unwrap_or(scanwise_core::DEFAULT_THRESHOLD_PCT);
            print_report(&stored.report, threshold);
            return Ok(());
        }
    }

    println!();
    println!("--- Input ---");
    println!("{}", analysis.extracted_text);
    if let Some(ref output) = analysis.output_text {
        println!();
        println!("--- Output ---");
        println!("{}", output);
    }

    Ok(())
}

pub fn cmd_history_delete(db: &Database, user: &str, id: i64) -> Result<()> {
    if db.delete_analysis(id, user)? {
        println!("🗑️  Deleted analysis #{}", id);
        Ok(())
    } else {
        Err(anyhow!("Analysis #{} not found", id))
    }
}

pub fn cmd_stats(db: &Database, user: &str, system: bool) -> Result<()> {
    let stats = db.get_user_stats(user)?;

    println!();
    println!("📊 Usage for {}", user);
    println!("   ─────────────────────────────");
    println!("   Analyses:        {}", stats.total_analyses);
    println!("   Tokens used:     {}", stats.total_tokens);
    println!("   Avg time:        {:.0} ms", stats.avg_processing_ms);
    println!("   Active days:     {}", stats.active_days);
    if let Some(last) = stats.last_activity {
        println!("   Last activity:   {}", last.format("%Y-%m-%d %H:%M"));
    }

    let spending = db.get_category_spending(user)?;
    if !spending.is_empty() {
        let total: f64 = spending.iter().map(|c| c.amount).sum();
        println!();
        println!("🛒 Spending by category");
        for category in &spending {
            let share = if total > 0.0 {
                category.amount / total * 100.0
            } else {
                0.0
            };
            println!(
                "   {:<16} {:>10} {:>6.1}%  ({} receipts)",
                category.category.as_str(),
                format!("${:.2}", category.amount),
                share,
                category.receipt_count
            );
        }
    }

    if system {
        let sys = db.get_system_stats()?;
        println!();
        println!("🌐 System");
        println!("   Users:           {}", sys.total_users);
        println!("   Analyses:        {}", sys.total_analyses);
        println!("   Tokens used:     {}", sys.total_tokens);
        println!("   Today:           {}", sys.today_analyses);
    }

    println!();
    Ok(())
}

pub fn cmd_export(
    db: &Database,
    user: &str,
    output: Option<&Path>,
    kind: Option<&str>,
    limit: Option<i64>,
) -> Result<()> {
    let kind = kind
        .map(|k| k.parse::<AnalysisKind>())
        .transpose()
        .map_err(|e: String| anyhow!(e))?;
    let opts = HistoryExportOptions { kind, limit };

    match output {
        Some(path) => {
            let count = db.export_history_to_path(user, &opts, path)?;
            println!("✅ Exported {} analyses to {}", count, path.display());
        }
        None => {
            print!("{}", db.export_history_csv(user, &opts)?);
        }
    }

    Ok(())
}
