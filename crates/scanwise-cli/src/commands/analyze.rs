//! Model-backed commands: receipt analysis, summaries and code review

use std::time::Instant;

use anyhow::{anyhow, Result};
use scanwise_core::models::{AnalysisKind, NewAnalysis, PipelineReport};
use scanwise_core::{
    content_hash, AnalysisType, CodeAnalyzer, Config, Database, DocumentAnalysis,
    LanguageModel, PlainTextExtractor, PromptLibrary, ReceiptPipeline, ReportStore,
    SummaryLength, Summarizer, TextExtractor,
};

use super::Input;

/// Flags for `scanwise receipt`
#[derive(Debug, Clone)]
pub struct ReceiptOptions {
    pub threshold: Option<f64>,
    pub language: String,
    pub json: bool,
    pub save: bool,
}

/// Analyze receipt text and optionally record it
///
/// Returns the stored analysis id when the report was saved.
pub async fn cmd_receipt<M: LanguageModel + Clone>(
    db: &Database,
    user: &str,
    model: M,
    config: &Config,
    input: &Input,
    options: &ReceiptOptions,
) -> Result<Option<i64>> {
    let pipeline = ReceiptPipeline::from_library(model, &mut PromptLibrary::new(), config)?;
    let threshold = options
        .threshold
        .unwrap_or_else(|| pipeline.default_threshold_pct());

    let started = Instant::now();
    let DocumentAnalysis {
        extracted_text: text,
        report,
    } = pipeline
        .analyze_document(&PlainTextExtractor, &input.bytes, &options.language, threshold)
        .await
        .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;
    let processing_ms = started.elapsed().as_millis() as i64;

    if let Some(previous) = db.find_by_hash(user, &content_hash(&text))? {
        println!(
            "ℹ️  This text was analyzed before (#{} on {})",
            previous.id,
            previous.created_at.format("%Y-%m-%d")
        );
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, threshold);
    }

    if !options.save {
        return Ok(None);
    }

    let meta = NewAnalysis {
        kind: AnalysisKind::Receipt,
        source_name: input.source_name.clone(),
        extracted_text: text,
        output_text: None,
        options: Some(format!("threshold={}", threshold)),
        tokens_used: report.usage.total(),
        processing_ms,
    };
    let id = db.save_report(user, &meta, &report)?;
    if !options.json {
        println!("💾 Saved as #{}", id);
    }

    Ok(Some(id))
}

/// Print a receipt report for the terminal
pub fn print_report(report: &PipelineReport, threshold: f64) {
    let receipt = &report.receipt;

    println!();
    println!(
        "🧾 {}{}",
        receipt.store_name.as_deref().unwrap_or("Receipt"),
        receipt
            .date
            .map(|d| format!(" ({})", d))
            .unwrap_or_default()
    );
    println!("   ─────────────────────────────────────────");
    println!("   Total: ${:.2}  ({} items)", report.breakdown.total, report.breakdown.item_count);

    let discrepancy = report.breakdown.discrepancy();
    if discrepancy.abs() >= 0.01 {
        println!(
            "   ⚠️  Items add up to ${:.2}, {:+.2} from the printed total",
            report.breakdown.items_total, -discrepancy
        );
    }

    println!();
    println!("   {:<16} {:>10} {:>8}", "CATEGORY", "AMOUNT", "SHARE");
    for spend in report.breakdown.iter() {
        println!(
            "   {:<16} {:>10} {:>7.1}%",
            spend.category.as_str(),
            format!("${:.2}", spend.amount),
            spend.percentage
        );
    }

    println!();
    if report.anomalies.is_empty() {
        println!("   ✅ No category above {:.0}% of spending", threshold);
    } else {
        for anomaly in &report.anomalies {
            println!("   🚨 {}", anomaly.message());
        }
    }

    println!();
    println!("💡 Advice");
    println!("{}", report.advice.text);
    println!();
    println!(
        "   Tokens: {} (parse {}, advice {})",
        report.usage.total(),
        report.usage.parse,
        report.usage.advice
    );
}

/// Summarize a text document and optionally record it
#[allow(clippy::too_many_arguments)]
pub async fn cmd_summarize<M: LanguageModel>(
    db: &Database,
    user: &str,
    model: M,
    config: &Config,
    input: &Input,
    length: &str,
    language: &str,
    save: bool,
) -> Result<Option<i64>> {
    let length: SummaryLength = length.parse().map_err(|e: String| anyhow!(e))?;
    let summarizer = Summarizer::from_library(model, &mut PromptLibrary::new(), config)?;

    let started = Instant::now();
    let text = PlainTextExtractor
        .extract(&input.bytes, language)
        .await
        .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;

    let summary = summarizer
        .summarize(&text, length, language)
        .await
        .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;

    println!();
    println!("📝 {} summary ({})", summary.length, summary.language);
    println!("   ─────────────────────────────────────────");
    println!("{}", summary.text);
    println!();
    println!("   Tokens: {}", summary.tokens_used);

    if !save {
        return Ok(None);
    }

    let id = db.save_analysis(
        user,
        &NewAnalysis {
            kind: AnalysisKind::Summary,
            source_name: input.source_name.clone(),
            extracted_text: text,
            output_text: Some(summary.text),
            options: Some(format!("{}/{}", summary.length, summary.language)),
            tokens_used: summary.tokens_used,
            processing_ms: started.elapsed().as_millis() as i64,
        },
    )?;
    println!("💾 Saved as #{}", id);

    Ok(Some(id))
}

/// Analyze source code and optionally record it
#[allow(clippy::too_many_arguments)]
pub async fn cmd_review<M: LanguageModel>(
    db: &Database,
    user: &str,
    model: M,
    config: &Config,
    input: &Input,
    analysis_type: &str,
    detect_language: bool,
    save: bool,
) -> Result<Option<i64>> {
    let analysis_type: AnalysisType = analysis_type.parse().map_err(|e: String| anyhow!(e))?;
    let analyzer = CodeAnalyzer::from_library(model, &mut PromptLibrary::new(), config)?;

    let started = Instant::now();
    let code = PlainTextExtractor
        .extract(&input.bytes, "English")
        .await
        .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;

    let language = if detect_language {
        let language = analyzer
            .detect_language(&code)
            .await
            .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;
        println!("🔎 Detected language: {}", language);
        Some(language)
    } else {
        None
    };

    let analysis = analyzer
        .analyze(&code, analysis_type)
        .await
        .map_err(|e| anyhow!("{} ({})", e.kind().user_message(), e))?;
    let tokens_used = analysis.tokens_used;

    println!();
    println!("🧑‍💻 {}", analysis.analysis_type);
    println!("   ─────────────────────────────────────────");
    println!("{}", analysis.text);
    println!();
    println!("   Tokens: {}", tokens_used);

    if !save {
        return Ok(None);
    }

    let options = match language {
        Some(lang) => format!("{}/{}", analysis.analysis_type, lang),
        None => analysis.analysis_type.to_string(),
    };
    let id = db.save_analysis(
        user,
        &NewAnalysis {
            kind: AnalysisKind::Code,
            source_name: input.source_name.clone(),
            extracted_text: code,
            output_text: Some(analysis.text),
            options: Some(options),
            tokens_used,
            processing_ms: started.elapsed().as_millis() as i64,
        },
    )?;
    println!("💾 Saved as #{}", id);

    Ok(Some(id))
}
