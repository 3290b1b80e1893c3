//! Analysis history and stored receipt reports

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{content_hash, parse_datetime, Database};
use crate::error::{Error, Result};
use crate::models::*;
use crate::pipeline::ReportStore;

const ANALYSIS_COLUMNS: &str = "id, user_id, kind, source_name, content_hash, extracted_text,
     output_text, options, tokens_used, processing_ms, created_at";

impl Database {
    /// Record a summary, code analysis or bare receipt event
    pub fn save_analysis(&self, user_id: &str, analysis: &NewAnalysis) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analyses (user_id, kind, source_name, content_hash, extracted_text,
             output_text, options, tokens_used, processing_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                analysis.kind.as_str(),
                analysis.source_name,
                content_hash(&analysis.extracted_text),
                analysis.extracted_text,
                analysis.output_text,
                analysis.options,
                analysis.tokens_used,
                analysis.processing_ms,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Store a pipeline report with its history row and category rows
    ///
    /// Everything is written in one transaction.
    pub fn save_receipt_report(
        &self,
        user_id: &str,
        meta: &NewAnalysis,
        report: &PipelineReport,
    ) -> Result<i64> {
        let report_json = serde_json::to_string(report)?;
        let output_text = meta
            .output_text
            .clone()
            .unwrap_or_else(|| report.advice.text.clone());

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO analyses (user_id, kind, source_name, content_hash, extracted_text,
             output_text, options, tokens_used, processing_ms)
             VALUES (?, 'receipt', ?, ?, ?, ?, ?, ?, ?)",
            params![
                user_id,
                meta.source_name,
                content_hash(&meta.extracted_text),
                meta.extracted_text,
                output_text,
                meta.options,
                report.usage.total(),
                meta.processing_ms,
            ],
        )?;
        let analysis_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO receipt_reports (analysis_id, store_name, receipt_date, total,
             items_total, anomaly_count, report_json)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                analysis_id,
                report.receipt.store_name,
                report.receipt.date.map(|d| d.to_string()),
                report.breakdown.total,
                report.breakdown.items_total,
                report.anomalies.len() as i64,
                report_json,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO receipt_categories (analysis_id, category, amount, percentage)
                 VALUES (?, ?, ?, ?)",
            )?;
            for spend in report.breakdown.iter() {
                stmt.execute(params![
                    analysis_id,
                    spend.category.as_str(),
                    spend.amount,
                    spend.percentage
                ])?;
            }
        }

        tx.commit()?;
        debug!(analysis_id, user_id, "Stored receipt report");
        Ok(analysis_id)
    }

    /// Get one history row owned by `user_id`
    pub fn get_analysis(&self, id: i64, user_id: &str) -> Result<Option<Analysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM analyses WHERE id = ? AND user_id = ?",
            ANALYSIS_COLUMNS
        ))?;

        let analysis = stmt
            .query_row(params![id, user_id], Self::row_to_analysis)
            .optional()?;

        Ok(analysis)
    }

    /// Get a stored receipt report owned by `user_id`
    pub fn get_receipt_report(&self, id: i64, user_id: &str) -> Result<Option<StoredReport>> {
        let Some(analysis) = self.get_analysis(id, user_id)? else {
            return Ok(None);
        };

        let conn = self.conn()?;
        let report_json: Option<String> = conn
            .query_row(
                "SELECT report_json FROM receipt_reports WHERE analysis_id = ?",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        match report_json {
            Some(json) => {
                let report: PipelineReport = serde_json::from_str(&json).map_err(|e| {
                    Error::InvalidData(format!("Stored report {} is corrupt: {}", id, e))
                })?;
                Ok(Some(StoredReport { analysis, report }))
            }
            None => Ok(None),
        }
    }

    /// Most recent history rows first
    pub fn list_history(&self, user_id: &str, limit: i64) -> Result<Vec<Analysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM analyses WHERE user_id = ?
             ORDER BY created_at DESC, id DESC LIMIT ?",
            ANALYSIS_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![user_id, limit], Self::row_to_analysis)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Case-insensitive search over extracted text, output and source name
    pub fn search_history(&self, user_id: &str, term: &str, limit: i64) -> Result<Vec<Analysis>> {
        let pattern = format!("%{}%", escape_like(term.trim()));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM analyses
             WHERE user_id = ?1
               AND (extracted_text LIKE ?2 ESCAPE '\\'
                    OR output_text LIKE ?2 ESCAPE '\\'
                    OR source_name LIKE ?2 ESCAPE '\\')
             ORDER BY created_at DESC, id DESC LIMIT ?3",
            ANALYSIS_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![user_id, pattern, limit], Self::row_to_analysis)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Delete a history row (and its report) owned by `user_id`
    ///
    /// Returns false when nothing matched.
    pub fn delete_analysis(&self, id: i64, user_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM analyses WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        Ok(deleted > 0)
    }

    /// Latest analysis of the same text, if this user has seen it before
    pub fn find_by_hash(&self, user_id: &str, hash: &str) -> Result<Option<Analysis>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM analyses WHERE user_id = ? AND content_hash = ?
             ORDER BY created_at DESC, id DESC LIMIT 1",
            ANALYSIS_COLUMNS
        ))?;

        let analysis = stmt
            .query_row(params![user_id, hash], Self::row_to_analysis)
            .optional()?;

        Ok(analysis)
    }

    /// Helper to convert a row to Analysis
    fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<Analysis> {
        let kind_str: String = row.get(2)?;
        let kind: AnalysisKind = kind_str.parse().map_err(|e: String| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
        })?;
        let created_at_str: String = row.get(10)?;

        Ok(Analysis {
            id: row.get(0)?,
            user_id: row.get(1)?,
            kind,
            source_name: row.get(3)?,
            content_hash: row.get(4)?,
            extracted_text: row.get(5)?,
            output_text: row.get(6)?,
            options: row.get(7)?,
            tokens_used: row.get(8)?,
            processing_ms: row.get(9)?,
            created_at: parse_datetime(&created_at_str),
        })
    }
}

impl ReportStore for Database {
    fn save_report(
        &self,
        user_id: &str,
        meta: &NewAnalysis,
        report: &PipelineReport,
    ) -> Result<i64> {
        self.save_receipt_report(user_id, meta, report)
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern using `\` as the escape character
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
