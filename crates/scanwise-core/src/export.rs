//! CSV export of analysis history

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Analysis, AnalysisKind};

/// Options for history export
#[derive(Debug, Clone, Default)]
pub struct HistoryExportOptions {
    /// Only rows of this kind
    pub kind: Option<AnalysisKind>,
    /// Most recent N rows; everything when unset
    pub limit: Option<i64>,
}

/// One CSV row
#[derive(Debug, Clone, Serialize)]
struct HistoryRow<'a> {
    id: i64,
    created_at: String,
    kind: &'static str,
    source_name: &'a str,
    tokens_used: i64,
    processing_ms: i64,
    options: &'a str,
    extracted_text: &'a str,
    output_text: &'a str,
}

impl<'a> From<&'a Analysis> for HistoryRow<'a> {
    fn from(a: &'a Analysis) -> Self {
        Self {
            id: a.id,
            created_at: a.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            kind: a.kind.as_str(),
            source_name: a.source_name.as_deref().unwrap_or(""),
            tokens_used: a.tokens_used,
            processing_ms: a.processing_ms,
            options: a.options.as_deref().unwrap_or(""),
            extracted_text: &a.extracted_text,
            output_text: a.output_text.as_deref().unwrap_or(""),
        }
    }
}

impl Database {
    /// History rows selected for export, newest first
    pub fn export_history(&self, user_id: &str, opts: &HistoryExportOptions) -> Result<Vec<Analysis>> {
        let mut rows = self.list_history(user_id, i64::MAX)?;
        if let Some(kind) = opts.kind {
            rows.retain(|a| a.kind == kind);
        }
        if let Some(limit) = opts.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }

    /// Write history as CSV with a header row
    pub fn write_history_csv<W: Write>(
        &self,
        user_id: &str,
        opts: &HistoryExportOptions,
        writer: W,
    ) -> Result<usize> {
        let rows = self.export_history(user_id, opts)?;

        let mut csv = csv::Writer::from_writer(writer);
        for row in &rows {
            csv.serialize(HistoryRow::from(row))?;
        }
        if rows.is_empty() {
            csv.write_record([
                "id",
                "created_at",
                "kind",
                "source_name",
                "tokens_used",
                "processing_ms",
                "options",
                "extracted_text",
                "output_text",
            ])?;
        }
        csv.flush()?;

        Ok(rows.len())
    }

    /// History as a CSV string
    pub fn export_history_csv(&self, user_id: &str, opts: &HistoryExportOptions) -> Result<String> {
        let mut buf = Vec::new();
        self.write_history_csv(user_id, opts, &mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::InvalidData(e.to_string()))
    }

    /// Write history CSV to a file, returning the row count
    pub fn export_history_to_path(
        &self,
        user_id: &str,
        opts: &HistoryExportOptions,
        path: &Path,
    ) -> Result<usize> {
        let file = std::fs::File::create(path)?;
        self.write_history_csv(user_id, opts, std::io::BufWriter::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAnalysis;

    fn analysis(kind: AnalysisKind, text: &str, output: &str) -> NewAnalysis {
        NewAnalysis {
            kind,
            source_name: Some("notes.txt".to_string()),
            extracted_text: text.to_string(),
            output_text: Some(output.to_string()),
            options: None,
            tokens_used: 10,
            processing_ms: 5,
        }
    }

    #[test]
    fn test_export_history_csv() {
        let db = Database::in_memory().unwrap();
        db.save_analysis("alice", &analysis(AnalysisKind::Summary, "Hello, world", "Says \"hi\""))
            .unwrap();

        let csv = db
            .export_history_csv("alice", &HistoryExportOptions::default())
            .unwrap();
        let mut lines = csv.lines();
        assert_eq!(
            lines.next().unwrap(),
            "id,created_at,kind,source_name,tokens_used,processing_ms,options,extracted_text,output_text"
        );
        let row = lines.next().unwrap();
        assert!(row.contains(",summary,notes.txt,10,5,,"));
        assert!(row.contains("\"Hello, world\""));
        assert!(row.contains("\"Says \"\"hi\"\"\""));
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_export_empty_history_has_header() {
        let db = Database::in_memory().unwrap();
        let csv = db
            .export_history_csv("nobody", &HistoryExportOptions::default())
            .unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("id,created_at,kind"));
    }

    #[test]
    fn test_export_filters_by_kind() {
        let db = Database::in_memory().unwrap();
        db.save_analysis("alice", &analysis(AnalysisKind::Summary, "a", "b"))
            .unwrap();
        db.save_analysis("alice", &analysis(AnalysisKind::Code, "fn x() {}", "fine"))
            .unwrap();

        let opts = HistoryExportOptions {
            kind: Some(AnalysisKind::Code),
            limit: None,
        };
        let rows = db.export_history("alice", &opts).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, AnalysisKind::Code);
    }

    #[test]
    fn test_export_to_path() {
        let db = Database::in_memory().unwrap();
        db.save_analysis("alice", &analysis(AnalysisKind::Summary, "a", "b"))
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        let count = db
            .export_history_to_path("alice", &HistoryExportOptions::default(), &path)
            .unwrap();
        assert_eq!(count, 1);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.lines().count(), 2);
    }
}
