//! Usage statistics and spending analytics

use rusqlite::params;

use super::{parse_datetime, Database};
use crate::error::Result;
use crate::models::*;

impl Database {
    /// Activity statistics for one user
    pub fn get_user_stats(&self, user_id: &str) -> Result<UsageStats> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(tokens_used), 0),
                    COALESCE(AVG(processing_ms), 0.0),
                    COUNT(DISTINCT DATE(created_at)),
                    MAX(created_at)
             FROM analyses WHERE user_id = ?",
            params![user_id],
            |row| {
                let last: Option<String> = row.get(4)?;
                Ok(UsageStats {
                    total_analyses: row.get(0)?,
                    total_tokens: row.get(1)?,
                    avg_processing_ms: row.get(2)?,
                    active_days: row.get(3)?,
                    last_activity: last.as_deref().map(parse_datetime),
                })
            },
        )?;
        Ok(stats)
    }

    /// Whole-system statistics
    pub fn get_system_stats(&self) -> Result<SystemStats> {
        let conn = self.conn()?;
        let stats = conn.query_row(
            "SELECT COUNT(DISTINCT user_id),
                    COUNT(*),
                    COALESCE(SUM(tokens_used), 0),
                    COALESCE(SUM(CASE WHEN DATE(created_at) = DATE('now') THEN 1 ELSE 0 END), 0)
             FROM analyses",
            [],
            |row| {
                Ok(SystemStats {
                    total_users: row.get(0)?,
                    total_analyses: row.get(1)?,
                    total_tokens: row.get(2)?,
                    today_analyses: row.get(3)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Spend per category across all of a user's stored receipts, largest first
    pub fn get_category_spending(&self, user_id: &str) -> Result<Vec<CategoryTotal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.category, SUM(c.amount) AS spent, COUNT(DISTINCT c.analysis_id)
             FROM receipt_categories c
             JOIN analyses a ON a.id = c.analysis_id
             WHERE a.user_id = ?
             GROUP BY c.category
             ORDER BY spent DESC, c.category ASC",
        )?;

        let totals = stmt
            .query_map(params![user_id], |row| {
                let category: String = row.get(0)?;
                Ok(CategoryTotal {
                    category: Category::from_label(&category),
                    amount: row.get(1)?,
                    receipt_count: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(totals)
    }
}
