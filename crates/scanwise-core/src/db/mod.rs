//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `analyses` - History rows and stored receipt reports
//! - `analytics` - Usage statistics and spending per category

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::error::{Error, Result};

mod analyses;
mod analytics;


pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Environment variable for database encryption key
pub const DB_KEY_ENV: &str = "SCANWISE_DB_KEY";

/// Derive an encryption key from a passphrase using Argon2
///
/// Uses a fixed application salt so the same passphrase always produces the same key,
/// regardless of database path.
fn derive_key(passphrase: &str) -> Result<String> {
    use argon2::{password_hash::SaltString, Argon2, PasswordHasher};

    // Changing this invalidates every existing encrypted database
    const APP_SALT: &[u8; 16] = b"scanwise-salt-v1";

    let salt = SaltString::encode_b64(APP_SALT)
        .map_err(|e| Error::Encryption(format!("Failed to create salt: {}", e)))?;

    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(passphrase.as_bytes(), &salt)
        .map_err(|e| Error::Encryption(format!("Failed to derive key: {}", e)))?;

    let hash_str = hash
        .hash
        .ok_or_else(|| Error::Encryption("No hash output".to_string()))?;
    Ok(hex::encode(hash_str.as_bytes()))
}

/// Parse a SQLite datetime string into a DateTime<Utc>
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    // SQLite stores as "YYYY-MM-DD HH:MM:SS" format
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

/// SHA-256 of extracted text, hex encoded
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    hex::encode(hasher.finalize())
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    db_path: String,
    encrypted: bool,
}

impl Database {
    /// Create a new database connection pool with encryption
    ///
    /// Requires `SCANWISE_DB_KEY` to be set. The database is encrypted with
    /// SQLCipher using a key derived from the passphrase via Argon2.
    pub fn new(path: &str) -> Result<Self> {
        match std::env::var(DB_KEY_ENV).ok() {
            Some(key) => Self::new_with_key(path, Some(&key)),
            None => Err(Error::Encryption(format!(
                "Database encryption required. Set {} environment variable with your passphrase, \
                or use --no-encrypt for unencrypted databases (not recommended for production).",
                DB_KEY_ENV
            ))),
        }
    }

    /// Create a new unencrypted database connection pool
    ///
    /// WARNING: development and testing only.
    pub fn new_unencrypted(path: &str) -> Result<Self> {
        Self::new_with_key(path, None)
    }

    /// Create a new database with an explicit encryption key
    pub fn new_with_key(path: &str, passphrase: Option<&str>) -> Result<Self> {
        let key_pragma = match passphrase {
            Some(pass) => Some(format!("PRAGMA key = 'x\"{}\"';", derive_key(pass)?)),
            None => None,
        };
        let encrypted = key_pragma.is_some();

        // Runs on every new pooled connection
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            if let Some(ref pragma) = key_pragma {
                conn.execute_batch(pragma)?;
            }
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
            encrypted,
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create an in-memory database (for testing)
    ///
    /// Uses a temporary file rather than `:memory:` because every pooled
    /// connection would otherwise get its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "scanwise_test_{}_{}.db",
            std::process::id(),
            id
        ));

        let _ = std::fs::remove_file(&path);

        Self::new_unencrypted(&path.to_string_lossy())
    }

    /// Whether the pool was opened with an encryption key
    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block writers
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- One row per analysis event (receipt, summary or code review)
            CREATE TABLE IF NOT EXISTS analyses (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                kind TEXT NOT NULL CHECK (kind IN ('receipt', 'summary', 'code')),
                source_name TEXT,
                content_hash TEXT NOT NULL,
                extracted_text TEXT NOT NULL,
                output_text TEXT,
                options TEXT,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                processing_ms INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_analyses_user ON analyses(user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_analyses_hash ON analyses(user_id, content_hash);

            -- Full receipt report snapshot
            CREATE TABLE IF NOT EXISTS receipt_reports (
                analysis_id INTEGER PRIMARY KEY REFERENCES analyses(id) ON DELETE CASCADE,
                store_name TEXT,
                receipt_date TEXT,
                total REAL NOT NULL,
                items_total REAL NOT NULL,
                anomaly_count INTEGER NOT NULL DEFAULT 0,
                report_json TEXT NOT NULL
            );

            -- Per-category spend for cross-receipt analytics
            CREATE TABLE IF NOT EXISTS receipt_categories (
                analysis_id INTEGER NOT NULL REFERENCES analyses(id) ON DELETE CASCADE,
                category TEXT NOT NULL,
                amount REAL NOT NULL,
                percentage REAL NOT NULL,
                PRIMARY KEY (analysis_id, category)
            );

            CREATE INDEX IF NOT EXISTS idx_receipt_categories_category
                ON receipt_categories(category);
            "#,
        )?;

        info!(path = %self.db_path, encrypted = self.encrypted, "Database ready");
        Ok(())
    }
}
