//! SQLite persistence
//!
//! Authorized users, channels, and per-item history live here instead of
//! process-wide mutable lists. The orchestrator receives a [`Store`] by
//! injection; history writes are best-effort at the call sites.

use crate::error::Result;
use crate::types::{ContentKind, DownloadItem, ItemState, SourceKind};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;

/// One terminal item recorded in history
#[derive(Clone, Debug, FromRow)]
pub struct HistoryRow {
    /// Unique database id
    pub id: i64,
    /// Batch the item belonged to
    pub batch_name: String,
    /// Original input URL
    pub url: String,
    /// Display name
    pub name: String,
    /// Content category as text
    pub content_kind: String,
    /// Source platform as text
    pub source_kind: String,
    /// Terminal state as text
    pub status: String,
    /// Message from the final failure, when failed
    pub error: Option<String>,
    /// Unix timestamp of the terminal transition
    pub completed_at: i64,
}

/// SQLite-backed store for users, channels, and history
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database and run migrations
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePool::connect_with(options).await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                added_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                channel_id INTEGER PRIMARY KEY,
                is_log INTEGER NOT NULL DEFAULT 0,
                added_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_name TEXT NOT NULL,
                url TEXT NOT NULL,
                name TEXT NOT NULL,
                content_kind TEXT NOT NULL,
                source_kind TEXT NOT NULL,
                status TEXT NOT NULL,
                error TEXT,
                completed_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Authorize a user
    pub async fn add_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO users (user_id, added_at) VALUES (?, ?)")
            .bind(user_id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Revoke a user's authorization
    pub async fn remove_user(&self, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether a user is authorized
    pub async fn is_authorized(&self, user_id: i64) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// All authorized user ids
    pub async fn list_users(&self) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar("SELECT user_id FROM users ORDER BY user_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// Add a channel; `is_log` marks mirroring destinations
    pub async fn add_channel(&self, channel_id: i64, is_log: bool) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO channels (channel_id, is_log, added_at) VALUES (?, ?, ?)",
        )
        .bind(channel_id)
        .bind(is_log as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a channel
    pub async fn remove_channel(&self, channel_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM channels WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Channel ids, log-mirroring destinations only when `log_only`
    pub async fn list_channels(&self, log_only: bool) -> Result<Vec<i64>> {
        let ids = if log_only {
            sqlx::query_scalar("SELECT channel_id FROM channels WHERE is_log = 1 ORDER BY channel_id")
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query_scalar("SELECT channel_id FROM channels ORDER BY channel_id")
                .fetch_all(&self.pool)
                .await?
        };
        Ok(ids)
    }

    /// Record one terminal item
    pub async fn record_item(&self, batch_name: &str, item: &DownloadItem) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO history (
                batch_name, url, name, content_kind, source_kind,
                status, error, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(batch_name)
        .bind(item.original_url())
        .bind(&item.display_name)
        .bind(kind_text(item.content))
        .bind(source_text(item.source))
        .bind(state_text(item.state))
        .bind(&item.last_error)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent history rows, newest first
    pub async fn recent_history(&self, limit: usize) -> Result<Vec<HistoryRow>> {
        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT id, batch_name, url, name, content_kind, source_kind,
                   status, error, completed_at
            FROM history
            ORDER BY completed_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

fn kind_text(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Video => "video",
        ContentKind::Pdf => "pdf",
        ContentKind::Image => "image",
        ContentKind::Audio => "audio",
        ContentKind::Html => "html",
        ContentKind::ZipLink => "zip_link",
        ContentKind::Document => "document",
        ContentKind::EncryptedStream => "encrypted_stream",
        ContentKind::DrmStream => "drm_stream",
        ContentKind::Hls => "hls",
    }
}

fn source_text(source: SourceKind) -> &'static str {
    match source {
        SourceKind::EmbedPlayer => "embed_player",
        SourceKind::DrmCdn => "drm_cdn",
        SourceKind::SignedCdn => "signed_cdn",
        SourceKind::PortalPlayer => "portal_player",
        SourceKind::CloudDrive => "cloud_drive",
        SourceKind::VideoHost => "video_host",
        SourceKind::Generic => "generic",
    }
}

fn state_text(state: ItemState) -> &'static str {
    match state {
        ItemState::Pending => "pending",
        ItemState::Downloading => "downloading",
        ItemState::Downloaded => "downloaded",
        ItemState::Uploading => "uploading",
        ItemState::Uploaded => "uploaded",
        ItemState::Failed => "failed",
        ItemState::UploadFailed => "upload_failed",
    }
}
