//! Session and segment storage on SQLite
//!
//! Sessions are one row of running totals; segments are append-only rows
//! holding the outer-compressed recording bytes. Reads never assume a
//! segment decodes: a malformed row is skipped with a warning so one bad
//! write cannot take a whole session's timeline down.

use crate::relay::{Compressor, SessionRequest, SessionTicket};
use crate::timeline::SegmentRecording;
use crate::utils::errors::{EngineError, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("replay-engine.db"),
        }
    }
}

/// One session's identity and running totals
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub session_id: String,
    pub account_id: String,
    pub website_id: String,
    pub profiler_id: String,
    pub origin_url: Option<String>,
    pub user_agent: Option<String>,
    pub has_error: bool,
    pub duration: i64,
    pub bytes: i64,
    pub page_count: i64,
    pub segment_count: i64,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One stored segment's bytes and the metadata streaming needs
#[derive(Debug, Clone)]
pub struct SegmentRow {
    pub bytes: Vec<u8>,
    pub duration: i64,
    pub record_count: i64,
}

/// A session's totals together with its decoded segments
#[derive(Debug, Clone)]
pub struct SessionOverview {
    pub session: SessionRow,
    pub recordings: Vec<SegmentRecording>,
}

/// Session/segment store
pub struct SegmentStore {
    db: Arc<Mutex<Connection>>,
    compressor: Compressor,
}

impl SegmentStore {
    /// Open (or create) the store at the configured path
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                EngineError::Storage(format!("failed to create storage directory: {}", e))
            })?;
        }

        let conn = Connection::open(&config.db_path)
            .map_err(|e| EngineError::Storage(format!("failed to open database: {}", e)))?;

        let store = Self {
            db: Arc::new(Mutex::new(conn)),
            compressor: Compressor::default(),
        };
        store.init_schema().await?;

        info!(path = %config.db_path.display(), "segment store opened");
        Ok(store)
    }

    async fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().await;

        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                website_id TEXT NOT NULL,
                profiler_id TEXT NOT NULL,
                origin_url TEXT,
                user_agent TEXT,
                has_error INTEGER NOT NULL DEFAULT 0,
                duration INTEGER NOT NULL DEFAULT 0,
                bytes INTEGER NOT NULL DEFAULT 0,
                page_count INTEGER NOT NULL DEFAULT 0,
                segment_count INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS segments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL REFERENCES sessions(session_id),
                bytes BLOB NOT NULL,
                byte_len INTEGER NOT NULL,
                duration INTEGER NOT NULL,
                record_count INTEGER NOT NULL,
                page_count INTEGER NOT NULL,
                has_error INTEGER NOT NULL,
                persisted_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_segments_session
                ON segments(session_id, persisted_at, id);
            "#,
        )
        .map_err(|e| EngineError::Storage(format!("schema creation failed: {}", e)))?;

        Ok(())
    }

    /// Insert a freshly issued session
    pub async fn create_session(
        &self,
        ticket: &SessionTicket,
        request: &SessionRequest,
    ) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        let db = self.db.lock().await;

        db.execute(
            r#"
            INSERT INTO sessions (
                session_id, account_id, website_id, profiler_id,
                origin_url, user_agent, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                ticket.session_id,
                ticket.account_id,
                ticket.website_id,
                ticket.profiler_id,
                request.origin_url,
                request.user_agent,
                now,
                now,
            ],
        )
        .map_err(|e| EngineError::Storage(format!("session insert failed: {}", e)))?;

        Ok(())
    }

    /// Fetch one session's totals
    pub async fn session(&self, session_id: &str) -> Result<Option<SessionRow>> {
        let db = self.db.lock().await;

        db.query_row(
            r#"
            SELECT session_id, account_id, website_id, profiler_id,
                   origin_url, user_agent, has_error, duration, bytes,
                   page_count, segment_count, version, created_at, updated_at
            FROM sessions WHERE session_id = ?
            "#,
            params![session_id],
            |row| {
                Ok(SessionRow {
                    session_id: row.get(0)?,
                    account_id: row.get(1)?,
                    website_id: row.get(2)?,
                    profiler_id: row.get(3)?,
                    origin_url: row.get(4)?,
                    user_agent: row.get(5)?,
                    has_error: row.get::<_, i64>(6)? != 0,
                    duration: row.get(7)?,
                    bytes: row.get(8)?,
                    page_count: row.get(9)?,
                    segment_count: row.get(10)?,
                    version: row.get(11)?,
                    created_at: row.get(12)?,
                    updated_at: row.get(13)?,
                })
            },
        )
        .optional()
        .map_err(|e| EngineError::Storage(format!("session query failed: {}", e)))
    }

    /// List every session, most recently updated first
    pub async fn sessions(&self) -> Result<Vec<SessionRow>> {
        let db = self.db.lock().await;

        let mut stmt = db
            .prepare(
                r#"
                SELECT session_id, account_id, website_id, profiler_id,
                       origin_url, user_agent, has_error, duration, bytes,
                       page_count, segment_count, version, created_at, updated_at
                FROM sessions ORDER BY updated_at DESC, session_id
                "#,
            )
            .map_err(|e| EngineError::Storage(format!("query preparation failed: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SessionRow {
                    session_id: row.get(0)?,
                    account_id: row.get(1)?,
                    website_id: row.get(2)?,
                    profiler_id: row.get(3)?,
                    origin_url: row.get(4)?,
                    user_agent: row.get(5)?,
                    has_error: row.get::<_, i64>(6)? != 0,
                    duration: row.get(7)?,
                    bytes: row.get(8)?,
                    page_count: row.get(9)?,
                    segment_count: row.get(10)?,
                    version: row.get(11)?,
                    created_at: row.get(12)?,
                    updated_at: row.get(13)?,
                })
            })
            .map_err(|e| EngineError::Storage(format!("session scan failed: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::Storage(format!("session scan failed: {}", e)))?;

        Ok(rows)
    }

    /// Append one segment and fold its totals into the session row.
    ///
    /// Both writes happen in one transaction; the session's version bumps by
    /// one per accepted segment and the error flag is sticky.
    pub async fn append_segment(
        &self,
        session_id: &str,
        recording: &SegmentRecording,
        record_count: usize,
    ) -> Result<()> {
        let bytes = self.compressor.compress_json(recording)?;
        let now = chrono::Utc::now().timestamp_millis();

        let mut db = self.db.lock().await;
        let tx = db
            .transaction()
            .map_err(|e| EngineError::Storage(format!("transaction failed: {}", e)))?;

        // fold the totals first: a missing session row must surface as a
        // session error, not as a constraint failure on the segment insert
        let updated = tx
            .execute(
                r#"
                UPDATE sessions SET
                    duration = duration + ?,
                    bytes = bytes + ?,
                    page_count = page_count + ?,
                    segment_count = segment_count + 1,
                    has_error = MAX(has_error, ?),
                    version = version + 1,
                    updated_at = ?
                WHERE session_id = ?
                "#,
                params![
                    recording.duration,
                    bytes.len() as i64,
                    recording.pages.len() as i64,
                    recording.has_error,
                    now,
                    session_id,
                ],
            )
            .map_err(|e| EngineError::Storage(format!("session update failed: {}", e)))?;

        if updated == 0 {
            return Err(EngineError::Session(format!(
                "unknown session {}",
                session_id
            )));
        }

        tx.execute(
            r#"
            INSERT INTO segments (
                session_id, bytes, byte_len, duration,
                record_count, page_count, has_error, persisted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                session_id,
                bytes,
                bytes.len() as i64,
                recording.duration,
                record_count as i64,
                recording.pages.len() as i64,
                recording.has_error,
                now,
            ],
        )
        .map_err(|e| EngineError::Storage(format!("segment insert failed: {}", e)))?;

        tx.commit()
            .map_err(|e| EngineError::Storage(format!("commit failed: {}", e)))?;

        debug!(
            session_id,
            bytes = bytes.len(),
            records = record_count,
            "segment persisted"
        );
        Ok(())
    }

    /// Number of segments stored for a session
    pub async fn segment_count(&self, session_id: &str) -> Result<usize> {
        let db = self.db.lock().await;

        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM segments WHERE session_id = ?",
                params![session_id],
                |row| row.get(0),
            )
            .map_err(|e| EngineError::Storage(format!("segment count failed: {}", e)))?;

        Ok(count as usize)
    }

    /// Fetch the n-th segment (persistence order) as stored bytes
    pub async fn segment_at(&self, session_id: &str, index: usize) -> Result<Option<SegmentRow>> {
        let db = self.db.lock().await;

        db.query_row(
            r#"
            SELECT bytes, duration, record_count FROM segments
            WHERE session_id = ?
            ORDER BY persisted_at, id
            LIMIT 1 OFFSET ?
            "#,
            params![session_id, index as i64],
            |row| {
                Ok(SegmentRow {
                    bytes: row.get(0)?,
                    duration: row.get(1)?,
                    record_count: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(|e| EngineError::Storage(format!("segment query failed: {}", e)))
    }

    /// Fetch and decode the n-th segment
    pub async fn recording_at(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<Option<SegmentRecording>> {
        match self.segment_at(session_id, index).await? {
            Some(row) => Ok(Some(self.compressor.decompress_json(&row.bytes)?)),
            None => Ok(None),
        }
    }

    /// Decode every segment of a session, in persistence order.
    ///
    /// Rows that fail to decode are skipped, not fatal.
    pub async fn load_recordings(&self, session_id: &str) -> Result<Vec<SegmentRecording>> {
        let rows: Vec<Vec<u8>> = {
            let db = self.db.lock().await;
            let mut stmt = db
                .prepare(
                    r#"
                    SELECT bytes FROM segments
                    WHERE session_id = ?
                    ORDER BY persisted_at, id
                    "#,
                )
                .map_err(|e| EngineError::Storage(format!("query preparation failed: {}", e)))?;

            let rows = stmt
                .query_map(params![session_id], |row| row.get(0))
                .map_err(|e| EngineError::Storage(format!("segment scan failed: {}", e)))?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| EngineError::Storage(format!("segment scan failed: {}", e)))?;
            rows
        };

        let mut recordings = Vec::with_capacity(rows.len());
        for (idx, bytes) in rows.iter().enumerate() {
            match self.compressor.decompress_json::<SegmentRecording>(bytes) {
                Ok(recording) => recordings.push(recording),
                Err(e) => {
                    warn!(session_id, segment = idx, error = %e, "skipping malformed segment");
                }
            }
        }

        Ok(recordings)
    }

    /// Everything a viewer needs to open a session: the totals row plus the
    /// decoded segments, ready for aggregation
    pub async fn session_overview(&self, session_id: &str) -> Result<Option<SessionOverview>> {
        let Some(session) = self.session(session_id).await? else {
            return Ok(None);
        };
        let recordings = self.load_recordings(session_id).await?;
        Ok(Some(SessionOverview {
            session,
            recordings,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::{EventKind, EventRecord};
    use crate::capture::FlushSnapshot;
    use crate::timeline::PageMarker;
    use tempfile::tempdir;

    fn ticket(id: &str) -> SessionTicket {
        SessionTicket {
            session_id: id.to_string(),
            account_id: "acct".into(),
            website_id: "site".into(),
            profiler_id: "prof".into(),
        }
    }

    fn recording(duration: i64, has_error: bool) -> SegmentRecording {
        SegmentRecording {
            pages: vec![PageMarker {
                buffer_event_idx: 0,
                url: Some("https://example.com".into()),
                start_time: 0,
            }],
            event_buffer: vec![FlushSnapshot {
                errors: Vec::new(),
                records: vec![EventRecord::new(EventKind::Dom, 0)],
            }],
            duration,
            has_error,
        }
    }

    async fn store() -> (tempfile::TempDir, SegmentStore) {
        let dir = tempdir().unwrap();
        let config = StorageConfig {
            db_path: dir.path().join("replay.db"),
        };
        let store = SegmentStore::new(&config).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let (_dir, store) = store().await;
        store
            .create_session(&ticket("s1"), &SessionRequest::default())
            .await
            .unwrap();

        let row = store.session("s1").await.unwrap().unwrap();
        assert_eq!(row.session_id, "s1");
        assert_eq!(row.segment_count, 0);
        assert!(store.session("missing").await.unwrap().is_none());

        let all = store.sessions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].session_id, "s1");
    }

    #[tokio::test]
    async fn test_append_accumulates_totals() {
        let (_dir, store) = store().await;
        store
            .create_session(&ticket("s1"), &SessionRequest::default())
            .await
            .unwrap();

        store
            .append_segment("s1", &recording(100, false), 1)
            .await
            .unwrap();
        store
            .append_segment("s1", &recording(250, true), 1)
            .await
            .unwrap();
        // the error flag is sticky once set
        store
            .append_segment("s1", &recording(50, false), 1)
            .await
            .unwrap();

        let row = store.session("s1").await.unwrap().unwrap();
        assert_eq!(row.duration, 400);
        assert_eq!(row.page_count, 3);
        assert_eq!(row.segment_count, 3);
        assert_eq!(row.version, 3);
        assert!(row.has_error);
        assert!(row.bytes > 0);
    }

    #[tokio::test]
    async fn test_append_to_unknown_session_fails() {
        let (_dir, store) = store().await;
        let err = store
            .append_segment("missing", &recording(10, false), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Session(_)));
        // the rejected append leaves no orphan segment behind
        assert_eq!(store.segment_count("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_segments_keep_persistence_order() {
        let (_dir, store) = store().await;
        store
            .create_session(&ticket("s1"), &SessionRequest::default())
            .await
            .unwrap();

        for duration in [10, 20, 30] {
            store
                .append_segment("s1", &recording(duration, false), 1)
                .await
                .unwrap();
        }

        assert_eq!(store.segment_count("s1").await.unwrap(), 3);
        let first = store.recording_at("s1", 0).await.unwrap().unwrap();
        let last = store.recording_at("s1", 2).await.unwrap().unwrap();
        assert_eq!(first.duration, 10);
        assert_eq!(last.duration, 30);
        assert!(store.segment_at("s1", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_recordings_skips_malformed() {
        let (_dir, store) = store().await;
        store
            .create_session(&ticket("s1"), &SessionRequest::default())
            .await
            .unwrap();
        store
            .append_segment("s1", &recording(10, false), 1)
            .await
            .unwrap();

        // corrupt a second row directly
        {
            let db = store.db.lock().await;
            db.execute(
                "INSERT INTO segments (session_id, bytes, byte_len, duration, record_count, page_count, has_error, persisted_at) \
                 VALUES ('s1', X'DEADBEEF', 4, 0, 0, 0, 0, 9999999999999)",
                [],
            )
            .unwrap();
        }

        let recordings = store.load_recordings("s1").await.unwrap();
        assert_eq!(recordings.len(), 1);
        assert_eq!(recordings[0].duration, 10);
    }

    #[tokio::test]
    async fn test_session_overview_pairs_totals_with_segments() {
        let (_dir, store) = store().await;
        store
            .create_session(&ticket("s1"), &SessionRequest::default())
            .await
            .unwrap();
        store
            .append_segment("s1", &recording(75, false), 1)
            .await
            .unwrap();

        let overview = store.session_overview("s1").await.unwrap().unwrap();
        assert_eq!(overview.session.duration, 75);
        assert_eq!(overview.recordings.len(), 1);
        assert!(store.session_overview("missing").await.unwrap().is_none());
    }
}
