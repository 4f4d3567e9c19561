//! SQLite session store.

use crate::core::classifier::Confidence;
use crate::core::embedding::Embedding;
use crate::core::session::{ClickPoint, KeySummary, Session};
use crate::store::{DuplicatePolicy, InsertOutcome, SessionStore, StoreError};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, Transaction};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use uuid::Uuid;

const CURRENT_SCHEMA_VERSION: i32 = 2;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS click_sessions (
    ts_first_click    INTEGER PRIMARY KEY,
    ts_end            INTEGER NOT NULL,
    screenshot_jpeg   BLOB NOT NULL,
    clip_vector       BLOB NOT NULL,
    window_title      TEXT NOT NULL,
    app               TEXT NOT NULL,
    action            TEXT NOT NULL,
    conf_app          REAL NOT NULL,
    conf_action_raw   REAL NOT NULL,
    conf_action_boost REAL NOT NULL,
    key_summary       TEXT NOT NULL,
    run_id            TEXT NOT NULL
);
";

const SCHEMA_V2: &str = r"
ALTER TABLE click_sessions ADD COLUMN click_x REAL;
ALTER TABLE click_sessions ADD COLUMN click_y REAL;
ALTER TABLE click_sessions ADD COLUMN click_x_perc REAL;
ALTER TABLE click_sessions ADD COLUMN click_y_perc REAL;
";

const SESSION_COLUMNS: &str = "ts_first_click, ts_end, clip_vector, window_title, app, action, \
     conf_app, conf_action_raw, conf_action_boost, key_summary, run_id, \
     click_x, click_y, click_x_perc, click_y_perc";

/// A stored session without its screenshot bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredSessionInfo {
    pub session_start_ts: i64,
    pub ended_ts: i64,
    #[serde(skip)]
    pub embedding: Embedding,
    pub window_title: String,
    pub click: Option<ClickPoint>,
    pub app_label: String,
    pub action_label: String,
    pub confidence: Confidence,
    pub key_summary: KeySummary,
    pub run_id: String,
}

/// Sessions table in a single SQLite database.
pub struct SqliteStore {
    conn: Connection,
    policy: DuplicatePolicy,
    run_id: String,
}

impl SqliteStore {
    /// Open or create the store at `path`.
    pub fn open(path: impl AsRef<Path>, policy: DuplicatePolicy) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!(error = %err, "failed to enable WAL mode");
        }
        let store = Self::with_connection(conn, policy)?;
        info!(path = %path.display(), run_id = %store.run_id, "session store opened");
        Ok(store)
    }

    /// A private store that lives as long as the handle.
    pub fn open_in_memory(policy: DuplicatePolicy) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, policy)
    }

    fn with_connection(mut conn: Connection, policy: DuplicatePolicy) -> Result<Self, StoreError> {
        run_migrations(&mut conn)?;
        Ok(Self {
            conn,
            policy,
            run_id: Uuid::new_v4().to_string(),
        })
    }

    /// Identifier stamped on every row written through this handle.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Number of stored sessions.
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM click_sessions", [], |row| row.get(0))?;
        u64::try_from(count).map_err(|_| StoreError::InvalidDbValue(format!("count {count}")))
    }

    /// Most recent sessions first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredSessionInfo>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM click_sessions ORDER BY ts_first_click DESC LIMIT ?1"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], decode_row)?;
        rows.map(|row| row?).collect()
    }

    /// Sessions started in `[from_ts, to_ts)`, oldest first.
    pub fn range(&self, from_ts: i64, to_ts: i64) -> Result<Vec<StoredSessionInfo>, StoreError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM click_sessions
             WHERE ts_first_click >= ?1 AND ts_first_click < ?2
             ORDER BY ts_first_click ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![from_ts, to_ts], decode_row)?;
        rows.map(|row| row?).collect()
    }

    /// The session that started at `session_start_ts`.
    pub fn get(&self, session_start_ts: i64) -> Result<Option<StoredSessionInfo>, StoreError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM click_sessions WHERE ts_first_click = ?1");
        self.conn
            .query_row(&sql, params![session_start_ts], decode_row)
            .optional()?
            .transpose()
    }

    /// Stored JPEG bytes of a session's screenshot.
    pub fn screenshot(&self, session_start_ts: i64) -> Result<Option<Vec<u8>>, StoreError> {
        self.conn
            .query_row(
                "SELECT screenshot_jpeg FROM click_sessions WHERE ts_first_click = ?1",
                params![session_start_ts],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
    }
}

impl SessionStore for SqliteStore {
    fn insert_session(&mut self, session: &Session) -> Result<InsertOutcome, StoreError> {
        let verb = match self.policy {
            DuplicatePolicy::Ignore => "INSERT OR IGNORE",
            DuplicatePolicy::Reject => "INSERT",
        };
        let sql = format!(
            "{verb} INTO click_sessions (
                ts_first_click, ts_end, screenshot_jpeg, clip_vector, window_title,
                app, action, conf_app, conf_action_raw, conf_action_boost, key_summary, run_id,
                click_x, click_y, click_x_perc, click_y_perc
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        );
        let key_summary = serde_json::to_string(&session.key_summary)?;
        let click = session.click.as_ref();

        let result = self.conn.execute(
            &sql,
            params![
                session.session_start_ts,
                session.ended_ts,
                session.screenshot,
                session.embedding.to_blob(),
                session.window_title,
                session.app_label,
                session.action_label,
                session.confidence.app as f64,
                session.confidence.action_raw as f64,
                session.confidence.action_boost as f64,
                key_summary,
                self.run_id,
                click.map(|c| c.x),
                click.map(|c| c.y),
                click.map(|c| c.x_perc),
                click.map(|c| c.y_perc),
            ],
        );

        match result {
            Ok(0) => {
                debug!(ts = session.session_start_ts, "duplicate session ignored");
                Ok(InsertOutcome::Ignored)
            }
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(session.session_start_ts))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchema {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        version += 1;
        apply_migration(&tx, version)?;
        debug!(version, "applied schema migration");
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;
    Ok(())
}

fn apply_migration(tx: &Transaction<'_>, version: i32) -> Result<(), StoreError> {
    match version {
        1 => tx.execute_batch(SCHEMA_V1)?,
        2 => tx.execute_batch(SCHEMA_V2)?,
        _ => {
            return Err(StoreError::UnsupportedSchema {
                found: version,
                supported: CURRENT_SCHEMA_VERSION,
            })
        }
    }
    Ok(())
}

type DecodedRow = Result<StoredSessionInfo, StoreError>;

fn decode_row(row: &Row) -> rusqlite::Result<DecodedRow> {
    let blob: Vec<u8> = row.get("clip_vector")?;
    let key_summary: String = row.get("key_summary")?;
    let conf_app: f64 = row.get("conf_app")?;
    let conf_action_raw: f64 = row.get("conf_action_raw")?;
    let conf_action_boost: f64 = row.get("conf_action_boost")?;
    let session_start_ts: i64 = row.get("ts_first_click")?;
    let ended_ts: i64 = row.get("ts_end")?;
    let window_title: String = row.get("window_title")?;
    let app_label: String = row.get("app")?;
    let action_label: String = row.get("action")?;
    let run_id: String = row.get("run_id")?;
    let click_x: Option<f64> = row.get("click_x")?;
    let click_y: Option<f64> = row.get("click_y")?;
    let click_x_perc: Option<f64> = row.get("click_x_perc")?;
    let click_y_perc: Option<f64> = row.get("click_y_perc")?;
    let click = match (click_x, click_y, click_x_perc, click_y_perc) {
        (Some(x), Some(y), Some(x_perc), Some(y_perc)) => Some(ClickPoint {
            x,
            y,
            x_perc,
            y_perc,
        }),
        _ => None,
    };

    Ok((|| {
        let embedding = Embedding::from_blob(&blob).map_err(|e| {
            StoreError::InvalidDbValue(format!("embedding of session {session_start_ts}: {e}"))
        })?;
        let key_summary: KeySummary = serde_json::from_str(&key_summary)?;
        Ok(StoredSessionInfo {
            session_start_ts,
            ended_ts,
            embedding,
            window_title,
            click,
            app_label,
            action_label,
            confidence: Confidence {
                app: conf_app as f32,
                action_raw: conf_action_raw as f32,
                action_boost: conf_action_boost as f32,
            },
            key_summary,
            run_id,
        })
    })())
}
