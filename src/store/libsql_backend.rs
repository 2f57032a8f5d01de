//! libSQL backend — async `SessionStore` implementation.
//!
//! One sessions table holding the serialized state blob per chat, plus a
//! flat `farmers` profile snapshot (kept queryable for reporting) and a
//! `crop_images` log of uploaded photos. Supports local file and in-memory
//! databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::session::{SessionState, utc_now_iso};
use crate::store::SessionStore;

/// libSQL session store.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlStore {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS sessions (
        session_id TEXT PRIMARY KEY,
        state_json TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS farmers (
        session_id TEXT PRIMARY KEY,
        farmer_name TEXT,
        crop TEXT,
        land_size TEXT,
        land_unit TEXT,
        location_text TEXT,
        lat TEXT,
        lon TEXT,
        updated_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS crop_images (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        file_path TEXT NOT NULL,
        caption TEXT,
        remote_file_id TEXT,
        created_at TEXT NOT NULL
    )",
];

impl LibSqlStore {
    /// Open (or create) a local database file and initialize the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Open(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        info!(path = %path.display(), "Session database opened");
        Ok(store)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("Failed to create in-memory database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("Failed to create connection: {e}")))?;

        let store = Self {
            db: Arc::new(db),
            conn,
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        for stmt in SCHEMA {
            self.conn
                .execute(stmt, ())
                .await
                .map_err(|e| StoreError::Query(format!("Schema init failed: {e}")))?;
        }
        Ok(())
    }
}

fn validate_session_id(session_id: &str) -> Result<&str, StoreError> {
    let id = session_id.trim();
    if id.is_empty() {
        return Err(StoreError::InvalidSessionId(session_id.to_string()));
    }
    Ok(id)
}

#[async_trait]
impl SessionStore for LibSqlStore {
    async fn load(&self, session_id: &str) -> Result<SessionState, StoreError> {
        let id = validate_session_id(session_id)?;

        let mut rows = self
            .conn
            .query(
                "SELECT state_json FROM sessions WHERE session_id = ?1",
                params![id],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let row = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(SessionState::new(id));
        };

        let state_json: String = row
            .get(0)
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // Corruption is self-healing: reset rather than block the user.
        match serde_json::from_str::<SessionState>(&state_json) {
            Ok(state) => Ok(state),
            Err(e) => {
                warn!(session = %id, error = %e, "state parse failed, resetting session");
                Ok(SessionState::new(id))
            }
        }
    }

    async fn save(&self, state: &SessionState) -> Result<(), StoreError> {
        let id = validate_session_id(&state.session_id)?.to_string();
        let state_json = serde_json::to_string(state)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let now = utc_now_iso();

        self.conn
            .execute(
                "INSERT INTO sessions (session_id, state_json, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(session_id) DO UPDATE SET
                     state_json = excluded.state_json,
                     updated_at = excluded.updated_at",
                params![id.clone(), state_json, now.clone()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        // Flat profile snapshot alongside the blob.
        let c = &state.context;
        self.conn
            .execute(
                "INSERT INTO farmers
                     (session_id, farmer_name, crop, land_size, land_unit,
                      location_text, lat, lon, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(session_id) DO UPDATE SET
                     farmer_name = excluded.farmer_name,
                     crop = excluded.crop,
                     land_size = excluded.land_size,
                     land_unit = excluded.land_unit,
                     location_text = excluded.location_text,
                     lat = excluded.lat,
                     lon = excluded.lon,
                     updated_at = excluded.updated_at",
                params![
                    id,
                    c.farmer_name.clone(),
                    c.crop.clone(),
                    c.land_size.map(|v| v.to_string()),
                    c.land_unit.clone(),
                    c.location_text.clone(),
                    c.lat.map(|v| v.to_string()),
                    c.lon.map(|v| v.to_string()),
                    now,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn save_image_record(
        &self,
        session_id: &str,
        file_path: &str,
        caption: Option<&str>,
        remote_file_id: Option<&str>,
    ) -> Result<(), StoreError> {
        let id = validate_session_id(session_id)?;

        self.conn
            .execute(
                "INSERT INTO crop_images
                     (id, session_id, file_path, caption, remote_file_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    id,
                    file_path,
                    caption.map(str::to_string),
                    remote_file_id.map(str::to_string),
                    utc_now_iso(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    async fn list_session_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut rows = self
            .conn
            .query("SELECT session_id FROM sessions ORDER BY session_id", ())
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            let id: String = row.get(0).map_err(|e| StoreError::Query(e.to_string()))?;
            ids.push(id);
        }
        Ok(ids)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
