//! Persistence layer — the session store and its single-writer guard.

pub mod libsql_backend;
pub mod lock;

pub use libsql_backend::LibSqlStore;
pub use lock::SessionLocks;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::session::SessionState;

/// Backend-agnostic session store.
///
/// `load` is self-healing: a missing row or a corrupt state blob yields a
/// fresh empty state, never an error. Only infrastructure failures (and an
/// unusable session identifier) surface as `Err`.
///
/// Callers must serialize turns per session identifier (see
/// [`SessionLocks`]) — the store itself does not guard against concurrent
/// read-modify-write cycles on the same session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the session for an identifier, or a fresh state if none exists.
    async fn load(&self, session_id: &str) -> Result<SessionState, StoreError>;

    /// Persist the session (upserts the state blob and the profile snapshot).
    async fn save(&self, state: &SessionState) -> Result<(), StoreError>;

    /// Record an uploaded crop image.
    async fn save_image_record(
        &self,
        session_id: &str,
        file_path: &str,
        caption: Option<&str>,
        remote_file_id: Option<&str>,
    ) -> Result<(), StoreError>;

    /// All known session identifiers (drives the daily digest).
    async fn list_session_ids(&self) -> Result<Vec<String>, StoreError>;
}
