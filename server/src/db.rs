//! Database access layer interface. The real database is an out-of-scope
//! collaborator; modeled here only as the operation-level trait DCW's
//! `macro_resync()` needs, following the `Api` trait pattern in
//! `proxy/src/control_plane/provider/mod.rs` for out-of-scope
//! collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database transaction failed: {0}")]
    Transaction(String),
}

/// One row of the macro-resync candidate query: items whose stored display
/// name contains an unexpanded user-macro marker, joined against an
/// enabled host, filtered to the allowed item-flag set. Grounded on
/// `dbsync_macros()`'s `select` in `dbconfig_worker.c`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroResyncCandidate {
    pub item_id: u64,
    pub host_id: u64,
    pub name: String,
    pub name_resolved: String,
}

/// A staged `UPDATE items SET name_resolved=..., name_resolved_upper=...`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MacroResyncUpdate {
    pub item_id: u64,
    pub name_resolved: String,
    pub name_resolved_upper: String,
}

#[async_trait]
pub trait DbConfigStore: Send + Sync {
    /// Select the macro-resync candidate rows, within an implicit
    /// transaction that the implementation commits in
    /// `apply_macro_resync_batch` and rolls back on error.
    async fn macro_resync_candidates(&self) -> Result<Vec<MacroResyncCandidate>, DbError>;

    /// Execute staged updates in one batch and commit. An empty `updates`
    /// still commits the (read-only) transaction.
    async fn apply_macro_resync_batch(
        &self,
        updates: Vec<MacroResyncUpdate>,
    ) -> Result<(), DbError>;
}

/// In-memory mock used by tests, and a reasonable default for development
/// runs without a real database configured.
#[derive(Default)]
pub struct MockDbConfigStore {
    candidates: Mutex<Vec<MacroResyncCandidate>>,
    pub applied: Mutex<Vec<MacroResyncUpdate>>,
}

impl MockDbConfigStore {
    pub fn new(candidates: Vec<MacroResyncCandidate>) -> Self {
        Self {
            candidates: Mutex::new(candidates),
            applied: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl DbConfigStore for MockDbConfigStore {
    async fn macro_resync_candidates(&self) -> Result<Vec<MacroResyncCandidate>, DbError> {
        Ok(self.candidates.lock().clone())
    }

    async fn apply_macro_resync_batch(
        &self,
        updates: Vec<MacroResyncUpdate>,
    ) -> Result<(), DbError> {
        self.applied.lock().extend(updates);
        Ok(())
    }
}
