// Daybook - Core Errors
// Failure taxonomy shared by the gateway, coordinator, and watcher

use thiserror::Error;
use uuid::Uuid;

/// Result alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A gateway read failed (network, timeout). The in-memory view is
    /// left at its last-known-good state; recovery is a caller retry.
    #[error("fetch failed: {0}")]
    TransientFetch(String),

    /// A gateway write failed after an optimistic local apply. The
    /// local state has already been rolled back when this surfaces.
    #[error("mutation rejected: {0}")]
    MutationRejected(String),

    /// The remote store no longer has the targeted item. Non-fatal:
    /// the item disappears on the next aggregation pass.
    #[error("stale reference: {0}")]
    StaleReference(Uuid),

    /// The enrichment service rejected or never received a request.
    #[error("enrichment request failed: {0}")]
    Enrichment(String),

    #[error("configuration error: {0}")]
    Config(String),
}
