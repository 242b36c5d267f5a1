use common::BlobError;

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// No storage credential is configured.
    #[error("Blob storage is not configured")]
    StorageUnconfigured,

    /// Listing storage failed; the run is aborted without partial results.
    #[error("Failed to list blob storage")]
    Storage(#[source] BlobError),

    /// Reading the referenced set from the database failed.
    #[error("Failed to read blob references")]
    References(#[source] anyhow::Error),

    /// Reading or deleting orphan rows failed during the media sweep.
    #[error("Media sweep failed")]
    Sweep(#[source] anyhow::Error),

    #[error("Invalid scan request: {0}")]
    InvalidRequest(String),
}
