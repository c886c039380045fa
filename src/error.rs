//! Errors surfaced by [`crate::service::ScanService`] to request handlers.

use crate::{mask::MaskError, models::ScanId, repository::RepositoryError, resolver::ResolveError};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Scan, slice, category, label or tile does not exist
    #[error("{0}")]
    NotFound(String),

    /// A selection is malformed or does not fit the scan
    #[error("Invalid selection: {0}")]
    InvalidSelection(#[source] MaskError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// The scan geometry is unknown until its first slice is converted
    #[error("Scan {0} has no converted slices yet")]
    ScanNotReady(ScanId),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::DuplicateCategory(_) => ServiceError::Conflict(error.to_string()),
            _ => ServiceError::NotFound(error.to_string()),
        }
    }
}

impl From<ResolveError> for ServiceError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Repository(e) => e.into(),
            ResolveError::Io(e) => e.into(),
            e @ (ResolveError::SliceNotFound { .. } | ResolveError::TileNotFound(_)) => {
                ServiceError::NotFound(e.to_string())
            }
        }
    }
}

impl From<MaskError> for ServiceError {
    fn from(error: MaskError) -> Self {
        match error {
            MaskError::Image(e) => e.into(),
            e @ MaskError::VolumeTooLarge { .. } => ServiceError::BadRequest(e.to_string()),
            e => ServiceError::InvalidSelection(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
