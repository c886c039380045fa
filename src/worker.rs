//! Background consumer of dispatched tasks.

use crate::{
    dispatcher::Task,
    imaging::{ConversionError, dicom_to_png},
    models::{SliceId, SliceStatus},
    repository::{Repository, RepositoryError},
};

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Conversion error: {0}")]
    Conversion(#[from] ConversionError),
}

/// Process tasks until every sender is dropped
pub async fn run(mut rx: mpsc::UnboundedReceiver<Task>, repository: Arc<dyn Repository>) {
    while let Some(task) = rx.recv().await {
        let repository = Arc::clone(&repository);
        let handle = tokio::task::spawn_blocking(move || match task {
            Task::ParseDicom { slice_id } => {
                parse_dicom_and_update_slice(repository.as_ref(), slice_id)
            }
        });
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("{task:?} failed: {e}"),
            Err(e) => error!("{task:?} panicked: {e}"),
        }
    }
    info!("task queue closed, worker exiting");
}

/// Convert the stored DICOM of a slice into its PNG preview.
///
/// Records the scan's plane size from the first converted slice. The slice is
/// marked `ProcessingFailed` if anything goes wrong.
pub fn parse_dicom_and_update_slice(
    repository: &dyn Repository,
    slice_id: SliceId,
) -> Result<(), WorkerError> {
    let result = convert_slice(repository, slice_id);
    let status = match &result {
        Ok(()) => SliceStatus::Processed,
        Err(e) => {
            error!("conversion of slice {slice_id} failed: {e}");
            SliceStatus::ProcessingFailed
        }
    };
    repository.set_slice_status(slice_id, status)?;
    result
}

fn convert_slice(repository: &dyn Repository, slice_id: SliceId) -> Result<(), WorkerError> {
    let slice = repository.get_slice_by_id(slice_id)?;
    let original = repository.get_original_image(slice_id)?;
    let converted = dicom_to_png(&original)?;

    repository.store_converted_image(slice_id, converted.png)?;
    repository.set_scan_geometry(slice.scan_id, converted.width, converted.height)?;
    info!(
        "converted slice {} of scan {} ({}x{})",
        slice.location, slice.scan_id, converted.width, converted.height
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{enums::Orientation, repository::InMemoryRepository};

    #[test]
    fn unreadable_upload_marks_slice_failed() {
        let repository = InMemoryRepository::new();
        let category = repository.add_new_category("KIDNEYS", "Kidneys", "").unwrap();
        let scan = repository.add_new_scan(&category, 1);
        let slice = repository.add_new_slice(scan.id, Orientation::Axial).unwrap();
        repository.store_original_image(slice.id, b"garbage".to_vec()).unwrap();

        let result = parse_dicom_and_update_slice(&repository, slice.id);
        assert!(matches!(result, Err(WorkerError::Conversion(_))));
        assert_eq!(
            repository.get_slice_by_id(slice.id).unwrap().status,
            SliceStatus::ProcessingFailed
        );
        assert_eq!(repository.get_scan_by_id(scan.id).unwrap().width, None);
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn conversion_error_is_logged_when_status_update_fails() {
        let repository = InMemoryRepository::new();
        let slice_id = SliceId::new_v4();
        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let result = tracing::subscriber::with_default(subscriber, || {
            parse_dicom_and_update_slice(&repository, slice_id)
        });
        assert!(matches!(
            result,
            Err(WorkerError::Repository(RepositoryError::SliceNotFound(id))) if id == slice_id
        ));
        let output = String::from_utf8(log.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains(&format!("conversion of slice {slice_id} failed")));
    }
}
