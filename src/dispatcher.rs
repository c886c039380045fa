use crate::models::SliceId;

use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Work handed to the background worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Convert a freshly uploaded DICOM slice for the labeling UI
    ParseDicom { slice_id: SliceId },
}

/// Fire-and-forget submission of background tasks.
///
/// Callers never observe completion; failures are the worker's to log.
pub trait TaskDispatcher: Send + Sync {
    fn enqueue(&self, task: Task);
}

/// Dispatcher backed by an unbounded tokio channel consumed by [`crate::worker::run`]
#[derive(Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::UnboundedSender<Task>,
}

impl ChannelDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl TaskDispatcher for ChannelDispatcher {
    fn enqueue(&self, task: Task) {
        debug!("enqueue {task:?}");
        if self.tx.send(task).is_err() {
            warn!("worker is gone, dropping {task:?}");
        }
    }
}
