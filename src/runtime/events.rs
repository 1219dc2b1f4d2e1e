//! Tracker event stream payloads.

use crate::types::{OperationId, OperationStatus};

/// Events emitted from the tracker loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A record was inserted or its content changed.
    Updated {
        /// Changed operation id.
        id: OperationId,
        /// Status after the change.
        status: OperationStatus,
    },
    /// The list of top-level operations changed.
    MainListChanged {
        /// Number of top-level operations.
        count: usize,
    },
    /// A finished operation was deleted on the device and dropped locally.
    Removed {
        /// Removed top-level id.
        id: OperationId,
    },
    /// A fetch failed; the store kept its previous state.
    FetchFailed {
        /// Rendered backend error.
        message: String,
    },
    /// Background polling became active.
    PollingStarted,
    /// Background polling stopped.
    PollingStopped,
}
