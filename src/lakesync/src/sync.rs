mod change_detection;
mod coordinator;
mod merge;
mod watermark;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use change_detection::{build_delta_predicate, DeltaPredicate, WatermarkTracker};
pub use coordinator::{IncrementalSyncConfig, SyncCoordinator, SyncOutcome};
pub use merge::{MergeOutcome, MergeStrategy, MergeTarget};
pub use watermark::{Watermark, WatermarkStore, WatermarkType, WatermarkValue};
