pub mod engine;
pub mod link;
pub mod naming;
pub mod reporter;

use serde::{Deserialize, Serialize};

pub use engine::{EngineConfig, TransferEngine, TransferOutcome, TransferReport, UploadResult};
pub use link::build_link;
pub use naming::build_object_name;
pub use reporter::{ReportOutcome, StatusMessage, StatusReporter};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Received,
    Staging,
    Staged,
    Uploading,
    Completed,
    Failed,
}
