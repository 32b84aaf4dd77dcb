pub mod object;
pub mod staging;

pub use object::{ObjectStorage, R2Config, R2Storage};
pub use staging::{LocalStagingStore, StagedFile, StagingConfig};
