mod buffer;
pub mod download;
pub mod presenter;
mod types;

pub use buffer::{BatchOutcome, UploadBuffer, UploadSource};
pub use types::{SelectedFile, TrackedUpload, UploadStatus};
