//! Per-classification manifests: synthesis from the tree and the merge that
//! keeps user-entered columns across regenerations.
//! 清單產生與合併。

pub mod merge;
pub mod store;
pub mod synthesize;
pub mod table;
pub mod timestamp;

pub use merge::merge;
pub use store::ManifestStore;
pub use synthesize::{infer_file_type, FilenameColumn, ManifestSynthesizer, Synthesis};
pub use table::{Manifest, ManifestRow, FIXED_HEADERS, FIXED_WIDTH};
pub use timestamp::modified_timestamp;
