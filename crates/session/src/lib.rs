//! Dataset session: the owning context for one curation, its on-disk document
//! and the user settings that shape imports and manifests.
//! 資料集工作階段與設定。

pub mod metadata;
pub mod session;
pub mod settings;
pub mod util;

pub use metadata::{
    MetadataError, MetadataFile, MetadataFiles, MetadataKind, SerializedMetadataFile,
};
pub use session::{
    DatasetSession, ImportOutcome, SessionDocument, SessionError, SessionStore,
    SESSION_FORMAT_VERSION,
};
pub use settings::{
    CuratorSettings, ImportSettings, ManifestSettings, SettingsError, SettingsStore,
};
pub use util::write_atomic;
