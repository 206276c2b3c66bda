//! Virtual dataset tree: structural paths, naming rules, the node model and
//! the invariant-keeping [`TreeStore`].
//! 資料集虛擬樹：路徑、命名規則、節點模型與 [`TreeStore`]。

pub mod serde_source;

pub mod classification;
pub mod node;
pub mod path;
pub mod sanitize;
pub mod serialized;
pub mod store;

pub use classification::Classification;
pub use node::{LeafMetadata, LifecycleTag, LifecycleTags, Node, NodeKind, Provenance};
pub use path::{resolve, DatasetPath, PATH_SEPARATOR};
pub use sanitize::{NameClass, SanitizeMode};
pub use serialized::{SerializedFile, SerializedFolder, SerializedTreeError};
pub use store::{RenameNotice, TreeError, TreeStats, TreeStore, Walk, WalkOptions};
