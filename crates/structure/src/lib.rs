//! Subject/sample/pool registry and its projection onto the dataset tree.
//! 受試者／樣本／群組登錄表與資料集樹的投影。

pub mod projector;
pub mod registry;

use curator_tree::{Classification, TreeError};
use thiserror::Error;

pub use projector::{PoolRemoval, ProjectionKind, PruneOutcome, StructureProjector};
pub use registry::{Metadata, PoolRecord, SampleRecord, SubjectRecord, SubjectRegistry};

/// Errors raised by registry edits and their projection.  
/// 投影錯誤。
///
/// A failed operation leaves both the registry and the tree unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("unknown subject '{0}'")]
    UnknownSubject(String),
    #[error("unknown pool '{0}'")]
    UnknownPool(String),
    #[error("subject '{subject}' has no sample '{sample}'")]
    UnknownSample { subject: String, sample: String },
    #[error("'{0}' is already used by a subject or pool")]
    NameInUse(String),
    #[error("subject '{subject}' already has a sample '{sample}'")]
    DuplicateSample { subject: String, sample: String },
    #[error("invalid structure name '{0}'")]
    InvalidName(String),
    #[error("subject '{subject}' is not in pool '{pool}'")]
    NotInPool { subject: String, pool: String },
    #[error("subject '{subject}' belongs to pool {expected:?}")]
    PoolMismatch {
        subject: String,
        expected: Option<String>,
    },
    #[error("'{0}' is no longer empty")]
    NotEmpty(curator_tree::DatasetPath),
    #[error("'{0}' does not hold subject or sample folders")]
    NotDataClassification(Classification),
    #[error(transparent)]
    Tree(#[from] TreeError),
}
