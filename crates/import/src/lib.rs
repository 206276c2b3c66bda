//! Reconciles external filesystem entries with the dataset tree.
//! 匯入外部檔案並與資料集樹協調。

pub mod entry;
pub mod reconcile;
pub mod scan;

use std::path::PathBuf;

use curator_tree::{DatasetPath, TreeError};
use thiserror::Error;

pub use entry::ExternalEntry;
pub use reconcile::{
    DecisionPoint, DuplicateAction, HiddenFileAction, ImportDecisions, ImportPlan,
    ImportReconciler, ImportReport, ImportVerdict, IrregularNameAction, RenamedEntry,
    SkipReason, SkippedEntry, BANNED_NAMES, HIDDEN_MARKER,
};
pub use scan::{scan_path, scan_paths};

/// Errors raised while scanning or reconciling an import batch.  
/// 匯入錯誤。
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("files cannot be imported at the dataset root; choose a classification folder")]
    RootDestination,
    #[error("import destination '{0}' is not a folder")]
    NotAContainer(DatasetPath),
    #[error("failed to read {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("{path} has no usable file name")]
    Nameless { path: PathBuf },
    #[error(transparent)]
    Tree(#[from] TreeError),
}
