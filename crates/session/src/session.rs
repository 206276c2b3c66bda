use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use curator_import::{
    DecisionPoint, ExternalEntry, ImportDecisions, ImportError, ImportReconciler, ImportReport,
    ImportVerdict,
};
use curator_manifest::{FilenameColumn, ManifestStore, ManifestSynthesizer};
use curator_structure::{PoolRemoval, ProjectionError, StructureProjector, SubjectRegistry};
use curator_tree::{
    Classification, DatasetPath, RenameNotice, SerializedFolder, SerializedTreeError, TreeError,
    TreeStore,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::metadata::{MetadataError, MetadataFiles, MetadataKind, SerializedMetadataFile};
use crate::util::write_atomic;

/// Current session document version.
pub const SESSION_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read session {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write session {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid session payload in {path}: {source}")]
    InvalidPayload {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("session format version {0} is newer than supported version {SESSION_FORMAT_VERSION}")]
    UnsupportedVersion(u32),
    #[error("invalid dataset structure: {0}")]
    Structure(#[from] SerializedTreeError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    Projection(#[from] ProjectionError),
}

/// On-disk session document.  
/// 工作階段文件（磁碟格式）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionDocument {
    #[serde(default = "default_version")]
    pub format_version: u32,
    #[serde(default)]
    pub dataset_name: String,
    #[serde(default)]
    pub dataset_structure: SerializedFolder,
    #[serde(default)]
    pub metadata_files: BTreeMap<String, SerializedMetadataFile>,
    #[serde(default)]
    pub manifest_files: ManifestStore,
    #[serde(default)]
    pub subject_structure: SubjectRegistry,
    #[serde(default)]
    pub projected_classifications: BTreeSet<Classification>,
}

fn default_version() -> u32 {
    SESSION_FORMAT_VERSION
}

/// Result of [`DatasetSession::import`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    NeedsDecisions(Vec<DecisionPoint>),
    Cancelled,
    Imported(ImportReport),
}

/// Owning context: tree, registry, manifests and metadata files.  
/// 資料集工作階段。
///
/// Components receive what they need from here; nothing is global.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetSession {
    name: String,
    tree: TreeStore,
    registry: SubjectRegistry,
    manifests: ManifestStore,
    metadata_files: MetadataFiles,
    projected: BTreeSet<Classification>,
}

impl DatasetSession {
    /// Creates an empty session for the named dataset.  
    /// 建立指定資料集名稱的空白工作階段。
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns the dataset name.  
    /// 回傳資料集名稱。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renames the dataset.  
    /// 變更資料集名稱。
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Read access to the dataset tree.  
    /// 唯讀存取資料集樹。
    pub fn tree(&self) -> &TreeStore {
        &self.tree
    }

    /// Mutable access to the dataset tree.  
    /// 可變存取資料集樹。
    pub fn tree_mut(&mut self) -> &mut TreeStore {
        &mut self.tree
    }

    /// Read access to the subject registry.  
    /// 唯讀存取受試者登錄表。
    pub fn registry(&self) -> &SubjectRegistry {
        &self.registry
    }

    /// Mutable access to the subject registry.  
    /// 可變存取受試者登錄表。
    pub fn registry_mut(&mut self) -> &mut SubjectRegistry {
        &mut self.registry
    }

    /// Stored manifests, one per classification.  
    /// 各分類已儲存的清單。
    pub fn manifests(&self) -> &ManifestStore {
        &self.manifests
    }

    /// Mutable access to the stored manifests.  
    /// 可變存取已儲存的清單。
    pub fn manifests_mut(&mut self) -> &mut ManifestStore {
        &mut self.manifests
    }

    /// Metadata files attached at the dataset root.  
    /// 資料集根目錄的描述檔。
    pub fn metadata_files(&self) -> &MetadataFiles {
        &self.metadata_files
    }

    /// Classifications the registry is mirrored into.
    pub fn projected_classifications(&self) -> &BTreeSet<Classification> {
        &self.projected
    }

    /// Projector over this session's tree and registry.  
    /// 以本工作階段的樹與登錄表建立投影器。
    pub fn projector(&mut self) -> StructureProjector<'_> {
        StructureProjector::new(&mut self.tree, &mut self.registry)
    }

    /// Renames a tree node and migrates manifest rows keyed by its old name.
    pub fn rename(
        &mut self,
        path: &DatasetPath,
        new_name: &str,
        mode: FilenameColumn,
    ) -> Result<Option<RenameNotice>, SessionError> {
        let notice = self.tree.rename(path, new_name)?;
        if let Some(notice) = &notice {
            self.manifests.apply_rename(&self.tree, notice, mode);
        }
        Ok(notice)
    }

    /// Moves a tree node under `new_parent`; manifest rows keyed by its old
    /// relative path follow it.
    pub fn move_node(
        &mut self,
        path: &DatasetPath,
        new_parent: &DatasetPath,
        mode: FilenameColumn,
    ) -> Result<DatasetPath, SessionError> {
        let to = self.tree.move_node(path, new_parent)?;
        if to != *path {
            let notice = RenameNotice {
                from: path.clone(),
                to: to.clone(),
            };
            self.manifests.apply_rename(&self.tree, &notice, mode);
        }
        Ok(to)
    }

    /// Deletes a pool, releasing its subjects, and re-keys the manifest rows
    /// of every relocated subject folder.
    pub fn delete_pool(
        &mut self,
        pool: &str,
        mode: FilenameColumn,
    ) -> Result<PoolRemoval, SessionError> {
        let removal = self.projector().delete_pool(pool)?;
        self.apply_renames(&removal.relocated, mode);
        Ok(removal)
    }

    /// Migrates manifest rows for notices produced elsewhere (e.g. the projector).
    pub fn apply_renames(&mut self, notices: &[RenameNotice], mode: FilenameColumn) {
        for notice in notices {
            self.manifests.apply_rename(&self.tree, notice, mode);
        }
    }

    /// Plans an import and applies it once every decision is answered.  
    /// 匯入外部檔案。
    pub fn import(
        &mut self,
        reconciler: &ImportReconciler,
        destination: &DatasetPath,
        entries: &[ExternalEntry],
        decisions: &ImportDecisions,
    ) -> Result<ImportOutcome, SessionError> {
        match reconciler.plan(&self.tree, destination, entries, decisions)? {
            ImportVerdict::NeedsDecisions(points) => Ok(ImportOutcome::NeedsDecisions(points)),
            ImportVerdict::Cancelled => Ok(ImportOutcome::Cancelled),
            ImportVerdict::Ready(plan) => Ok(ImportOutcome::Imported(plan.apply(&mut self.tree)?)),
        }
    }

    /// Opts `classification` into projection and mirrors the whole registry there.
    pub fn project(
        &mut self,
        classification: Classification,
    ) -> Result<Vec<DatasetPath>, SessionError> {
        let ensured = self.projector().project(classification)?;
        self.projected.insert(classification);
        Ok(ensured)
    }

    /// Re-projects every opted-in classification, e.g. after registry edits.
    pub fn reproject(&mut self) -> Result<usize, SessionError> {
        let classifications: Vec<Classification> = self.projected.iter().copied().collect();
        let mut ensured = 0;
        for classification in classifications {
            ensured += self.projector().project(classification)?.len();
        }
        Ok(ensured)
    }

    /// Regenerates every manifest; `stamp` supplies file timestamps.  
    /// 重新產生所有清單；`stamp` 提供檔案時間戳記。
    pub fn regenerate_manifests<F>(
        &mut self,
        synthesizer: &ManifestSynthesizer,
        stamp: F,
    ) -> Result<Vec<Classification>, SessionError>
    where
        F: FnMut(&Path) -> Option<String>,
    {
        Ok(self.manifests.regenerate(&self.tree, synthesizer, stamp)?)
    }

    /// Attaches a local metadata file of `kind`.  
    /// 附加指定種類的本機描述檔。
    pub fn attach_metadata_file(
        &mut self,
        kind: MetadataKind,
        source: &Path,
    ) -> Result<String, SessionError> {
        Ok(self.metadata_files.attach(kind, source)?)
    }

    /// Detaches every metadata file of `kind`.  
    /// 移除指定種類的描述檔。
    pub fn detach_metadata_file(&mut self, kind: MetadataKind) -> usize {
        self.metadata_files.detach(kind)
    }

    /// Keeps the selected classification folders, creating missing ones.
    /// Dropped classifications also leave the projection set and lose their manifest.
    pub fn select_classifications(&mut self, selected: &[Classification]) -> Vec<Classification> {
        let dropped = self.tree.select_classifications(selected);
        for classification in &dropped {
            self.projected.remove(classification);
            self.manifests.remove(*classification);
        }
        dropped
    }

    /// Full document, soft-deleted entries included, for save/resume.
    pub fn to_document(&self) -> SessionDocument {
        SessionDocument {
            format_version: SESSION_FORMAT_VERSION,
            dataset_name: self.name.clone(),
            dataset_structure: self.tree.to_serialized(),
            metadata_files: self.metadata_files.to_serialized(true),
            manifest_files: self.manifests.clone(),
            subject_structure: self.registry.clone(),
            projected_classifications: self.projected.clone(),
        }
    }

    /// Document handed to the upload backend: deleted entries purged.  
    /// 上傳用文件。
    pub fn upload_document(&self) -> SessionDocument {
        SessionDocument {
            dataset_structure: self.tree.upload_payload(),
            metadata_files: self.metadata_files.to_serialized(false),
            ..self.to_document()
        }
    }

    /// Rebuilds a session, rejecting documents from a newer format.  
    /// 由文件重建工作階段；拒絕較新的格式版本。
    pub fn from_document(document: &SessionDocument) -> Result<Self, SessionError> {
        if document.format_version > SESSION_FORMAT_VERSION {
            return Err(SessionError::UnsupportedVersion(document.format_version));
        }
        Ok(Self {
            name: document.dataset_name.clone(),
            tree: TreeStore::from_serialized(&document.dataset_structure)?,
            registry: document.subject_structure.clone(),
            manifests: document.manifest_files.clone(),
            metadata_files: MetadataFiles::from_serialized(&document.metadata_files),
            projected: document.projected_classifications.clone(),
        })
    }
}

/// Saves and resumes a [`DatasetSession`] as one JSON document.  
/// 工作階段存取。
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Creates a store backed by the JSON file at `path`.  
    /// 建立以 `path` JSON 檔為後端的存放區。
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the session file path.  
    /// 回傳工作階段檔案路徑。
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the session. A missing file yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<DatasetSession>, SessionError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SessionError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let document: SessionDocument =
            serde_json::from_str(&contents).map_err(|source| SessionError::InvalidPayload {
                path: self.path.clone(),
                source,
            })?;
        let session = DatasetSession::from_document(&document)?;
        debug!(path = %self.path.display(), dataset = session.name(), "session resumed");
        Ok(Some(session))
    }

    /// Persists the full document atomically.
    pub fn save(&self, session: &DatasetSession) -> Result<(), SessionError> {
        self.write_document(&self.path, &session.to_document())?;
        info!(path = %self.path.display(), dataset = session.name(), "session saved");
        Ok(())
    }

    /// Writes the upload document to `target`.
    pub fn export(&self, session: &DatasetSession, target: &Path) -> Result<(), SessionError> {
        self.write_document(target, &session.upload_document())
    }

    fn write_document(&self, target: &Path, document: &SessionDocument) -> Result<(), SessionError> {
        let json =
            serde_json::to_vec_pretty(document).map_err(|source| SessionError::InvalidPayload {
                path: target.to_path_buf(),
                source,
            })?;
        write_atomic(target, &json).map_err(|source| SessionError::Write {
            path: target.to_path_buf(),
            source,
        })
    }
}
