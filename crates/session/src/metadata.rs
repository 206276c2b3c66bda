//! Top-level dataset metadata files (submission, dataset description, ...).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use curator_tree::{LifecycleTag, LifecycleTags, Provenance};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Metadata file attachment failure.
/// 描述檔附加錯誤。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetadataError {
    #[error("{0} has no usable file name")]
    UnusableName(PathBuf),
    #[error("'{name}' is not a {kind} file")]
    KindMismatch { name: String, kind: MetadataKind },
}

/// Kinds of metadata file a dataset can carry at its root.  
/// 資料集描述檔種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetadataKind {
    Submission,
    DatasetDescription,
    Subjects,
    Samples,
    Readme,
    Changes,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 6] = [
        MetadataKind::Submission,
        MetadataKind::DatasetDescription,
        MetadataKind::Subjects,
        MetadataKind::Samples,
        MetadataKind::Readme,
        MetadataKind::Changes,
    ];

    /// Kinds a dataset cannot be uploaded without.
    pub const REQUIRED: [MetadataKind; 3] = [
        MetadataKind::Submission,
        MetadataKind::DatasetDescription,
        MetadataKind::Subjects,
    ];

    /// File stem identifying this kind, e.g. `dataset_description` in
    /// `dataset_description.xlsx`.
    pub fn stem(&self) -> &'static str {
        match self {
            MetadataKind::Submission => "submission",
            MetadataKind::DatasetDescription => "dataset_description",
            MetadataKind::Subjects => "subjects",
            MetadataKind::Samples => "samples",
            MetadataKind::Readme => "README",
            MetadataKind::Changes => "CHANGES",
        }
    }

    /// Kind of a file name, judged by its stem.
    pub fn of_file(name: &str) -> Option<Self> {
        let stem = Path::new(name).file_stem()?.to_str()?;
        Self::ALL.into_iter().find(|kind| kind.stem() == stem)
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

impl FromStr for MetadataKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.stem().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| format!("unknown metadata file kind '{s}'"))
    }
}

/// A metadata file attached to the dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFile {
    pub provenance: Provenance,
    pub tags: LifecycleTags,
}

impl MetadataFile {
    pub fn is_deleted(&self) -> bool {
        self.tags.is_soft_deleted()
    }
}

/// Metadata files keyed by file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFiles {
    files: BTreeMap<String, MetadataFile>,
}

impl MetadataFiles {
    /// Iterates over every entry, deleted ones included.  
    /// 列舉所有項目（含已刪除）。
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataFile)> {
        self.files.iter().map(|(name, file)| (name.as_str(), file))
    }

    /// Looks up an entry by file name.  
    /// 依檔名查詢項目。
    pub fn get(&self, name: &str) -> Option<&MetadataFile> {
        self.files.get(name)
    }

    /// Attaches a local file as the dataset's `kind` file.  
    /// 附加描述檔。
    ///
    /// Earlier local files of the same kind are dropped; a remote one is
    /// marked deleted so the upload replaces it.
    pub fn attach(&mut self, kind: MetadataKind, source: &Path) -> Result<String, MetadataError> {
        let name = source
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| MetadataError::UnusableName(source.to_path_buf()))?;
        if MetadataKind::of_file(&name) != Some(kind) {
            return Err(MetadataError::KindMismatch { name, kind });
        }
        self.detach(kind);
        self.files.insert(
            name.clone(),
            MetadataFile {
                provenance: Provenance::Local(source.to_path_buf()),
                tags: LifecycleTags::of(&[LifecycleTag::New]),
            },
        );
        debug!(%kind, file = %name, "metadata file attached");
        Ok(name)
    }

    /// Removes local files of `kind` and marks remote ones deleted.
    /// Returns how many entries were affected.
    pub fn detach(&mut self, kind: MetadataKind) -> usize {
        let mut affected = 0;
        self.files.retain(|name, file| {
            if MetadataKind::of_file(name) != Some(kind) {
                return true;
            }
            affected += 1;
            file.provenance.is_remote()
        });
        for (name, file) in &mut self.files {
            if MetadataKind::of_file(name) == Some(kind) && !file.is_deleted() {
                file.tags = file
                    .tags
                    .iter()
                    .chain([LifecycleTag::Deleted])
                    .collect();
            }
        }
        affected
    }

    /// Required kinds with no live file.
    pub fn missing_required(&self) -> Vec<MetadataKind> {
        MetadataKind::REQUIRED
            .into_iter()
            .filter(|kind| {
                !self
                    .files
                    .iter()
                    .any(|(name, file)| MetadataKind::of_file(name) == Some(*kind) && !file.is_deleted())
            })
            .collect()
    }

    pub(crate) fn to_serialized(&self, include_deleted: bool) -> BTreeMap<String, SerializedMetadataFile> {
        self.files
            .iter()
            .filter(|(_, file)| include_deleted || !file.is_deleted())
            .map(|(name, file)| (name.clone(), SerializedMetadataFile::from(file)))
            .collect()
    }

    pub(crate) fn from_serialized(files: &BTreeMap<String, SerializedMetadataFile>) -> Self {
        let files = files
            .iter()
            .filter_map(|(name, file)| match file.to_metadata_file() {
                Some(parsed) => Some((name.clone(), parsed)),
                None => {
                    warn!(file = %name, kind = %file.kind, "skipping unreadable metadata file entry");
                    None
                }
            })
            .collect();
        Self { files }
    }
}

/// Wire form: `{ "path": ..., "type": "local" | "bf", "action": [...] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedMetadataFile {
    #[serde(
        default,
        with = "curator_tree::serde_source",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<PathBuf>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub action: Vec<String>,
}

impl From<&MetadataFile> for SerializedMetadataFile {
    fn from(file: &MetadataFile) -> Self {
        let kind = if file.provenance.is_remote() { "bf" } else { "local" };
        let path = match &file.provenance {
            Provenance::Remote(id) => id.as_ref().map(PathBuf::from),
            other => other.source_path().map(Path::to_path_buf),
        };
        Self {
            path,
            kind: kind.to_string(),
            action: file.tags.iter().map(|tag| tag.as_str().to_string()).collect(),
        }
    }
}

impl SerializedMetadataFile {
    fn to_metadata_file(&self) -> Option<MetadataFile> {
        let provenance = match self.kind.as_str() {
            "bf" | "remote" => Provenance::Remote(
                self.path
                    .as_ref()
                    .map(|id| id.to_string_lossy().into_owned()),
            ),
            "local" | "" => Provenance::Local(self.path.clone()?),
            _ => return None,
        };
        let tags = self
            .action
            .iter()
            .filter_map(|name| name.parse::<LifecycleTag>().ok())
            .collect();
        Some(MetadataFile { provenance, tags })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_judged_by_stem() {
        assert_eq!(
            MetadataKind::of_file("dataset_description.xlsx"),
            Some(MetadataKind::DatasetDescription)
        );
        assert_eq!(MetadataKind::of_file("README.txt"), Some(MetadataKind::Readme));
        assert_eq!(MetadataKind::of_file("notes.txt"), None);
        assert_eq!("dataset-description".parse::<MetadataKind>(), Ok(MetadataKind::DatasetDescription));
    }

    #[test]
    fn attach_replaces_local_and_retires_remote() {
        let mut files = MetadataFiles::from_serialized(&BTreeMap::from([(
            "submission.xlsx".to_string(),
            SerializedMetadataFile {
                path: None,
                kind: "bf".into(),
                action: vec!["existing".into()],
            },
        )]));
        files
            .attach(MetadataKind::Submission, Path::new("/in/submission.csv"))
            .unwrap();

        let remote = files.get("submission.xlsx").unwrap();
        assert!(remote.is_deleted());
        let local = files.get("submission.csv").unwrap();
        assert_eq!(local.tags, LifecycleTags::of(&[LifecycleTag::New]));
        assert!(!files.missing_required().contains(&MetadataKind::Submission));

        files
            .attach(MetadataKind::Submission, Path::new("/in/v2/submission.xlsx"))
            .unwrap();
        assert_eq!(
            files.get("submission.xlsx").unwrap().provenance,
            Provenance::Local(PathBuf::from("/in/v2/submission.xlsx"))
        );
        assert!(files.get("submission.csv").is_none());
    }

    #[test]
    fn attach_rejects_mismatched_names() {
        let mut files = MetadataFiles::default();
        assert_eq!(
            files.attach(MetadataKind::Samples, Path::new("/in/subjects.xlsx")),
            Err(MetadataError::KindMismatch {
                name: "subjects.xlsx".into(),
                kind: MetadataKind::Samples,
            })
        );
        assert_eq!(
            files.attach(MetadataKind::Readme, Path::new("/")),
            Err(MetadataError::UnusableName(PathBuf::from("/")))
        );
        assert_eq!(files.missing_required().len(), 3);
    }

    #[test]
    fn serialized_payload_can_skip_deleted_entries() {
        let mut files = MetadataFiles::default();
        files
            .attach(MetadataKind::Readme, Path::new("/in/README.txt"))
            .unwrap();
        assert_eq!(files.detach(MetadataKind::Readme), 1);
        assert!(files.to_serialized(false).is_empty());
    }
}
