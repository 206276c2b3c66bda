use std::path::Path;

use curator_tree::{Classification, DatasetPath, TreeError, TreeStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::table::{Manifest, ManifestRow, FIXED_HEADERS};

/// Suffix the upload backend appends to files it has trashed.
const REMOTE_DELETED_SUFFIX: &str = "-DELETED";

/// File names that are themselves manifests and never inventoried.
const MANIFEST_FILE_NAMES: [&str; 3] = ["manifest.xlsx", "manifest.csv", "manifest.json"];

/// Type reported for files without an extension.
const NO_EXTENSION: &str = "None";

/// How the `filename` column identifies a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilenameColumn {
    /// The leaf name alone.
    #[default]
    LeafName,
    /// The path below the classification folder, for trees that repeat leaf names.
    RelativePath,
}

/// Synthesized rows for one classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub headers: Vec<String>,
    pub rows: Vec<ManifestRow>,
}

impl Synthesis {
    /// Fills empty timestamps from each row's source path.
    pub fn fill_timestamps<F>(&mut self, mut stamp: F)
    where
        F: FnMut(&Path) -> Option<String>,
    {
        for row in &mut self.rows {
            if !row.timestamp.is_empty() {
                continue;
            }
            if let Some(value) = row.source.as_deref().and_then(&mut stamp) {
                row.timestamp = value;
            }
        }
    }

    pub fn to_manifest(&self) -> Manifest {
        Manifest {
            headers: self.headers.clone(),
            data: self.rows.iter().map(ManifestRow::cells).collect(),
        }
    }
}

/// Walks a classification folder and produces inventory rows.  
/// 清單產生器。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSynthesizer {
    variable_headers: Vec<String>,
    filename_column: FilenameColumn,
}

impl Default for ManifestSynthesizer {
    fn default() -> Self {
        Self::new(vec!["description".to_string(), "Additional Metadata".to_string()])
    }
}

impl ManifestSynthesizer {
    pub fn new(variable_headers: Vec<String>) -> Self {
        Self {
            variable_headers,
            filename_column: FilenameColumn::default(),
        }
    }

    pub fn with_filename_column(mut self, filename_column: FilenameColumn) -> Self {
        self.filename_column = filename_column;
        self
    }

    pub fn filename_column(&self) -> FilenameColumn {
        self.filename_column
    }

    pub fn headers(&self) -> Vec<String> {
        FIXED_HEADERS
            .iter()
            .map(|header| header.to_string())
            .chain(self.variable_headers.iter().cloned())
            .collect()
    }

    /// One row per non-deleted leaf below `classification`, in walk order.
    pub fn synthesize(
        &self,
        tree: &TreeStore,
        classification: Classification,
    ) -> Result<Synthesis, TreeError> {
        let base = DatasetPath::from_segments([classification.as_str()]);
        let mut rows = Vec::new();
        for (path, node) in tree.walk(&base)? {
            if node.is_container() || MANIFEST_FILE_NAMES.contains(&node.name()) {
                continue;
            }
            let filename = match self.filename_column {
                FilenameColumn::LeafName => node.name().to_string(),
                FilenameColumn::RelativePath => path
                    .strip_prefix(&base)
                    .map(|relative| relative.to_string())
                    .unwrap_or_else(|| node.name().to_string()),
            };
            rows.push(ManifestRow {
                filename,
                file_type: infer_file_type(node.name(), node.provenance().is_remote()),
                timestamp: String::new(),
                extra: vec![String::new(); self.variable_headers.len()],
                source: node.source_path().map(Path::to_path_buf),
            });
        }
        debug!(%classification, rows = rows.len(), "manifest rows synthesized");
        Ok(Synthesis {
            headers: self.headers(),
            rows,
        })
    }
}

/// Extension after the last `.`, or `None`.  
/// 推斷檔案類型。
///
/// Remote names first lose a trailing `-DELETED` marker.
pub fn infer_file_type(name: &str, remote: bool) -> String {
    let name = if remote {
        name.strip_suffix(REMOTE_DELETED_SUFFIX).unwrap_or(name)
    } else {
        name
    };
    match name.rfind('.') {
        Some(index) if index > 0 && index + 1 < name.len() => name[index + 1..].to_string(),
        _ => NO_EXTENSION.to_string(),
    }
}
