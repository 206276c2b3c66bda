//! Wire form of the dataset tree shared with the persistence layer and the
//! upload backend.
//!
//! ```json
//! { "folders": { "primary": { "folders": {}, "files": {}, "type": "virtual", "action": ["new"] } },
//!   "files": {},
//!   "type": "virtual" }
//! ```
//!
//! Files carry `path`, `description`, `additional-metadata`, `type` and
//! `action`. Key names must stay stable: persisted sessions are read back
//! verbatim.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::node::{LeafMetadata, LifecycleTag, LifecycleTags, Node, Provenance};
use crate::path::DatasetPath;
use crate::store::{TreeError, TreeStore};

const TYPE_LOCAL: &str = "local";
const TYPE_VIRTUAL: &str = "virtual";
const TYPE_REMOTE: &str = "bf";

/// Serialized folder (and dataset root).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedFolder {
    #[serde(default)]
    pub folders: BTreeMap<String, SerializedFolder>,
    #[serde(default)]
    pub files: BTreeMap<String, SerializedFile>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(
        default,
        with = "crate::serde_source",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub action: Vec<String>,
}

/// Serialized file entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedFile {
    #[serde(
        default,
        with = "crate::serde_source",
        skip_serializing_if = "Option::is_none"
    )]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "additional-metadata", default)]
    pub additional_metadata: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub action: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SerializedTreeError {
    #[error("local entry '{0}' has no source path")]
    MissingSourcePath(DatasetPath),
    #[error("entry '{path}' has unknown type '{kind}'")]
    UnknownType { path: DatasetPath, kind: String },
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl TreeStore {
    /// Serializes the whole tree, soft-deleted nodes included.
    pub fn to_serialized(&self) -> SerializedFolder {
        folder_to_serialized(self.root())
    }

    /// Curation payload for the upload backend: the purged tree.
    pub fn upload_payload(&self) -> SerializedFolder {
        self.purged().to_serialized()
    }

    /// Rebuilds a tree from its serialized form, validating every invariant.
    pub fn from_serialized(root: &SerializedFolder) -> Result<TreeStore, SerializedTreeError> {
        let mut tree = TreeStore::new();
        load_folder(&mut tree, &DatasetPath::root(), root)?;
        Ok(tree)
    }
}

fn folder_to_serialized(node: &Node) -> SerializedFolder {
    let mut folder = SerializedFolder {
        kind: provenance_name(node.provenance()).to_string(),
        path: wire_path(node.provenance()),
        action: tag_names(node.tags()),
        ..SerializedFolder::default()
    };
    for (name, child) in node.children().into_iter().flatten() {
        if child.is_container() {
            folder
                .folders
                .insert(name.clone(), folder_to_serialized(child));
        } else {
            let metadata = child.metadata().cloned().unwrap_or_default();
            folder.files.insert(
                name.clone(),
                SerializedFile {
                    path: wire_path(child.provenance()),
                    description: metadata.description,
                    additional_metadata: metadata.extra_metadata,
                    kind: provenance_name(child.provenance()).to_string(),
                    action: tag_names(child.tags()),
                },
            );
        }
    }
    folder
}

fn load_folder(
    tree: &mut TreeStore,
    path: &DatasetPath,
    folder: &SerializedFolder,
) -> Result<(), SerializedTreeError> {
    for (name, child) in &folder.folders {
        let child_path = path.join(name.as_str());
        let provenance = parse_provenance(&child_path, &child.kind, child.path.as_ref())?;
        let node = Node::container(name.as_str(), provenance)
            .with_tags(parse_tags(&child_path, &child.action));
        tree.insert_child(path, node)?;
        load_folder(tree, &child_path, child)?;
    }
    for (name, file) in &folder.files {
        let child_path = path.join(name.as_str());
        let provenance = parse_provenance(&child_path, &file.kind, file.path.as_ref())?;
        let node = Node::leaf(name.as_str(), provenance)
            .with_tags(parse_tags(&child_path, &file.action))
            .with_metadata(LeafMetadata {
                description: file.description.clone(),
                extra_metadata: file.additional_metadata.clone(),
            });
        tree.insert_child(path, node)?;
    }
    Ok(())
}

fn provenance_name(provenance: &Provenance) -> &'static str {
    match provenance {
        Provenance::Local(_) => TYPE_LOCAL,
        Provenance::Virtual => TYPE_VIRTUAL,
        Provenance::Remote(_) => TYPE_REMOTE,
    }
}

/// The `path` key holds the disk source of local entries and the backend
/// identifier of remote ones.
fn wire_path(provenance: &Provenance) -> Option<PathBuf> {
    match provenance {
        Provenance::Local(source) => Some(source.clone()),
        Provenance::Remote(id) => id.as_ref().map(PathBuf::from),
        Provenance::Virtual => None,
    }
}

fn parse_provenance(
    path: &DatasetPath,
    kind: &str,
    source: Option<&PathBuf>,
) -> Result<Provenance, SerializedTreeError> {
    match kind {
        TYPE_LOCAL => source
            .cloned()
            .map(Provenance::Local)
            .ok_or_else(|| SerializedTreeError::MissingSourcePath(path.clone())),
        TYPE_VIRTUAL | "" => Ok(Provenance::Virtual),
        TYPE_REMOTE | "remote" => Ok(Provenance::Remote(
            source.map(|id| id.to_string_lossy().into_owned()),
        )),
        other => Err(SerializedTreeError::UnknownType {
            path: path.clone(),
            kind: other.to_string(),
        }),
    }
}

fn tag_names(tags: &LifecycleTags) -> Vec<String> {
    tags.iter().map(|tag| tag.as_str().to_string()).collect()
}

fn parse_tags(path: &DatasetPath, names: &[String]) -> LifecycleTags {
    names
        .iter()
        .filter_map(|name| match name.parse::<LifecycleTag>() {
            Ok(tag) => Some(tag),
            Err(err) => {
                warn!(path = %path, "ignoring serialized action: {err}");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(text: &str) -> DatasetPath {
        DatasetPath::parse(text)
    }

    #[test]
    fn serialized_form_uses_wire_key_names() {
        let mut tree = TreeStore::new();
        tree.create_container(&DatasetPath::root(), "primary").unwrap();
        tree.import_leaf(&p("primary"), "a.csv", "/data/a.csv").unwrap();
        tree.set_leaf_description(&p("primary/a.csv"), "trace").unwrap();

        let value = serde_json::to_value(tree.to_serialized()).unwrap();
        let file = &value["folders"]["primary"]["files"]["a.csv"];
        assert_eq!(file["path"], "/data/a.csv");
        assert_eq!(file["description"], "trace");
        assert_eq!(file["additional-metadata"], "");
        assert_eq!(file["type"], "local");
        assert_eq!(file["action"], json!(["new"]));
        assert_eq!(value["folders"]["primary"]["type"], "virtual");
    }

    #[test]
    fn reload_preserves_tags_and_provenance() {
        let mut tree = TreeStore::new();
        tree.create_container(&DatasetPath::root(), "primary").unwrap();
        tree.import_container(&p("primary"), "sub-1", "/data/sub-1").unwrap();
        tree.import_leaf(&p("primary/sub-1"), "a.csv", "/data/sub-1/a.csv")
            .unwrap();
        tree.insert_remote_leaf(&p("primary"), "old.csv", None, LeafMetadata::default())
            .unwrap();
        tree.soft_delete(&p("primary/old.csv")).unwrap();

        let restored = TreeStore::from_serialized(&tree.to_serialized()).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn upload_payload_excludes_deleted_nodes() {
        let mut tree = TreeStore::new();
        tree.create_container(&DatasetPath::root(), "code").unwrap();
        tree.import_leaf(&p("code"), "keep.py", "/src/keep.py").unwrap();
        tree.import_leaf(&p("code"), "drop.py", "/src/drop.py").unwrap();
        tree.soft_delete(&p("code/drop.py")).unwrap();

        let payload = tree.upload_payload();
        let files = &payload.folders["code"].files;
        assert!(files.contains_key("keep.py"));
        assert!(!files.contains_key("drop.py"));
        // The live tree is untouched.
        assert!(tree.contains(&p("code/drop.py")));
    }

    #[test]
    fn legacy_payload_is_accepted() {
        let payload = json!({
            "folders": {
                "primary": {
                    "folders": {},
                    "files": {
                        "r.csv": { "path": "N:package:1", "description": "", "additional-metadata": "", "type": "bf", "action": ["existing", "moved"] }
                    },
                    "type": ""
                }
            },
            "files": {},
            "type": ""
        });
        let folder: SerializedFolder = serde_json::from_value(payload).unwrap();
        let tree = TreeStore::from_serialized(&folder).unwrap();
        let node = tree.resolve(&p("primary/r.csv")).unwrap();
        assert_eq!(node.provenance(), &Provenance::Remote(Some("N:package:1".into())));
        assert_eq!(node.tags(), &LifecycleTags::of(&[LifecycleTag::Existing]));
    }

    #[test]
    fn remote_identifiers_survive_a_rename_and_reserialization() {
        let payload = json!({
            "folders": {
                "primary": {
                    "folders": {
                        "sub-1": { "path": "N:collection:7", "type": "bf", "action": ["existing"] }
                    },
                    "files": {
                        "r.csv": { "path": "N:package:1", "description": "", "additional-metadata": "", "type": "bf", "action": ["existing"] }
                    },
                    "type": "virtual"
                }
            },
            "type": ""
        });
        let folder: SerializedFolder = serde_json::from_value(payload).unwrap();
        let mut tree = TreeStore::from_serialized(&folder).unwrap();
        tree.rename(&p("primary/r.csv"), "trace.csv").unwrap();

        let value = serde_json::to_value(tree.upload_payload()).unwrap();
        let file = &value["folders"]["primary"]["files"]["trace.csv"];
        assert_eq!(file["path"], "N:package:1");
        assert_eq!(file["type"], "bf");
        assert_eq!(file["action"], json!(["renamed", "existing"]));
        assert_eq!(
            value["folders"]["primary"]["folders"]["sub-1"]["path"],
            "N:collection:7"
        );

        let reloaded: SerializedFolder = serde_json::from_value(value).unwrap();
        assert_eq!(TreeStore::from_serialized(&reloaded).unwrap(), tree);
    }

    #[test]
    fn local_entries_require_a_source_path() {
        let payload = json!({
            "folders": { "docs": { "files": { "x.md": { "type": "local" } } } },
            "type": ""
        });
        let folder: SerializedFolder = serde_json::from_value(payload).unwrap();
        assert_eq!(
            TreeStore::from_serialized(&folder).unwrap_err(),
            SerializedTreeError::MissingSourcePath(p("docs/x.md"))
        );
    }

    #[test]
    fn non_classification_root_folders_are_rejected() {
        let payload = json!({ "folders": { "misc": {} }, "type": "" });
        let folder: SerializedFolder = serde_json::from_value(payload).unwrap();
        assert!(matches!(
            TreeStore::from_serialized(&folder),
            Err(SerializedTreeError::Tree(TreeError::InvalidTopLevel(_)))
        ));
    }
}
