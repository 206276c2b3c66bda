use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::classification::Classification;
use crate::node::{LeafMetadata, LifecycleTag, LifecycleTags, Node, Provenance};
use crate::path::{self, DatasetPath, PATH_SEPARATOR};

/// Errors raised by tree mutations.  
/// 資料集樹操作錯誤類型。
///
/// Every failing operation leaves the tree exactly as it was before the call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("'{0}' not found")]
    NotFound(DatasetPath),
    #[error("'{name}' already exists in '{parent}'")]
    DuplicateName { parent: DatasetPath, name: String },
    #[error("cannot move '{path}' into its own subtree '{destination}'")]
    CircularMove {
        path: DatasetPath,
        destination: DatasetPath,
    },
    #[error("'{0}' is not a folder")]
    NotAContainer(DatasetPath),
    #[error("'{0}' is not a file")]
    NotALeaf(DatasetPath),
    #[error("invalid node name '{0}'")]
    InvalidName(String),
    #[error("'{0}' is not a classification folder and cannot be placed at the dataset root")]
    InvalidTopLevel(String),
    #[error("top-level folder '{0}' cannot be renamed or moved")]
    TopLevelLocked(DatasetPath),
    #[error("the dataset root cannot be modified")]
    RootLocked,
}

/// Old→new mapping emitted once per successful rename.  
/// 重新命名通知（舊路徑 → 新路徑）。
///
/// Per-file tables keyed by name (manifests, registries) are migrated by the
/// receiver; the tree keeps no such table itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameNotice {
    pub from: DatasetPath,
    pub to: DatasetPath,
}

impl RenameNotice {
    /// Leaf name before the rename.  
    /// 改名前的名稱。
    pub fn old_name(&self) -> &str {
        self.from.name().unwrap_or_default()
    }

    /// Leaf name after the rename.  
    /// 改名後的名稱。
    pub fn new_name(&self) -> &str {
        self.to.name().unwrap_or_default()
    }
}

/// Options for [`TreeStore::walk_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkOptions {
    pub include_deleted: bool,
}

/// File and folder counts over the non-deleted part of a subtree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub files: usize,
    pub folders: usize,
}

/// Owner of the virtual dataset tree and its invariants.  
/// 資料集虛擬樹。
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStore {
    root: Node,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    /// Creates an empty dataset tree.  
    /// 建立空的資料集樹。
    pub fn new() -> Self {
        Self {
            root: Node::container("", Provenance::Virtual),
        }
    }

    /// Returns the dataset root container.  
    /// 回傳資料集根節點。
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Resolves a path to a node.  
    /// 依路徑取得節點。
    pub fn resolve(&self, path: &DatasetPath) -> Result<&Node, TreeError> {
        path::resolve(&self.root, path)
    }

    /// Returns `true` when `path` resolves, soft-deleted or not.  
    /// 路徑存在時回傳 `true`（含軟刪除節點）。
    pub fn contains(&self, path: &DatasetPath) -> bool {
        self.resolve(path).is_ok()
    }

    /// Classification containers currently present at the root, deleted or not.
    pub fn classifications(&self) -> Vec<Classification> {
        Classification::ALL
            .into_iter()
            .filter(|c| self.root.child(c.as_str()).is_some())
            .collect()
    }

    /// Adds an empty, model-only folder.  
    /// 新增虛擬資料夾。
    pub fn create_container(
        &mut self,
        parent: &DatasetPath,
        name: &str,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::container(name, Provenance::Virtual)
            .with_tags(LifecycleTags::of(&[LifecycleTag::New]));
        self.insert_child(parent, node)
    }

    /// Adds a file backed by `source` on the local disk.  
    /// 匯入本機檔案。
    pub fn import_leaf(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        source: impl Into<PathBuf>,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::leaf(name, Provenance::Local(source.into()))
            .with_tags(LifecycleTags::of(&[LifecycleTag::New]));
        self.insert_child(parent, node)
    }

    /// Adds a folder backed by `source`; contents are imported separately.  
    /// 匯入本機資料夾（不含內容）。
    pub fn import_container(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        source: impl Into<PathBuf>,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::container(name, Provenance::Local(source.into()))
            .with_tags(LifecycleTags::of(&[LifecycleTag::New]));
        self.insert_child(parent, node)
    }

    /// Like [`Self::import_leaf`] for an entry whose on-disk name was changed
    /// during import; the node is tagged `{new, renamed}`.
    pub fn import_renamed_leaf(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        source: impl Into<PathBuf>,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::leaf(name, Provenance::Local(source.into()))
            .with_tags(LifecycleTags::of(&[LifecycleTag::New, LifecycleTag::Renamed]));
        self.insert_child(parent, node)
    }

    /// Folder counterpart of [`Self::import_renamed_leaf`].
    pub fn import_renamed_container(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        source: impl Into<PathBuf>,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::container(name, Provenance::Local(source.into()))
            .with_tags(LifecycleTags::of(&[LifecycleTag::New, LifecycleTag::Renamed]));
        self.insert_child(parent, node)
    }

    /// Adds a file that already exists in the previously uploaded copy.
    ///
    /// `remote_id` is the backend's identifier, carried through to the
    /// serialized `path` so later renames and deletions can be applied remotely.
    pub fn insert_remote_leaf(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        remote_id: Option<String>,
        metadata: LeafMetadata,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::leaf(name, Provenance::Remote(remote_id))
            .with_tags(LifecycleTags::of(&[LifecycleTag::Existing]))
            .with_metadata(metadata);
        self.insert_child(parent, node)
    }

    /// Adds a folder that already exists in the previously uploaded copy.
    pub fn insert_remote_container(
        &mut self,
        parent: &DatasetPath,
        name: &str,
        remote_id: Option<String>,
    ) -> Result<DatasetPath, TreeError> {
        let node = Node::container(name, Provenance::Remote(remote_id))
            .with_tags(LifecycleTags::of(&[LifecycleTag::Existing]));
        self.insert_child(parent, node)
    }

    pub(crate) fn insert_child(
        &mut self,
        parent: &DatasetPath,
        node: Node,
    ) -> Result<DatasetPath, TreeError> {
        validate_name(node.name())?;
        if parent.is_root()
            && (!node.is_container() || Classification::from_name(node.name()).is_none())
        {
            return Err(TreeError::InvalidTopLevel(node.name().to_string()));
        }
        let parent_node = path::resolve_mut(&mut self.root, parent)?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| TreeError::NotAContainer(parent.clone()))?;
        if children.contains_key(node.name()) {
            return Err(TreeError::DuplicateName {
                parent: parent.clone(),
                name: node.name().to_string(),
            });
        }
        let created = parent.join(node.name());
        debug!(path = %created, provenance = ?node.provenance(), "node added");
        children.insert(node.name().to_string(), node);
        Ok(created)
    }

    /// Renames the node at `path`.  
    /// 重新命名節點。
    ///
    /// Renaming to the current name succeeds without a notice. On success the
    /// node gains the `renamed` tag and the old→new mapping is returned.
    pub fn rename(
        &mut self,
        path: &DatasetPath,
        new_name: &str,
    ) -> Result<Option<RenameNotice>, TreeError> {
        let (parent, old_name) = split_movable(path)?;
        validate_name(new_name)?;
        let parent_node = path::resolve_mut(&mut self.root, &parent)?;
        let children = parent_node
            .children_mut()
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
        if !children.contains_key(old_name) {
            return Err(TreeError::NotFound(path.clone()));
        }
        if old_name == new_name {
            return Ok(None);
        }
        if children.contains_key(new_name) {
            return Err(TreeError::DuplicateName {
                parent,
                name: new_name.to_string(),
            });
        }
        let Some(mut node) = children.remove(old_name) else {
            return Err(TreeError::NotFound(path.clone()));
        };
        node.set_name(new_name);
        node.tags_mut().insert(LifecycleTag::Renamed);
        children.insert(new_name.to_string(), node);

        let notice = RenameNotice {
            from: path.clone(),
            to: parent.join(new_name),
        };
        debug!(from = %notice.from, to = %notice.to, "node renamed");
        Ok(Some(notice))
    }

    /// Relocates the subtree at `path` under `new_parent`.  
    /// 移動子樹到新的父資料夾。
    pub fn move_node(
        &mut self,
        path: &DatasetPath,
        new_parent: &DatasetPath,
    ) -> Result<DatasetPath, TreeError> {
        let (old_parent, name) = split_movable(path)?;
        self.resolve(path)?;
        if new_parent.is_root() {
            return Err(TreeError::InvalidTopLevel(name.to_string()));
        }
        if new_parent.starts_with(path) {
            return Err(TreeError::CircularMove {
                path: path.clone(),
                destination: new_parent.clone(),
            });
        }
        if *new_parent == old_parent {
            return Ok(path.clone());
        }
        let destination = self.resolve(new_parent)?;
        let siblings = destination
            .children()
            .ok_or_else(|| TreeError::NotAContainer(new_parent.clone()))?;
        if siblings.contains_key(name) {
            return Err(TreeError::DuplicateName {
                parent: new_parent.clone(),
                name: name.to_string(),
            });
        }

        let node = self.detach(path)?;
        let target = new_parent.join(name);
        if let Err(node) = self.attach(new_parent, node) {
            // Validated above; put the node back so the tree is unchanged.
            let _ = self.attach(&old_parent, node);
            return Err(TreeError::NotAContainer(new_parent.clone()));
        }
        debug!(from = %path, to = %target, "node moved");
        Ok(target)
    }

    /// Tags the node as deleted without changing structure.  
    /// 軟刪除節點（可還原）。
    ///
    /// Containers with descendants receive `recursively-deleted`, everything
    /// else `deleted`.
    pub fn soft_delete(&mut self, path: &DatasetPath) -> Result<LifecycleTag, TreeError> {
        if path.is_root() {
            return Err(TreeError::RootLocked);
        }
        let node = path::resolve_mut(&mut self.root, path)?;
        let tag = if node.is_container() && node.has_descendants() {
            LifecycleTag::RecursivelyDeleted
        } else {
            LifecycleTag::Deleted
        };
        node.tags_mut().insert(tag);
        debug!(path = %path, tag = %tag, "node soft-deleted");
        Ok(tag)
    }

    /// Clears the deletion tags set by [`Self::soft_delete`].  
    /// 還原軟刪除的節點。
    pub fn restore(&mut self, path: &DatasetPath) -> Result<bool, TreeError> {
        if path.is_root() {
            return Err(TreeError::RootLocked);
        }
        let node = path::resolve_mut(&mut self.root, path)?;
        let tags = node.tags_mut();
        let deleted = tags.remove(LifecycleTag::Deleted);
        let recursive = tags.remove(LifecycleTag::RecursivelyDeleted);
        let restored = deleted || recursive;
        debug!(path = %path, restored, "node restored");
        Ok(restored)
    }

    /// Irreversibly drops soft-deleted nodes at or under `path`.  
    /// 永久移除 `path` 之下所有軟刪除的節點。
    ///
    /// Returns the number of nodes removed, descendants included.
    pub fn purge(&mut self, path: &DatasetPath) -> Result<usize, TreeError> {
        let node = self.resolve(path)?;
        if !path.is_root() && node.is_soft_deleted() {
            let removed = self.detach(path)?;
            let count = count_nodes(&removed);
            debug!(path = %path, count, "subtree purged");
            return Ok(count);
        }
        let node = path::resolve_mut(&mut self.root, path)?;
        let count = purge_children(node);
        if count > 0 {
            debug!(path = %path, count, "soft-deleted nodes purged");
        }
        Ok(count)
    }

    /// Lazy depth-first walk below `path`, skipping soft-deleted nodes.  
    /// 深度優先走訪（資料夾優先、不分大小寫排序）。
    pub fn walk(&self, path: &DatasetPath) -> Result<Walk<'_>, TreeError> {
        self.walk_with(path, WalkOptions::default())
    }

    /// Walk with explicit options, e.g. to include soft-deleted nodes.  
    /// 可指定選項的走訪（例如包含軟刪除節點）。
    pub fn walk_with(
        &self,
        path: &DatasetPath,
        options: WalkOptions,
    ) -> Result<Walk<'_>, TreeError> {
        let start = self.resolve(path)?;
        let excluded = !options.include_deleted && self.is_excluded(path);
        let mut walk = Walk {
            stack: Vec::new(),
            include_deleted: options.include_deleted,
        };
        if !excluded {
            walk.expand(path, start);
        }
        Ok(walk)
    }

    /// Whether `path` or any ancestor carries a deletion tag.
    pub fn is_excluded(&self, path: &DatasetPath) -> bool {
        let mut current = &self.root;
        for segment in path.segments() {
            match current.child(segment) {
                Some(child) if child.is_soft_deleted() => return true,
                Some(child) => current = child,
                None => return false,
            }
        }
        false
    }

    /// Counts non-deleted files and folders below `path`.  
    /// 統計 `path` 之下未刪除的檔案與資料夾數量。
    pub fn stats(&self, path: &DatasetPath) -> Result<TreeStats, TreeError> {
        let mut stats = TreeStats::default();
        for (_, node) in self.walk(path)? {
            if node.is_container() {
                stats.folders += 1;
            } else {
                stats.files += 1;
            }
        }
        Ok(stats)
    }

    /// Source paths of the non-deleted local files below `path`, for size reporting.
    pub fn local_sources(&self, path: &DatasetPath) -> Result<Vec<&Path>, TreeError> {
        Ok(self
            .walk(path)?
            .filter(|(_, node)| node.is_leaf())
            .filter_map(|(_, node)| node.source_path())
            .collect())
    }

    /// Sets a file's description; remote files gain `updated`.  
    /// 設定檔案描述；遠端檔案會加上 `updated`。
    pub fn set_leaf_description(
        &mut self,
        path: &DatasetPath,
        description: impl Into<String>,
    ) -> Result<(), TreeError> {
        let description = description.into();
        self.update_leaf(path, |metadata| metadata.description = description)
    }

    /// Sets a file's additional metadata; remote files gain `updated`.  
    /// 設定檔案附加資料；遠端檔案會加上 `updated`。
    pub fn set_leaf_metadata(
        &mut self,
        path: &DatasetPath,
        extra_metadata: impl Into<String>,
    ) -> Result<(), TreeError> {
        let extra_metadata = extra_metadata.into();
        self.update_leaf(path, |metadata| metadata.extra_metadata = extra_metadata)
    }

    fn update_leaf<F>(&mut self, path: &DatasetPath, op: F) -> Result<(), TreeError>
    where
        F: FnOnce(&mut LeafMetadata),
    {
        let node = path::resolve_mut(&mut self.root, path)?;
        let is_existing = node.has_tag(LifecycleTag::Existing);
        let metadata = node
            .metadata_mut()
            .ok_or_else(|| TreeError::NotALeaf(path.clone()))?;
        op(metadata);
        if is_existing {
            node.tags_mut().insert(LifecycleTag::Updated);
        }
        Ok(())
    }

    /// Points the file at `path` to new local content.
    ///
    /// A remote file keeps its `existing` tag and gains `updated`; any other
    /// file becomes a fresh `new` import. Deletion tags are cleared and leaf
    /// metadata is preserved.
    pub fn replace_leaf_source(
        &mut self,
        path: &DatasetPath,
        source: impl Into<PathBuf>,
    ) -> Result<(), TreeError> {
        let node = path::resolve_mut(&mut self.root, path)?;
        if !node.is_leaf() {
            return Err(TreeError::NotALeaf(path.clone()));
        }
        retarget(node, source.into());
        debug!(path = %path, "file content replaced");
        Ok(())
    }

    /// Folder counterpart of [`Self::replace_leaf_source`].
    ///
    /// Children are left in place; the caller reconciles them against the
    /// incoming content.
    pub fn replace_container_source(
        &mut self,
        path: &DatasetPath,
        source: impl Into<PathBuf>,
    ) -> Result<(), TreeError> {
        split_movable(path)?;
        let node = path::resolve_mut(&mut self.root, path)?;
        if !node.is_container() {
            return Err(TreeError::NotAContainer(path.clone()));
        }
        retarget(node, source.into());
        debug!(path = %path, "folder content replaced");
        Ok(())
    }

    /// Keeps selected classification folders, creates missing ones, drops the rest.  
    /// 依選取的分類調整頂層資料夾。
    ///
    /// Returns the classifications that were dropped.
    pub fn select_classifications(&mut self, selected: &[Classification]) -> Vec<Classification> {
        let wanted: BTreeSet<Classification> = selected.iter().copied().collect();
        let mut dropped = Vec::new();
        if let Some(children) = self.root.children_mut() {
            for classification in Classification::ALL {
                let name = classification.as_str();
                if wanted.contains(&classification) {
                    children.entry(name.to_string()).or_insert_with(|| {
                        Node::container(name, Provenance::Virtual)
                            .with_tags(LifecycleTags::of(&[LifecycleTag::New]))
                    });
                } else if children.remove(name).is_some() {
                    dropped.push(classification);
                }
            }
        }
        debug!(selected = ?wanted, dropped = ?dropped, "classifications selected");
        dropped
    }

    /// Clone of this tree with every soft-deleted node removed.
    pub fn purged(&self) -> TreeStore {
        let mut copy = self.clone();
        purge_children(&mut copy.root);
        copy
    }

    fn detach(&mut self, path: &DatasetPath) -> Result<Node, TreeError> {
        let (parent, name) = split_child(path)?;
        let parent_node = path::resolve_mut(&mut self.root, &parent)?;
        parent_node
            .children_mut()
            .and_then(|children| children.remove(name))
            .ok_or_else(|| TreeError::NotFound(path.clone()))
    }

    /// Hands the node back when it cannot be attached.
    fn attach(&mut self, parent: &DatasetPath, node: Node) -> Result<(), Node> {
        let Ok(parent_node) = path::resolve_mut(&mut self.root, parent) else {
            return Err(node);
        };
        let Some(children) = parent_node.children_mut() else {
            return Err(node);
        };
        if children.contains_key(node.name()) {
            return Err(node);
        }
        children.insert(node.name().to_string(), node);
        Ok(())
    }
}

/// Lazy, restartable depth-first iterator over a subtree.  
/// 以排序後順序延遲走訪子樹。
#[derive(Debug)]
pub struct Walk<'a> {
    stack: Vec<(DatasetPath, &'a Node)>,
    include_deleted: bool,
}

impl<'a> Walk<'a> {
    fn expand(&mut self, path: &DatasetPath, node: &'a Node) {
        let children = node.sorted_children();
        for child in children.into_iter().rev() {
            if !self.include_deleted && child.is_soft_deleted() {
                continue;
            }
            self.stack.push((path.join(child.name()), child));
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (DatasetPath, &'a Node);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        if node.is_container() {
            self.expand(&path, node);
        }
        Some((path, node))
    }
}

fn validate_name(name: &str) -> Result<(), TreeError> {
    if name.is_empty() || name.contains(PATH_SEPARATOR) || name == "." || name == ".." {
        return Err(TreeError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn split_child(path: &DatasetPath) -> Result<(DatasetPath, &str), TreeError> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(TreeError::RootLocked),
    }
}

fn split_movable(path: &DatasetPath) -> Result<(DatasetPath, &str), TreeError> {
    let (parent, name) = split_child(path)?;
    if parent.is_root() {
        return Err(TreeError::TopLevelLocked(path.clone()));
    }
    Ok((parent, name))
}

/// Points `node` at new local content. Remote nodes keep `existing` and gain
/// `updated`; anything else starts over as `new`.
fn retarget(node: &mut Node, source: PathBuf) {
    if node.provenance().is_remote() {
        let tags = node.tags_mut();
        tags.remove(LifecycleTag::Deleted);
        tags.remove(LifecycleTag::RecursivelyDeleted);
        tags.insert(LifecycleTag::Updated);
    } else {
        *node.tags_mut() = LifecycleTags::of(&[LifecycleTag::New]);
    }
    node.set_provenance(Provenance::Local(source));
}

fn count_nodes(node: &Node) -> usize {
    1 + node
        .children()
        .map(|children| children.values().map(count_nodes).sum())
        .unwrap_or(0)
}

fn purge_children(node: &mut Node) -> usize {
    let Some(children) = node.children_mut() else {
        return 0;
    };
    let doomed: Vec<String> = children
        .iter()
        .filter(|(_, child)| child.is_soft_deleted())
        .map(|(name, _)| name.clone())
        .collect();
    let mut count = 0;
    for name in doomed {
        if let Some(removed) = children.remove(&name) {
            count += count_nodes(&removed);
        }
    }
    for child in children.values_mut() {
        count += purge_children(child);
    }
    count
}
