use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Where a node's content comes from.  
/// 節點內容的來源。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Backed by a real path on the user's disk.
    Local(PathBuf),
    /// Exists only inside the model (e.g. an empty folder the user added).
    Virtual,
    /// Already present in the previously uploaded copy of the dataset,
    /// with the backend's identifier for it when one is known.
    Remote(Option<String>),
}

impl Provenance {
    pub fn source_path(&self) -> Option<&Path> {
        match self {
            Provenance::Local(path) => Some(path),
            _ => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Provenance::Remote(_))
    }

    /// Backend identifier of a remote node, e.g. `N:package:1`.
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Provenance::Remote(id) => id.as_deref(),
            _ => None,
        }
    }
}

/// Lifecycle tag attached to a node.  
/// 節點生命週期標記。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LifecycleTag {
    New,
    Renamed,
    Updated,
    Deleted,
    RecursivelyDeleted,
    Existing,
}

impl LifecycleTag {
    pub const ALL: [LifecycleTag; 6] = [
        LifecycleTag::New,
        LifecycleTag::Renamed,
        LifecycleTag::Updated,
        LifecycleTag::Deleted,
        LifecycleTag::RecursivelyDeleted,
        LifecycleTag::Existing,
    ];

    /// Wire name used in the serialized `action` array.
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleTag::New => "new",
            LifecycleTag::Renamed => "renamed",
            LifecycleTag::Updated => "updated",
            LifecycleTag::Deleted => "deleted",
            LifecycleTag::RecursivelyDeleted => "recursive_deleted",
            LifecycleTag::Existing => "existing",
        }
    }
}

impl fmt::Display for LifecycleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LifecycleTag::New),
            "renamed" => Ok(LifecycleTag::Renamed),
            "updated" => Ok(LifecycleTag::Updated),
            "deleted" => Ok(LifecycleTag::Deleted),
            "recursive_deleted" | "recursively-deleted" => Ok(LifecycleTag::RecursivelyDeleted),
            "existing" => Ok(LifecycleTag::Existing),
            other => Err(format!("unknown lifecycle tag '{other}'")),
        }
    }
}

/// Unordered set of lifecycle tags.  
/// 無序的生命週期標記集合。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LifecycleTags(BTreeSet<LifecycleTag>);

impl LifecycleTags {
    /// Builds a set from a tag list.  
    /// 由標記清單建立集合。
    pub fn of(tags: &[LifecycleTag]) -> Self {
        Self(tags.iter().copied().collect())
    }

    pub fn contains(&self, tag: LifecycleTag) -> bool {
        self.0.contains(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = LifecycleTag> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn insert(&mut self, tag: LifecycleTag) -> bool {
        self.0.insert(tag)
    }

    pub(crate) fn remove(&mut self, tag: LifecycleTag) -> bool {
        self.0.remove(&tag)
    }

    /// `deleted` or `recursively-deleted`.
    pub fn is_soft_deleted(&self) -> bool {
        self.contains(LifecycleTag::Deleted) || self.contains(LifecycleTag::RecursivelyDeleted)
    }
}

impl FromIterator<LifecycleTag> for LifecycleTags {
    fn from_iter<T: IntoIterator<Item = LifecycleTag>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Free-text fields carried by leaves.  
/// 檔案的自由文字欄位。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafMetadata {
    pub description: String,
    pub extra_metadata: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Container,
    Leaf,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NodeBody {
    Container { children: BTreeMap<String, Node> },
    Leaf(LeafMetadata),
}

/// A folder or file inside the dataset tree.  
/// 資料集樹中的節點（資料夾或檔案）。
///
/// Fields are private: nodes are only mutated through [`crate::TreeStore`]
/// so lifecycle tags stay consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    provenance: Provenance,
    tags: LifecycleTags,
    body: NodeBody,
}

impl Node {
    pub(crate) fn container(name: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            name: name.into(),
            provenance,
            tags: LifecycleTags::default(),
            body: NodeBody::Container {
                children: BTreeMap::new(),
            },
        }
    }

    pub(crate) fn leaf(name: impl Into<String>, provenance: Provenance) -> Self {
        Self {
            name: name.into(),
            provenance,
            tags: LifecycleTags::default(),
            body: NodeBody::Leaf(LeafMetadata::default()),
        }
    }

    pub(crate) fn with_tags(mut self, tags: LifecycleTags) -> Self {
        self.tags = tags;
        self
    }

    pub(crate) fn with_metadata(mut self, metadata: LeafMetadata) -> Self {
        if let NodeBody::Leaf(existing) = &mut self.body {
            *existing = metadata;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Folder or file.  
    /// 資料夾或檔案。
    pub fn kind(&self) -> NodeKind {
        match self.body {
            NodeBody::Container { .. } => NodeKind::Container,
            NodeBody::Leaf(_) => NodeKind::Leaf,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind() == NodeKind::Container
    }

    pub fn is_leaf(&self) -> bool {
        self.kind() == NodeKind::Leaf
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.provenance.source_path()
    }

    pub fn tags(&self) -> &LifecycleTags {
        &self.tags
    }

    pub fn has_tag(&self, tag: LifecycleTag) -> bool {
        self.tags.contains(tag)
    }

    pub fn is_soft_deleted(&self) -> bool {
        self.tags.is_soft_deleted()
    }

    pub fn metadata(&self) -> Option<&LeafMetadata> {
        match &self.body {
            NodeBody::Leaf(metadata) => Some(metadata),
            NodeBody::Container { .. } => None,
        }
    }

    pub fn children(&self) -> Option<&BTreeMap<String, Node>> {
        match &self.body {
            NodeBody::Container { children } => Some(children),
            NodeBody::Leaf(_) => None,
        }
    }

    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children().and_then(|children| children.get(name))
    }

    /// Whether the container holds any child at all, soft-deleted or not.
    pub fn has_descendants(&self) -> bool {
        self.children().is_some_and(|children| !children.is_empty())
    }

    /// Children ordered for display: folders first, then case-insensitive by name.
    pub fn sorted_children(&self) -> Vec<&Node> {
        let mut children: Vec<&Node> = self
            .children()
            .map(|children| children.values().collect())
            .unwrap_or_default();
        children.sort_by(|a, b| display_order(a, b));
        children
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_provenance(&mut self, provenance: Provenance) {
        self.provenance = provenance;
    }

    pub(crate) fn tags_mut(&mut self) -> &mut LifecycleTags {
        &mut self.tags
    }

    pub(crate) fn metadata_mut(&mut self) -> Option<&mut LeafMetadata> {
        match &mut self.body {
            NodeBody::Leaf(metadata) => Some(metadata),
            NodeBody::Container { .. } => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut BTreeMap<String, Node>> {
        match &mut self.body {
            NodeBody::Container { children } => Some(children),
            NodeBody::Leaf(_) => None,
        }
    }
}

/// Folders before files, case-insensitive name, exact name as tie-breaker.
pub fn display_order(a: &Node, b: &Node) -> Ordering {
    b.is_container()
        .cmp(&a.is_container())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_children_puts_folders_first_case_insensitively() {
        let mut root = Node::container("", Provenance::Virtual);
        let children = root.children_mut().unwrap();
        for name in ["b.txt", "A.txt", "zeta"] {
            children.insert(name.into(), Node::leaf(name, Provenance::Virtual));
        }
        children.insert("Beta".into(), Node::container("Beta", Provenance::Virtual));
        children.insert("alpha".into(), Node::container("alpha", Provenance::Virtual));

        let names: Vec<&str> = root.sorted_children().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["alpha", "Beta", "A.txt", "b.txt", "zeta"]);
    }

    #[test]
    fn tag_names_parse_back() {
        for tag in LifecycleTag::ALL {
            assert_eq!(tag.as_str().parse::<LifecycleTag>().unwrap(), tag);
        }
        assert_eq!(
            "recursively-deleted".parse::<LifecycleTag>().unwrap(),
            LifecycleTag::RecursivelyDeleted
        );
        assert!("moved".parse::<LifecycleTag>().is_err());
    }

    #[test]
    fn only_local_nodes_expose_a_source_path() {
        let local = Node::leaf("a.csv", Provenance::Local(PathBuf::from("/data/a.csv")));
        let remote = Node::leaf("b.csv", Provenance::Remote(Some("N:package:2".into())));
        assert_eq!(local.source_path(), Some(Path::new("/data/a.csv")));
        assert!(remote.source_path().is_none());
        assert_eq!(remote.provenance().remote_id(), Some("N:package:2"));
        assert_eq!(local.provenance().remote_id(), None);
        assert!(remote.metadata().is_some());
        assert!(remote.children().is_none());
    }
}
