use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::node::Node;
use crate::TreeError;

/// Separator used by virtual dataset paths.
pub const PATH_SEPARATOR: char = '/';

/// Structural path inside the dataset tree.  
/// 資料集樹中的結構化路徑（由片段組成）。
///
/// Paths are always manipulated segment by segment; the string form is only
/// produced for display and serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct DatasetPath {
    segments: Vec<String>,
}

impl DatasetPath {
    /// The dataset root.  
    /// 資料集根目錄。
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a slash-delimited path, discarding empty segments.  
    /// 解析以斜線分隔的路徑，忽略空片段。
    pub fn parse(text: &str) -> Self {
        Self {
            segments: text
                .split(PATH_SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|segment: &String| !segment.is_empty())
                .collect(),
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, i.e. the node name.  
    /// 最後一個片段（節點名稱）。
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// First segment, which names the top-level classification container.
    pub fn top_level(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn parent(&self) -> Option<DatasetPath> {
        if self.is_root() {
            return None;
        }
        let mut parent = self.clone();
        parent.segments.pop();
        Some(parent)
    }

    pub fn push(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }

    pub fn pop(&mut self) -> Option<String> {
        self.segments.pop()
    }

    /// Returns a new path with `segment` appended.  
    /// 回傳加上子片段的新路徑。
    pub fn join(&self, segment: impl Into<String>) -> DatasetPath {
        let mut next = self.clone();
        next.push(segment);
        next
    }

    /// Whether `self` equals `ancestor` or lies underneath it.
    pub fn starts_with(&self, ancestor: &DatasetPath) -> bool {
        self.segments.len() >= ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// Path of `self` relative to `ancestor`, if `self` lies underneath it.
    pub fn strip_prefix(&self, ancestor: &DatasetPath) -> Option<DatasetPath> {
        if !self.starts_with(ancestor) {
            return None;
        }
        Some(DatasetPath {
            segments: self.segments[ancestor.segments.len()..].to_vec(),
        })
    }

    /// Replaces the leading `from` prefix with `to`.
    pub fn rebase(&self, from: &DatasetPath, to: &DatasetPath) -> Option<DatasetPath> {
        let rest = self.strip_prefix(from)?;
        let mut rebased = to.clone();
        rebased.segments.extend(rest.segments);
        Some(rebased)
    }
}

impl fmt::Display for DatasetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for segment in &self.segments {
            if !first {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
            first = false;
        }
        Ok(())
    }
}

impl FromStr for DatasetPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(DatasetPath::parse(s))
    }
}

impl From<&str> for DatasetPath {
    fn from(value: &str) -> Self {
        DatasetPath::parse(value)
    }
}

impl From<String> for DatasetPath {
    fn from(value: String) -> Self {
        DatasetPath::parse(&value)
    }
}

impl From<DatasetPath> for String {
    fn from(value: DatasetPath) -> Self {
        value.to_string()
    }
}

/// Resolves `path` starting at `root`; files cannot be descended into.  
/// 依路徑尋找節點；無法下探至檔案。
pub fn resolve<'a>(root: &'a Node, path: &DatasetPath) -> Result<&'a Node, TreeError> {
    let mut current = root;
    for segment in path.segments() {
        current = current
            .children()
            .and_then(|children| children.get(segment))
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
    }
    Ok(current)
}

/// Mutable counterpart of [`resolve`].
pub fn resolve_mut<'a>(root: &'a mut Node, path: &DatasetPath) -> Result<&'a mut Node, TreeError> {
    let mut current = root;
    for segment in path.segments() {
        current = current
            .children_mut()
            .and_then(|children| children.get_mut(segment))
            .ok_or_else(|| TreeError::NotFound(path.clone()))?;
    }
    Ok(current)
}
