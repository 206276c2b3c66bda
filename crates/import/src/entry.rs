use std::path::{Path, PathBuf};

/// A file or directory offered for import.  
/// 外部檔案或資料夾。
///
/// Directories carry their fully scanned subtree; nothing is read lazily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalEntry {
    File {
        name: String,
        source: PathBuf,
    },
    Directory {
        name: String,
        source: PathBuf,
        children: Vec<ExternalEntry>,
    },
}

impl ExternalEntry {
    pub fn file(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        ExternalEntry::File {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn directory(
        name: impl Into<String>,
        source: impl Into<PathBuf>,
        children: Vec<ExternalEntry>,
    ) -> Self {
        ExternalEntry::Directory {
            name: name.into(),
            source: source.into(),
            children,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ExternalEntry::File { name, .. } | ExternalEntry::Directory { name, .. } => name,
        }
    }

    pub fn source(&self) -> &Path {
        match self {
            ExternalEntry::File { source, .. } | ExternalEntry::Directory { source, .. } => source,
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, ExternalEntry::Directory { .. })
    }

    pub fn children(&self) -> &[ExternalEntry] {
        match self {
            ExternalEntry::Directory { children, .. } => children,
            ExternalEntry::File { .. } => &[],
        }
    }

    /// Number of files in this entry, descendants included.
    pub fn file_count(&self) -> usize {
        match self {
            ExternalEntry::File { .. } => 1,
            ExternalEntry::Directory { children, .. } => {
                children.iter().map(ExternalEntry::file_count).sum()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_count_descends_into_directories() {
        let entry = ExternalEntry::directory(
            "raw",
            "/in/raw",
            vec![
                ExternalEntry::file("a.csv", "/in/raw/a.csv"),
                ExternalEntry::directory(
                    "nested",
                    "/in/raw/nested",
                    vec![ExternalEntry::file("b.csv", "/in/raw/nested/b.csv")],
                ),
                ExternalEntry::directory("empty", "/in/raw/empty", Vec::new()),
            ],
        );
        assert_eq!(entry.file_count(), 2);
        assert_eq!(entry.children().len(), 3);
        assert!(entry.is_directory());
        assert_eq!(entry.source(), Path::new("/in/raw"));
    }
}
