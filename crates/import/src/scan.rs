//! Eager filesystem scanning into [`ExternalEntry`] trees.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::entry::ExternalEntry;
use crate::ImportError;

/// Scans every path before anything touches the tree.  
/// 掃描多個路徑。
pub fn scan_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<ExternalEntry>, ImportError> {
    paths.iter().map(|path| scan_path(path.as_ref())).collect()
}

/// Reads `path` and, for a directory, its whole subtree in file-name order.
pub fn scan_path(path: &Path) -> Result<ExternalEntry, ImportError> {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| ImportError::Nameless {
            path: path.to_path_buf(),
        })?;

    let mut walker = WalkDir::new(path).sort_by_file_name().into_iter();
    let root = walker
        .next()
        .ok_or_else(|| ImportError::Nameless {
            path: path.to_path_buf(),
        })?
        .map_err(|err| scan_error(path, err))?;
    if !root.file_type().is_dir() {
        return Ok(ExternalEntry::file(name, root.path()));
    }

    // Pre-order walk: the open directories form a stack indexed by depth.
    let mut open = vec![ExternalEntry::directory(name, root.path(), Vec::new())];
    for item in walker {
        let item = item.map_err(|err| scan_error(path, err))?;
        while open.len() > item.depth() {
            close_directory(&mut open);
        }
        let child_name = item.file_name().to_string_lossy().into_owned();
        if item.file_type().is_dir() {
            open.push(ExternalEntry::directory(child_name, item.path(), Vec::new()));
        } else {
            push_child(&mut open, ExternalEntry::file(child_name, item.path()));
        }
    }
    while open.len() > 1 {
        close_directory(&mut open);
    }
    let entry = open.pop().ok_or_else(|| ImportError::Nameless {
        path: path.to_path_buf(),
    })?;
    debug!(path = %path.display(), files = entry.file_count(), "directory scanned");
    Ok(entry)
}

fn close_directory(open: &mut Vec<ExternalEntry>) {
    if let Some(done) = open.pop() {
        push_child(open, done);
    }
}

fn push_child(open: &mut [ExternalEntry], child: ExternalEntry) {
    if let Some(ExternalEntry::Directory { children, .. }) = open.last_mut() {
        children.push(child);
    }
}

fn scan_error(root: &Path, err: walkdir::Error) -> ImportError {
    let path = err
        .path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(root));
    ImportError::Scan { path, source: err }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn scans_nested_directories_in_name_order() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("raw");
        fs::create_dir_all(raw.join("sub-2")).unwrap();
        fs::create_dir_all(raw.join("sub-1/ses-1")).unwrap();
        fs::write(raw.join("b.csv"), "b").unwrap();
        fs::write(raw.join("a.csv"), "a").unwrap();
        fs::write(raw.join("sub-1/ses-1/trace.dat"), "t").unwrap();

        let entry = scan_path(&raw).unwrap();
        assert_eq!(entry.name(), "raw");
        let names: Vec<&str> = entry.children().iter().map(ExternalEntry::name).collect();
        assert_eq!(names, ["a.csv", "b.csv", "sub-1", "sub-2"]);

        let sub1 = &entry.children()[2];
        assert!(sub1.is_directory());
        let session = &sub1.children()[0];
        assert_eq!(session.name(), "ses-1");
        assert_eq!(session.children()[0].source(), raw.join("sub-1/ses-1/trace.dat"));
        assert!(entry.children()[3].children().is_empty());
        assert_eq!(entry.file_count(), 3);
    }

    #[test]
    fn single_file_becomes_file_entry() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, "n").unwrap();

        let entries = scan_paths(&[&file]).unwrap();
        assert_eq!(entries, vec![ExternalEntry::file("notes.txt", &file)]);
    }

    #[test]
    fn missing_path_reports_scan_error() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("absent");
        let err = scan_path(&missing).unwrap_err();
        assert!(matches!(err, ImportError::Scan { path, .. } if path == missing));
    }
}
