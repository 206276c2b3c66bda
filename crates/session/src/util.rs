use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Writes `data` through a sibling `<name>.tmp` file and a rename, so readers
/// never observe a half-written document.
/// 以臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = temp_sibling(path);
    fs::write(&tmp_path, data)?;
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

/// `session.json` → `session.json.tmp`; the original extension is kept.
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("document"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_parents_and_leaves_no_temp_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/session.json");
        write_atomic(&target, b"{}").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"{}");
        assert!(!dir.path().join("nested/session.json.tmp").exists());
    }

    #[test]
    fn temp_sibling_keeps_extension() {
        assert_eq!(
            temp_sibling(Path::new("/data/session.json")),
            PathBuf::from("/data/session.json.tmp")
        );
    }
}
