use std::fs;
use std::path::Path;

use chrono::{DateTime, Local};

/// Timestamp format written into the manifest.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Local modification time of `path`, or `None` when unreadable.  
/// 讀取檔案修改時間。
pub fn modified_timestamp(path: &Path) -> Option<String> {
    let modified = fs::metadata(path).and_then(|meta| meta.modified()).ok()?;
    let local: DateTime<Local> = modified.into();
    Some(local.format(TIMESTAMP_FORMAT).to_string())
}
