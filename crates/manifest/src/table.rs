use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Fixed leading columns of every manifest.
pub const FIXED_HEADERS: [&str; 3] = ["filename", "file type", "timestamp"];

/// Offset of the first variable (user) column.
pub const FIXED_WIDTH: usize = FIXED_HEADERS.len();

/// Serialized manifest: a header row plus data rows.  
/// 清單表格。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub data: Vec<Vec<String>>,
}

impl Manifest {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            data: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First-column values, rows without a filename skipped.
    pub fn filenames(&self) -> impl Iterator<Item = &str> {
        self.data
            .iter()
            .filter_map(|row| row.first().map(String::as_str))
    }

    pub fn row(&self, filename: &str) -> Option<&[String]> {
        self.data
            .iter()
            .find(|row| row.first().map(String::as_str) == Some(filename))
            .map(Vec::as_slice)
    }

    /// Looks up a cell by header name.
    pub fn cell(&self, filename: &str, header: &str) -> Option<&str> {
        let column = self.headers.iter().position(|h| h == header)?;
        self.row(filename)?.get(column).map(String::as_str)
    }

    /// Sets a cell by header name; returns `false` when the row or column is missing.
    pub fn set_cell(&mut self, filename: &str, header: &str, value: impl Into<String>) -> bool {
        let Some(column) = self.headers.iter().position(|h| h == header) else {
            return false;
        };
        let width = self.width();
        let Some(row) = self
            .data
            .iter_mut()
            .find(|row| row.first().map(String::as_str) == Some(filename))
        else {
            return false;
        };
        row.resize(width, String::new());
        row[column] = value.into();
        true
    }

    /// Renames the first row keyed `from`; returns whether a row matched.
    pub fn rename_row(&mut self, from: &str, to: &str) -> bool {
        self.rename_nth_row(from, to, 0)
    }

    /// Renames the `nth` row keyed `from` (counting from zero).
    ///
    /// Rows sharing a key belong to same-named files in different folders;
    /// only the addressed one changes.
    pub fn rename_nth_row(&mut self, from: &str, to: &str, nth: usize) -> bool {
        let Some(first) = self
            .data
            .iter_mut()
            .filter_map(|row| row.first_mut())
            .filter(|first| first.as_str() == from)
            .nth(nth)
        else {
            return false;
        };
        *first = to.to_string();
        true
    }
}

/// One synthesized inventory row.  
/// 清單資料列。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestRow {
    pub filename: String,
    pub file_type: String,
    pub timestamp: String,
    /// Variable columns, one per variable header.
    pub extra: Vec<String>,
    /// Local source of the leaf, used to fill `timestamp`; not a column.
    pub source: Option<PathBuf>,
}

impl ManifestRow {
    pub fn cells(&self) -> Vec<String> {
        let mut cells = Vec::with_capacity(FIXED_WIDTH + self.extra.len());
        cells.push(self.filename.clone());
        cells.push(self.file_type.clone());
        cells.push(self.timestamp.clone());
        cells.extend(self.extra.iter().cloned());
        cells
    }
}
