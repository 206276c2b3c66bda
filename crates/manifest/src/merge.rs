use std::collections::HashMap;

use tracing::debug;

use crate::table::{Manifest, FIXED_WIDTH};

/// Three-way merge of fresh rows with the stored manifest.  
/// 合併新舊清單。
///
/// Rows are matched by filename only. Known files take their fixed columns
/// from `fresh` and their variable columns from `previous`; new files come
/// through as synthesized; files missing from `fresh` are dropped. The header
/// is `previous`'s whenever one exists. Never fails.
pub fn merge(fresh: &Manifest, previous: Option<&Manifest>) -> Manifest {
    let Some(previous) = previous else {
        return fresh.clone();
    };
    if is_unchanged(fresh, previous) {
        debug!(rows = previous.data.len(), "manifest unchanged");
        return previous.clone();
    }

    let mut user_values: HashMap<&str, &[String]> = HashMap::new();
    for row in &previous.data {
        if let Some(filename) = row.first() {
            let variable = row.get(FIXED_WIDTH..).unwrap_or(&[]);
            user_values.entry(filename.as_str()).or_insert(variable);
        }
    }

    let width = previous.width();
    let mut preserved = 0;
    let data = fresh
        .data
        .iter()
        .filter(|row| !row.is_empty())
        .map(|row| {
            let mut merged: Vec<String> = match user_values.get(row[0].as_str()) {
                Some(values) => {
                    preserved += 1;
                    row.iter()
                        .take(FIXED_WIDTH)
                        .chain(values.iter())
                        .cloned()
                        .collect()
                }
                None => row.clone(),
            };
            merged.resize(width, String::new());
            merged
        })
        .collect::<Vec<_>>();

    debug!(rows = data.len(), preserved, "manifest merged");
    Manifest {
        headers: previous.headers.clone(),
        data,
    }
}

/// Same filenames with the same fixed columns: nothing to merge.
fn is_unchanged(fresh: &Manifest, previous: &Manifest) -> bool {
    let mut fresh_names: Vec<&str> = fresh.filenames().collect();
    let mut previous_names: Vec<&str> = previous.filenames().collect();
    fresh_names.sort_unstable();
    previous_names.sort_unstable();
    if fresh_names != previous_names {
        return false;
    }
    fresh.data.iter().filter(|row| !row.is_empty()).all(|row| {
        previous
            .row(&row[0])
            .is_some_and(|stored| fixed(stored) == fixed(row))
    })
}

fn fixed(row: &[String]) -> Vec<&str> {
    (0..FIXED_WIDTH)
        .map(|column| row.get(column).map(String::as_str).unwrap_or(""))
        .collect()
}
