use std::collections::BTreeMap;
use std::path::Path;

use curator_tree::{Classification, DatasetPath, RenameNotice, TreeError, TreeStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::merge::merge;
use crate::synthesize::{FilenameColumn, ManifestSynthesizer};
use crate::table::Manifest;

/// Stored manifests keyed by classification.  
/// 各分類的清單。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestStore {
    manifests: BTreeMap<Classification, Manifest>,
}

impl ManifestStore {
    /// Creates an empty store.  
    /// 建立空的清單存放區。
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the manifest of `classification`, if any.  
    /// 取得指定分類的清單。
    pub fn get(&self, classification: Classification) -> Option<&Manifest> {
        self.manifests.get(&classification)
    }

    pub fn get_mut(&mut self, classification: Classification) -> Option<&mut Manifest> {
        self.manifests.get_mut(&classification)
    }

    /// Stores `manifest` for `classification`, replacing any previous one.  
    /// 儲存指定分類的清單（覆寫舊的）。
    pub fn insert(&mut self, classification: Classification, manifest: Manifest) {
        self.manifests.insert(classification, manifest);
    }

    /// Forgets the manifest of `classification`.  
    /// 移除指定分類的清單。
    pub fn remove(&mut self, classification: Classification) -> Option<Manifest> {
        self.manifests.remove(&classification)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Classification, &Manifest)> {
        self.manifests.iter().map(|(c, m)| (*c, m))
    }

    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty()
    }

    /// Regenerates every classification's manifest and merges it
    /// with the stored one.  
    /// 重新產生所有清單。
    ///
    /// A classification whose folder is gone loses its manifest. One that only
    /// has no eligible file keeps its header with no rows, so user columns
    /// come back with the files. Returns the classifications that have a
    /// manifest afterwards.
    pub fn regenerate<F>(
        &mut self,
        tree: &TreeStore,
        synthesizer: &ManifestSynthesizer,
        mut stamp: F,
    ) -> Result<Vec<Classification>, TreeError>
    where
        F: FnMut(&Path) -> Option<String>,
    {
        let mut regenerated = BTreeMap::new();
        for classification in tree.classifications() {
            let mut synthesis = synthesizer.synthesize(tree, classification)?;
            if synthesis.rows.is_empty() {
                if let Some(previous) = self.manifests.get(&classification) {
                    debug!(%classification, "no files; header kept");
                    regenerated.insert(classification, Manifest::new(previous.headers.clone()));
                }
                continue;
            }
            synthesis.fill_timestamps(&mut stamp);
            let merged = merge(&synthesis.to_manifest(), self.manifests.get(&classification));
            regenerated.insert(classification, merged);
        }
        self.manifests = regenerated;
        let present: Vec<Classification> = self.manifests.keys().copied().collect();
        info!(manifests = present.len(), "manifests regenerated");
        Ok(present)
    }

    /// Re-keys rows after a file rename so their user columns follow the file.
    ///
    /// `tree` must already reflect the rename. Folder renames only matter in
    /// [`FilenameColumn::RelativePath`] mode, where every row below the folder
    /// is re-keyed.
    pub fn apply_rename(&mut self, tree: &TreeStore, notice: &RenameNotice, mode: FilenameColumn) {
        let Some(classification) = notice.from.top_level().and_then(Classification::from_name) else {
            return;
        };
        let Some(manifest) = self.manifests.get_mut(&classification) else {
            return;
        };
        let Ok(node) = tree.resolve(&notice.to) else {
            return;
        };
        let base = DatasetPath::from_segments([classification.as_str()]);
        let (Some(from), Some(to)) = (notice.from.strip_prefix(&base), notice.to.strip_prefix(&base))
        else {
            return;
        };
        let mut rekeyed = 0;
        match (mode, node.is_leaf()) {
            (FilenameColumn::LeafName, true) => {
                // Rows follow walk order, so same-named files are told apart by
                // their position among each other.
                let nth = tree
                    .walk(&base)
                    .map(|walk| {
                        walk.filter(|(path, node)| {
                            node.is_leaf() && (node.name() == notice.old_name() || *path == notice.to)
                        })
                        .position(|(path, _)| path == notice.to)
                        .unwrap_or(0)
                    })
                    .unwrap_or(0);
                rekeyed += usize::from(manifest.rename_nth_row(
                    notice.old_name(),
                    notice.new_name(),
                    nth,
                ));
            }
            (FilenameColumn::LeafName, false) => {}
            (FilenameColumn::RelativePath, _) => {
                let (from, to) = (from.to_string(), to.to_string());
                for row in &mut manifest.data {
                    let Some(first) = row.first_mut() else {
                        continue;
                    };
                    if *first == from {
                        *first = to.clone();
                        rekeyed += 1;
                    } else if let Some(rest) = first.strip_prefix(&format!("{from}/")) {
                        *first = format!("{to}/{rest}");
                        rekeyed += 1;
                    }
                }
            }
        }
        debug!(from = %notice.from, to = %notice.to, rekeyed, "manifest rows re-keyed");
    }
}
