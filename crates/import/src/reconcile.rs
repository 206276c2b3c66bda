//! Batch import reconciliation.
//!
//! [`ImportReconciler::plan`] is pure: it surveys a batch against the
//! destination and either asks for the decisions it still needs or returns an
//! [`ImportPlan`]. Nothing reaches the tree until [`ImportPlan::apply`], which
//! runs every step on a scratch copy and commits only when all of them succeed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use curator_tree::sanitize::{self, SanitizeMode};
use curator_tree::{DatasetPath, TreeError, TreeStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entry::ExternalEntry;
use crate::ImportError;

/// Leading character that marks a hidden file.
pub const HIDDEN_MARKER: char = '.';

/// Operating-system clutter that is never imported.
pub const BANNED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db", "desktop.ini"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IrregularNameAction {
    Replace,
    Strip,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HiddenFileAction {
    /// Drop the leading marker and import under the visible name.
    StripMarker,
    KeepName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateAction {
    SkipAll,
    ReplaceAll,
    /// Import under the first free `name (n)`.
    KeepBoth,
    Cancel,
}

/// Batch-wide answers to the decision points.  
/// 每批匯入的使用者決定。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecisions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irregular_names: Option<IrregularNameAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_files: Option<HiddenFileAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_files: Option<DuplicateAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_folders: Option<DuplicateAction>,
}

impl ImportDecisions {
    /// Fills unanswered points from `defaults`.
    pub fn or(self, defaults: ImportDecisions) -> ImportDecisions {
        ImportDecisions {
            irregular_names: self.irregular_names.or(defaults.irregular_names),
            hidden_files: self.hidden_files.or(defaults.hidden_files),
            duplicate_files: self.duplicate_files.or(defaults.duplicate_files),
            duplicate_folders: self.duplicate_folders.or(defaults.duplicate_folders),
        }
    }
}

/// A question the caller must answer once for the whole batch.
///
/// Each variant lists the affected names, relative to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionPoint {
    IrregularNames(Vec<String>),
    HiddenFiles(Vec<String>),
    DuplicateFiles(Vec<String>),
    DuplicateFolders(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImportVerdict {
    NeedsDecisions(Vec<DecisionPoint>),
    Cancelled,
    Ready(ImportPlan),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Banned,
    Duplicate,
    /// A later same-named entry in the batch replaced this one.
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntry {
    pub name: String,
    pub source: PathBuf,
    pub reason: SkipReason,
}

/// An entry that landed in the tree under a different name than on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedEntry {
    pub original: String,
    pub path: DatasetPath,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Top-level entries created in the destination.
    pub imported: Vec<DatasetPath>,
    /// Top-level entries that replaced an existing node.
    pub replaced: Vec<DatasetPath>,
    pub renamed: Vec<RenamedEntry>,
    pub skipped: Vec<SkippedEntry>,
    /// Entries already present with the same source; left alone.
    pub unchanged: usize,
    /// Files written, descendants of imported folders included.
    pub files: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedEntry {
    name: String,
    original: String,
    source: PathBuf,
    children: Option<Vec<PlannedEntry>>,
}

impl PlannedEntry {
    fn is_directory(&self) -> bool {
        self.children.is_some()
    }

    fn is_renamed(&self) -> bool {
        self.name != self.original
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Create,
    Replace,
}

#[derive(Debug, Clone, PartialEq)]
struct PlannedStep {
    entry: PlannedEntry,
    placement: Placement,
}

/// Fully decided import, ready to run against the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportPlan {
    destination: DatasetPath,
    steps: Vec<PlannedStep>,
    skipped: Vec<SkippedEntry>,
    unchanged: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fate {
    Accept,
    Unchanged,
    /// Clashes with a node already in the destination.
    ClashesWithTree,
    /// Clashes with an earlier entry of the same batch.
    ClashesWithBatch,
}

/// Plans batch imports into a destination folder.  
/// 匯入協調器。
#[derive(Debug, Clone)]
pub struct ImportReconciler {
    banned: BTreeSet<String>,
}

impl Default for ImportReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportReconciler {
    pub fn new() -> Self {
        Self::with_banned_names(BANNED_NAMES.iter().copied())
    }

    pub fn with_banned_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            banned: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_banned(&self, name: &str) -> bool {
        self.banned.contains(name)
    }

    /// Surveys `entries` against `destination` without touching the tree.  
    /// 規劃匯入。
    pub fn plan(
        &self,
        tree: &TreeStore,
        destination: &DatasetPath,
        entries: &[ExternalEntry],
        decisions: &ImportDecisions,
    ) -> Result<ImportVerdict, ImportError> {
        if destination.is_root() {
            return Err(ImportError::RootDestination);
        }
        let target = tree.resolve(destination)?;
        let existing = target
            .children()
            .ok_or_else(|| ImportError::NotAContainer(destination.clone()))?;

        let mut plan = ImportPlan::empty(destination.clone());
        if entries.is_empty() {
            debug!(destination = %destination, "empty import batch");
            return Ok(ImportVerdict::Ready(plan));
        }

        // Stage one: name transforms, independent of the tree.
        let mut survey = Survey::default();
        let mut candidates = Vec::new();
        for entry in entries {
            match entry {
                ExternalEntry::File { name, source } if self.is_banned(name) => {
                    plan.skipped.push(SkippedEntry {
                        name: name.clone(),
                        source: source.clone(),
                        reason: SkipReason::Banned,
                    });
                }
                ExternalEntry::File { name, .. } => {
                    if is_hidden(name) {
                        survey.hidden.push(name.clone());
                    }
                    candidates.push(entry);
                }
                ExternalEntry::Directory { .. } => {
                    self.survey_directory(entry, "", &mut survey, &mut plan.skipped);
                    candidates.push(entry);
                }
            }
        }

        let mut points = Vec::new();
        let mode = match (survey.irregular.is_empty(), decisions.irregular_names) {
            (true, _) => None,
            (false, None) => {
                points.push(DecisionPoint::IrregularNames(survey.irregular));
                None
            }
            (false, Some(IrregularNameAction::Cancel)) => return Ok(cancelled(destination)),
            (false, Some(IrregularNameAction::Replace)) => Some(SanitizeMode::Replace),
            (false, Some(IrregularNameAction::Strip)) => Some(SanitizeMode::Strip),
        };
        let hidden = match (survey.hidden.is_empty(), decisions.hidden_files) {
            (true, _) => HiddenFileAction::KeepName,
            (false, None) => {
                points.push(DecisionPoint::HiddenFiles(survey.hidden));
                HiddenFileAction::KeepName
            }
            (false, Some(action)) => action,
        };
        if !points.is_empty() {
            return Ok(needs(destination, points));
        }

        let prepared: Vec<PlannedEntry> = candidates
            .into_iter()
            .map(|entry| self.prepare(entry, mode, hidden, true))
            .collect();

        // Stage two: duplicates, judged on final names.
        let mut batch: BTreeMap<&str, (&Path, bool)> = BTreeMap::new();
        let mut fates = Vec::with_capacity(prepared.len());
        let mut file_clashes = Vec::new();
        let mut folder_clashes = Vec::new();
        for entry in &prepared {
            let fate = if let Some(node) = existing.get(&entry.name) {
                let same_kind = node.is_container() == entry.is_directory();
                if same_kind
                    && !node.is_soft_deleted()
                    && node.source_path() == Some(entry.source.as_path())
                {
                    Fate::Unchanged
                } else {
                    Fate::ClashesWithTree
                }
            } else if let Some((source, is_directory)) = batch.get(entry.name.as_str()) {
                if *source == entry.source.as_path() && *is_directory == entry.is_directory() {
                    Fate::Unchanged
                } else {
                    Fate::ClashesWithBatch
                }
            } else {
                batch.insert(&entry.name, (entry.source.as_path(), entry.is_directory()));
                Fate::Accept
            };
            if matches!(fate, Fate::ClashesWithTree | Fate::ClashesWithBatch) {
                if entry.is_directory() {
                    folder_clashes.push(entry.name.clone());
                } else {
                    file_clashes.push(entry.name.clone());
                }
            }
            fates.push(fate);
        }

        let file_action = match settle(
            file_clashes,
            decisions.duplicate_files,
            DecisionPoint::DuplicateFiles,
            &mut points,
        ) {
            Some(action) => action,
            None => return Ok(cancelled(destination)),
        };
        let folder_action = match settle(
            folder_clashes,
            decisions.duplicate_folders,
            DecisionPoint::DuplicateFolders,
            &mut points,
        ) {
            Some(action) => action,
            None => return Ok(cancelled(destination)),
        };
        if !points.is_empty() {
            return Ok(needs(destination, points));
        }

        let mut taken: BTreeSet<String> = existing.keys().cloned().collect();
        taken.extend(prepared.iter().map(|entry| entry.name.clone()));
        let mut placed: BTreeMap<String, usize> = BTreeMap::new();
        for (mut entry, fate) in prepared.into_iter().zip(fates) {
            let action = if entry.is_directory() {
                folder_action
            } else {
                file_action
            };
            match (fate, action) {
                (Fate::Unchanged, _) => plan.unchanged += 1,
                (Fate::Accept, _) => {
                    placed.insert(entry.name.clone(), plan.steps.len());
                    plan.steps.push(PlannedStep {
                        entry,
                        placement: Placement::Create,
                    });
                }
                (_, DuplicateAction::SkipAll) => plan.skipped.push(SkippedEntry {
                    name: entry.name,
                    source: entry.source,
                    reason: SkipReason::Duplicate,
                }),
                (_, DuplicateAction::KeepBoth) => {
                    entry.name = keep_both_name(&entry.name, !entry.is_directory(), &taken);
                    taken.insert(entry.name.clone());
                    plan.steps.push(PlannedStep {
                        entry,
                        placement: Placement::Create,
                    });
                }
                (Fate::ClashesWithTree, DuplicateAction::ReplaceAll) => {
                    match placed.get(&entry.name) {
                        Some(&index) => supersede(&mut plan, index, entry),
                        None => {
                            placed.insert(entry.name.clone(), plan.steps.len());
                            plan.steps.push(PlannedStep {
                                entry,
                                placement: Placement::Replace,
                            });
                        }
                    }
                }
                (_, DuplicateAction::ReplaceAll) => match placed.get(&entry.name) {
                    Some(&index) => supersede(&mut plan, index, entry),
                    None => plan.steps.push(PlannedStep {
                        entry,
                        placement: Placement::Create,
                    }),
                },
                (_, DuplicateAction::Cancel) => return Ok(cancelled(destination)),
            }
        }

        debug!(
            destination = %destination,
            steps = plan.steps.len(),
            skipped = plan.skipped.len(),
            unchanged = plan.unchanged,
            "import planned"
        );
        Ok(ImportVerdict::Ready(plan))
    }

    fn survey_directory(
        &self,
        entry: &ExternalEntry,
        prefix: &str,
        survey: &mut Survey,
        skipped: &mut Vec<SkippedEntry>,
    ) {
        let display = display_name(prefix, entry.name());
        if sanitize::is_irregular(entry.name()) {
            survey.irregular.push(display.clone());
        }
        for child in entry.children() {
            match child {
                ExternalEntry::File { name, source } if self.is_banned(name) => {
                    skipped.push(SkippedEntry {
                        name: display_name(&display, name),
                        source: source.clone(),
                        reason: SkipReason::Banned,
                    });
                }
                ExternalEntry::File { name, .. } => {
                    let child_display = display_name(&display, name);
                    if sanitize::is_irregular(name) {
                        survey.irregular.push(child_display.clone());
                    }
                    if is_hidden(name) {
                        survey.hidden.push(child_display);
                    }
                }
                ExternalEntry::Directory { .. } => {
                    self.survey_directory(child, &display, survey, skipped);
                }
            }
        }
    }

    /// Applies stage-one transforms. Top-level files keep their characters;
    /// everything inside a directory, and the directory itself, is sanitized.
    fn prepare(
        &self,
        entry: &ExternalEntry,
        mode: Option<SanitizeMode>,
        hidden: HiddenFileAction,
        top_level: bool,
    ) -> PlannedEntry {
        let original = entry.name().to_string();
        match entry {
            ExternalEntry::File { source, .. } => {
                let mut name = match mode {
                    Some(mode) if !top_level => sanitize::sanitize(&original, mode).into_owned(),
                    _ => original.clone(),
                };
                if hidden == HiddenFileAction::StripMarker {
                    if let Some(visible) = name.strip_prefix(HIDDEN_MARKER) {
                        if !visible.is_empty() {
                            name = visible.to_string();
                        }
                    }
                }
                PlannedEntry {
                    name,
                    original,
                    source: source.clone(),
                    children: None,
                }
            }
            ExternalEntry::Directory {
                source, children, ..
            } => {
                let name = match mode {
                    Some(mode) => sanitize::sanitize(&original, mode).into_owned(),
                    None => original.clone(),
                };
                let mut planned: Vec<PlannedEntry> = children
                    .iter()
                    .filter(|child| child.is_directory() || !self.is_banned(child.name()))
                    .map(|child| self.prepare(child, mode, hidden, false))
                    .collect();
                separate_collisions(&mut planned);
                PlannedEntry {
                    name,
                    original,
                    source: source.clone(),
                    children: Some(planned),
                }
            }
        }
    }
}

impl ImportPlan {
    fn empty(destination: DatasetPath) -> Self {
        Self {
            destination,
            steps: Vec::new(),
            skipped: Vec::new(),
            unchanged: 0,
        }
    }

    pub fn destination(&self) -> &DatasetPath {
        &self.destination
    }

    /// Whether applying the plan would change the tree.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedEntry] {
        &self.skipped
    }

    /// Runs the plan; on failure `tree` is left untouched.  
    /// 套用匯入計畫。
    pub fn apply(self, tree: &mut TreeStore) -> Result<ImportReport, ImportError> {
        let mut scratch = tree.clone();
        let mut report = ImportReport {
            skipped: self.skipped,
            unchanged: self.unchanged,
            ..ImportReport::default()
        };
        for step in &self.steps {
            match step.placement {
                Placement::Create => {
                    let path = place(&mut scratch, &self.destination, &step.entry, &mut report)?;
                    report.imported.push(path);
                }
                Placement::Replace => {
                    let path =
                        replace(&mut scratch, &self.destination, &step.entry, &mut report)?;
                    report.replaced.push(path);
                }
            }
        }
        *tree = scratch;
        info!(
            destination = %self.destination,
            imported = report.imported.len(),
            replaced = report.replaced.len(),
            renamed = report.renamed.len(),
            skipped = report.skipped.len(),
            files = report.files,
            "import applied"
        );
        Ok(report)
    }
}

#[derive(Debug, Default)]
struct Survey {
    irregular: Vec<String>,
    hidden: Vec<String>,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with(HIDDEN_MARKER)
}

fn display_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

fn needs(destination: &DatasetPath, points: Vec<DecisionPoint>) -> ImportVerdict {
    debug!(destination = %destination, points = points.len(), "import needs decisions");
    ImportVerdict::NeedsDecisions(points)
}

fn cancelled(destination: &DatasetPath) -> ImportVerdict {
    info!(destination = %destination, "import cancelled");
    ImportVerdict::Cancelled
}

/// `None` means the batch was cancelled.
fn settle(
    clashes: Vec<String>,
    decision: Option<DuplicateAction>,
    point: fn(Vec<String>) -> DecisionPoint,
    points: &mut Vec<DecisionPoint>,
) -> Option<DuplicateAction> {
    match decision {
        _ if clashes.is_empty() => Some(DuplicateAction::SkipAll),
        Some(DuplicateAction::Cancel) => None,
        Some(action) => Some(action),
        None => {
            points.push(point(clashes));
            Some(DuplicateAction::SkipAll)
        }
    }
}

fn supersede(plan: &mut ImportPlan, index: usize, entry: PlannedEntry) {
    let step = &mut plan.steps[index];
    let previous = std::mem::replace(&mut step.entry, entry);
    plan.skipped.push(SkippedEntry {
        name: previous.name,
        source: previous.source,
        reason: SkipReason::Superseded,
    });
}

/// Gives later siblings that collide after sanitization a keep-both name.
fn separate_collisions(children: &mut [PlannedEntry]) {
    let mut taken: BTreeSet<String> = children.iter().map(|child| child.name.clone()).collect();
    let mut seen = BTreeSet::new();
    for child in children.iter_mut() {
        if seen.insert(child.name.clone()) {
            continue;
        }
        let fresh = keep_both_name(&child.name, !child.is_directory(), &taken);
        debug!(from = %child.name, to = %fresh, "sibling collision after renaming");
        taken.insert(fresh.clone());
        seen.insert(fresh.clone());
        child.name = fresh;
    }
}

/// First `name (n)` with n ≥ 2 not in `taken`; files keep their extension last.
fn keep_both_name(name: &str, is_file: bool, taken: &BTreeSet<String>) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(index) if is_file && index > 0 => name.split_at(index),
        _ => (name, ""),
    };
    (2..)
        .map(|n| format!("{stem} ({n}){extension}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

fn place(
    tree: &mut TreeStore,
    parent: &DatasetPath,
    entry: &PlannedEntry,
    report: &mut ImportReport,
) -> Result<DatasetPath, TreeError> {
    let source = entry.source.clone();
    let path = match (entry.is_directory(), entry.is_renamed()) {
        (false, false) => tree.import_leaf(parent, &entry.name, source)?,
        (false, true) => tree.import_renamed_leaf(parent, &entry.name, source)?,
        (true, false) => tree.import_container(parent, &entry.name, source)?,
        (true, true) => tree.import_renamed_container(parent, &entry.name, source)?,
    };
    note_rename(entry, &path, report);
    match &entry.children {
        None => report.files += 1,
        Some(children) => {
            for child in children {
                place(tree, &path, child, report)?;
            }
        }
    }
    Ok(path)
}

fn replace(
    tree: &mut TreeStore,
    parent: &DatasetPath,
    entry: &PlannedEntry,
    report: &mut ImportReport,
) -> Result<DatasetPath, TreeError> {
    let path = parent.join(entry.name.as_str());
    let current = tree.resolve(&path)?;
    match &entry.children {
        None if current.is_leaf() => {
            tree.replace_leaf_source(&path, entry.source.clone())?;
            note_rename(entry, &path, report);
            report.files += 1;
            Ok(path)
        }
        Some(children) if current.is_container() && current.provenance().is_remote() => {
            tree.replace_container_source(&path, entry.source.clone())?;
            note_rename(entry, &path, report);
            merge_children(tree, &path, children, report)?;
            Ok(path)
        }
        _ => {
            tree.soft_delete(&path)?;
            tree.purge(&path)?;
            place(tree, parent, entry, report)
        }
    }
}

/// Reconciles the children of a folder that now mirrors `children` on disk.
///
/// Remote children the batch no longer supplies stay in the tree marked
/// deleted so the upload removes them; other leftovers are dropped.
fn merge_children(
    tree: &mut TreeStore,
    path: &DatasetPath,
    children: &[PlannedEntry],
    report: &mut ImportReport,
) -> Result<(), TreeError> {
    let supplied: BTreeSet<&str> = children.iter().map(|child| child.name.as_str()).collect();
    let leftovers: Vec<(String, bool, bool)> = tree
        .resolve(path)?
        .children()
        .into_iter()
        .flatten()
        .filter(|(name, _)| !supplied.contains(name.as_str()))
        .map(|(name, node)| (name.clone(), node.provenance().is_remote(), node.is_soft_deleted()))
        .collect();
    for (name, remote, deleted) in leftovers {
        let stale = path.join(name.as_str());
        if !deleted {
            tree.soft_delete(&stale)?;
        }
        if !remote {
            tree.purge(&stale)?;
        }
    }
    for child in children {
        if tree.contains(&path.join(child.name.as_str())) {
            replace(tree, path, child, report)?;
        } else {
            place(tree, path, child, report)?;
        }
    }
    Ok(())
}

fn note_rename(entry: &PlannedEntry, path: &DatasetPath, report: &mut ImportReport) {
    if entry.is_renamed() {
        report.renamed.push(RenamedEntry {
            original: entry.original.clone(),
            path: path.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_tree::{LeafMetadata, LifecycleTag, LifecycleTags, Provenance};

    fn p(text: &str) -> DatasetPath {
        DatasetPath::parse(text)
    }

    fn tree_with_primary() -> TreeStore {
        let mut tree = TreeStore::new();
        tree.create_container(&DatasetPath::root(), "primary").unwrap();
        tree
    }

    fn ready(verdict: ImportVerdict) -> ImportPlan {
        match verdict {
            ImportVerdict::Ready(plan) => plan,
            other => panic!("expected a ready plan, got {other:?}"),
        }
    }

    #[test]
    fn same_named_files_raise_one_duplicate_decision() {
        let tree = tree_with_primary();
        let batch = vec![
            ExternalEntry::file("data.txt", "/a/data.txt"),
            ExternalEntry::file("data.txt", "/b/data.txt"),
        ];
        let reconciler = ImportReconciler::new();

        let verdict = reconciler
            .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
            .unwrap();
        assert_eq!(
            verdict,
            ImportVerdict::NeedsDecisions(vec![DecisionPoint::DuplicateFiles(vec![
                "data.txt".to_string()
            ])])
        );

        let decisions = ImportDecisions {
            duplicate_files: Some(DuplicateAction::KeepBoth),
            ..ImportDecisions::default()
        };
        let mut tree = tree;
        let plan = ready(reconciler.plan(&tree, &p("primary"), &batch, &decisions).unwrap());
        let report = plan.apply(&mut tree).unwrap();

        assert_eq!(report.imported, vec![p("primary/data.txt"), p("primary/data (2).txt")]);
        assert_eq!(
            tree.resolve(&p("primary/data (2).txt")).unwrap().source_path(),
            Some(Path::new("/b/data.txt"))
        );
    }

    #[test]
    fn empty_batch_is_a_successful_noop() {
        let mut tree = tree_with_primary();
        let before = tree.clone();
        let plan = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &[], &ImportDecisions::default())
                .unwrap(),
        );
        assert!(plan.is_noop());
        let report = plan.apply(&mut tree).unwrap();
        assert_eq!(report, ImportReport::default());
        assert_eq!(tree, before);
    }

    #[test]
    fn banned_only_batch_reports_skips() {
        let mut tree = tree_with_primary();
        let batch = vec![
            ExternalEntry::file(".DS_Store", "/in/.DS_Store"),
            ExternalEntry::file("Thumbs.db", "/in/Thumbs.db"),
        ];
        let plan = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
                .unwrap(),
        );
        let report = plan.apply(&mut tree).unwrap();
        assert!(report.imported.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert!(report
            .skipped
            .iter()
            .all(|entry| entry.reason == SkipReason::Banned));
        assert!(tree.resolve(&p("primary")).unwrap().children().unwrap().is_empty());
    }

    #[test]
    fn identical_reimport_is_silent() {
        let mut tree = tree_with_primary();
        tree.import_leaf(&p("primary"), "a.csv", "/in/a.csv").unwrap();
        let before = tree.clone();

        let batch = vec![ExternalEntry::file("a.csv", "/in/a.csv")];
        let plan = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
                .unwrap(),
        );
        let report = plan.apply(&mut tree).unwrap();
        assert_eq!(report.unchanged, 1);
        assert_eq!(tree, before);
    }

    #[test]
    fn irregular_directory_names_wait_for_one_decision() {
        let mut tree = tree_with_primary();
        let batch = vec![ExternalEntry::directory(
            "run:1",
            "/in/run:1",
            vec![
                ExternalEntry::file("a?.csv", "/in/run:1/a?.csv"),
                ExternalEntry::file("ok.csv", "/in/run:1/ok.csv"),
            ],
        )];
        let reconciler = ImportReconciler::new();

        let verdict = reconciler
            .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
            .unwrap();
        assert_eq!(
            verdict,
            ImportVerdict::NeedsDecisions(vec![DecisionPoint::IrregularNames(vec![
                "run:1".to_string(),
                "run:1/a?.csv".to_string(),
            ])])
        );

        let cancel = ImportDecisions {
            irregular_names: Some(IrregularNameAction::Cancel),
            ..ImportDecisions::default()
        };
        assert_eq!(
            reconciler.plan(&tree, &p("primary"), &batch, &cancel).unwrap(),
            ImportVerdict::Cancelled
        );

        let strip = ImportDecisions {
            irregular_names: Some(IrregularNameAction::Strip),
            ..ImportDecisions::default()
        };
        let report = ready(reconciler.plan(&tree, &p("primary"), &batch, &strip).unwrap())
            .apply(&mut tree)
            .unwrap();
        assert_eq!(report.files, 2);
        assert!(tree.contains(&p("primary/run1/a.csv")));
        assert!(tree.contains(&p("primary/run1/ok.csv")));
        let folder = tree.resolve(&p("primary/run1")).unwrap();
        assert_eq!(
            folder.tags(),
            &LifecycleTags::of(&[LifecycleTag::New, LifecycleTag::Renamed])
        );
        assert_eq!(report.renamed.len(), 2);
    }

    #[test]
    fn sanitization_collisions_inside_a_directory_get_suffixes() {
        let mut tree = tree_with_primary();
        let batch = vec![ExternalEntry::directory(
            "raw",
            "/in/raw",
            vec![
                ExternalEntry::file("a-b.txt", "/in/raw/a-b.txt"),
                ExternalEntry::file("a:b.txt", "/in/raw/a:b.txt"),
            ],
        )];
        let decisions = ImportDecisions {
            irregular_names: Some(IrregularNameAction::Replace),
            ..ImportDecisions::default()
        };
        let report = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &decisions)
                .unwrap(),
        )
        .apply(&mut tree)
        .unwrap();

        assert_eq!(
            tree.resolve(&p("primary/raw/a-b (2).txt")).unwrap().source_path(),
            Some(Path::new("/in/raw/a:b.txt"))
        );
        assert_eq!(
            report.renamed,
            vec![RenamedEntry {
                original: "a:b.txt".to_string(),
                path: p("primary/raw/a-b (2).txt"),
            }]
        );
    }

    #[test]
    fn hidden_files_follow_the_batch_choice() {
        let mut tree = tree_with_primary();
        let batch = vec![ExternalEntry::file(".env.json", "/in/.env.json")];
        let reconciler = ImportReconciler::new();
        assert_eq!(
            reconciler
                .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
                .unwrap(),
            ImportVerdict::NeedsDecisions(vec![DecisionPoint::HiddenFiles(vec![
                ".env.json".to_string()
            ])])
        );

        let decisions = ImportDecisions {
            hidden_files: Some(HiddenFileAction::StripMarker),
            ..ImportDecisions::default()
        };
        ready(reconciler.plan(&tree, &p("primary"), &batch, &decisions).unwrap())
            .apply(&mut tree)
            .unwrap();
        assert!(tree.contains(&p("primary/env.json")));
    }

    #[test]
    fn replace_all_over_remote_file_marks_it_updated() {
        let mut tree = tree_with_primary();
        tree.insert_remote_leaf(&p("primary"), "r.csv", None, LeafMetadata::default())
            .unwrap();
        let batch = vec![ExternalEntry::file("r.csv", "/in/r.csv")];
        let decisions = ImportDecisions {
            duplicate_files: Some(DuplicateAction::ReplaceAll),
            ..ImportDecisions::default()
        };
        let report = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &decisions)
                .unwrap(),
        )
        .apply(&mut tree)
        .unwrap();

        assert_eq!(report.replaced, vec![p("primary/r.csv")]);
        let node = tree.resolve(&p("primary/r.csv")).unwrap();
        assert_eq!(node.provenance(), &Provenance::Local(PathBuf::from("/in/r.csv")));
        assert_eq!(
            node.tags(),
            &LifecycleTags::of(&[LifecycleTag::Existing, LifecycleTag::Updated])
        );
    }

    #[test]
    fn replace_all_over_remote_folder_keeps_its_identity() {
        let mut tree = tree_with_primary();
        tree.insert_remote_container(&p("primary"), "sub-1", Some("N:collection:1".into()))
            .unwrap();
        tree.insert_remote_leaf(
            &p("primary/sub-1"),
            "old.csv",
            Some("N:package:1".into()),
            LeafMetadata::default(),
        )
        .unwrap();
        tree.insert_remote_leaf(
            &p("primary/sub-1"),
            "kept.csv",
            Some("N:package:2".into()),
            LeafMetadata::default(),
        )
        .unwrap();
        let batch = vec![ExternalEntry::directory(
            "sub-1",
            "/in/sub-1",
            vec![
                ExternalEntry::file("kept.csv", "/in/sub-1/kept.csv"),
                ExternalEntry::file("new.csv", "/in/sub-1/new.csv"),
            ],
        )];
        let decisions = ImportDecisions {
            duplicate_folders: Some(DuplicateAction::ReplaceAll),
            ..ImportDecisions::default()
        };
        let report = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &decisions)
                .unwrap(),
        )
        .apply(&mut tree)
        .unwrap();

        assert_eq!(report.replaced, vec![p("primary/sub-1")]);
        assert_eq!(report.files, 2);
        let existing_updated = LifecycleTags::of(&[LifecycleTag::Existing, LifecycleTag::Updated]);
        let folder = tree.resolve(&p("primary/sub-1")).unwrap();
        assert_eq!(folder.provenance(), &Provenance::Local(PathBuf::from("/in/sub-1")));
        assert_eq!(folder.tags(), &existing_updated);
        assert_eq!(
            tree.resolve(&p("primary/sub-1/kept.csv")).unwrap().tags(),
            &existing_updated
        );
        assert_eq!(
            tree.resolve(&p("primary/sub-1/new.csv")).unwrap().tags(),
            &LifecycleTags::of(&[LifecycleTag::New])
        );

        // The remote file the batch no longer carries is kept, marked deleted.
        let old = tree.resolve(&p("primary/sub-1/old.csv")).unwrap();
        assert_eq!(old.provenance().remote_id(), Some("N:package:1"));
        assert!(old.has_tag(LifecycleTag::Deleted));
        assert!(old.has_tag(LifecycleTag::Existing));
    }

    #[test]
    fn duplicate_folders_have_their_own_decision() {
        let mut tree = tree_with_primary();
        tree.create_container(&p("primary"), "sub-1").unwrap();
        let batch = vec![
            ExternalEntry::directory("sub-1", "/in/sub-1", Vec::new()),
            ExternalEntry::file("a.csv", "/in/a.csv"),
        ];
        let reconciler = ImportReconciler::new();
        assert_eq!(
            reconciler
                .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
                .unwrap(),
            ImportVerdict::NeedsDecisions(vec![DecisionPoint::DuplicateFolders(vec![
                "sub-1".to_string()
            ])])
        );

        let decisions = ImportDecisions {
            duplicate_folders: Some(DuplicateAction::SkipAll),
            ..ImportDecisions::default()
        };
        let report = ready(reconciler.plan(&tree, &p("primary"), &batch, &decisions).unwrap())
            .apply(&mut tree)
            .unwrap();
        assert_eq!(report.imported, vec![p("primary/a.csv")]);
        assert_eq!(report.skipped[0].reason, SkipReason::Duplicate);
    }

    #[test]
    fn root_destination_is_rejected() {
        let tree = tree_with_primary();
        let err = ImportReconciler::new()
            .plan(
                &tree,
                &DatasetPath::root(),
                &[ExternalEntry::file("a.csv", "/in/a.csv")],
                &ImportDecisions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ImportError::RootDestination));
    }

    #[test]
    fn failed_apply_leaves_tree_untouched() {
        let mut tree = tree_with_primary();
        let batch = vec![
            ExternalEntry::file("a.csv", "/in/a.csv"),
            ExternalEntry::file("b.csv", "/in/b.csv"),
        ];
        let plan = ready(
            ImportReconciler::new()
                .plan(&tree, &p("primary"), &batch, &ImportDecisions::default())
                .unwrap(),
        );
        // The tree changes between planning and applying.
        tree.import_leaf(&p("primary"), "b.csv", "/elsewhere/b.csv").unwrap();
        let before = tree.clone();

        let err = plan.apply(&mut tree).unwrap_err();
        assert!(matches!(err, ImportError::Tree(TreeError::DuplicateName { .. })));
        assert_eq!(tree, before);
    }

    #[test]
    fn keep_both_name_skips_taken_suffixes() {
        let taken: BTreeSet<String> = ["data.txt", "data (2).txt"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(keep_both_name("data.txt", true, &taken), "data (3).txt");
        assert_eq!(keep_both_name("v1.0", false, &taken), "v1.0 (2)");
        assert_eq!(keep_both_name(".env", true, &taken), ".env (2)");
    }
}
