//! Projection of the subject registry onto classification folders.
//!
//! Layout under a data classification:
//! `<classification>/[<pool>/]<subject>/<sample>`.
//! Every public operation works on copies of the tree and the registry and
//! writes both back only when it succeeds.

use curator_tree::{Classification, DatasetPath, RenameNotice, TreeError, TreeStore};
use tracing::{debug, info};

use crate::registry::SubjectRegistry;
use crate::ProjectionError;

/// Which projections a prune pass looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Subjects,
    Samples,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// Empty projections awaiting one yes/no answer; nothing was removed.
    Pending(Vec<DatasetPath>),
    Deleted(Vec<DatasetPath>),
}

/// Result of [`StructureProjector::delete_pool`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolRemoval {
    /// Pool folders removed from the tree.
    pub removed: Vec<DatasetPath>,
    /// Member subject folders moved up to their classification.
    pub relocated: Vec<RenameNotice>,
}

impl PruneOutcome {
    pub fn paths(&self) -> &[DatasetPath] {
        match self {
            PruneOutcome::Pending(paths) | PruneOutcome::Deleted(paths) => paths,
        }
    }
}

/// Keeps subject, sample and pool folders in step with the registry.  
/// 結構投影器。
pub struct StructureProjector<'a> {
    tree: &'a mut TreeStore,
    registry: &'a mut SubjectRegistry,
}

impl<'a> StructureProjector<'a> {
    pub fn new(tree: &'a mut TreeStore, registry: &'a mut SubjectRegistry) -> Self {
        Self { tree, registry }
    }

    /// Creates the missing part of `classification/[pool/]subject`.  
    /// 確保受試者資料夾存在。
    pub fn ensure_subject_container(
        &mut self,
        classification: Classification,
        pool: Option<&str>,
        subject: &str,
    ) -> Result<DatasetPath, ProjectionError> {
        self.transact(|tree, registry| {
            let record = registry.require_subject(subject)?;
            if record.pool.as_deref() != pool {
                return Err(ProjectionError::PoolMismatch {
                    subject: subject.to_string(),
                    expected: record.pool.clone(),
                });
            }
            ensure_subject(tree, registry, classification, subject)
        })
    }

    pub fn ensure_sample_container(
        &mut self,
        classification: Classification,
        subject: &str,
        sample: &str,
    ) -> Result<DatasetPath, ProjectionError> {
        self.transact(|tree, registry| {
            registry.require_sample(subject, sample)?;
            let parent = ensure_subject(tree, registry, classification, subject)?;
            ensure_container(tree, &parent, sample)
        })
    }

    /// Ensures a folder for every subject and sample under `classification`.  
    /// 投影整個登錄表。
    pub fn project(
        &mut self,
        classification: Classification,
    ) -> Result<Vec<DatasetPath>, ProjectionError> {
        let ensured = self.transact(|tree, registry| {
            let mut ensured = Vec::new();
            for (subject, record) in registry.subjects() {
                let subject_path = ensure_subject(tree, registry, classification, subject)?;
                for sample in record.samples.keys() {
                    ensured.push(ensure_container(tree, &subject_path, sample)?);
                }
                ensured.push(subject_path);
            }
            Ok(ensured)
        })?;
        info!(%classification, folders = ensured.len(), "registry projected");
        Ok(ensured)
    }

    pub fn rename_subject(
        &mut self,
        old: &str,
        new: &str,
    ) -> Result<Vec<RenameNotice>, ProjectionError> {
        if old == new {
            self.registry.require_subject(old)?;
            return Ok(Vec::new());
        }
        self.transact(|tree, registry| {
            let located = subject_locations(tree, registry, old)?;
            registry.rename_subject(old, new)?;
            rename_all(tree, &located, new)
        })
    }

    pub fn rename_pool(&mut self, old: &str, new: &str) -> Result<Vec<RenameNotice>, ProjectionError> {
        if old == new {
            self.registry.require_pool(old)?;
            return Ok(Vec::new());
        }
        self.transact(|tree, registry| {
            registry.require_pool(old)?;
            let located = existing_paths(tree, |classification| {
                DatasetPath::from_segments([classification.as_str(), old])
            });
            registry.rename_pool(old, new)?;
            rename_all(tree, &located, new)
        })
    }

    pub fn rename_sample(
        &mut self,
        subject: &str,
        old: &str,
        new: &str,
    ) -> Result<Vec<RenameNotice>, ProjectionError> {
        if old == new {
            self.registry.require_sample(subject, old)?;
            return Ok(Vec::new());
        }
        self.transact(|tree, registry| {
            let located: Vec<DatasetPath> = subject_locations(tree, registry, subject)?
                .into_iter()
                .map(|path| path.join(old))
                .filter(|path| tree.contains(path))
                .collect();
            registry.rename_sample(subject, old, new)?;
            rename_all(tree, &located, new)
        })
    }

    /// Regroups `subject` under `pool` wherever its folder exists.  
    /// 將受試者移入群組。
    ///
    /// Returns one old→new notice per relocated folder.
    pub fn move_subject_into_pool(
        &mut self,
        subject: &str,
        pool: &str,
    ) -> Result<Vec<RenameNotice>, ProjectionError> {
        self.transact(|tree, registry| {
            registry.require_pool(pool)?;
            let located = subject_locations(tree, registry, subject)?;
            if registry.require_subject(subject)?.pool.as_deref() == Some(pool) {
                return Ok(Vec::new());
            }
            let mut moved = Vec::new();
            for path in located {
                let Some(classification) = path.top_level().and_then(Classification::from_name)
                else {
                    continue;
                };
                let pool_path = ensure_container(tree, &classification_path(classification), pool)?;
                let to = tree.move_node(&path, &pool_path)?;
                moved.push(RenameNotice { from: path, to });
            }
            registry.subject_mut(subject)?.pool = Some(pool.to_string());
            debug!(subject, pool, "subject moved into pool");
            Ok(moved)
        })
    }

    pub fn move_subject_out_of_pool(
        &mut self,
        subject: &str,
        pool: &str,
    ) -> Result<Vec<RenameNotice>, ProjectionError> {
        self.transact(|tree, registry| {
            registry.require_pool(pool)?;
            if registry.require_subject(subject)?.pool.as_deref() != Some(pool) {
                return Err(ProjectionError::NotInPool {
                    subject: subject.to_string(),
                    pool: pool.to_string(),
                });
            }
            let mut moved = Vec::new();
            for path in subject_locations(tree, registry, subject)? {
                let Some(classification) = path.top_level().and_then(Classification::from_name)
                else {
                    continue;
                };
                let to = tree.move_node(&path, &classification_path(classification))?;
                moved.push(RenameNotice { from: path, to });
            }
            registry.subject_mut(subject)?.pool = None;
            debug!(subject, pool, "subject moved out of pool");
            Ok(moved)
        })
    }

    /// Removes the subject from the registry and its folders from the tree.  
    /// 刪除受試者。
    pub fn delete_subject(&mut self, subject: &str) -> Result<Vec<DatasetPath>, ProjectionError> {
        self.transact(|tree, registry| {
            let located = subject_locations(tree, registry, subject)?;
            registry.remove_subject(subject)?;
            remove_all(tree, &located)?;
            Ok(located)
        })
    }

    pub fn delete_sample(
        &mut self,
        subject: &str,
        sample: &str,
    ) -> Result<Vec<DatasetPath>, ProjectionError> {
        self.transact(|tree, registry| {
            registry.require_sample(subject, sample)?;
            let located: Vec<DatasetPath> = subject_locations(tree, registry, subject)?
                .into_iter()
                .map(|path| path.join(sample))
                .filter(|path| tree.contains(path))
                .collect();
            registry.remove_sample(subject, sample)?;
            remove_all(tree, &located)?;
            Ok(located)
        })
    }

    /// Deletes the pool; its subjects move up to the classification root.
    pub fn delete_pool(&mut self, pool: &str) -> Result<PoolRemoval, ProjectionError> {
        self.transact(|tree, registry| {
            registry.require_pool(pool)?;
            let members: Vec<String> = registry.members(pool).into_iter().map(String::from).collect();
            let pools = existing_paths(tree, |classification| {
                DatasetPath::from_segments([classification.as_str(), pool])
            });
            let mut relocated = Vec::new();
            for pool_path in &pools {
                let Some(root) = pool_path.parent() else {
                    continue;
                };
                for member in &members {
                    let member_path = pool_path.join(member.as_str());
                    if tree.contains(&member_path) {
                        let to = tree.move_node(&member_path, &root)?;
                        relocated.push(RenameNotice {
                            from: member_path,
                            to,
                        });
                    }
                }
            }
            registry.remove_pool(pool)?;
            remove_all(tree, &pools)?;
            debug!(pool, released = members.len(), "pool deleted");
            Ok(PoolRemoval {
                removed: pools,
                relocated,
            })
        })
    }

    /// Lists (or with `force_all`, deletes) empty subject or sample folders.  
    /// 清除空的投影資料夾。
    pub fn prune_empty_projections(
        &mut self,
        classification: Classification,
        kind: ProjectionKind,
        force_all: bool,
    ) -> Result<PruneOutcome, ProjectionError> {
        require_data(classification)?;
        let empty = self.empty_projections(classification, kind);
        if !force_all {
            return Ok(PruneOutcome::Pending(empty));
        }
        self.delete_empty_projections(&empty)?;
        Ok(PruneOutcome::Deleted(empty))
    }

    /// Deletes the listed projections, typically the confirmed answer to
    /// [`PruneOutcome::Pending`]. Paths that gained content meanwhile fail the batch.
    pub fn delete_empty_projections(&mut self, paths: &[DatasetPath]) -> Result<(), ProjectionError> {
        self.transact(|tree, _| {
            for path in paths {
                if tree.walk(path)?.next().is_some() {
                    return Err(ProjectionError::NotEmpty(path.clone()));
                }
            }
            remove_all(tree, paths)?;
            info!(count = paths.len(), "empty projections deleted");
            Ok(())
        })
    }

    fn empty_projections(&self, classification: Classification, kind: ProjectionKind) -> Vec<DatasetPath> {
        let mut empty = Vec::new();
        for (subject, record) in self.registry.subjects() {
            let subject_path = subject_path(classification, record.pool.as_deref(), subject);
            let candidates: Vec<DatasetPath> = match kind {
                ProjectionKind::Subjects => vec![subject_path],
                ProjectionKind::Samples => record
                    .samples
                    .keys()
                    .map(|sample| subject_path.join(sample.as_str()))
                    .collect(),
            };
            for path in candidates {
                if is_empty_container(self.tree, &path) {
                    empty.push(path);
                }
            }
        }
        empty
    }

    fn transact<T, F>(&mut self, op: F) -> Result<T, ProjectionError>
    where
        F: FnOnce(&mut TreeStore, &mut SubjectRegistry) -> Result<T, ProjectionError>,
    {
        let mut tree = self.tree.clone();
        let mut registry = self.registry.clone();
        let value = op(&mut tree, &mut registry)?;
        *self.tree = tree;
        *self.registry = registry;
        Ok(value)
    }
}

fn require_data(classification: Classification) -> Result<(), ProjectionError> {
    if classification.is_data() {
        Ok(())
    } else {
        Err(ProjectionError::NotDataClassification(classification))
    }
}

fn classification_path(classification: Classification) -> DatasetPath {
    DatasetPath::from_segments([classification.as_str()])
}

fn subject_path(classification: Classification, pool: Option<&str>, subject: &str) -> DatasetPath {
    let mut path = classification_path(classification);
    if let Some(pool) = pool {
        path.push(pool);
    }
    path.push(subject);
    path
}

fn ensure_subject(
    tree: &mut TreeStore,
    registry: &SubjectRegistry,
    classification: Classification,
    subject: &str,
) -> Result<DatasetPath, ProjectionError> {
    require_data(classification)?;
    let record = registry.require_subject(subject)?;
    let mut path = ensure_container(tree, &DatasetPath::root(), classification.as_str())?;
    if let Some(pool) = record.pool.as_deref() {
        path = ensure_container(tree, &path, pool)?;
    }
    ensure_container(tree, &path, subject)
}

/// Reuses (and restores) an existing folder, or creates it.
fn ensure_container(
    tree: &mut TreeStore,
    parent: &DatasetPath,
    name: &str,
) -> Result<DatasetPath, ProjectionError> {
    let path = parent.join(name);
    match tree.resolve(&path) {
        Ok(node) if node.is_container() => {
            if node.is_soft_deleted() {
                tree.restore(&path)?;
            }
            Ok(path)
        }
        Ok(_) => Err(TreeError::NotAContainer(path).into()),
        Err(_) => Ok(tree.create_container(parent, name)?),
    }
}

/// Paths of `subject`'s folder in every data classification where it exists.
fn subject_locations(
    tree: &TreeStore,
    registry: &SubjectRegistry,
    subject: &str,
) -> Result<Vec<DatasetPath>, ProjectionError> {
    let pool = registry.require_subject(subject)?.pool.clone();
    Ok(existing_paths(tree, |classification| {
        subject_path(classification, pool.as_deref(), subject)
    }))
}

fn existing_paths<F>(tree: &TreeStore, path_in: F) -> Vec<DatasetPath>
where
    F: Fn(Classification) -> DatasetPath,
{
    tree.classifications()
        .into_iter()
        .filter(Classification::is_data)
        .map(path_in)
        .filter(|path| tree.contains(path))
        .collect()
}

fn rename_all(
    tree: &mut TreeStore,
    paths: &[DatasetPath],
    new_name: &str,
) -> Result<Vec<RenameNotice>, ProjectionError> {
    let mut notices = Vec::new();
    for path in paths {
        if let Some(notice) = tree.rename(path, new_name)? {
            notices.push(notice);
        }
    }
    Ok(notices)
}

fn remove_all(tree: &mut TreeStore, paths: &[DatasetPath]) -> Result<(), ProjectionError> {
    for path in paths {
        tree.soft_delete(path)?;
        tree.purge(path)?;
    }
    Ok(())
}

fn is_empty_container(tree: &TreeStore, path: &DatasetPath) -> bool {
    match tree.resolve(path) {
        Ok(node) if node.is_container() && !tree.is_excluded(path) => tree
            .walk(path)
            .map(|mut walk| walk.next().is_none())
            .unwrap_or(false),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_tree::LifecycleTag;

    fn p(text: &str) -> DatasetPath {
        DatasetPath::parse(text)
    }

    fn fixture() -> (TreeStore, SubjectRegistry) {
        let mut tree = TreeStore::new();
        tree.select_classifications(&[Classification::Primary, Classification::Source]);
        let mut registry = SubjectRegistry::new();
        registry.add_pool("pool-1").unwrap();
        registry.add_subject("sub-1", None).unwrap();
        registry.add_sample("sub-1", "sam-1").unwrap();
        (tree, registry)
    }

    #[test]
    fn ensure_is_idempotent_and_keeps_contents() {
        let (mut tree, mut registry) = fixture();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        let path = projector
            .ensure_subject_container(Classification::Primary, None, "sub-1")
            .unwrap();
        assert_eq!(path, p("primary/sub-1"));
        projector.tree.import_leaf(&path, "a.csv", "/in/a.csv").unwrap();

        projector
            .ensure_subject_container(Classification::Primary, None, "sub-1")
            .unwrap();
        assert!(tree.contains(&p("primary/sub-1/a.csv")));
    }

    #[test]
    fn ensure_restores_soft_deleted_chain() {
        let (mut tree, mut registry) = fixture();
        StructureProjector::new(&mut tree, &mut registry)
            .ensure_sample_container(Classification::Primary, "sub-1", "sam-1")
            .unwrap();
        tree.soft_delete(&p("primary/sub-1")).unwrap();

        StructureProjector::new(&mut tree, &mut registry)
            .ensure_sample_container(Classification::Primary, "sub-1", "sam-1")
            .unwrap();
        let subject = tree.resolve(&p("primary/sub-1")).unwrap();
        assert!(!subject.has_tag(LifecycleTag::RecursivelyDeleted));
        assert!(tree.contains(&p("primary/sub-1/sam-1")));
    }

    #[test]
    fn ensure_rejects_wrong_pool_and_auxiliary_classifications() {
        let (mut tree, mut registry) = fixture();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        assert_eq!(
            projector.ensure_subject_container(Classification::Primary, Some("pool-1"), "sub-1"),
            Err(ProjectionError::PoolMismatch {
                subject: "sub-1".into(),
                expected: None,
            })
        );
        assert_eq!(
            projector.ensure_subject_container(Classification::Code, None, "sub-1"),
            Err(ProjectionError::NotDataClassification(Classification::Code))
        );
    }

    #[test]
    fn pool_moves_are_symmetric() {
        let (mut tree, mut registry) = fixture();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        projector.project(Classification::Source).unwrap();

        projector.move_subject_into_pool("sub-1", "pool-1").unwrap();
        assert!(projector.tree.contains(&p("primary/pool-1/sub-1/sam-1")));
        assert!(projector.tree.contains(&p("source/pool-1/sub-1")));
        assert!(!projector.tree.contains(&p("primary/sub-1")));

        let moved = projector.move_subject_out_of_pool("sub-1", "pool-1").unwrap();
        assert_eq!(moved[0].from, p("primary/pool-1/sub-1"));
        assert_eq!(moved[0].to, p("primary/sub-1"));
        assert!(tree.contains(&p("primary/sub-1/sam-1")));
        assert!(tree.contains(&p("source/sub-1/sam-1")));
        assert_eq!(registry.subject("sub-1").unwrap().pool, None);
    }

    #[test]
    fn failed_move_changes_nothing() {
        let (mut tree, mut registry) = fixture();
        StructureProjector::new(&mut tree, &mut registry)
            .project(Classification::Primary)
            .unwrap();
        StructureProjector::new(&mut tree, &mut registry)
            .project(Classification::Source)
            .unwrap();
        // A same-named folder already waits inside the source pool.
        tree.create_container(&p("source"), "pool-1").unwrap();
        tree.create_container(&p("source/pool-1"), "sub-1").unwrap();
        let (tree_before, registry_before) = (tree.clone(), registry.clone());

        let err = StructureProjector::new(&mut tree, &mut registry)
            .move_subject_into_pool("sub-1", "pool-1")
            .unwrap_err();
        assert!(matches!(err, ProjectionError::Tree(TreeError::DuplicateName { .. })));
        assert_eq!(tree, tree_before);
        assert_eq!(registry, registry_before);
    }

    #[test]
    fn rename_subject_moves_folders_and_reports_notices() {
        let (mut tree, mut registry) = fixture();
        registry.set_subject_metadata("sub-1", "species", "mouse").unwrap();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        projector.project(Classification::Source).unwrap();

        let notices = projector.rename_subject("sub-1", "sub-01").unwrap();
        assert_eq!(notices.len(), 2);
        assert_eq!(notices[0].from, p("primary/sub-1"));
        assert_eq!(notices[0].to, p("primary/sub-01"));
        assert!(tree.contains(&p("source/sub-01/sam-1")));
        assert_eq!(registry.subject("sub-01").unwrap().metadata["species"], "mouse");
    }

    #[test]
    fn deleting_a_pool_ungroups_subjects() {
        let (mut tree, mut registry) = fixture();
        registry.add_subject("sub-2", Some("pool-1")).unwrap();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        assert!(projector.tree.contains(&p("primary/pool-1/sub-2")));

        let removal = projector.delete_pool("pool-1").unwrap();
        assert_eq!(removal.removed, vec![p("primary/pool-1")]);
        assert_eq!(
            removal.relocated,
            vec![RenameNotice {
                from: p("primary/pool-1/sub-2"),
                to: p("primary/sub-2"),
            }]
        );
        assert!(tree.contains(&p("primary/sub-2")));
        assert!(!tree.contains(&p("primary/pool-1")));
        assert!(registry.pool("pool-1").is_none());
    }

    #[test]
    fn delete_subject_removes_folders_everywhere() {
        let (mut tree, mut registry) = fixture();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        projector.project(Classification::Source).unwrap();

        let removed = projector.delete_subject("sub-1").unwrap();
        assert_eq!(removed, vec![p("primary/sub-1"), p("source/sub-1")]);
        assert!(!tree.contains(&p("primary/sub-1")));
        assert!(registry.subject("sub-1").is_none());
    }

    #[test]
    fn prune_asks_before_deleting() {
        let (mut tree, mut registry) = fixture();
        registry.add_subject("sub-2", None).unwrap();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        projector
            .tree
            .import_leaf(&p("primary/sub-1/sam-1"), "x.dat", "/in/x.dat")
            .unwrap();

        let pending = projector
            .prune_empty_projections(Classification::Primary, ProjectionKind::Subjects, false)
            .unwrap();
        assert_eq!(pending, PruneOutcome::Pending(vec![p("primary/sub-2")]));
        assert!(projector.tree.contains(&p("primary/sub-2")));

        let deleted = projector
            .prune_empty_projections(Classification::Primary, ProjectionKind::Subjects, true)
            .unwrap();
        assert_eq!(deleted.paths(), [p("primary/sub-2")]);
        assert!(!tree.contains(&p("primary/sub-2")));
        assert!(tree.contains(&p("primary/sub-1/sam-1/x.dat")));
    }

    #[test]
    fn confirmed_prune_fails_when_folder_gained_content() {
        let (mut tree, mut registry) = fixture();
        let mut projector = StructureProjector::new(&mut tree, &mut registry);
        projector.project(Classification::Primary).unwrap();
        let PruneOutcome::Pending(paths) = projector
            .prune_empty_projections(Classification::Primary, ProjectionKind::Samples, false)
            .unwrap()
        else {
            panic!("expected pending prune");
        };
        assert_eq!(paths, vec![p("primary/sub-1/sam-1")]);
        projector
            .tree
            .import_leaf(&paths[0], "late.dat", "/in/late.dat")
            .unwrap();
        assert_eq!(
            projector.delete_empty_projections(&paths),
            Err(ProjectionError::NotEmpty(p("primary/sub-1/sam-1")))
        );
    }
}
