use std::collections::BTreeMap;

use curator_tree::sanitize;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ProjectionError;

/// Free-form key/value metadata attached to a subject, sample or pool.
pub type Metadata = BTreeMap<String, String>;

/// Pool grouping several subjects.
/// 受試者群組。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolRecord {
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    #[serde(default)]
    pub metadata: Metadata,
}

/// Subject with its optional pool and its samples.
/// 受試者及其所屬群組與樣本。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub samples: BTreeMap<String, SampleRecord>,
}

/// Subject/sample/pool registry kept in sync with the tree by the
/// [`StructureProjector`](crate::StructureProjector).
/// 受試者／樣本／群組登錄表。
///
/// Subject and pool names share one namespace because their folders can be
/// siblings under a classification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectRegistry {
    #[serde(default)]
    pools: BTreeMap<String, PoolRecord>,
    #[serde(default)]
    subjects: BTreeMap<String, SubjectRecord>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty() && self.subjects.is_empty()
    }

    pub fn pools(&self) -> impl Iterator<Item = (&str, &PoolRecord)> {
        self.pools.iter().map(|(name, record)| (name.as_str(), record))
    }

    pub fn subjects(&self) -> impl Iterator<Item = (&str, &SubjectRecord)> {
        self.subjects
            .iter()
            .map(|(name, record)| (name.as_str(), record))
    }

    pub fn pool(&self, name: &str) -> Option<&PoolRecord> {
        self.pools.get(name)
    }

    pub fn subject(&self, name: &str) -> Option<&SubjectRecord> {
        self.subjects.get(name)
    }

    pub fn sample(&self, subject: &str, sample: &str) -> Option<&SampleRecord> {
        self.subjects.get(subject)?.samples.get(sample)
    }

    /// Subjects currently grouped in `pool`.
    pub fn members(&self, pool: &str) -> Vec<&str> {
        self.subjects
            .iter()
            .filter(|(_, record)| record.pool.as_deref() == Some(pool))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn add_pool(&mut self, name: &str) -> Result<(), ProjectionError> {
        self.claim_name(name)?;
        self.pools.insert(name.to_string(), PoolRecord::default());
        debug!(pool = name, "pool registered");
        Ok(())
    }

    pub fn add_subject(&mut self, name: &str, pool: Option<&str>) -> Result<(), ProjectionError> {
        if let Some(pool) = pool {
            self.require_pool(pool)?;
        }
        self.claim_name(name)?;
        self.subjects.insert(
            name.to_string(),
            SubjectRecord {
                pool: pool.map(str::to_string),
                ..SubjectRecord::default()
            },
        );
        debug!(subject = name, pool = ?pool, "subject registered");
        Ok(())
    }

    pub fn add_sample(&mut self, subject: &str, sample: &str) -> Result<(), ProjectionError> {
        validate_name(sample)?;
        let record = self.subject_mut(subject)?;
        if record.samples.contains_key(sample) {
            return Err(ProjectionError::DuplicateSample {
                subject: subject.to_string(),
                sample: sample.to_string(),
            });
        }
        record
            .samples
            .insert(sample.to_string(), SampleRecord::default());
        debug!(subject, sample, "sample registered");
        Ok(())
    }

    pub fn set_subject_metadata(
        &mut self,
        subject: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProjectionError> {
        self.subject_mut(subject)?
            .metadata
            .insert(key.into(), value.into());
        Ok(())
    }

    pub fn set_sample_metadata(
        &mut self,
        subject: &str,
        sample: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProjectionError> {
        self.sample_mut(subject, sample)?
            .metadata
            .insert(key.into(), value.into());
        Ok(())
    }

    pub fn set_pool_metadata(
        &mut self,
        pool: &str,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ProjectionError> {
        self.pools
            .get_mut(pool)
            .ok_or_else(|| ProjectionError::UnknownPool(pool.to_string()))?
            .metadata
            .insert(key.into(), value.into());
        Ok(())
    }

    pub(crate) fn require_pool(&self, pool: &str) -> Result<&PoolRecord, ProjectionError> {
        self.pools
            .get(pool)
            .ok_or_else(|| ProjectionError::UnknownPool(pool.to_string()))
    }

    pub(crate) fn require_subject(&self, subject: &str) -> Result<&SubjectRecord, ProjectionError> {
        self.subjects
            .get(subject)
            .ok_or_else(|| ProjectionError::UnknownSubject(subject.to_string()))
    }

    pub(crate) fn require_sample(&self, subject: &str, sample: &str) -> Result<(), ProjectionError> {
        if self.require_subject(subject)?.samples.contains_key(sample) {
            Ok(())
        } else {
            Err(ProjectionError::UnknownSample {
                subject: subject.to_string(),
                sample: sample.to_string(),
            })
        }
    }

    pub(crate) fn subject_mut(&mut self, subject: &str) -> Result<&mut SubjectRecord, ProjectionError> {
        self.subjects
            .get_mut(subject)
            .ok_or_else(|| ProjectionError::UnknownSubject(subject.to_string()))
    }

    fn sample_mut(&mut self, subject: &str, sample: &str) -> Result<&mut SampleRecord, ProjectionError> {
        self.subject_mut(subject)?
            .samples
            .get_mut(sample)
            .ok_or_else(|| ProjectionError::UnknownSample {
                subject: subject.to_string(),
                sample: sample.to_string(),
            })
    }

    /// Moves the subject record, metadata and samples included, to `new`.
    pub(crate) fn rename_subject(&mut self, old: &str, new: &str) -> Result<(), ProjectionError> {
        self.require_subject(old)?;
        self.claim_name(new)?;
        if let Some(record) = self.subjects.remove(old) {
            self.subjects.insert(new.to_string(), record);
        }
        Ok(())
    }

    pub(crate) fn rename_pool(&mut self, old: &str, new: &str) -> Result<(), ProjectionError> {
        self.require_pool(old)?;
        self.claim_name(new)?;
        if let Some(record) = self.pools.remove(old) {
            self.pools.insert(new.to_string(), record);
        }
        for record in self.subjects.values_mut() {
            if record.pool.as_deref() == Some(old) {
                record.pool = Some(new.to_string());
            }
        }
        Ok(())
    }

    pub(crate) fn rename_sample(
        &mut self,
        subject: &str,
        old: &str,
        new: &str,
    ) -> Result<(), ProjectionError> {
        validate_name(new)?;
        self.require_sample(subject, old)?;
        let record = self.subject_mut(subject)?;
        if record.samples.contains_key(new) {
            return Err(ProjectionError::DuplicateSample {
                subject: subject.to_string(),
                sample: new.to_string(),
            });
        }
        if let Some(sample) = record.samples.remove(old) {
            record.samples.insert(new.to_string(), sample);
        }
        Ok(())
    }

    pub(crate) fn remove_subject(&mut self, subject: &str) -> Result<SubjectRecord, ProjectionError> {
        self.subjects
            .remove(subject)
            .ok_or_else(|| ProjectionError::UnknownSubject(subject.to_string()))
    }

    pub(crate) fn remove_sample(&mut self, subject: &str, sample: &str) -> Result<(), ProjectionError> {
        self.require_sample(subject, sample)?;
        self.subject_mut(subject)?.samples.remove(sample);
        Ok(())
    }

    /// Drops the pool and ungroups its members.
    pub(crate) fn remove_pool(&mut self, pool: &str) -> Result<Vec<String>, ProjectionError> {
        self.pools
            .remove(pool)
            .ok_or_else(|| ProjectionError::UnknownPool(pool.to_string()))?;
        let mut released = Vec::new();
        for (name, record) in &mut self.subjects {
            if record.pool.as_deref() == Some(pool) {
                record.pool = None;
                released.push(name.clone());
            }
        }
        Ok(released)
    }

    fn claim_name(&self, name: &str) -> Result<(), ProjectionError> {
        validate_name(name)?;
        if self.subjects.contains_key(name) || self.pools.contains_key(name) {
            return Err(ProjectionError::NameInUse(name.to_string()));
        }
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), ProjectionError> {
    if name.trim().is_empty() || sanitize::is_irregular(name) || name == "." || name == ".." {
        return Err(ProjectionError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_and_pool_names_share_a_namespace() {
        let mut registry = SubjectRegistry::new();
        registry.add_pool("pool-1").unwrap();
        registry.add_subject("sub-1", Some("pool-1")).unwrap();
        assert_eq!(
            registry.add_subject("pool-1", None),
            Err(ProjectionError::NameInUse("pool-1".into()))
        );
        assert_eq!(
            registry.add_pool("sub-1"),
            Err(ProjectionError::NameInUse("sub-1".into()))
        );
        assert_eq!(
            registry.add_subject("sub-2", Some("pool-9")),
            Err(ProjectionError::UnknownPool("pool-9".into()))
        );
        assert_eq!(registry.members("pool-1"), ["sub-1"]);
    }

    #[test]
    fn names_must_be_clean() {
        let mut registry = SubjectRegistry::new();
        for name in ["", "  ", "a/b", "x:y", ".."] {
            assert_eq!(
                registry.add_subject(name, None),
                Err(ProjectionError::InvalidName(name.into()))
            );
        }
    }

    #[test]
    fn rename_subject_keeps_metadata_and_samples() {
        let mut registry = SubjectRegistry::new();
        registry.add_subject("sub-1", None).unwrap();
        registry.set_subject_metadata("sub-1", "age", "12").unwrap();
        registry.add_sample("sub-1", "sam-1").unwrap();
        registry
            .set_sample_metadata("sub-1", "sam-1", "tissue", "liver")
            .unwrap();

        registry.rename_subject("sub-1", "sub-01").unwrap();
        assert!(registry.subject("sub-1").is_none());
        let record = registry.subject("sub-01").unwrap();
        assert_eq!(record.metadata["age"], "12");
        assert_eq!(
            registry.sample("sub-01", "sam-1").unwrap().metadata["tissue"],
            "liver"
        );
    }

    #[test]
    fn removing_a_pool_ungroups_members() {
        let mut registry = SubjectRegistry::new();
        registry.add_pool("pool-1").unwrap();
        registry.add_subject("sub-1", Some("pool-1")).unwrap();
        registry.add_subject("sub-2", None).unwrap();

        assert_eq!(registry.remove_pool("pool-1").unwrap(), ["sub-1"]);
        assert_eq!(registry.subject("sub-1").unwrap().pool, None);
        assert!(registry.pool("pool-1").is_none());
    }

    #[test]
    fn registry_round_trips_through_json() {
        let mut registry = SubjectRegistry::new();
        registry.add_pool("pool-1").unwrap();
        registry.add_subject("sub-1", Some("pool-1")).unwrap();
        registry.add_sample("sub-1", "sam-1").unwrap();

        let text = serde_json::to_string(&registry).unwrap();
        assert!(text.contains("\"pool\":\"pool-1\""));
        let restored: SubjectRegistry = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, registry);
    }
}
