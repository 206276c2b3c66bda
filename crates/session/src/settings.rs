use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use curator_import::{ImportDecisions, ImportReconciler, BANNED_NAMES};
use curator_manifest::{FilenameColumn, ManifestSynthesizer, FIXED_HEADERS};

use crate::util::write_atomic;

const SETTINGS_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize settings {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write settings {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User settings shared by every dataset session.  
/// 策展設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CuratorSettings {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub manifest: ManifestSettings,
    #[serde(default)]
    pub import: ImportSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for CuratorSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            manifest: ManifestSettings::default(),
            import: ImportSettings::default(),
        }
    }
}

impl CuratorSettings {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = SETTINGS_VERSION;
        }
        self.manifest.sanitize();
        self.import.sanitize();
    }

    pub fn synthesizer(&self) -> ManifestSynthesizer {
        ManifestSynthesizer::new(self.manifest.variable_headers.clone())
            .with_filename_column(self.manifest.filename_column)
    }

    pub fn reconciler(&self) -> ImportReconciler {
        ImportReconciler::with_banned_names(
            BANNED_NAMES
                .iter()
                .map(|name| name.to_string())
                .chain(self.import.extra_banned_names.iter().cloned()),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ManifestSettings {
    /// Columns appended after the fixed ones in new manifests.
    #[serde(default = "default_variable_headers")]
    pub variable_headers: Vec<String>,
    #[serde(default)]
    pub filename_column: FilenameColumn,
}

fn default_variable_headers() -> Vec<String> {
    vec!["description".to_string(), "Additional Metadata".to_string()]
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            variable_headers: default_variable_headers(),
            filename_column: FilenameColumn::default(),
        }
    }
}

impl ManifestSettings {
    fn sanitize(&mut self) {
        let mut kept: Vec<String> = Vec::with_capacity(self.variable_headers.len());
        for header in &self.variable_headers {
            let header = header.trim();
            if header.is_empty()
                || FIXED_HEADERS.contains(&header)
                || kept.iter().any(|existing| existing == header)
            {
                continue;
            }
            kept.push(header.to_string());
        }
        self.variable_headers = kept;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ImportSettings {
    /// Answers applied when a batch leaves a decision point open.
    #[serde(default)]
    pub defaults: ImportDecisions,
    /// Names skipped on import in addition to the built-in list.
    #[serde(default)]
    pub extra_banned_names: Vec<String>,
}

impl ImportSettings {
    fn sanitize(&mut self) {
        self.extra_banned_names = self
            .extra_banned_names
            .iter()
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect();
        self.extra_banned_names.sort();
        self.extra_banned_names.dedup();
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    data: CuratorSettings,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>, settings: CuratorSettings) -> Self {
        Self {
            path: path.into(),
            data: settings,
        }
    }

    /// Loads settings, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Ok(Self {
                path,
                data: CuratorSettings::default(),
            });
        }

        let contents = fs::read_to_string(&path).map_err(|source| SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        let mut data: CuratorSettings =
            serde_json::from_str(&contents).map_err(|source| SettingsError::Parse {
                path: path.clone(),
                source,
            })?;
        data.sanitize();
        Ok(Self { path, data })
    }

    pub fn settings(&self) -> &CuratorSettings {
        &self.data
    }

    pub fn settings_mut(&mut self) -> &mut CuratorSettings {
        &mut self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), SettingsError>
    where
        F: FnMut(&mut CuratorSettings),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        let payload = serde_json::to_string_pretty(&self.data).map_err(|source| {
            SettingsError::Serialize {
                path: self.path.clone(),
                source,
            }
        })?;
        write_atomic(&self.path, payload.as_bytes()).map_err(|source| SettingsError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
