//! Flat-file persistence for records and manifests.
//!
//! Every annotator owns `annotations_<name>.json` plus a backup copy
//! `annotations_<name>_backup.json`. Manifests live next to them. All
//! writes go through a temporary file in the same directory and are
//! persisted atomically.

use crate::error::{AnnotatorError, Result};
use crate::models::{AnnotationRecord, AnnotatorName, Phase1Manifest, Phase2Manifest};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const RECORD_PREFIX: &str = "annotations_";
const BACKUP_SUFFIX: &str = "_backup";
const PHASE1_MANIFEST: &str = "assignments_phase1.json";
const PHASE2_MANIFEST: &str = "assignments_phase2.json";

/// Reads and writes everything under the data directory.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Create a store rooted at `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn record_path(&self, name: &AnnotatorName) -> PathBuf {
        self.dir.join(format!("{}{}.json", RECORD_PREFIX, name))
    }

    pub fn backup_path(&self, name: &AnnotatorName) -> PathBuf {
        self.dir
            .join(format!("{}{}{}.json", RECORD_PREFIX, name, BACKUP_SUFFIX))
    }

    pub fn phase1_manifest_path(&self) -> PathBuf {
        self.dir.join(PHASE1_MANIFEST)
    }

    pub fn phase2_manifest_path(&self) -> PathBuf {
        self.dir.join(PHASE2_MANIFEST)
    }

    /// Load a record, falling back to the backup when the main file is damaged.
    ///
    /// Returns `Ok(None)` when neither file exists. A record whose stored
    /// annotator differs from `name` is rejected as ambiguous.
    pub fn load_record(&self, name: &AnnotatorName) -> Result<Option<AnnotationRecord>> {
        let path = self.record_path(name);
        let backup = self.backup_path(name);

        let record = match read_json::<AnnotationRecord>(&path) {
            Ok(record) => record,
            Err(AnnotatorError::Malformed { .. }) if backup.exists() => {
                warn!(
                    "{} is damaged, recovering from {}",
                    path.display(),
                    backup.display()
                );
                Some(read_json::<AnnotationRecord>(&backup)?.ok_or_else(|| {
                    AnnotatorError::MissingRecord(backup.clone())
                })?)
            }
            Err(e) => return Err(e),
        };

        let record = match record {
            Some(r) => r,
            None if backup.exists() => {
                warn!("{} missing, recovering from backup", path.display());
                match read_json::<AnnotationRecord>(&backup)? {
                    Some(r) => r,
                    None => return Ok(None),
                }
            }
            None => return Ok(None),
        };

        if record.annotator != name.as_str() {
            return Err(AnnotatorError::AmbiguousName {
                name: name.to_string(),
                reason: format!(
                    "{} belongs to annotator '{}'",
                    path.display(),
                    record.annotator
                ),
            });
        }

        debug!(
            "Loaded {} annotations for {}",
            record.annotations.len(),
            name
        );
        Ok(Some(record))
    }

    /// Load a record that must exist.
    pub fn require_record(&self, name: &AnnotatorName) -> Result<AnnotationRecord> {
        self.load_record(name)?
            .ok_or_else(|| AnnotatorError::MissingRecord(self.record_path(name)))
    }

    /// Load a record or start an empty one.
    pub fn load_or_create_record(&self, name: &AnnotatorName) -> Result<AnnotationRecord> {
        match self.load_record(name)? {
            Some(record) => Ok(record),
            None => {
                info!("Starting a new record for {}", name);
                Ok(AnnotationRecord::new(name))
            }
        }
    }

    /// Save a record and its backup.
    pub fn save_record(&self, record: &mut AnnotationRecord) -> Result<()> {
        let name = AnnotatorName::parse(&record.annotator)?;
        record.last_updated = Some(Utc::now());

        self.write_json(&self.record_path(&name), record)?;
        self.write_json(&self.backup_path(&name), record)?;
        Ok(())
    }

    /// Annotators that have a record file, sorted.
    pub fn record_annotators(&self) -> Result<Vec<AnnotatorName>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)?.flatten() {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = file_name
                .strip_prefix(RECORD_PREFIX)
                .and_then(|rest| rest.strip_suffix(".json"))
            else {
                continue;
            };

            if stem.ends_with(BACKUP_SUFFIX) {
                continue;
            }

            match AnnotatorName::parse(stem) {
                Ok(name) if name.as_str() == stem => names.push(name),
                _ => warn!("Ignoring record file with invalid name: {}", file_name),
            }
        }

        names.sort();
        names.dedup();
        Ok(names)
    }

    pub fn load_phase1(&self) -> Result<Option<Phase1Manifest>> {
        read_json(&self.phase1_manifest_path())
    }

    /// Load the Phase 1 manifest, failing when it has not been planned yet.
    pub fn require_phase1(&self) -> Result<Phase1Manifest> {
        self.load_phase1()?.ok_or_else(|| AnnotatorError::MissingManifest {
            what: "Phase 1 manifest",
            command: "assign",
            path: self.phase1_manifest_path(),
        })
    }

    pub fn save_phase1(&self, manifest: &Phase1Manifest) -> Result<()> {
        self.write_json(&self.phase1_manifest_path(), manifest)
    }

    pub fn load_phase2(&self) -> Result<Option<Phase2Manifest>> {
        read_json(&self.phase2_manifest_path())
    }

    /// Load the Phase 2 manifest, failing when it has not been planned yet.
    pub fn require_phase2(&self) -> Result<Phase2Manifest> {
        self.load_phase2()?.ok_or_else(|| AnnotatorError::MissingManifest {
            what: "Phase 2 manifest",
            command: "reassign",
            path: self.phase2_manifest_path(),
        })
    }

    pub fn save_phase2(&self, manifest: &Phase2Manifest) -> Result<()> {
        self.write_json(&self.phase2_manifest_path(), manifest)
    }

    /// Atomically write `value` as pretty JSON.
    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let content = serde_json::to_string_pretty(value).map_err(|source| {
            AnnotatorError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;

        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Read a JSON file; `Ok(None)` when it does not exist.
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| AnnotatorError::Malformed {
            path: path.to_path_buf(),
            source,
        })
}
