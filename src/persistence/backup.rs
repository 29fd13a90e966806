//! Crash-recovery snapshot of where away entities must be sent back to.
//!
//! The file is a YAML map keyed by identity. Every save overwrites it whole
//! through a temp file and rename; a load consumes it and deletes it.

use crate::entities::record::{AfkRecord, FlightState};
use crate::error::PersistenceError;
use crate::world::host::EntityId;
use crate::world::position::Location;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub const BACKUP_FILE: &str = "backup.yml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupEntry {
    pub world: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub flying: bool,
    #[serde(rename = "allowFlight")]
    pub allow_flight: bool,
}

impl BackupEntry {
    fn from_record(record: &AfkRecord) -> Option<Self> {
        if !record.is_away() {
            return None;
        }
        let location = record.return_location()?;
        Some(Self {
            world: location.world.clone(),
            x: location.x,
            y: location.y,
            z: location.z,
            yaw: location.yaw,
            pitch: location.pitch,
            flying: record.saved_flight.flying,
            allow_flight: record.saved_flight.allow_flight,
        })
    }

    fn location(&self) -> Location {
        Location::new(self.world.clone(), self.x, self.y, self.z).with_rotation(self.yaw, self.pitch)
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct RestoreReport {
    pub records: Vec<AfkRecord>,
    /// Entries whose world is not loaded.
    pub skipped_worlds: Vec<String>,
    pub invalid: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    path: PathBuf,
}

impl BackupStore {
    pub fn from_root(root: &Path) -> Self {
        Self {
            path: root.join(BACKUP_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replaces the snapshot with every away record that has a return
    /// location. Returns how many entries were written.
    pub fn save(&self, records: &[AfkRecord]) -> Result<usize, PersistenceError> {
        let entries: BTreeMap<String, BackupEntry> = records
            .iter()
            .filter_map(|record| {
                BackupEntry::from_record(record).map(|entry| (record.id.to_string(), entry))
            })
            .collect();
        let data = serde_yaml::to_string(&entries).map_err(|source| PersistenceError::Format {
            path: self.path.clone(),
            source,
        })?;
        self.write_atomic(data.as_bytes())?;
        Ok(entries.len())
    }

    fn write_atomic(&self, data: &[u8]) -> Result<(), PersistenceError> {
        let io_err = |source| PersistenceError::Io {
            path: self.path.clone(),
            source,
        };
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(data).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|err| io_err(err.error))?;
        Ok(())
    }

    /// Reads and deletes the snapshot. Entries pointing at worlds for which
    /// `world_loaded` is false are dropped. A missing file is an empty restore.
    pub fn load(
        &self,
        world_loaded: impl Fn(&str) -> bool,
        now: Instant,
    ) -> Result<RestoreReport, PersistenceError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(RestoreReport::default());
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let raw: BTreeMap<String, serde_yaml::Value> = if data.trim().is_empty() {
            BTreeMap::new()
        } else {
            serde_yaml::from_str(&data).map_err(|source| PersistenceError::Format {
                path: self.path.clone(),
                source,
            })?
        };

        let mut report = RestoreReport::default();
        for (key, value) in raw {
            let id = match key.parse::<EntityId>() {
                Ok(id) => id,
                Err(err) => {
                    report.invalid.push(format!("{key}: {err}"));
                    continue;
                }
            };
            let entry: BackupEntry = match serde_yaml::from_value(value) {
                Ok(entry) => entry,
                Err(err) => {
                    report.invalid.push(format!("{key}: {err}"));
                    continue;
                }
            };
            if !world_loaded(&entry.world) {
                report.skipped_worlds.push(entry.world);
                continue;
            }
            let flight = FlightState {
                allow_flight: entry.allow_flight,
                flying: entry.flying,
            };
            report
                .records
                .push(AfkRecord::recovered(id, entry.location(), flight, now));
        }
        self.clear()?;
        Ok(report)
    }

    pub fn clear(&self) -> Result<(), PersistenceError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(PersistenceError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}
