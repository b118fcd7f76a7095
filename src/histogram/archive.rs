//! Saveset archive access.
//!
//! An archive is a per-run file of monitoring objects addressed by a string
//! path such as `VPClusterMonitors/VPClusterMapOnMod10Sens2`.

use super::{Histogram, HistogramObject};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("cannot open archive {}: {source}", .path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("archive {} is unreadable: {reason}", .path.display())]
    Unreadable { path: PathBuf, reason: String },
}

/// An opened per-run archive.
pub trait RunArchive: Send {
    fn get(&self, location: &str) -> Option<&dyn HistogramObject>;
    /// Whether the file was not closed cleanly and needed crash recovery.
    fn was_recovered(&self) -> bool;
}

pub trait ArchiveOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn RunArchive>, ArchiveError>;
}

/// Archive held fully in memory, as loaded from a JSON dump.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavesetDump {
    #[serde(default)]
    pub recovered: bool,
    pub objects: BTreeMap<String, Histogram>,
}

impl SavesetDump {
    pub fn insert(&mut self, location: impl Into<String>, mut histogram: Histogram) {
        let location = location.into();
        if histogram.name.is_empty() {
            histogram.name = object_name(&location).to_string();
        }
        self.objects.insert(location, histogram);
    }

    fn normalize(mut self) -> Result<Self, String> {
        for (location, histogram) in self.objects.iter_mut() {
            if histogram.name.is_empty() {
                histogram.name = object_name(location).to_string();
            }
            histogram.validate()?;
        }
        Ok(self)
    }
}

/// Last path segment of an object location.
pub fn object_name(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

impl RunArchive for SavesetDump {
    fn get(&self, location: &str) -> Option<&dyn HistogramObject> {
        self.objects
            .get(location)
            .map(|h| h as &dyn HistogramObject)
    }

    fn was_recovered(&self) -> bool {
        self.recovered
    }
}

/// Opens savesets exported as JSON [`SavesetDump`] documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonArchiveOpener;

impl ArchiveOpener for JsonArchiveOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn RunArchive>, ArchiveError> {
        let bytes = std::fs::read(path).map_err(|source| ArchiveError::Unavailable {
            path: path.to_path_buf(),
            source,
        })?;
        let dump: SavesetDump =
            serde_json::from_slice(&bytes).map_err(|e| ArchiveError::Unreadable {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let dump = dump.normalize().map_err(|reason| ArchiveError::Unreadable {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(Box::new(dump))
    }
}
