use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Run identifier; the iteration key of every pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunNumber(pub u32);

impl fmt::Display for RunNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// The run was booked but never finalized.
    Created,
    Other(String),
}

impl From<&str> for RunState {
    fn from(s: &str) -> Self {
        if s == "CREATED" {
            RunState::Created
        } else {
            RunState::Other(s.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunMetadata {
    pub state: RunState,
    pub destination: Option<String>,
    /// Raw start timestamp as served by the run database.
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    /// `end - start` in seconds, when both timestamps parse.
    pub length_secs: Option<f64>,
}

impl RunMetadata {
    /// The `YYYY-MM-DD` prefix of the start timestamp, used to request savesets.
    pub fn start_date(&self) -> Option<&str> {
        self.start_time.as_deref().and_then(|s| s.get(0..10))
    }
}

/// How per-location samples are combined into one series point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    Absolute,
    Ratio,
}

impl MetricType {
    pub fn required_locations(self) -> usize {
        match self {
            MetricType::Absolute => 1,
            MetricType::Ratio => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MetricSample {
    pub value: f64,
    pub error: f64,
}

impl MetricSample {
    pub fn new(value: f64, error: f64) -> Self {
        Self { value, error }
    }

    pub fn zero() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub run: RunNumber,
    pub value: f64,
    pub error: f64,
    /// Unphysical points are kept for plot indexing but never published.
    pub publish: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub points: Vec<SeriesPoint>,
}

impl Series {
    pub fn runs(&self) -> impl Iterator<Item = RunNumber> + '_ {
        self.points.iter().map(|p| p.run)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn published(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter().filter(|p| p.publish)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Resolved settings for one pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_lower: RunNumber,
    pub run_upper: RunNumber,
    pub report_type: String,
    pub algorithm: String,
    pub rundb_url: String,
    pub rundb_cache: PathBuf,
    pub saveset_root: PathBuf,
    pub saveset_service_url: String,
    pub publish_url: Option<String>,
    pub key_file: PathBuf,
    pub min_run_length: Duration,
    pub destination: Option<String>,
    pub figures_dir: PathBuf,
    pub fetch_concurrency: usize,
    pub http_timeout: Duration,
    pub user_agent: String,
}

impl RunConfig {
    pub fn runs(&self) -> impl Iterator<Item = RunNumber> {
        (self.run_lower.0..=self.run_upper.0).map(RunNumber)
    }

    /// `figures/<lo>_<hi>/<sub>/`
    pub fn figures_subdir(&self, sub: &str) -> PathBuf {
        self.figures_dir
            .join(format!("{}_{}", self.run_lower, self.run_upper))
            .join(sub)
    }
}
