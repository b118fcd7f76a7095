//! Run eligibility.
//!
//! Checks run cheapest first and stop at the first failure, so the saveset is
//! only requested and opened for runs that pass every metadata check.

use crate::histogram::archive::{ArchiveOpener, RunArchive};
use crate::locator::RunFileLocator;
use crate::model::{RunMetadata, RunNumber, RunState};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_MIN_RUN_LENGTH: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    NotFinalized,
    WrongDestination { found: Option<String> },
    TooShort { length_secs: f64 },
    NoData,
    PossiblyCorrupt,
    Unreadable(String),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotFinalized => write!(f, "run not finalized"),
            Rejection::WrongDestination { found } => {
                write!(f, "wrong destination ({})", found.as_deref().unwrap_or("none"))
            }
            Rejection::TooShort { length_secs } => write!(f, "too short ({length_secs:.0}s)"),
            Rejection::NoData => write!(f, "no data"),
            Rejection::PossiblyCorrupt => write!(f, "possibly corrupt (file needed recovery)"),
            Rejection::Unreadable(reason) => write!(f, "saveset unreadable: {reason}"),
        }
    }
}

/// A run that passed every check, with its opened saveset.
pub struct AdmittedRun {
    pub run: RunNumber,
    pub length_hours: f64,
    pub archive: Box<dyn RunArchive>,
}

pub enum Admission {
    Admit(AdmittedRun),
    Reject(Rejection),
}

#[derive(Debug, Clone)]
pub struct RunAdmissionFilter {
    /// Required destination; `None` disables the destination check.
    pub destination: Option<String>,
    pub min_run_length: Duration,
}

impl Default for RunAdmissionFilter {
    fn default() -> Self {
        Self {
            destination: None,
            min_run_length: DEFAULT_MIN_RUN_LENGTH,
        }
    }
}

impl RunAdmissionFilter {
    /// State, destination and length checks. Returns the run length in seconds.
    pub fn check_metadata(&self, meta: &RunMetadata) -> Result<f64, Rejection> {
        if meta.state == RunState::Created {
            return Err(Rejection::NotFinalized);
        }
        if let Some(required) = &self.destination {
            if meta.destination.as_deref() != Some(required.as_str()) {
                return Err(Rejection::WrongDestination {
                    found: meta.destination.clone(),
                });
            }
        }
        let length_secs = meta.length_secs.unwrap_or(0.0);
        if length_secs < self.min_run_length.as_secs_f64() {
            return Err(Rejection::TooShort { length_secs });
        }
        Ok(length_secs)
    }

    pub async fn admit(
        &self,
        run: RunNumber,
        meta: &RunMetadata,
        provider: &str,
        locator: &RunFileLocator,
        opener: &dyn ArchiveOpener,
    ) -> Admission {
        let length_secs = match self.check_metadata(meta) {
            Ok(length) => length,
            Err(rejection) => return Admission::Reject(rejection),
        };
        let start_date = meta.start_date().unwrap_or_default();
        if !locator.ensure_exists(run, provider, start_date).await {
            return Admission::Reject(Rejection::NoData);
        }
        let archive = match opener.open(&locator.locate(run, provider)) {
            Ok(archive) => archive,
            Err(err) => return Admission::Reject(Rejection::Unreadable(err.to_string())),
        };
        if archive.was_recovered() {
            return Admission::Reject(Rejection::PossiblyCorrupt);
        }
        Admission::Admit(AdmittedRun {
            run,
            length_hours: length_secs / 3600.0,
            archive,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::archive::{JsonArchiveOpener, SavesetDump};
    use crate::locator::SavesetService;
    use futures::future::BoxFuture;

    struct NoService;

    impl SavesetService for NoService {
        fn request_creation<'a>(
            &'a self,
            _run: RunNumber,
            _start_date: &'a str,
        ) -> BoxFuture<'a, anyhow::Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn meta(state: &str, destination: &str, length_secs: f64) -> RunMetadata {
        RunMetadata {
            state: RunState::from(state),
            destination: Some(destination.to_string()),
            start_time: Some("2024-05-01T10:00:00+0200".into()),
            end_time: None,
            length_secs: Some(length_secs),
        }
    }

    fn offline_filter() -> RunAdmissionFilter {
        RunAdmissionFilter {
            destination: Some("OFFLINE".into()),
            ..Default::default()
        }
    }

    #[test]
    fn created_runs_are_rejected_first() {
        let m = meta("CREATED", "LOCAL", 10.0);
        assert_eq!(offline_filter().check_metadata(&m), Err(Rejection::NotFinalized));
    }

    #[test]
    fn destination_is_only_checked_when_required() {
        let m = meta("ENDED", "LOCAL", 3600.0);
        assert!(matches!(
            offline_filter().check_metadata(&m),
            Err(Rejection::WrongDestination { .. })
        ));
        assert_eq!(RunAdmissionFilter::default().check_metadata(&m), Ok(3600.0));
    }

    #[test]
    fn minimum_length_is_inclusive() {
        let filter = RunAdmissionFilter::default();
        assert_eq!(filter.check_metadata(&meta("ENDED", "OFFLINE", 300.0)), Ok(300.0));
        assert_eq!(
            filter.check_metadata(&meta("ENDED", "OFFLINE", 299.0)),
            Err(Rejection::TooShort { length_secs: 299.0 })
        );
    }

    #[tokio::test]
    async fn archive_checks_come_last() {
        let dir = tempfile::tempdir().unwrap();
        let locator = RunFileLocator::new(dir.path(), ".root", Box::new(NoService));
        let filter = RunAdmissionFilter::default();
        let run = RunNumber(265911);
        let m = meta("ENDED", "OFFLINE", 7200.0);

        let outcome = filter.admit(run, &m, "RecoMon", &locator, &JsonArchiveOpener).await;
        assert!(matches!(outcome, Admission::Reject(Rejection::NoData)));

        let path = locator.locate(run, "RecoMon");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let recovered = SavesetDump {
            recovered: true,
            ..Default::default()
        };
        std::fs::write(&path, serde_json::to_vec(&recovered).unwrap()).unwrap();
        let outcome = filter.admit(run, &m, "RecoMon", &locator, &JsonArchiveOpener).await;
        assert!(matches!(outcome, Admission::Reject(Rejection::PossiblyCorrupt)));

        std::fs::write(&path, serde_json::to_vec(&SavesetDump::default()).unwrap()).unwrap();
        match filter.admit(run, &m, "RecoMon", &locator, &JsonArchiveOpener).await {
            Admission::Admit(admitted) => assert_eq!(admitted.length_hours, 2.0),
            Admission::Reject(r) => panic!("unexpected rejection: {r}"),
        }

        // Short runs never touch the filesystem.
        let short = meta("ENDED", "OFFLINE", 10.0);
        let outcome = filter.admit(run, &short, "RecoMon", &locator, &JsonArchiveOpener).await;
        assert!(matches!(outcome, Admission::Reject(Rejection::TooShort { .. })));
    }
}
