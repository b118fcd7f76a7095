//! Run metadata from the run database, cached on disk.
//!
//! Metadata of a finished run never changes, so a cached document is reused
//! forever and never refreshed.

use crate::model::{RunMetadata, RunNumber, RunState};
use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;
use time::macros::format_description;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("run {run}: metadata unavailable: {reason}")]
    Unavailable { run: RunNumber, reason: String },
    #[error("run {run}: malformed metadata: {reason}")]
    Malformed { run: RunNumber, reason: String },
}

/// Remote origin of run metadata documents.
pub trait MetadataSource: Send + Sync {
    fn fetch(&self, run: RunNumber) -> BoxFuture<'_, Result<String, MetadataError>>;
}

/// `GET <base_url><run>` against the run database API.
pub struct HttpMetadataSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpMetadataSource {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl MetadataSource for HttpMetadataSource {
    fn fetch(&self, run: RunNumber) -> BoxFuture<'_, Result<String, MetadataError>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, run);
            tracing::debug!(%url, "fetching run metadata");
            let unavailable = |reason: String| MetadataError::Unavailable { run, reason };
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| unavailable(e.to_string()))?;
            if !resp.status().is_success() {
                return Err(unavailable(format!("HTTP {}", resp.status())));
            }
            resp.text().await.map_err(|e| unavailable(e.to_string()))
        })
    }
}

pub struct RunMetadataResolver {
    source: Box<dyn MetadataSource>,
    cache_dir: PathBuf,
}

impl RunMetadataResolver {
    pub fn new(source: Box<dyn MetadataSource>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            cache_dir: cache_dir.into(),
        }
    }

    pub async fn resolve(&self, run: RunNumber) -> Result<RunMetadata, MetadataError> {
        let path = self.cache_dir.join(run.to_string());
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => {
                tracing::debug!(%run, "run metadata cache hit");
                body
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let body = self.source.fetch(run).await?;
                if let Err(err) = self.store(&path, &body).await {
                    tracing::warn!(%run, error = %err, "failed to cache run metadata");
                }
                body
            }
            Err(e) => {
                return Err(MetadataError::Unavailable {
                    run,
                    reason: format!("cannot read {}: {e}", path.display()),
                })
            }
        };
        parse_metadata(run, &body)
    }

    async fn store(&self, path: &std::path::Path, body: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir).await?;
        tokio::fs::write(path, body).await
    }
}

#[derive(Debug, Deserialize)]
struct RunInfoDocument {
    state: Option<String>,
    #[serde(default)]
    destination: Option<String>,
    #[serde(default)]
    starttime: Option<String>,
    #[serde(default)]
    endtime: Option<String>,
}

fn parse_rundb_time(s: &str) -> Result<OffsetDateTime, time::error::Parse> {
    OffsetDateTime::parse(
        s,
        format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
        ),
    )
    .or_else(|_| {
        OffsetDateTime::parse(
            s,
            format_description!(
                "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]"
            ),
        )
    })
}

/// Parse a run database document. Runs still in `CREATED` state carry no
/// usable timing and are returned without a length.
pub fn parse_metadata(run: RunNumber, body: &str) -> Result<RunMetadata, MetadataError> {
    let malformed = |reason: String| MetadataError::Malformed { run, reason };
    let doc: RunInfoDocument = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let state = doc
        .state
        .as_deref()
        .map(RunState::from)
        .ok_or_else(|| malformed("missing `state`".into()))?;

    let length_secs = if state == RunState::Created {
        None
    } else {
        let start = doc
            .starttime
            .as_deref()
            .ok_or_else(|| malformed("missing `starttime`".into()))?;
        let end = doc
            .endtime
            .as_deref()
            .ok_or_else(|| malformed("missing `endtime`".into()))?;
        let start = parse_rundb_time(start).map_err(|e| malformed(format!("starttime: {e}")))?;
        let end = parse_rundb_time(end).map_err(|e| malformed(format!("endtime: {e}")))?;
        if end < start {
            return Err(malformed("run ends before it starts".into()));
        }
        Some((end - start).as_seconds_f64())
    };

    Ok(RunMetadata {
        state,
        destination: doc.destination,
        start_time: doc.starttime,
        end_time: doc.endtime,
        length_secs,
    })
}
