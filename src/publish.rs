//! Publishing of per-run metrics to the data-quality time-series store.

use crate::model::RunNumber;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("cannot read publish credential {}: {source}", .path.display())]
    Credential {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("publish credential {} is empty", .0.display())]
    EmptyCredential(PathBuf),
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// One `(run, metric, error)` triple as sent to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub run: RunNumber,
    pub metric_name: String,
    pub value: f64,
    pub error: f64,
    pub series_name: String,
    pub algorithm: String,
}

impl PublishRecord {
    pub fn error_name(&self) -> String {
        format!("{}_err", self.metric_name)
    }
}

pub trait Publisher: Send + Sync {
    fn publish(&self, record: PublishRecord) -> BoxFuture<'_, Result<(), PublishError>>;
}

/// Read the publish credential, dropping the trailing newline.
pub fn load_credential(path: &Path) -> Result<String, PublishError> {
    let text = std::fs::read_to_string(path).map_err(|source| PublishError::Credential {
        path: path.to_path_buf(),
        source,
    })?;
    let key = text.trim_end_matches(['\n', '\r']).to_string();
    if key.trim().is_empty() {
        return Err(PublishError::EmptyCredential(path.to_path_buf()));
    }
    Ok(key)
}

/// Posts each record as JSON to the store's ingest endpoint.
pub struct HttpPublisher {
    http: reqwest::Client,
    url: String,
    credential: String,
}

impl HttpPublisher {
    pub fn new(http: reqwest::Client, url: impl Into<String>, credential: String) -> Self {
        Self {
            http,
            url: url.into(),
            credential,
        }
    }

    fn body(&self, record: &PublishRecord) -> serde_json::Value {
        let mut values = serde_json::Map::new();
        values.insert(record.metric_name.clone(), record.value.into());
        values.insert(record.error_name(), record.error.into());
        serde_json::json!({
            "key": self.credential,
            "run": record.run,
            "tag": "",
            "values": values,
            "name": record.series_name,
            "algorithm": record.algorithm,
        })
    }
}

impl Publisher for HttpPublisher {
    fn publish(&self, record: PublishRecord) -> BoxFuture<'_, Result<(), PublishError>> {
        Box::pin(async move {
            let body = self.body(&record);
            self.http
                .post(&self.url)
                .json(&body)
                .send()
                .await?
                .error_for_status()?;
            tracing::debug!(run = %record.run, metric = %record.metric_name, "published");
            Ok(())
        })
    }
}
