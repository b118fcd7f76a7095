//! Saveset paths and on-demand saveset creation.
//!
//! Savesets live under `<root>/<provider>/<shard1>/<shard2>/<provider>-run<run><suffix>`
//! where the shards floor the run number to the nearest 10000 and 1000,
//! e.g. `260000/265000/RecoMon-run265911.root`.

use crate::model::RunNumber;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};

pub const DEFAULT_FILE_SUFFIX: &str = ".root";

/// `"<floor10000>/<floor1000>/"` for a run number.
pub fn shard_dir(run: RunNumber) -> String {
    let n = run.0;
    format!("{}/{}/", n / 10_000 * 10_000, n / 1_000 * 1_000)
}

/// Service able to (re)build a run's saveset from the histogram store.
pub trait SavesetService: Send + Sync {
    fn request_creation<'a>(
        &'a self,
        run: RunNumber,
        start_date: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>>;
}

/// `GET <base_url><run>?date=<YYYY-MM-DD>&path=/hist` on the monitoring hub.
pub struct HttpSavesetService {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSavesetService {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

impl SavesetService for HttpSavesetService {
    fn request_creation<'a>(
        &'a self,
        run: RunNumber,
        start_date: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let url = format!("{}{}", self.base_url, run);
            tracing::debug!(%url, date = start_date, "requesting saveset creation");
            self.http
                .get(&url)
                .query(&[("date", start_date), ("path", "/hist")])
                .send()
                .await?
                .error_for_status()?;
            Ok(())
        })
    }
}

pub struct RunFileLocator {
    saveset_root: PathBuf,
    file_suffix: String,
    service: Box<dyn SavesetService>,
}

impl RunFileLocator {
    pub fn new(
        saveset_root: impl Into<PathBuf>,
        file_suffix: impl Into<String>,
        service: Box<dyn SavesetService>,
    ) -> Self {
        Self {
            saveset_root: saveset_root.into(),
            file_suffix: file_suffix.into(),
            service,
        }
    }

    pub fn locate(&self, run: RunNumber, provider: &str) -> PathBuf {
        self.saveset_root.join(provider).join(format!(
            "{}{}-run{}{}",
            shard_dir(run),
            provider,
            run,
            self.file_suffix
        ))
    }

    /// Whether the saveset exists, asking the saveset service to create it
    /// first when it does not.
    pub async fn ensure_exists(&self, run: RunNumber, provider: &str, start_date: &str) -> bool {
        let path = self.locate(run, provider);
        if exists(&path) {
            return true;
        }
        tracing::info!(%run, path = %path.display(), "saveset missing, requesting creation");
        if let Err(err) = self.service.request_creation(run, start_date).await {
            tracing::warn!(%run, error = %err, "saveset creation request failed");
        }
        exists(&path)
    }
}

fn exists(path: &Path) -> bool {
    path.is_file()
}
