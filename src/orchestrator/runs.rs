//! Run walking shared by both pipelines.
//!
//! Metadata may be resolved a few runs ahead, but runs always come out in
//! range order and admission itself is sequential.

use crate::admission::{Admission, AdmittedRun, RunAdmissionFilter};
use crate::histogram::archive::ArchiveOpener;
use crate::locator::RunFileLocator;
use crate::model::{RunMetadata, RunNumber};
use crate::publish::{PublishRecord, Publisher};
use crate::rundb::{MetadataError, RunMetadataResolver};
use futures::stream::{self, Stream, StreamExt};

pub(crate) struct RunWalker {
    pub resolver: RunMetadataResolver,
    pub locator: RunFileLocator,
    pub opener: Box<dyn ArchiveOpener>,
    pub filter: RunAdmissionFilter,
    pub provider: String,
    pub fetch_concurrency: usize,
}

impl RunWalker {
    /// Admitted runs of `runs`, in the order given.
    pub(crate) fn admitted(&self, runs: Vec<RunNumber>) -> impl Stream<Item = AdmittedRun> + '_ {
        stream::iter(runs)
            .map(move |run| async move { (run, self.resolver.resolve(run).await) })
            .buffered(self.fetch_concurrency.max(1))
            .filter_map(move |(run, meta)| self.admit(run, meta))
    }

    async fn admit(
        &self,
        run: RunNumber,
        meta: Result<RunMetadata, MetadataError>,
    ) -> Option<AdmittedRun> {
        let meta = match meta {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(%run, error = %err, "skipping run");
                return None;
            }
        };
        match self
            .filter
            .admit(run, &meta, &self.provider, &self.locator, self.opener.as_ref())
            .await
        {
            Admission::Admit(admitted) => {
                tracing::info!(%run, hours = admitted.length_hours, "run admitted");
                Some(admitted)
            }
            Admission::Reject(reason) => {
                tracing::info!(%run, %reason, "skipping run");
                None
            }
        }
    }
}

/// Publish one record. Failures are logged and reported as `false`.
pub(crate) async fn publish_logged(publisher: &dyn Publisher, record: PublishRecord) -> bool {
    let run = record.run;
    let metric = record.metric_name.clone();
    match publisher.publish(record).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(%run, %metric, error = %err, "publish failed");
            false
        }
    }
}
