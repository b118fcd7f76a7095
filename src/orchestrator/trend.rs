//! Single-metric trend pipeline.

use super::runs::{publish_logged, RunWalker};
use crate::extract::MetricExtractor;
use crate::model::{RunNumber, Series};
use crate::options::TrendSpec;
use crate::publish::{PublishRecord, Publisher};
use crate::render::TrendRenderer;
use crate::series::SeriesAccumulator;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;

pub(crate) struct TrendJob<'a> {
    /// Series name; also the published metric name.
    pub name: &'a str,
    pub algorithm: &'a str,
    pub spec: &'a TrendSpec,
    pub extractor: &'a MetricExtractor,
    pub publisher: Option<&'a dyn Publisher>,
}

#[derive(Debug, Default)]
pub(crate) struct TrendOutcome {
    pub series: Series,
    pub admitted: usize,
    pub published: usize,
}

/// Walk `runs`, extract one point per usable run and publish the physical ones.
///
/// A method that does not fit its object aborts the whole pipeline; every
/// other extraction failure only skips the run.
pub(crate) async fn run_trend(
    walker: &RunWalker,
    runs: Vec<RunNumber>,
    job: &TrendJob<'_>,
) -> Result<TrendOutcome> {
    let mut accumulator = SeriesAccumulator::new(job.spec.metric_type);
    let mut admitted = 0;
    let mut published = 0;

    let stream = walker.admitted(runs);
    futures::pin_mut!(stream);
    while let Some(run) = stream.next().await {
        admitted += 1;
        let samples = match job.extractor.extract_run(
            run.archive.as_ref(),
            &job.spec.locations,
            run.length_hours,
        ) {
            Ok(samples) => samples,
            Err(err) if err.is_configuration_mismatch() => {
                tracing::error!(run = %run.run, error = %err, "method does not fit its object");
                return Err(err).with_context(|| format!("extracting run {}", run.run));
            }
            Err(err) => {
                tracing::warn!(run = %run.run, error = %err, "skipping run");
                continue;
            }
        };

        let point = accumulator.push(run.run, &samples);
        if !point.publish {
            tracing::info!(run = %run.run, "unphysical point kept for plotting only");
            continue;
        }
        if let Some(publisher) = job.publisher {
            let record = PublishRecord {
                run: point.run,
                metric_name: job.name.to_string(),
                value: point.value,
                error: point.error,
                series_name: job.name.to_string(),
                algorithm: job.algorithm.to_string(),
            };
            if publish_logged(publisher, record).await {
                published += 1;
            }
        }
    }

    Ok(TrendOutcome {
        series: accumulator.into_series(),
        admitted,
        published,
    })
}

/// Draw the series, or warn when there is nothing to draw.
pub(crate) fn plot_trend(
    series: &Series,
    renderer: &TrendRenderer,
    dir: &Path,
    stem: &str,
) -> Result<()> {
    if series.is_empty() {
        tracing::warn!(series = stem, "no points in range, nothing to plot");
        return Ok(());
    }
    renderer
        .render(series, dir, stem)
        .with_context(|| format!("failed to plot {stem} into {}", dir.display()))
}

#[cfg(test)]
mod tests {
    use super::super::runs::testing::*;
    use super::*;
    use crate::extract::{ExtractError, DEFAULT_HOTSPOT_PREFIX};
    use crate::histogram::archive::SavesetDump;
    use crate::histogram::{Axis, Histogram};
    use crate::method::MethodDescriptor;
    use crate::model::MetricType;
    use crate::publish::testing::RecordingPublisher;
    use crate::regions::RegionTable;

    fn counts(entries: f64) -> Histogram {
        let mut h = Histogram::new_1d("", Axis::new(4, 0.0, 4.0));
        h.entries = entries;
        h
    }

    fn dump(objects: &[(&str, Histogram)]) -> SavesetDump {
        let mut dump = SavesetDump::default();
        for (location, h) in objects {
            dump.insert(*location, h.clone());
        }
        dump
    }

    fn extractor() -> MetricExtractor {
        MetricExtractor::new(RegionTable::default(), DEFAULT_HOTSPOT_PREFIX)
    }

    fn ratio_spec() -> TrendSpec {
        TrendSpec {
            metric_type: MetricType::Ratio,
            locations: vec![
                ("Mon/a".into(), MethodDescriptor::Raw),
                ("Mon/b".into(), MethodDescriptor::Raw),
            ],
        }
    }

    #[tokio::test]
    async fn ratio_trend_over_a_mixed_range() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = StaticMetadata::default()
            .finished(200, 60)
            .created(201)
            .finished(202, 60)
            .finished(203, 60)
            .finished(204, 4);
        let walker = walker(dir.path(), metadata);
        write_saveset(&walker, 200, &dump(&[("Mon/a", counts(400.0)), ("Mon/b", counts(100.0))]));
        // Missing the second location: the whole run is dropped.
        write_saveset(&walker, 202, &dump(&[("Mon/a", counts(400.0))]));
        // Empty numerator: kept in the series, never published.
        write_saveset(&walker, 203, &dump(&[("Mon/a", counts(0.0)), ("Mon/b", counts(100.0))]));
        write_saveset(&walker, 204, &dump(&[("Mon/a", counts(9.0)), ("Mon/b", counts(9.0))]));

        let publisher = RecordingPublisher::default();
        let spec = ratio_spec();
        let extractor = extractor();
        let job = TrendJob {
            name: "a_over_b",
            algorithm: "rta_piquet_trends|test|a_over_b",
            spec: &spec,
            extractor: &extractor,
            publisher: Some(&publisher),
        };
        let outcome = run_trend(&walker, (200..=204).map(RunNumber).collect(), &job)
            .await
            .unwrap();

        assert_eq!(outcome.admitted, 3);
        assert_eq!(outcome.published, 1);
        let runs: Vec<_> = outcome.series.runs().collect();
        assert_eq!(runs, vec![RunNumber(200), RunNumber(203)]);
        assert_eq!(outcome.series.points[0].value, 4.0);
        assert!(!outcome.series.points[1].publish);

        let records = publisher.taken();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].run, RunNumber(200));
        assert_eq!(records[0].algorithm, "rta_piquet_trends|test|a_over_b");
    }

    #[tokio::test]
    async fn identical_inputs_give_identical_series() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = StaticMetadata::default()
            .finished(300, 90)
            .finished(301, 120);
        let walker = walker(dir.path(), metadata);
        let mut h = Histogram::new_2d("", Axis::new(2, -1.0, 1.0), Axis::new(2, -1.0, 1.0));
        h.entries = 40.0;
        h.set_content(2, 2, 16.0);
        for run in [300, 301] {
            write_saveset(&walker, run, &dump(&[("Mon/a", counts(40.0)), ("Mon/q", h.clone())]));
        }
        let spec = TrendSpec {
            metric_type: MetricType::Ratio,
            locations: vec![
                ("Mon/a".into(), MethodDescriptor::Raw),
                ("Mon/q".into(), "quadrant1".parse().unwrap()),
            ],
        };
        let extractor = extractor();
        let job = TrendJob {
            name: "q",
            algorithm: "a",
            spec: &spec,
            extractor: &extractor,
            publisher: None,
        };

        let first = run_trend(&walker, (300..=301).map(RunNumber).collect(), &job).await.unwrap();
        let second = run_trend(&walker, (300..=301).map(RunNumber).collect(), &job).await.unwrap();
        assert_eq!(first.series.len(), 2);
        assert_eq!(first.series, second.series);
        assert_eq!(first.published, 0);
    }

    #[tokio::test]
    async fn publish_failures_do_not_stop_the_walk() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = StaticMetadata::default()
            .finished(400, 60)
            .finished(401, 60)
            .finished(402, 60);
        let walker = walker(dir.path(), metadata);
        for run in [400, 401, 402] {
            write_saveset(&walker, run, &dump(&[("Mon/a", counts(4.0)), ("Mon/b", counts(2.0))]));
        }
        let publisher = RecordingPublisher {
            failing_runs: vec![RunNumber(401)],
            ..Default::default()
        };
        let spec = ratio_spec();
        let extractor = extractor();
        let job = TrendJob {
            name: "r",
            algorithm: "a",
            spec: &spec,
            extractor: &extractor,
            publisher: Some(&publisher),
        };
        let outcome = run_trend(&walker, (400..=402).map(RunNumber).collect(), &job)
            .await
            .unwrap();
        assert_eq!(outcome.series.len(), 3);
        assert_eq!(outcome.published, 2);
        let runs: Vec<_> = publisher.taken().iter().map(|r| r.run).collect();
        assert_eq!(runs, vec![RunNumber(400), RunNumber(402)]);
    }

    #[tokio::test]
    async fn dimensionality_mismatch_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let walker = walker(dir.path(), StaticMetadata::default().finished(500, 60));
        write_saveset(&walker, 500, &dump(&[("Mon/a", counts(4.0)), ("Mon/b", counts(2.0))]));
        let spec = TrendSpec {
            metric_type: MetricType::Ratio,
            locations: vec![
                ("Mon/a".into(), MethodDescriptor::Raw),
                ("Mon/b".into(), "quadrant3".parse().unwrap()),
            ],
        };
        let extractor = extractor();
        let job = TrendJob {
            name: "q",
            algorithm: "a",
            spec: &spec,
            extractor: &extractor,
            publisher: None,
        };
        let err = run_trend(&walker, vec![RunNumber(500)], &job).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ExtractError>(),
            Some(ExtractError::WrongDimensionality { .. })
        ));
    }

    #[test]
    fn empty_series_is_not_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = TrendRenderer {
            title: "t".into(),
            y_axis_title: "y".into(),
            y_range: None,
        };
        plot_trend(&Series::default(), &renderer, dir.path(), "t_1_2").unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
