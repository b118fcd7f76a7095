//! Per-sensor, per-module publishing of stored bin values.
//!
//! Each sensor object stores one value per module in bin `module + 1`. Every
//! (sensor, module) pair is its own series and publishes under its own
//! metric and algorithm names.

use super::runs::{publish_logged, RunWalker};
use crate::extract::MetricExtractor;
use crate::method::MethodDescriptor;
use crate::model::{MetricType, RunNumber};
use crate::options::BatchOptions;
use crate::publish::{PublishRecord, Publisher};
use crate::render::{render_overlay, Curve};
use crate::series::SeriesAccumulator;
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;

pub(crate) struct BatchJob<'a> {
    pub name: &'a str,
    pub batch: &'a BatchOptions,
    pub extractor: &'a MetricExtractor,
    pub publisher: Option<&'a dyn Publisher>,
}

pub(crate) struct SensorTrends {
    pub sensor: String,
    /// One curve per module, labelled by module number.
    pub modules: Vec<Curve>,
}

impl SensorTrends {
    pub fn point_count(&self) -> usize {
        self.modules.iter().map(|c| c.series.len()).sum()
    }
}

pub(crate) struct BatchOutcome {
    pub sensors: Vec<SensorTrends>,
    pub admitted: usize,
    pub published: usize,
}

pub(crate) async fn run_batch(
    walker: &RunWalker,
    runs: Vec<RunNumber>,
    job: &BatchJob<'_>,
) -> BatchOutcome {
    let batch = job.batch;
    let mut sensors: Vec<(String, Vec<SeriesAccumulator>)> = batch
        .sensors
        .iter()
        .map(|sensor| {
            let modules = (0..batch.modules)
                .map(|_| SeriesAccumulator::new(MetricType::Absolute))
                .collect();
            (sensor.clone(), modules)
        })
        .collect();
    let mut admitted = 0;
    let mut published = 0;

    let stream = walker.admitted(runs);
    futures::pin_mut!(stream);
    while let Some(run) = stream.next().await {
        admitted += 1;
        for (sensor, modules) in sensors.iter_mut() {
            let location = batch.location_for(sensor);
            let Some(object) = run.archive.get(&location) else {
                tracing::warn!(run = %run.run, %location, "location not found, skipping sensor");
                continue;
            };
            for (module, accumulator) in modules.iter_mut().enumerate() {
                let method = MethodDescriptor::StoredBin { bin: module + 1 };
                let sample = match job
                    .extractor
                    .extract(object, method, run.length_hours, None)
                {
                    Ok(sample) => sample,
                    Err(err) => {
                        tracing::warn!(run = %run.run, %sensor, module, error = %err, "skipping module");
                        continue;
                    }
                };
                let point = accumulator.push(run.run, &[sample]);
                let Some(publisher) = job.publisher else {
                    continue;
                };
                let record = PublishRecord {
                    run: point.run,
                    metric_name: batch.metric_for(sensor, module),
                    value: point.value,
                    error: point.error,
                    series_name: batch.metric_for(sensor, module),
                    algorithm: batch.algorithm_for(sensor, module),
                };
                if publish_logged(publisher, record).await {
                    published += 1;
                }
            }
        }
    }

    tracing::info!(admitted, published, "batch publishing finished");
    BatchOutcome {
        sensors: sensors
            .into_iter()
            .map(|(sensor, modules)| SensorTrends {
                sensor,
                modules: modules
                    .into_iter()
                    .enumerate()
                    .map(|(module, acc)| Curve {
                        label: format!("Mod {module}"),
                        series: acc.into_series(),
                    })
                    .collect(),
            })
            .collect(),
        admitted,
        published,
    }
}

/// One overlay per sensor. Sensors without points are logged and skipped.
pub(crate) fn plot_batch(
    outcome: &BatchOutcome,
    job: &BatchJob<'_>,
    y_desc: &str,
    dir: &Path,
    range_tag: &str,
) -> Result<()> {
    for trends in &outcome.sensors {
        if trends.point_count() == 0 {
            tracing::info!(sensor = %trends.sensor, "no points for sensor, skipping plot");
            continue;
        }
        let png = dir.join(job.batch.plot_file_for(job.name, &trends.sensor, range_tag));
        render_overlay(
            &job.batch.title_for(&trends.sensor),
            y_desc,
            &trends.modules,
            &png,
        )
        .with_context(|| format!("failed to plot sensor {}", trends.sensor))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::runs::testing::*;
    use super::*;
    use crate::extract::DEFAULT_HOTSPOT_PREFIX;
    use crate::histogram::archive::SavesetDump;
    use crate::histogram::{Axis, Histogram};
    use crate::publish::testing::RecordingPublisher;
    use crate::regions::RegionTable;

    fn options() -> BatchOptions {
        BatchOptions {
            sensors: vec!["VP00".into(), "VP01".into()],
            modules: 3,
            location: "VPHitEfficiencyMonitorSensor/hiteff_asic{sensor}".into(),
            metric: "velo_asic_{sensor}_mod{module}_eff".into(),
            algorithm: "rta_piquet_trends|tracking|publish_velo_{sensor}_mod{module}".into(),
            title: None,
            plot: Some("velo_asic_{sensor}_eff".into()),
        }
    }

    /// Two stored bins only, so module 2 is out of range.
    fn efficiencies(values: [f64; 2]) -> Histogram {
        let mut h = Histogram::new_1d("", Axis::new(2, 0.0, 2.0));
        h.set_content(1, 0, values[0]);
        h.set_content(2, 0, values[1]);
        h.errors = Some(vec![0.0, 0.01, 0.02, 0.0]);
        h
    }

    #[tokio::test]
    async fn publishes_every_sensor_module_pair() {
        let dir = tempfile::tempdir().unwrap();
        let metadata = StaticMetadata::default()
            .finished(600, 60)
            .finished(601, 60);
        let walker = walker(dir.path(), metadata);
        for run in [600, 601] {
            let mut dump = SavesetDump::default();
            dump.insert(
                "VPHitEfficiencyMonitorSensor/hiteff_asicVP00",
                efficiencies([0.98, 0.97]),
            );
            // VP01 only exists in the second run.
            if run == 601 {
                dump.insert(
                    "VPHitEfficiencyMonitorSensor/hiteff_asicVP01",
                    efficiencies([0.95, 0.5]),
                );
            }
            write_saveset(&walker, run, &dump);
        }

        let publisher = RecordingPublisher::default();
        let opts = options();
        let extractor = MetricExtractor::new(RegionTable::default(), DEFAULT_HOTSPOT_PREFIX);
        let job = BatchJob {
            name: "velo_asic_eff",
            batch: &opts,
            extractor: &extractor,
            publisher: Some(&publisher),
        };
        let outcome = run_batch(&walker, (600..=601).map(RunNumber).collect(), &job).await;

        assert_eq!(outcome.admitted, 2);
        // VP00: 2 runs x 2 modules, VP01: 1 run x 2 modules.
        assert_eq!(outcome.published, 6);
        assert_eq!(outcome.sensors[0].point_count(), 4);
        assert_eq!(outcome.sensors[1].point_count(), 2);
        assert!(outcome.sensors[0].modules[2].series.is_empty());

        let records = publisher.taken();
        let vp01_mod1 = records
            .iter()
            .find(|r| r.metric_name == "velo_asic_VP01_mod1_eff")
            .unwrap();
        assert_eq!(vp01_mod1.run, RunNumber(601));
        assert_eq!(vp01_mod1.value, 0.5);
        assert_eq!(vp01_mod1.error, 0.02);
        assert_eq!(
            vp01_mod1.algorithm,
            "rta_piquet_trends|tracking|publish_velo_VP01_mod1"
        );
        // Each (sensor, module) pair is its own series in the store.
        assert!(records.iter().all(|r| r.series_name == r.metric_name));
        assert_eq!(vp01_mod1.series_name, "velo_asic_VP01_mod1_eff");
        assert_eq!(outcome.sensors[1].modules[1].label, "Mod 1");
    }

    #[tokio::test]
    async fn sensors_without_points_are_not_plotted() {
        let dir = tempfile::tempdir().unwrap();
        let walker = walker(dir.path(), StaticMetadata::default());
        let opts = options();
        let extractor = MetricExtractor::new(RegionTable::default(), DEFAULT_HOTSPOT_PREFIX);
        let job = BatchJob {
            name: "velo_asic_eff",
            batch: &opts,
            extractor: &extractor,
            publisher: None,
        };
        let outcome = run_batch(&walker, vec![RunNumber(1)], &job).await;
        assert_eq!(outcome.admitted, 0);

        let figures = dir.path().join("figures");
        plot_batch(&outcome, &job, "Efficiency", &figures, "1_1").unwrap();
        assert!(!figures.exists());
    }
}
