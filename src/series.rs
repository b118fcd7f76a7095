//! Combination of per-location samples into an ordered run series.

use crate::model::{MetricSample, MetricType, RunNumber, Series, SeriesPoint};

/// Combine one run's samples according to the metric type.
///
/// Ratios with a zero numerator or denominator become a zero point that is
/// kept for plotting but flagged as not publishable.
pub fn combine(run: RunNumber, samples: &[MetricSample], metric_type: MetricType) -> SeriesPoint {
    match metric_type {
        MetricType::Absolute => {
            let s = samples.first().copied().unwrap_or_default();
            SeriesPoint {
                run,
                value: s.value,
                error: s.error,
                publish: true,
            }
        }
        MetricType::Ratio => {
            let (num, den) = match samples {
                [num, den, ..] => (num, den),
                _ => return unphysical(run),
            };
            if num.value == 0.0 || den.value == 0.0 {
                return unphysical(run);
            }
            let value = num.value / den.value;
            let error = value
                * ((num.error / num.value).powi(2) + (den.error / den.value).powi(2)).sqrt();
            SeriesPoint {
                run,
                value,
                error,
                publish: true,
            }
        }
    }
}

fn unphysical(run: RunNumber) -> SeriesPoint {
    SeriesPoint {
        run,
        value: 0.0,
        error: 0.0,
        publish: false,
    }
}

/// Builds a [`Series`] one admitted run at a time, in processing order.
#[derive(Debug)]
pub struct SeriesAccumulator {
    metric_type: MetricType,
    series: Series,
}

impl SeriesAccumulator {
    pub fn new(metric_type: MetricType) -> Self {
        Self {
            metric_type,
            series: Series::default(),
        }
    }

    pub fn push(&mut self, run: RunNumber, samples: &[MetricSample]) -> SeriesPoint {
        let point = combine(run, samples, self.metric_type);
        self.series.points.push(point);
        point
    }

    pub fn into_series(self) -> Series {
        self.series
    }
}
