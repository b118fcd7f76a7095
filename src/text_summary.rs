//! Text summary builder for CLI output.
//!
//! This module computes metrics over a finished pipeline and formats
//! human-readable lines for stdout.

use crate::metrics;
use crate::orchestrator::{BatchOutcome, TrendOutcome};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary of a single-metric trend.
pub(crate) fn build_text_summary(name: &str, outcome: &TrendOutcome) -> TextSummary {
    let series = &outcome.series;
    let mut lines = vec![
        format!("Series: {name}"),
        format!(
            "Runs: {} admitted, {} points, {} published",
            outcome.admitted,
            series.len(),
            outcome.published
        ),
    ];

    let first_last = series.points.first().zip(series.points.last());
    if let Some((first, last)) = first_last {
        lines.push(format!("Run span: {} .. {}", first.run, last.run));
    }

    let values: Vec<f64> = series.published().map(|p| p.value).collect();
    match metrics::compute_metrics(&values) {
        Some((mean, median, p25, p75)) => lines.push(format!(
            "Value: avg {:.4} med {:.4} p25 {:.4} p75 {:.4}",
            mean, median, p25, p75
        )),
        None => lines.push("Value: no publishable points".to_string()),
    }

    let withheld = series.len() - series.published().count();
    if withheld > 0 {
        lines.push(format!("Unphysical points withheld from publishing: {withheld}"));
    }

    TextSummary { lines }
}

/// Build a text summary of a per-sensor batch.
pub(crate) fn build_batch_summary(name: &str, outcome: &BatchOutcome) -> TextSummary {
    let mut lines = vec![
        format!("Batch: {name}"),
        format!(
            "Runs: {} admitted, {} points published",
            outcome.admitted, outcome.published
        ),
    ];
    for trends in &outcome.sensors {
        let values: Vec<f64> = trends
            .modules
            .iter()
            .flat_map(|c| c.series.values())
            .collect();
        match metrics::compute_metrics(&values) {
            Some((mean, median, p25, p75)) => lines.push(format!(
                "{}: {} points, avg {:.4} med {:.4} p25 {:.4} p75 {:.4}",
                trends.sensor,
                values.len(),
                mean,
                median,
                p25,
                p75
            )),
            None => lines.push(format!("{}: no points", trends.sensor)),
        }
    }
    TextSummary { lines }
}
