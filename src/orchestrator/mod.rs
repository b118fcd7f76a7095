//! Pipeline orchestration.
//!
//! Both pipelines walk the run range through the same resolver, admission
//! filter and archive opener, then extract with the same [`MetricExtractor`]
//! and accumulate with [`SeriesAccumulator`]. They differ only in which
//! objects they read and how points are named when published.
//!
//! [`MetricExtractor`]: crate::extract::MetricExtractor
//! [`SeriesAccumulator`]: crate::series::SeriesAccumulator

mod batch;
mod runs;
mod trend;

pub(crate) use batch::{plot_batch, run_batch, BatchJob, BatchOutcome};
pub(crate) use runs::RunWalker;
pub(crate) use trend::{plot_trend, run_trend, TrendJob, TrendOutcome};
