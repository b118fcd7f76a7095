//! Scalar metric extraction from monitoring histograms.
//!
//! Count-like methods are normalized to the run length in hours so runs of
//! different durations are comparable. The directional, quadrant and
//! single-bin methods derive their error from the value of the sample
//! extracted just before them for the same run; that coupling is part of the
//! published error bars and is kept as is.

use crate::histogram::archive::RunArchive;
use crate::histogram::HistogramObject;
use crate::method::{Direction, MethodDescriptor, Quadrant};
use crate::model::MetricSample;
use crate::regions::RegionTable;
use thiserror::Error;

pub const DEFAULT_HOTSPOT_PREFIX: &str = "VPClusterMapOn";

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("location `{0}` not found in archive")]
    LocationNotFound(String),
    /// Raised by quadrant methods only. `negative` and `positive` integrate
    /// the x axis and accept 1D objects.
    #[error("`{object}` is not a 2D histogram, `{method}` needs two dimensions")]
    WrongDimensionality {
        object: String,
        method: MethodDescriptor,
    },
    #[error("`{method}` on `{object}` needs a previously extracted sample")]
    MissingPriorSample {
        object: String,
        method: MethodDescriptor,
    },
    #[error("`{method}` on `{object}` divides by a non-positive count")]
    ZeroDenominator {
        object: String,
        method: MethodDescriptor,
    },
    #[error("bin {bin} is outside 1..={nbins} of `{object}`")]
    BinOutOfRange {
        object: String,
        bin: usize,
        nbins: usize,
    },
}

impl ExtractError {
    /// A method/object mismatch points at the options, not at one run's data.
    pub fn is_configuration_mismatch(&self) -> bool {
        matches!(self, ExtractError::WrongDimensionality { .. })
    }
}

pub struct MetricExtractor {
    regions: RegionTable,
    hotspot_prefix: String,
}

impl MetricExtractor {
    pub fn new(regions: RegionTable, hotspot_prefix: impl Into<String>) -> Self {
        Self {
            regions,
            hotspot_prefix: hotspot_prefix.into(),
        }
    }

    /// Extract one sample. `prior` is the sample extracted immediately before
    /// this one for the same run, if any.
    pub fn extract(
        &self,
        object: &dyn HistogramObject,
        method: MethodDescriptor,
        run_length_hours: f64,
        prior: Option<&MetricSample>,
    ) -> Result<MetricSample, ExtractError> {
        let sample = match method {
            MethodDescriptor::Raw => {
                let entries = object.entries();
                MetricSample::new(
                    entries / run_length_hours,
                    entries.sqrt() / run_length_hours,
                )
            }
            MethodDescriptor::Mean => MetricSample::new(object.mean(), object.mean_error()),
            MethodDescriptor::Rms => MetricSample::new(object.rms(), object.rms_error()),
            MethodDescriptor::Directional(direction) => {
                let count = directional_integral(object, direction);
                coupled_count(object, method, count, run_length_hours, prior)?
            }
            MethodDescriptor::Quadrant(quadrant) => {
                let count = quadrant_integral(object, quadrant)?;
                coupled_count(object, method, count, run_length_hours, prior)?
            }
            MethodDescriptor::Bin { bin } => {
                let count = object.bin_content(bin);
                coupled_count(object, method, count, run_length_hours, prior)?
            }
            MethodDescriptor::BinRatio { bin, reference } => {
                let count = object.bin_content(bin);
                let ref_count = object.bin_content(reference);
                if count == 0.0 || ref_count == 0.0 {
                    return Err(ExtractError::ZeroDenominator {
                        object: object.name().to_string(),
                        method,
                    });
                }
                let ratio = count / ref_count;
                MetricSample::new(ratio, ((1.0 / count + 1.0 / ref_count) * ratio).sqrt())
            }
            MethodDescriptor::HotspotMean => self.hotspot_mean(object, run_length_hours),
            MethodDescriptor::StoredBin { bin } => {
                let nbins = object.nbins_x();
                if bin < 1 || bin > nbins {
                    return Err(ExtractError::BinOutOfRange {
                        object: object.name().to_string(),
                        bin,
                        nbins,
                    });
                }
                MetricSample::new(object.bin_content(bin), object.bin_error(bin))
            }
        };
        Ok(sample)
    }

    /// Extract every configured location of one run, in order.
    ///
    /// All locations are checked for presence first so a run never yields a
    /// partial sample list.
    pub fn extract_run(
        &self,
        archive: &dyn RunArchive,
        locations: &[(String, MethodDescriptor)],
        run_length_hours: f64,
    ) -> Result<Vec<MetricSample>, ExtractError> {
        let objects = locations
            .iter()
            .map(|(location, method)| {
                archive
                    .get(location)
                    .map(|obj| (obj, *method))
                    .ok_or_else(|| ExtractError::LocationNotFound(location.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut samples: Vec<MetricSample> = Vec::with_capacity(objects.len());
        for (object, method) in objects {
            let sample = self.extract(object, method, run_length_hours, samples.last())?;
            samples.push(sample);
        }
        Ok(samples)
    }

    fn hotspot_mean(&self, object: &dyn HistogramObject, run_length_hours: f64) -> MetricSample {
        let sensor = object.name().replace(&self.hotspot_prefix, "");
        let Some(region) = self.regions.get(&sensor) else {
            tracing::warn!(sensor = %sensor, "sensor has no registered hotspot region");
            return MetricSample::zero();
        };
        let Some(((x_lo, x_hi), (y_lo, y_hi))) = region.bounds() else {
            return MetricSample::zero();
        };

        let start_x = object.find_bin_x(x_lo);
        let end_x = object.find_bin_x(x_hi);
        let start_y = object.find_bin_y(y_lo);
        let end_y = object.find_bin_y(y_hi);
        let n_bins = (end_x as i64 - start_x as i64 + 1) * (end_y as i64 - start_y as i64 + 1);
        if n_bins <= 0 {
            return MetricSample::zero();
        }
        let integral = object.integral_2d(start_x, end_x, start_y, end_y);
        if integral <= 0.0 {
            return MetricSample::zero();
        }

        let n_bins = n_bins as f64;
        MetricSample::new(
            integral / n_bins / run_length_hours,
            integral.sqrt() / n_bins / run_length_hours,
        )
    }
}

fn coupled_count(
    object: &dyn HistogramObject,
    method: MethodDescriptor,
    count: f64,
    run_length_hours: f64,
    prior: Option<&MetricSample>,
) -> Result<MetricSample, ExtractError> {
    let prior = prior.ok_or_else(|| ExtractError::MissingPriorSample {
        object: object.name().to_string(),
        method,
    })?;
    if count <= 0.0 {
        return Err(ExtractError::ZeroDenominator {
            object: object.name().to_string(),
            method,
        });
    }
    Ok(MetricSample::new(
        count / run_length_hours,
        prior.value / count.sqrt(),
    ))
}

/// Integral over one sign of x. The zero bin is included on both sides.
/// 1D objects integrate their only axis; 2D objects take the full y range.
fn directional_integral(object: &dyn HistogramObject, direction: Direction) -> f64 {
    let nx = object.nbins_x();
    let zero_x = object.find_bin_x(0.0);
    let (x_lo, x_hi) = match direction {
        Direction::Negative => (1, zero_x),
        Direction::Positive => (zero_x, nx),
    };
    if object.is_2d() {
        object.integral_2d(x_lo, x_hi, 1, object.nbins_y())
    } else {
        object.integral(x_lo, x_hi)
    }
}

/// Integral over one quadrant around the origin, zero bins included.
fn quadrant_integral(object: &dyn HistogramObject, quadrant: Quadrant) -> Result<f64, ExtractError> {
    if !object.is_2d() {
        return Err(ExtractError::WrongDimensionality {
            object: object.name().to_string(),
            method: MethodDescriptor::Quadrant(quadrant),
        });
    }
    let nx = object.nbins_x();
    let ny = object.nbins_y();
    let zero_x = object.find_bin_x(0.0);
    let zero_y = object.find_bin_y(0.0);
    let integral = match quadrant {
        Quadrant::First => object.integral_2d(zero_x, nx, zero_y, ny),
        Quadrant::Second => object.integral_2d(1, zero_x, zero_y, ny),
        Quadrant::Third => object.integral_2d(1, zero_x, 1, zero_y),
        Quadrant::Fourth => object.integral_2d(zero_x, nx, 1, zero_y),
    };
    Ok(integral)
}
