//! Histogram primitives consumed by metric extraction.
//!
//! The storage format of saveset archives is owned by the monitoring framework;
//! this module only fixes the narrow query surface the pipeline needs
//! ([`HistogramObject`]) and ships a plain in-memory implementation
//! ([`Histogram`]) backing the JSON archive dumps in [`archive`].

pub mod archive;

use serde::{Deserialize, Serialize};

/// Statistics and bin queries over a 1D or 2D distribution.
///
/// Bin indices follow the usual monitoring convention: `0` is underflow,
/// `1..=n` are in range and `n + 1` is overflow. For 2D objects the global
/// index is `ix + (nx + 2) * iy`.
pub trait HistogramObject {
    fn name(&self) -> &str;
    fn entries(&self) -> f64;
    fn is_2d(&self) -> bool;
    fn nbins_x(&self) -> usize;
    /// `1` for 1D objects.
    fn nbins_y(&self) -> usize;
    fn find_bin_x(&self, x: f64) -> usize;
    fn find_bin_y(&self, y: f64) -> usize;
    fn bin_content(&self, bin: usize) -> f64;
    fn bin_error(&self, bin: usize) -> f64;
    fn mean(&self) -> f64;
    fn mean_error(&self) -> f64;
    fn rms(&self) -> f64;
    fn rms_error(&self) -> f64;
    /// Sum of x bins `lo..=hi` (all in-range y bins for 2D objects).
    fn integral(&self, lo: usize, hi: usize) -> f64;
    fn integral_2d(&self, x_lo: usize, x_hi: usize, y_lo: usize, y_hi: usize) -> f64;
}

/// Fixed-width binning along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Axis {
    pub bins: usize,
    pub min: f64,
    pub max: f64,
}

impl Axis {
    pub fn new(bins: usize, min: f64, max: f64) -> Self {
        Self { bins, min, max }
    }

    pub fn width(&self) -> f64 {
        (self.max - self.min) / self.bins as f64
    }

    pub fn find_bin(&self, x: f64) -> usize {
        if x < self.min {
            0
        } else if x >= self.max {
            self.bins + 1
        } else {
            let bin = ((x - self.min) / (self.max - self.min) * self.bins as f64) as usize;
            1 + bin.min(self.bins - 1)
        }
    }

    pub fn center(&self, bin: usize) -> f64 {
        self.min + (bin as f64 - 0.5) * self.width()
    }

    fn is_valid(&self) -> bool {
        self.bins > 0 && self.max > self.min
    }
}

/// In-memory histogram with under/overflow cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Histogram {
    #[serde(default)]
    pub name: String,
    pub entries: f64,
    pub x: Axis,
    #[serde(default)]
    pub y: Option<Axis>,
    /// `(nx + 2)` cells for 1D, `(nx + 2) * (ny + 2)` for 2D.
    pub contents: Vec<f64>,
    /// Per-cell errors; `sqrt(|content|)` when absent.
    #[serde(default)]
    pub errors: Option<Vec<f64>>,
}

impl Histogram {
    pub fn new_1d(name: impl Into<String>, x: Axis) -> Self {
        Self {
            name: name.into(),
            entries: 0.0,
            x,
            y: None,
            contents: vec![0.0; x.bins + 2],
            errors: None,
        }
    }

    pub fn new_2d(name: impl Into<String>, x: Axis, y: Axis) -> Self {
        Self {
            name: name.into(),
            entries: 0.0,
            x,
            y: Some(y),
            contents: vec![0.0; (x.bins + 2) * (y.bins + 2)],
            errors: None,
        }
    }

    pub fn cell_count(&self) -> usize {
        match self.y {
            Some(y) => (self.x.bins + 2) * (y.bins + 2),
            None => self.x.bins + 2,
        }
    }

    /// Checks axis sanity and that the cell vectors match the binning.
    pub fn validate(&self) -> Result<(), String> {
        if !self.x.is_valid() || self.y.as_ref().is_some_and(|y| !y.is_valid()) {
            return Err(format!("{}: invalid axis definition", self.name));
        }
        let expected = self.cell_count();
        if self.contents.len() != expected {
            return Err(format!(
                "{}: expected {} cells, found {}",
                self.name,
                expected,
                self.contents.len()
            ));
        }
        if let Some(errors) = &self.errors {
            if errors.len() != expected {
                return Err(format!(
                    "{}: expected {} errors, found {}",
                    self.name,
                    expected,
                    errors.len()
                ));
            }
        }
        Ok(())
    }

    pub fn global_bin(&self, ix: usize, iy: usize) -> usize {
        ix + (self.x.bins + 2) * iy
    }

    pub fn set_content(&mut self, ix: usize, iy: usize, value: f64) {
        let bin = self.global_bin(ix, iy);
        self.contents[bin] = value;
    }

    fn cell(&self, ix: usize, iy: usize) -> f64 {
        self.contents
            .get(self.global_bin(ix, iy))
            .copied()
            .unwrap_or(0.0)
    }

    fn cell_error_sq(&self, bin: usize) -> f64 {
        match &self.errors {
            Some(errors) => errors.get(bin).map(|e| e * e).unwrap_or(0.0),
            None => self.contents.get(bin).map(|c| c.abs()).unwrap_or(0.0),
        }
    }

    fn y_bins(&self) -> usize {
        self.y.map(|y| y.bins).unwrap_or(0)
    }

    /// `(sumw, sumw2, sumwx, sumwx2)` over in-range cells, projected on x.
    fn x_moments(&self) -> (f64, f64, f64, f64) {
        let (y_lo, y_hi) = if self.y.is_some() {
            (1, self.y_bins())
        } else {
            (0, 0)
        };
        let mut sums = (0.0, 0.0, 0.0, 0.0);
        for iy in y_lo..=y_hi {
            for ix in 1..=self.x.bins {
                let w = self.cell(ix, iy);
                let xc = self.x.center(ix);
                sums.0 += w;
                sums.1 += self.cell_error_sq(self.global_bin(ix, iy));
                sums.2 += w * xc;
                sums.3 += w * xc * xc;
            }
        }
        sums
    }

    fn effective_entries(&self) -> f64 {
        let (sumw, sumw2, _, _) = self.x_moments();
        if sumw2 > 0.0 {
            sumw * sumw / sumw2
        } else {
            0.0
        }
    }
}

impl HistogramObject for Histogram {
    fn name(&self) -> &str {
        &self.name
    }

    fn entries(&self) -> f64 {
        self.entries
    }

    fn is_2d(&self) -> bool {
        self.y.is_some()
    }

    fn nbins_x(&self) -> usize {
        self.x.bins
    }

    fn nbins_y(&self) -> usize {
        self.y.map(|y| y.bins).unwrap_or(1)
    }

    fn find_bin_x(&self, x: f64) -> usize {
        self.x.find_bin(x)
    }

    fn find_bin_y(&self, y: f64) -> usize {
        self.y.map(|axis| axis.find_bin(y)).unwrap_or(0)
    }

    fn bin_content(&self, bin: usize) -> f64 {
        self.contents.get(bin).copied().unwrap_or(0.0)
    }

    fn bin_error(&self, bin: usize) -> f64 {
        self.cell_error_sq(bin).sqrt()
    }

    fn mean(&self) -> f64 {
        let (sumw, _, sumwx, _) = self.x_moments();
        if sumw == 0.0 {
            0.0
        } else {
            sumwx / sumw
        }
    }

    fn mean_error(&self) -> f64 {
        let neff = self.effective_entries();
        if neff > 0.0 {
            self.rms() / neff.sqrt()
        } else {
            0.0
        }
    }

    fn rms(&self) -> f64 {
        let (sumw, _, sumwx, sumwx2) = self.x_moments();
        if sumw == 0.0 {
            return 0.0;
        }
        let mean = sumwx / sumw;
        (sumwx2 / sumw - mean * mean).max(0.0).sqrt()
    }

    fn rms_error(&self) -> f64 {
        let neff = self.effective_entries();
        if neff > 0.0 {
            self.rms() / (2.0 * neff).sqrt()
        } else {
            0.0
        }
    }

    fn integral(&self, lo: usize, hi: usize) -> f64 {
        match self.y {
            Some(y) => self.integral_2d(lo, hi, 1, y.bins),
            None => {
                let hi = hi.min(self.x.bins + 1);
                (lo..=hi).map(|ix| self.cell(ix, 0)).sum()
            }
        }
    }

    fn integral_2d(&self, x_lo: usize, x_hi: usize, y_lo: usize, y_hi: usize) -> f64 {
        if self.y.is_none() {
            return self.integral(x_lo, x_hi);
        }
        let x_hi = x_hi.min(self.x.bins + 1);
        let y_hi = y_hi.min(self.y_bins() + 1);
        let mut sum = 0.0;
        for iy in y_lo..=y_hi {
            for ix in x_lo..=x_hi {
                sum += self.cell(ix, iy);
            }
        }
        sum
    }
}
