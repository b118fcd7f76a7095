//! Trend plots.
//!
//! One category per admitted run along x, labelled with the run number.
//! Charts are 1200x800 and written as PNG plus a PDF companion. The PDF is
//! converted from the same chart drawn as SVG.

use crate::model::{RunNumber, Series};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::FontTransform;
use std::path::Path;
use thiserror::Error;

const CHART_SIZE: (u32, u32) = (1200, 800);

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to create drawing area: {0}")]
    DrawingArea(String),

    #[error("Failed to configure chart: {0}")]
    ChartConfig(String),

    #[error("Failed to draw chart elements: {0}")]
    Drawing(String),

    #[error("Failed to prepare output directory: {0}")]
    FileSave(#[from] std::io::Error),

    #[error("Failed to convert chart to PDF: {0}")]
    Pdf(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

type Result<T> = core::result::Result<T, PlotError>;

/// Display range for a trend.
///
/// Upper outliers are suppressed by working from the mean when the maximum
/// exceeds five times the mean. Series that reach zero or below are shown
/// around zero from their extremes instead.
pub fn y_axis_range(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let minimum = values.iter().copied().fold(f64::INFINITY, f64::min);
    let maximum = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let mut working_maximum = mean;
    if 5.0 * mean > maximum {
        working_maximum = maximum;
    }

    if minimum > 0.0 {
        Some((0.0, 1.5 * working_maximum))
    } else if maximum > 0.0 {
        Some((1.5 * minimum, 1.5 * maximum))
    } else {
        Some((1.5 * minimum, 0.5 * maximum))
    }
}

/// plotters needs a non-empty range.
fn drawable(range: (f64, f64)) -> (f64, f64) {
    let (lo, hi) = range;
    if hi > lo {
        (lo, hi)
    } else {
        (lo - 0.5, lo + 0.5)
    }
}

pub struct TrendRenderer {
    pub title: String,
    pub y_axis_title: String,
    /// Explicit range from the options; the heuristic applies otherwise.
    pub y_range: Option<(f64, f64)>,
}

impl TrendRenderer {
    pub fn range_for(&self, series: &Series) -> Option<(f64, f64)> {
        self.y_range.or_else(|| y_axis_range(&series.values()))
    }

    /// Write `<stem>.png` and `<stem>.pdf` into `dir`.
    pub fn render(&self, series: &Series, dir: &Path, stem: &str) -> Result<()> {
        let range = self
            .range_for(series)
            .ok_or_else(|| PlotError::InvalidData("series is empty".to_string()))?;
        std::fs::create_dir_all(dir)?;

        let png = dir.join(format!("{stem}.png"));
        self.draw(
            BitMapBackend::new(&png, CHART_SIZE).into_drawing_area(),
            series,
            drawable(range),
        )?;
        let mut svg = String::new();
        self.draw(
            SVGBackend::with_string(&mut svg, CHART_SIZE).into_drawing_area(),
            series,
            drawable(range),
        )?;
        let pdf = dir.join(format!("{stem}.pdf"));
        write_pdf(&svg, &pdf)?;
        tracing::info!(png = %png.display(), pdf = %pdf.display(), "trend plot written");
        Ok(())
    }

    fn draw<DB: DrawingBackend>(
        &self,
        root: DrawingArea<DB, Shift>,
        series: &Series,
        (lo, hi): (f64, f64),
    ) -> Result<()> {
        root.fill(&WHITE)
            .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

        let runs: Vec<RunNumber> = series.runs().collect();
        let mut chart = ChartBuilder::on(&root)
            .caption(&self.title, ("sans-serif", 30))
            .margin(20)
            .x_label_area_size(90)
            .y_label_area_size(90)
            .build_cartesian_2d((0..runs.len() as i32).into_segmented(), lo..hi)
            .map_err(|e| PlotError::ChartConfig(e.to_string()))?;

        let run_label = |v: &SegmentValue<i32>| match v {
            SegmentValue::CenterOf(i) => runs
                .get(*i as usize)
                .map(|r| r.to_string())
                .unwrap_or_default(),
            _ => String::new(),
        };
        chart
            .configure_mesh()
            .disable_x_mesh()
            .x_labels(runs.len())
            .x_label_formatter(&run_label)
            .x_label_style(
                ("sans-serif", 14)
                    .into_font()
                    .transform(FontTransform::Rotate90),
            )
            .x_desc("Run")
            .y_desc(self.y_axis_title.as_str())
            .label_style(("sans-serif", 16))
            .draw()
            .map_err(|e| PlotError::Drawing(e.to_string()))?;

        chart
            .draw_series(series.points.iter().enumerate().map(|(i, p)| {
                ErrorBar::new_vertical(
                    SegmentValue::CenterOf(i as i32),
                    p.value - p.error,
                    p.value,
                    p.value + p.error,
                    BLUE.filled(),
                    6,
                )
            }))
            .map_err(|e| PlotError::Drawing(e.to_string()))?;
        chart
            .draw_series(series.points.iter().enumerate().map(|(i, p)| {
                Circle::new((SegmentValue::CenterOf(i as i32), p.value), 3, BLUE.filled())
            }))
            .map_err(|e| PlotError::Drawing(e.to_string()))?;

        root.present()
            .map_err(|e| PlotError::Drawing(e.to_string()))?;
        Ok(())
    }
}

/// Convert an SVG document to a single-page PDF at `path`.
///
/// Text needs a matching system font; without one the labels are dropped
/// and the rest of the chart is kept.
fn write_pdf(svg: &str, path: &Path) -> Result<()> {
    let mut options = svg2pdf::usvg::Options::default();
    options.fontdb_mut().load_system_fonts();
    let tree = svg2pdf::usvg::Tree::from_str(svg, &options)
        .map_err(|e| PlotError::Pdf(e.to_string()))?;
    let pdf = svg2pdf::to_pdf(
        &tree,
        svg2pdf::ConversionOptions::default(),
        svg2pdf::PageOptions::default(),
    )
    .map_err(|e| PlotError::Pdf(e.to_string()))?;
    std::fs::write(path, pdf)?;
    Ok(())
}

/// One labelled curve of an overlay.
pub struct Curve {
    pub label: String,
    pub series: Series,
}

/// Several curves against the run number, one colour each.
pub fn render_overlay(title: &str, y_desc: &str, curves: &[Curve], png: &Path) -> Result<()> {
    let all = curves.iter().flat_map(|c| c.series.points.iter());
    let (mut x_lo, mut x_hi, mut y_lo, mut y_hi) = (
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
    );
    for p in all {
        x_lo = x_lo.min(p.run.0 as f64);
        x_hi = x_hi.max(p.run.0 as f64);
        y_lo = y_lo.min(p.value - p.error);
        y_hi = y_hi.max(p.value + p.error);
    }
    if !x_lo.is_finite() {
        return Err(PlotError::InvalidData("no points to draw".to_string()));
    }
    let pad = ((y_hi - y_lo) * 0.1).max(1e-3);
    let (y_lo, y_hi) = (y_lo - pad, y_hi + pad);
    let (x_lo, x_hi) = (x_lo - 0.5, x_hi + 0.5);

    if let Some(dir) = png.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let root = BitMapBackend::new(png, (1400, 700)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::DrawingArea(e.to_string()))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(80)
        .build_cartesian_2d(x_lo..x_hi, y_lo..y_hi)
        .map_err(|e| PlotError::ChartConfig(e.to_string()))?;
    chart
        .configure_mesh()
        .x_desc("Run Number")
        .y_desc(y_desc)
        .x_label_formatter(&|x| format!("{:.0}", x))
        .x_labels(5)
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    for (idx, curve) in curves.iter().enumerate() {
        if curve.series.is_empty() {
            continue;
        }
        let color = Palette99::pick(idx).to_rgba();
        chart
            .draw_series(curve.series.points.iter().map(|p| {
                ErrorBar::new_vertical(
                    p.run.0 as f64,
                    p.value - p.error,
                    p.value,
                    p.value + p.error,
                    color.filled(),
                    4,
                )
            }))
            .map_err(|e| PlotError::Drawing(e.to_string()))?;
        chart
            .draw_series(
                curve
                    .series
                    .points
                    .iter()
                    .map(|p| Circle::new((p.run.0 as f64, p.value), 3, color.filled())),
            )
            .map_err(|e| PlotError::Drawing(e.to_string()))?
            .label(curve.label.as_str())
            .legend(move |(x, y)| Circle::new((x, y), 3, color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Drawing(e.to_string()))?;
    tracing::info!(png = %png.display(), "overlay plot written");
    Ok(())
}
