//! Options units: TOML files describing one trend metric or one batch of
//! per-sensor metrics.

use crate::extract::DEFAULT_HOTSPOT_PREFIX;
use crate::locator::DEFAULT_FILE_SUFFIX;
use crate::method::MethodDescriptor;
use crate::model::MetricType;
use crate::regions::{RegionOfInterest, RegionTable};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PROVIDER: &str = "RecoMon";
pub const ALGORITHM_PREFIX: &str = "rta_piquet_trends|";

const TREND_REQUIRED_KEYS: &[&str] = &["name", "type", "locations", "method", "y_axis_title"];
const BATCH_REQUIRED_KEYS: &[&str] = &["name", "batch"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read options file {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse options file {}: {source}", .path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("options are missing required keys; required {required:?}, provided {provided:?}")]
    MissingKeys {
        required: Vec<String>,
        provided: Vec<String>,
    },
    #[error("{0}")]
    Inconsistent(String),
}

#[derive(Debug, Deserialize)]
struct RawOptions {
    name: Option<String>,
    #[serde(rename = "type")]
    metric_type: Option<MetricType>,
    locations: Option<Vec<String>>,
    method: Option<Vec<MethodDescriptor>>,
    y_axis_title: Option<String>,
    provider: Option<String>,
    y_range: Option<[f64; 2]>,
    #[serde(default, with = "humantime_serde")]
    min_run_length: Option<Duration>,
    destination: Option<String>,
    region_preset: Option<String>,
    #[serde(default)]
    regions: HashMap<String, RegionOfInterest>,
    hotspot_name_prefix: Option<String>,
    file_suffix: Option<String>,
    batch: Option<BatchOptions>,
}

impl RawOptions {
    fn provided_keys(&self) -> Vec<String> {
        let present = [
            ("name", self.name.is_some()),
            ("type", self.metric_type.is_some()),
            ("locations", self.locations.is_some()),
            ("method", self.method.is_some()),
            ("y_axis_title", self.y_axis_title.is_some()),
            ("provider", self.provider.is_some()),
            ("y_range", self.y_range.is_some()),
            ("min_run_length", self.min_run_length.is_some()),
            ("destination", self.destination.is_some()),
            ("region_preset", self.region_preset.is_some()),
            ("regions", !self.regions.is_empty()),
            ("hotspot_name_prefix", self.hotspot_name_prefix.is_some()),
            ("file_suffix", self.file_suffix.is_some()),
            ("batch", self.batch.is_some()),
        ];
        present
            .iter()
            .filter(|(_, p)| *p)
            .map(|(k, _)| k.to_string())
            .collect()
    }
}

/// Per-sensor, per-module publishing of stored bin values.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchOptions {
    pub sensors: Vec<String>,
    pub modules: usize,
    /// Object location with a `{sensor}` placeholder.
    pub location: String,
    /// Metric name with `{sensor}` and `{module}` placeholders.
    pub metric: String,
    /// Algorithm identifier with `{sensor}` and `{module}` placeholders.
    pub algorithm: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Overlay file stem with a `{sensor}` placeholder.
    #[serde(default)]
    pub plot: Option<String>,
}

impl BatchOptions {
    pub fn location_for(&self, sensor: &str) -> String {
        self.location.replace("{sensor}", sensor)
    }

    pub fn metric_for(&self, sensor: &str, module: usize) -> String {
        fill(&self.metric, sensor, module)
    }

    pub fn algorithm_for(&self, sensor: &str, module: usize) -> String {
        fill(&self.algorithm, sensor, module)
    }

    pub fn title_for(&self, sensor: &str) -> String {
        match &self.title {
            Some(t) => t.replace("{sensor}", sensor),
            None => format!("{sensor} - all modules"),
        }
    }

    /// Overlay file name for one sensor, e.g.
    /// `velo_asic_VP00_eff_300000_300100_all_modules_verify.png`.
    pub fn plot_file_for(&self, series_name: &str, sensor: &str, range_tag: &str) -> String {
        let stem = match &self.plot {
            Some(t) => t.replace("{sensor}", sensor),
            None => format!("{series_name}_{sensor}"),
        };
        format!("{stem}_{range_tag}_all_modules_verify.png")
    }
}

fn fill(template: &str, sensor: &str, module: usize) -> String {
    template
        .replace("{sensor}", sensor)
        .replace("{module}", &module.to_string())
}

#[derive(Debug, Clone)]
pub struct TrendSpec {
    pub metric_type: MetricType,
    pub locations: Vec<(String, MethodDescriptor)>,
}

#[derive(Debug, Clone)]
pub enum Mode {
    Trend(TrendSpec),
    Batch(BatchOptions),
}

#[derive(Debug, Clone)]
pub struct TrendOptions {
    pub name: String,
    pub provider: String,
    pub y_axis_title: String,
    pub y_range: Option<(f64, f64)>,
    pub min_run_length: Option<Duration>,
    pub destination: Option<String>,
    pub regions: RegionTable,
    pub hotspot_name_prefix: String,
    pub file_suffix: String,
    pub mode: Mode,
}

impl TrendOptions {
    /// Load `<options_dir>/<options_path>.toml`.
    pub fn load(options_dir: &Path, options_path: &str) -> Result<Self, ConfigError> {
        let path = options_dir.join(format!("{options_path}.toml"));
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Unreadable {
            path: path.clone(),
            source,
        })?;
        let raw: RawOptions =
            toml::from_str(&text).map_err(|source| ConfigError::Invalid { path, source })?;
        Self::from_raw(raw)
    }

    #[cfg(test)]
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let raw: RawOptions = toml::from_str(text).map_err(|source| ConfigError::Invalid {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawOptions) -> Result<Self, ConfigError> {
        let required = if raw.batch.is_some() {
            BATCH_REQUIRED_KEYS
        } else {
            TREND_REQUIRED_KEYS
        };
        let provided = raw.provided_keys();
        if required.iter().any(|k| !provided.iter().any(|p| p == k)) {
            return Err(ConfigError::MissingKeys {
                required: required.iter().map(|k| k.to_string()).collect(),
                provided,
            });
        }

        let mut regions = match raw.region_preset.as_deref() {
            Some(preset) => RegionTable::preset(preset).ok_or_else(|| {
                ConfigError::Inconsistent(format!("unknown region preset `{preset}`"))
            })?,
            None => RegionTable::default(),
        };
        regions.extend(raw.regions);

        let mode = match raw.batch {
            Some(batch) => {
                if batch.sensors.is_empty() || batch.modules == 0 {
                    return Err(ConfigError::Inconsistent(
                        "batch needs at least one sensor and one module".into(),
                    ));
                }
                Mode::Batch(batch)
            }
            None => Mode::Trend(trend_spec(
                raw.metric_type.unwrap_or(MetricType::Absolute),
                raw.locations.unwrap_or_default(),
                raw.method.unwrap_or_default(),
            )?),
        };

        Ok(Self {
            name: raw.name.unwrap_or_default(),
            provider: raw.provider.unwrap_or_else(|| DEFAULT_PROVIDER.to_string()),
            y_axis_title: raw.y_axis_title.unwrap_or_default(),
            y_range: raw.y_range.map(|[lo, hi]| (lo, hi)),
            min_run_length: raw.min_run_length,
            destination: raw.destination,
            regions,
            hotspot_name_prefix: raw
                .hotspot_name_prefix
                .unwrap_or_else(|| DEFAULT_HOTSPOT_PREFIX.to_string()),
            file_suffix: raw
                .file_suffix
                .unwrap_or_else(|| DEFAULT_FILE_SUFFIX.to_string()),
            mode,
        })
    }
}

fn trend_spec(
    metric_type: MetricType,
    locations: Vec<String>,
    methods: Vec<MethodDescriptor>,
) -> Result<TrendSpec, ConfigError> {
    if locations.len() != methods.len() {
        return Err(ConfigError::Inconsistent(format!(
            "{} locations but {} methods",
            locations.len(),
            methods.len()
        )));
    }
    let needed = metric_type.required_locations();
    if locations.len() < needed {
        return Err(ConfigError::Inconsistent(format!(
            "{metric_type:?} metrics need at least {needed} locations, got {}",
            locations.len()
        )));
    }
    if let Some(first) = methods.first().filter(|m| m.reuses_prior_sample()) {
        return Err(ConfigError::Inconsistent(format!(
            "method `{first}` derives its error from the preceding location and cannot come first"
        )));
    }
    Ok(TrendSpec {
        metric_type,
        locations: locations.into_iter().zip(methods).collect(),
    })
}

/// Publishing algorithm identifier for an options path like `velo/occupancy`.
pub fn algorithm_id(options_path: &str) -> String {
    format!("{ALGORITHM_PREFIX}{}", options_path.replace('/', "|"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Quadrant;

    #[test]
    fn loads_a_ratio_trend() {
        let opts = TrendOptions::parse(
            r#"
            name = "ecal_ratio"
            type = "ratio"
            y_axis_title = "A / B"
            locations = ["Mon/a", "Mon/b"]
            method = ["raw", "quadrant2"]
            y_range = [0.0, 2.0]
            min_run_length = "10m"
            "#,
        )
        .unwrap();
        assert_eq!(opts.provider, "RecoMon");
        assert_eq!(opts.y_range, Some((0.0, 2.0)));
        assert_eq!(opts.min_run_length, Some(Duration::from_secs(600)));
        let Mode::Trend(spec) = opts.mode else {
            panic!("expected trend mode")
        };
        assert_eq!(spec.metric_type, MetricType::Ratio);
        assert_eq!(
            spec.locations[1],
            ("Mon/b".to_string(), MethodDescriptor::Quadrant(Quadrant::Second))
        );
    }

    #[test]
    fn missing_keys_are_listed() {
        let err = TrendOptions::parse(
            r#"
            name = "x"
            locations = ["a"]
            "#,
        )
        .unwrap_err();
        match err {
            ConfigError::MissingKeys { required, provided } => {
                assert!(required.contains(&"method".to_string()));
                assert_eq!(provided, vec!["name".to_string(), "locations".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_methods_fail_at_load() {
        let err = TrendOptions::parse(
            r#"
            name = "x"
            type = "absolute"
            y_axis_title = "t"
            locations = ["a"]
            method = ["median"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
    }

    #[test]
    fn shape_mismatches_are_rejected() {
        for body in [
            r#"type = "absolute"
               locations = ["a", "b"]
               method = ["raw"]"#,
            r#"type = "ratio"
               locations = ["a"]
               method = ["raw"]"#,
            r#"type = "absolute"
               locations = ["a"]
               method = ["bin3"]"#,
        ] {
            let text = format!("name = \"x\"\ny_axis_title = \"t\"\n{body}");
            assert!(matches!(
                TrendOptions::parse(&text),
                Err(ConfigError::Inconsistent(_))
            ));
        }
    }

    #[test]
    fn regions_layer_over_the_preset() {
        let opts = TrendOptions::parse(
            r#"
            name = "hotspots"
            type = "absolute"
            y_axis_title = "Avg. occupancy"
            locations = ["Mon/VPClusterMapOnMod0Sens0"]
            method = ["hotspot_mean"]
            region_preset = "velo"

            [regions.Mod0Sens0]
            x = []
            y = []
            "#,
        )
        .unwrap();
        assert_eq!(opts.regions.get("Mod0Sens0").unwrap().bounds(), None);
        assert!(opts.regions.get("Mod51Sens3").is_some());
    }

    #[test]
    fn batch_templates_expand() {
        let opts = TrendOptions::parse(
            r#"
            name = "velo_asic_eff"
            provider = "VeloTrackMon"

            [batch]
            sensors = ["VP00", "VP01"]
            modules = 52
            location = "VPHitEfficiencyMonitorSensor/hiteff_asic{sensor}"
            metric = "velo_asic_{sensor}_mod{module}_eff"
            algorithm = "rta_piquet_trends|tracking|publish_velo_{sensor}_mod{module}"
            "#,
        )
        .unwrap();
        let Mode::Batch(batch) = opts.mode else {
            panic!("expected batch mode")
        };
        assert_eq!(
            batch.location_for("VP01"),
            "VPHitEfficiencyMonitorSensor/hiteff_asicVP01"
        );
        assert_eq!(batch.metric_for("VP00", 7), "velo_asic_VP00_mod7_eff");
        assert_eq!(
            batch.algorithm_for("VP00", 7),
            "rta_piquet_trends|tracking|publish_velo_VP00_mod7"
        );
        assert_eq!(
            batch.plot_file_for("velo_asic_eff", "VP01", "1_2"),
            "velo_asic_eff_VP01_1_2_all_modules_verify.png"
        );
    }

    #[test]
    fn algorithm_id_flattens_the_options_path() {
        assert_eq!(
            algorithm_id("velo/hotspot_occupancy"),
            "rta_piquet_trends|velo|hotspot_occupancy"
        );
    }

    #[test]
    fn shipped_options_units_load() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("options");
        for unit in [
            "velo/hotspot_occupancy",
            "tracking/publish_velo_all_sensors",
            "calo/ecal_side_ratio",
        ] {
            if let Err(err) = TrendOptions::load(&dir, unit) {
                panic!("{unit}: {err}");
            }
        }

        let velo = TrendOptions::load(&dir, "tracking/publish_velo_all_sensors").unwrap();
        let Mode::Batch(batch) = velo.mode else {
            panic!("expected batch mode")
        };
        assert_eq!(
            batch.plot_file_for(&velo.name, "VP00", "300000_300100"),
            "velo_asic_VP00_eff_300000_300100_all_modules_verify.png"
        );
    }
}
