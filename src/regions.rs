//! Regions of interest for hotspot occupancy, keyed by sensor identifier.

use serde::Deserialize;
use std::collections::HashMap;

/// Rectangle in detector-position units. An empty range marks a sensor whose
/// hits are too scattered to define a hotspot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegionOfInterest {
    #[serde(default)]
    pub x: Vec<f64>,
    #[serde(default)]
    pub y: Vec<f64>,
}

impl RegionOfInterest {
    pub fn new(x: [f64; 2], y: [f64; 2]) -> Self {
        Self {
            x: x.to_vec(),
            y: y.to_vec(),
        }
    }

    /// `((x_lo, x_hi), (y_lo, y_hi))`, or `None` for an undefined region.
    pub fn bounds(&self) -> Option<((f64, f64), (f64, f64))> {
        match (self.x.as_slice(), self.y.as_slice()) {
            ([x_lo, x_hi, ..], [y_lo, y_hi, ..]) => Some(((*x_lo, *x_hi), (*y_lo, *y_hi))),
            _ => None,
        }
    }
}

/// Read-only lookup from sensor key (e.g. `Mod10Sens2`) to its region.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegionTable {
    regions: HashMap<String, RegionOfInterest>,
}

pub const VELO_MODULES: usize = 52;

impl RegionTable {
    pub fn new(regions: HashMap<String, RegionOfInterest>) -> Self {
        Self { regions }
    }

    /// Populated regions shared by every VELO module, per sensor position.
    pub fn velo() -> Self {
        let per_sensor = [
            ([550.0, 750.0], [200.0, 250.0]),
            ([0.0, 250.0], [150.0, 250.0]),
            ([0.0, 200.0], [200.0, 250.0]),
            ([500.0, 750.0], [180.0, 250.0]),
        ];
        let mut regions = HashMap::with_capacity(VELO_MODULES * per_sensor.len());
        for module in 0..VELO_MODULES {
            for (sensor, (x, y)) in per_sensor.iter().enumerate() {
                regions.insert(
                    format!("Mod{module}Sens{sensor}"),
                    RegionOfInterest::new(*x, *y),
                );
            }
        }
        Self::new(regions)
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "velo" => Some(Self::velo()),
            _ => None,
        }
    }

    /// Entries of `other` replace entries with the same key.
    pub fn extend(&mut self, other: HashMap<String, RegionOfInterest>) {
        self.regions.extend(other);
    }

    pub fn get(&self, sensor: &str) -> Option<&RegionOfInterest> {
        self.regions.get(sensor)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
