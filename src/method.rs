//! Declarative metric-extraction methods.
//!
//! Options files name methods with short strings (`raw`, `quadrant2`,
//! `bin3bin7`, ...). They are parsed once, at load time, into
//! [`MethodDescriptor`]; nothing downstream matches on strings.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Below zero on the x axis.
    Negative,
    Positive,
}

/// Sign quadrants of a 2D distribution, counter-clockwise from `(+x, +y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    First,
    Second,
    Third,
    Fourth,
}

impl Quadrant {
    fn from_index(i: u8) -> Option<Self> {
        match i {
            1 => Some(Quadrant::First),
            2 => Some(Quadrant::Second),
            3 => Some(Quadrant::Third),
            4 => Some(Quadrant::Fourth),
            _ => None,
        }
    }

    fn index(self) -> u8 {
        match self {
            Quadrant::First => 1,
            Quadrant::Second => 2,
            Quadrant::Third => 3,
            Quadrant::Fourth => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum MethodDescriptor {
    /// Entry count per hour.
    Raw,
    Mean,
    Rms,
    Directional(Direction),
    Quadrant(Quadrant),
    /// Content of one bin per hour.
    Bin { bin: usize },
    /// `content(bin) / content(reference)`, not normalized.
    BinRatio { bin: usize, reference: usize },
    /// Mean occupancy inside the sensor's region of interest.
    HotspotMean,
    /// Stored content and error of one bin, passed through untouched.
    StoredBin { bin: usize },
}

impl MethodDescriptor {
    /// Methods whose error term is derived from the previously extracted
    /// sample of the same run.
    pub fn reuses_prior_sample(&self) -> bool {
        matches!(
            self,
            MethodDescriptor::Directional(_)
                | MethodDescriptor::Quadrant(_)
                | MethodDescriptor::Bin { .. }
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown extraction method `{0}`")]
pub struct UnknownMethod(pub String);

fn parse_bin_index(s: &str) -> Option<usize> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

impl FromStr for MethodDescriptor {
    type Err = UnknownMethod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownMethod(s.to_string());
        let method = match s {
            "raw" => MethodDescriptor::Raw,
            "mean" => MethodDescriptor::Mean,
            "RMS" => MethodDescriptor::Rms,
            "negative" => MethodDescriptor::Directional(Direction::Negative),
            "positive" => MethodDescriptor::Directional(Direction::Positive),
            "hotspot_mean" => MethodDescriptor::HotspotMean,
            _ => {
                if let Some(n) = s.strip_prefix("quadrant") {
                    let q = n
                        .parse::<u8>()
                        .ok()
                        .and_then(Quadrant::from_index)
                        .ok_or_else(unknown)?;
                    MethodDescriptor::Quadrant(q)
                } else if let Some(n) = s.strip_prefix("stored") {
                    MethodDescriptor::StoredBin {
                        bin: parse_bin_index(n).ok_or_else(unknown)?,
                    }
                } else if let Some(rest) = s.strip_prefix("bin") {
                    match rest.split_once("bin") {
                        Some((n, m)) => MethodDescriptor::BinRatio {
                            bin: parse_bin_index(n).ok_or_else(unknown)?,
                            reference: parse_bin_index(m).ok_or_else(unknown)?,
                        },
                        None => MethodDescriptor::Bin {
                            bin: parse_bin_index(rest).ok_or_else(unknown)?,
                        },
                    }
                } else {
                    return Err(unknown());
                }
            }
        };
        Ok(method)
    }
}

impl TryFrom<String> for MethodDescriptor {
    type Error = UnknownMethod;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodDescriptor::Raw => write!(f, "raw"),
            MethodDescriptor::Mean => write!(f, "mean"),
            MethodDescriptor::Rms => write!(f, "RMS"),
            MethodDescriptor::Directional(Direction::Negative) => write!(f, "negative"),
            MethodDescriptor::Directional(Direction::Positive) => write!(f, "positive"),
            MethodDescriptor::Quadrant(q) => write!(f, "quadrant{}", q.index()),
            MethodDescriptor::Bin { bin } => write!(f, "bin{bin}"),
            MethodDescriptor::BinRatio { bin, reference } => write!(f, "bin{bin}bin{reference}"),
            MethodDescriptor::HotspotMean => write!(f, "hotspot_mean"),
            MethodDescriptor::StoredBin { bin } => write!(f, "stored{bin}"),
        }
    }
}
