//! Domain value types shared by every crate in the workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// Maximum length of a caller-supplied job identifier.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Opaque job identifier.
///
/// Either supplied by the caller (and validated, since it also names the
/// job's storage directory) or generated as a UUID v4 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Validate a caller-supplied identifier.
    ///
    /// Rules:
    /// - Must not be empty.
    /// - Must not exceed [`MAX_JOB_ID_LEN`] characters.
    /// - Must contain only ASCII alphanumeric, hyphen, or underscore characters.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        if raw.is_empty() {
            return Err(CoreError::Validation("Job id must not be empty".to_string()));
        }
        if raw.len() > MAX_JOB_ID_LEN {
            return Err(CoreError::Validation(format!(
                "Job id must not exceed {MAX_JOB_ID_LEN} characters"
            )));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(CoreError::Validation(
                "Job id may only contain alphanumeric, hyphen, or underscore characters"
                    .to_string(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Scale
// ---------------------------------------------------------------------------

/// A supported magnification factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Scale {
    X2,
    X4,
    X8,
}

impl Scale {
    /// Every supported factor, in ascending order.
    pub const ALL: [Scale; 3] = [Scale::X2, Scale::X4, Scale::X8];

    /// Integer magnification factor.
    pub fn factor(self) -> u32 {
        match self {
            Self::X2 => 2,
            Self::X4 => 4,
            Self::X8 => 8,
        }
    }

    pub fn from_factor(factor: u32) -> Option<Self> {
        match factor {
            2 => Some(Self::X2),
            4 => Some(Self::X4),
            8 => Some(Self::X8),
            _ => None,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.factor())
    }
}

impl FromStr for Scale {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u32>()
            .ok()
            .and_then(Self::from_factor)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid scale '{s}'. Must be one of: {:?}",
                    Self::ALL.map(Self::factor)
                ))
            })
    }
}

impl From<Scale> for String {
    fn from(value: Scale) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Scale {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// ResampleMode
// ---------------------------------------------------------------------------

/// Interpolation algorithm used when resizing, independent of the
/// magnification engine itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResampleMode {
    Nearest,
    Linear,
    Bilinear,
    #[default]
    Bicubic,
    Area,
    NearestExact,
}

impl ResampleMode {
    /// Every recognised mode, in the order advertised to clients.
    pub const ALL: [ResampleMode; 6] = [
        ResampleMode::Nearest,
        ResampleMode::Linear,
        ResampleMode::Bilinear,
        ResampleMode::Bicubic,
        ResampleMode::Area,
        ResampleMode::NearestExact,
    ];

    /// Wire name (`"nearest-exact"`, `"bicubic"`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Bilinear => "bilinear",
            Self::Bicubic => "bicubic",
            Self::Area => "area",
            Self::NearestExact => "nearest-exact",
        }
    }

    /// Human-readable description shown by front-ends.
    pub fn description(self) -> &'static str {
        match self {
            Self::Nearest => "Nearest Neighbor - Fast and sharp lines",
            Self::Linear => "Linear - Good for 1D, not recommended for images",
            Self::Bilinear => "Bilinear - Smooth interpolation",
            Self::Bicubic => "Bicubic - High quality, smooth (recommended)",
            Self::Area => "Area - Good for downsampling",
            Self::NearestExact => "Nearest Neighbor Exact - Strictly better nearest neighbor",
        }
    }
}

impl fmt::Display for ResampleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown resample mode '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

/// Compute device an engine is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
    /// Accelerator with its ordinal.
    Cuda(u32),
}

/// Device preference as configured, before resolution against what the
/// engine implementation can actually use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DevicePreference {
    Auto,
    Exact(Device),
}

impl FromStr for DevicePreference {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Exact(Device::Cpu)),
            "cuda" => Ok(Self::Exact(Device::Cuda(0))),
            other => other
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(|n| Self::Exact(Device::Cuda(n)))
                .ok_or_else(|| CoreError::Validation(format!("Unknown device '{s}'"))),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(n) => write!(f, "cuda:{n}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
