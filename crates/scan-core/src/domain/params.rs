//! Scan parameters: scanning-mode version and the voxel/unit size.
//!
//! The size the user picks is always expressed in the mode's display unit.
//! v2 scanning works in millimeters and the engine expects meters, so the
//! value is scaled by 1e-3 before it is sent; v1 already works in meters.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which scanning pipeline the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanningModeVersion {
    /// Legacy mode; unit size in meters.
    V1,
    /// Current mode; unit size in millimeters.
    #[default]
    V2,
}

impl ScanningModeVersion {
    pub fn is_v2(self) -> bool {
        matches!(self, ScanningModeVersion::V2)
    }
}

impl fmt::Display for ScanningModeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanningModeVersion::V1 => f.write_str("v1"),
            ScanningModeVersion::V2 => f.write_str("v2"),
        }
    }
}

const DEFAULT_UNIT_SIZE: f64 = 2.0;
const MILLIMETERS_PER_METER: f64 = 1000.0;

/// Mode plus the requested unit size, in the mode's display unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    pub mode: ScanningModeVersion,
    pub unit_size: f64,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            mode: ScanningModeVersion::default(),
            unit_size: DEFAULT_UNIT_SIZE,
        }
    }
}

impl ScanParameters {
    /// Returns `Err` with a reason when `size` cannot be sent to the engine.
    pub fn validate_unit_size(size: f64) -> Result<(), String> {
        if !size.is_finite() || size <= 0.0 {
            return Err(format!("unit size must be a positive finite number, got {size}"));
        }
        Ok(())
    }

    /// The value handed to the engine: millimeters → meters for v2,
    /// unchanged for v1.
    pub fn engine_unit_size(&self) -> f64 {
        match self.mode {
            ScanningModeVersion::V2 => self.unit_size / MILLIMETERS_PER_METER,
            ScanningModeVersion::V1 => self.unit_size,
        }
    }

    /// The size shown to the user, floored to one decimal place.
    pub fn display_size(&self) -> f64 {
        (self.unit_size * 10.0).floor() / 10.0
    }

    /// [`display_size`](Self::display_size) formatted with exactly one decimal.
    pub fn display_label(&self) -> String {
        format!("{:.1}", self.display_size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v2_size_is_scaled_to_meters() {
        // Arrange
        let params = ScanParameters {
            mode: ScanningModeVersion::V2,
            unit_size: 2.5,
        };

        // Act / Assert
        assert_eq!(params.engine_unit_size(), 2.5e-3);
    }

    #[test]
    fn test_v1_size_is_sent_unscaled() {
        let params = ScanParameters {
            mode: ScanningModeVersion::V1,
            unit_size: 2.5,
        };
        assert_eq!(params.engine_unit_size(), 2.5);
    }

    #[test]
    fn test_display_size_floors_to_one_decimal() {
        let params = ScanParameters {
            mode: ScanningModeVersion::V2,
            unit_size: 2.37,
        };
        assert_eq!(params.display_label(), "2.3");
        assert!((params.display_size() - 2.3).abs() < 1e-9);
    }

    #[test]
    fn test_display_label_keeps_trailing_zero() {
        let params = ScanParameters {
            mode: ScanningModeVersion::V1,
            unit_size: 4.0,
        };
        assert_eq!(params.display_label(), "4.0");
    }

    #[test]
    fn test_validate_unit_size_rejects_non_positive_and_nan() {
        assert!(ScanParameters::validate_unit_size(0.0).is_err());
        assert!(ScanParameters::validate_unit_size(-1.0).is_err());
        assert!(ScanParameters::validate_unit_size(f64::NAN).is_err());
        assert!(ScanParameters::validate_unit_size(f64::INFINITY).is_err());
        assert!(ScanParameters::validate_unit_size(0.5).is_ok());
    }

    #[test]
    fn test_default_is_v2_two_millimeters() {
        let params = ScanParameters::default();
        assert_eq!(params.mode, ScanningModeVersion::V2);
        assert_eq!(params.unit_size, 2.0);
    }
}
