//! Shared types for the BMI agent

use chrono::{DateTime, Utc};

/// A validated face-identification scan published by the listener.
///
/// Immutable once constructed; consumed exactly once by the session correlator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEvent {
    /// Person identifier from the device (the employee number string)
    pub person_id: String,
    pub employee_no: Option<String>,
    /// Display name as reported by the device, if any
    pub name: Option<String>,
    /// Scan time from the device payload, or receipt time if omitted
    pub scan_time: DateTime<Utc>,
    /// Device name as configured on the terminal
    pub device_id: Option<String>,
    /// Device IP from the payload, or the caller's network address
    pub device_ip: Option<String>,
}

/// One classified line of scale telemetry
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassifiedReading {
    /// Live weight/height pair, valid in any state, never accumulated
    RealTime { weight: f64, height: f64 },
    /// Button press marker that starts a sampling run
    Trigger,
    /// Weight/height pair accumulated only while a sampling run is active
    Sample { weight: f64, height: f64 },
}

/// Result of a completed sampling run.
///
/// Weight is rounded to one decimal, height to whole centimeters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AveragedMeasurement {
    pub weight: f64,
    pub height: f64,
}

/// A previously stored measurement fetched from the API
#[derive(Debug, Clone, PartialEq)]
pub struct PriorMeasurement {
    pub bmi: f64,
    pub weight: f64,
    pub height: f64,
    pub category: String,
    pub measured_at: DateTime<Utc>,
}

/// BMI classification by the fixed WHO thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
}

impl BmiCategory {
    pub fn from_bmi(bmi: f64) -> Self {
        if bmi < 18.5 {
            BmiCategory::Underweight
        } else if bmi < 25.0 {
            BmiCategory::Normal
        } else if bmi < 30.0 {
            BmiCategory::Overweight
        } else {
            BmiCategory::Obese
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        }
    }
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event consumed by the session correlator.
///
/// Both producers (HTTP listener, serial monitor) and the correlator's own
/// background tasks publish these into a single bounded channel, so session
/// mutations are serialized on one task. Lookup and save variants carry the
/// person id captured when the async operation started; the correlator drops
/// results whose id no longer matches the current session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A person was scanned at the access device
    Scan(ScanEvent),
    /// Live weight/height reading from the scale
    LiveReading { weight: f64, height: f64 },
    /// The scale button was pressed and a sampling run started
    CollectionStarted,
    /// Sampling progress update
    CollectionProgress { count: usize, target: usize },
    /// A sampling run completed with an averaged measurement
    MeasurementComplete(AveragedMeasurement),
    /// Person details lookup resolved
    PersonResolved { person_id: String, name: String, position: Option<String> },
    /// Latest-measurement lookup resolved (None when the person has no history)
    HistoryResolved { person_id: String, prior: Option<PriorMeasurement> },
    /// Request to persist the current measurement
    SaveRequested,
    /// Save call finished; `measurement_id` is None on failure
    SaveFinished { person_id: String, measurement_id: Option<i64>, saved: PriorMeasurement },
    /// Request to reset the session immediately
    ClearRequested,
    /// Post-save grace delay elapsed; clears only if the person still matches
    ClearDeferred { person_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bmi_category_thresholds() {
        assert_eq!(BmiCategory::from_bmi(17.0), BmiCategory::Underweight);
        assert_eq!(BmiCategory::from_bmi(18.5), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(24.99), BmiCategory::Normal);
        assert_eq!(BmiCategory::from_bmi(25.0), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(29.99), BmiCategory::Overweight);
        assert_eq!(BmiCategory::from_bmi(30.0), BmiCategory::Obese);
        assert_eq!(BmiCategory::from_bmi(45.0), BmiCategory::Obese);
    }

    #[test]
    fn test_bmi_category_as_str() {
        assert_eq!(BmiCategory::Underweight.as_str(), "Underweight");
        assert_eq!(BmiCategory::Normal.as_str(), "Normal");
        assert_eq!(BmiCategory::Overweight.as_str(), "Overweight");
        assert_eq!(BmiCategory::Obese.as_str(), "Obese");
    }
}
