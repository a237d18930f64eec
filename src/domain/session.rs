//! The measurement session aggregate
//!
//! `PersonSession` merges the scanned identity with the current scale
//! measurement. It is owned exclusively by the session correlator; everything
//! here is pure state and arithmetic so it can be tested without any IO.

use crate::domain::types::{BmiCategory, PriorMeasurement};
use tracing::debug;

/// Placeholder name shown while no person details are available
pub const NAME_PENDING: &str = "Waiting...";
/// Placeholder name between a scan and the person-details lookup resolving
pub const NAME_LOADING: &str = "Loading...";

/// The single mutable aggregate of the core.
///
/// Created empty at startup; identity fields set on a scan event, measurement
/// fields on every weight/height change, cleared on explicit clear or after a
/// successful save.
#[derive(Debug, Clone)]
pub struct PersonSession {
    pub person_id: Option<String>,
    pub person_name: String,
    pub person_position: Option<String>,
    pub prior: Option<PriorMeasurement>,
    pub weight: f64,
    pub height: f64,
    pub bmi: f64,
    pub category: BmiCategory,
    pub bmi_delta: Option<f64>,
}

impl PersonSession {
    pub fn new() -> Self {
        Self {
            person_id: None,
            person_name: NAME_PENDING.to_string(),
            person_position: None,
            prior: None,
            weight: 0.0,
            height: 0.0,
            bmi: 0.0,
            category: BmiCategory::from_bmi(0.0),
            bmi_delta: None,
        }
    }

    pub fn has_person(&self) -> bool {
        self.person_id.is_some()
    }

    /// Session may be saved once a person is set and a BMI has been computed.
    /// The single-flight guard is the correlator's concern, not the session's.
    pub fn can_save(&self) -> bool {
        self.has_person() && self.bmi > 0.0
    }

    /// Begin a session for a freshly scanned person.
    ///
    /// Identity is provisional until the person lookup resolves; prior data
    /// from any earlier person is dropped so a stale baseline is never shown.
    pub fn begin(&mut self, person_id: &str, device_name: Option<&str>) {
        self.person_id = Some(person_id.to_string());
        self.person_name = device_name.unwrap_or(NAME_LOADING).to_string();
        self.person_position = None;
        self.prior = None;
        self.bmi_delta = None;
    }

    /// Refine identity once the person lookup resolves
    pub fn apply_person(&mut self, name: &str, position: Option<&str>) {
        self.person_name = name.to_string();
        self.person_position = position.map(str::to_string);
    }

    /// Set the prior-measurement baseline and recompute the delta
    pub fn apply_prior(&mut self, prior: Option<PriorMeasurement>) {
        self.prior = prior;
        self.recompute_delta();
    }

    /// Update weight and height together and recompute derived values
    pub fn set_measurement(&mut self, weight: f64, height: f64) {
        self.weight = weight;
        self.height = height;
        self.recompute_bmi();
    }

    /// Zero out the measurement at the start of a sampling run
    pub fn reset_measurement(&mut self) {
        self.set_measurement(0.0, 0.0);
    }

    /// Reset the whole session back to empty
    pub fn clear(&mut self) {
        let had = self.person_id.take();
        if let Some(person_id) = had {
            debug!(person_id = %person_id, "session_cleared");
        }
        *self = Self::new();
    }

    fn recompute_bmi(&mut self) {
        self.bmi = if self.weight > 0.0 && self.height > 0.0 {
            let height_m = self.height / 100.0;
            self.weight / (height_m * height_m)
        } else {
            0.0
        };
        self.category = BmiCategory::from_bmi(self.bmi);
        self.recompute_delta();
    }

    fn recompute_delta(&mut self) {
        self.bmi_delta = match &self.prior {
            Some(prior) if self.bmi > 0.0 => Some(self.bmi - prior.bmi),
            _ => None,
        };
    }
}

impl Default for PersonSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn prior(bmi: f64) -> PriorMeasurement {
        PriorMeasurement {
            bmi,
            weight: 70.0,
            height: 175.0,
            category: "Normal".to_string(),
            measured_at: Utc::now(),
        }
    }

    #[test]
    fn test_bmi_computation() {
        let mut session = PersonSession::new();
        session.set_measurement(70.0, 175.0);
        assert!((session.bmi - 22.86).abs() < 0.01);
        assert_eq!(session.category, BmiCategory::Normal);
    }

    #[test]
    fn test_bmi_zero_without_both_inputs() {
        let mut session = PersonSession::new();
        session.set_measurement(70.0, 0.0);
        assert_eq!(session.bmi, 0.0);
        session.set_measurement(0.0, 175.0);
        assert_eq!(session.bmi, 0.0);
    }

    #[test]
    fn test_delta_requires_prior_and_bmi() {
        let mut session = PersonSession::new();
        session.apply_prior(Some(prior(24.0)));
        // No measurement yet, so no delta
        assert_eq!(session.bmi_delta, None);

        session.set_measurement(70.0, 175.0);
        let delta = session.bmi_delta.expect("delta set once bmi > 0");
        assert!((delta - (session.bmi - 24.0)).abs() < 1e-9);
    }

    #[test]
    fn test_begin_drops_previous_prior() {
        let mut session = PersonSession::new();
        session.begin("E1", None);
        session.apply_prior(Some(prior(24.0)));
        session.set_measurement(70.0, 175.0);
        assert!(session.bmi_delta.is_some());

        session.begin("E2", Some("Jane"));
        assert_eq!(session.person_id.as_deref(), Some("E2"));
        assert_eq!(session.person_name, "Jane");
        assert!(session.prior.is_none());
        assert!(session.bmi_delta.is_none());
    }

    #[test]
    fn test_can_save_gating() {
        let mut session = PersonSession::new();
        assert!(!session.can_save());

        session.set_measurement(70.0, 175.0);
        assert!(!session.can_save()); // no person

        session.begin("E1", None);
        assert!(session.can_save());

        session.reset_measurement();
        assert!(!session.can_save()); // bmi back to zero
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut session = PersonSession::new();
        session.begin("E1", Some("Jane"));
        session.apply_prior(Some(prior(24.0)));
        session.set_measurement(70.0, 175.0);

        session.clear();
        assert!(session.person_id.is_none());
        assert_eq!(session.person_name, NAME_PENDING);
        assert!(session.prior.is_none());
        assert_eq!(session.bmi, 0.0);
        assert_eq!(session.weight, 0.0);
        assert_eq!(session.height, 0.0);
        assert!(session.bmi_delta.is_none());
    }
}
