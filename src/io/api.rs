//! Access-control API client for person and measurement records
//!
//! Narrow boundary around the remote service: login for a bearer token, fetch
//! a person, fetch their latest stored measurement, create a new one. Every
//! failure - transport, auth, 4xx/5xx, bad body - degrades to `false`/`None`
//! with a warning, so the measurement session proceeds with partial data
//! instead of blocking on the network.

use crate::infra::config::Config;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Person record as returned by the API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDto {
    pub id: String,
    #[serde(default)]
    pub employee_no: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub mid_name: Option<String>,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

impl PersonDto {
    /// Display name assembled the way the service renders it
    pub fn full_name(&self) -> String {
        [self.last_name.as_deref(), self.name.as_deref(), self.mid_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// Stored measurement record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BmiMeasurementDto {
    pub id: i64,
    pub turnstile_person_id: String,
    pub weight: f64,
    pub height: f64,
    pub bmi: f64,
    pub bmi_category: String,
    pub measured_at: DateTime<Utc>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Payload for creating a measurement
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBmiMeasurementDto {
    pub turnstile_person_id: String,
    pub weight: f64,
    pub height: f64,
    pub bmi: f64,
    pub bmi_category: String,
    pub measured_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HaveIdResponse {
    id: i64,
}

/// The four operations the session correlator needs from the remote service
#[async_trait]
pub trait AccessControlApi: Send + Sync {
    async fn authenticate(&self, username: &str, password: &str) -> bool;
    async fn get_person_by_id(&self, person_id: &str) -> Option<PersonDto>;
    async fn get_latest_measurement(&self, person_id: &str) -> Option<BmiMeasurementDto>;
    async fn create_measurement(&self, dto: &CreateBmiMeasurementDto) -> Option<i64>;
}

/// HTTP implementation against the WB access-control service
pub struct WbApiClient {
    http: reqwest::Client,
    base_url: String,
    /// Bearer token from login, or the pre-provisioned token from config
    token: RwLock<Option<String>>,
}

impl WbApiClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs()))
            .build()?;

        Ok(Self {
            http,
            base_url: config.api_base_url().trim_end_matches('/').to_string(),
            token: RwLock::new(config.api_access_token().map(str::to_string)),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Option<T> {
        let response = match self.with_auth(self.http.get(self.url(path))).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(path = %path, error = %e, "api_request_failed");
                return None;
            }
        };

        if !response.status().is_success() {
            debug!(path = %path, status = %response.status(), "api_request_not_ok");
            return None;
        }

        match response.json::<T>().await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(path = %path, error = %e, "api_response_decode_failed");
                None
            }
        }
    }
}

#[async_trait]
impl AccessControlApi for WbApiClient {
    async fn authenticate(&self, username: &str, password: &str) -> bool {
        let body = serde_json::json!({ "username": username, "password": password });
        let response = match self.http.post(self.url("/api/Auth/Login")).json(&body).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "api_auth_request_failed");
                return false;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "api_auth_rejected");
            return false;
        }

        match response.json::<AuthResponse>().await {
            Ok(AuthResponse { access_token: Some(token) }) => {
                *self.token.write() = Some(token);
                info!(username = %username, "api_authenticated");
                true
            }
            Ok(_) => {
                warn!("api_auth_response_missing_token");
                false
            }
            Err(e) => {
                warn!(error = %e, "api_auth_decode_failed");
                false
            }
        }
    }

    async fn get_person_by_id(&self, person_id: &str) -> Option<PersonDto> {
        self.get_json(&format!("/api/TurnstilePerson/Get/{person_id}")).await
    }

    async fn get_latest_measurement(&self, person_id: &str) -> Option<BmiMeasurementDto> {
        self.get_json(&format!("/api/BmiMeasurement/GetLatestByPersonId/{person_id}")).await
    }

    async fn create_measurement(&self, dto: &CreateBmiMeasurementDto) -> Option<i64> {
        let request = self.with_auth(self.http.post(self.url("/api/BmiMeasurement/Create")));
        let response = match request.json(dto).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "api_create_request_failed");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "api_create_rejected");
            return None;
        }

        match response.json::<HaveIdResponse>().await {
            Ok(have_id) => Some(have_id.id),
            Err(e) => {
                warn!(error = %e, "api_create_decode_failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_name_joins_present_parts() {
        let person = PersonDto {
            id: "1".to_string(),
            employee_no: None,
            name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            mid_name: None,
            position: None,
            department: None,
        };
        assert_eq!(person.full_name(), "Doe Jane");
    }

    #[test]
    fn test_create_dto_serializes_camel_case() {
        let dto = CreateBmiMeasurementDto {
            turnstile_person_id: "E1".to_string(),
            weight: 70.0,
            height: 175.0,
            bmi: 22.86,
            bmi_category: "Normal".to_string(),
            measured_at: "2024-03-01T09:30:00Z".parse().unwrap(),
            device_id: Some("bmi-agent".to_string()),
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["turnstilePersonId"], "E1");
        assert_eq!(json["bmiCategory"], "Normal");
        assert_eq!(json["deviceId"], "bmi-agent");
        assert!(json.get("turnstile_person_id").is_none());
    }

    #[test]
    fn test_measurement_dto_deserializes() {
        let json = r#"{
            "id": 5,
            "turnstilePersonId": "E1",
            "weight": 70.5,
            "height": 175.0,
            "bmi": 23.02,
            "bmiCategory": "Normal",
            "measuredAt": "2024-02-01T08:00:00Z"
        }"#;
        let dto: BmiMeasurementDto = serde_json::from_str(json).unwrap();
        assert_eq!(dto.id, 5);
        assert_eq!(dto.turnstile_person_id, "E1");
        assert_eq!(dto.bmi_category, "Normal");
        assert!(dto.device_id.is_none());
    }
}
