//! Scan event decoder for HikVision callback payloads
//!
//! Turns a raw HTTP request body into a validated `ScanEvent`. Devices are
//! inconsistent about how they deliver the event JSON: some POST it bare, some
//! wrap it in a multipart/form-data body, and field casing varies between
//! firmware revisions. The decoder extracts the first JSON object it can find
//! and deserializes it tolerantly.

use crate::domain::types::ScanEvent;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Body contains no recoverable JSON object
    #[error("request body is not recoverable JSON")]
    MalformedPayload,
    /// Valid payload, but not a usable face scan (door events, heartbeats,
    /// and failed matches land here) - expected traffic, not an error
    #[error("payload is not a face scan event")]
    NotAFaceEvent,
}

/// Top-level HikVision event notification
#[derive(Debug, Deserialize)]
pub struct HikVisionEvent {
    #[serde(default, rename = "ipAddress", alias = "IpAddress")]
    pub ip_address: Option<String>,
    #[serde(default, rename = "dateTime", alias = "DateTime")]
    pub date_time: Option<String>,
    #[serde(default, rename = "eventType", alias = "EventType")]
    pub event_type: Option<String>,
    #[serde(default, rename = "eventState", alias = "EventState")]
    pub event_state: Option<String>,
    #[serde(default, rename = "AccessControllerEvent", alias = "accessControllerEvent")]
    pub access_controller_event: Option<AccessControllerEvent>,
}

/// Nested access-control sub-object carried by face and door events
#[derive(Debug, Deserialize)]
pub struct AccessControllerEvent {
    #[serde(default, rename = "deviceName", alias = "DeviceName")]
    pub device_name: Option<String>,
    #[serde(default, rename = "employeeNoString", alias = "EmployeeNoString")]
    pub employee_no: Option<String>,
    #[serde(default, rename = "name", alias = "Name")]
    pub name: Option<String>,
    #[serde(default, rename = "majorEventType", alias = "MajorEventType")]
    pub major_event_type: Option<i32>,
    #[serde(default, rename = "subEventType", alias = "SubEventType")]
    pub sub_event_type: Option<i32>,
}

/// Decode a raw callback body into a `ScanEvent`.
///
/// `remote_addr` is the caller's network address, used when the payload does
/// not carry its own `ipAddress`.
pub fn decode(body: &[u8], remote_addr: Option<&str>) -> Result<ScanEvent, DecodeError> {
    let text = String::from_utf8_lossy(body);
    let json = extract_json(&text).ok_or(DecodeError::MalformedPayload)?;

    let event: HikVisionEvent =
        serde_json::from_str(json).map_err(|_| DecodeError::MalformedPayload)?;

    let ace = event.access_controller_event.ok_or(DecodeError::NotAFaceEvent)?;

    // Events without an employee number are not successful face matches
    let person_id = match ace.employee_no {
        Some(ref no) if !no.is_empty() => no.clone(),
        _ => return Err(DecodeError::NotAFaceEvent),
    };

    Ok(ScanEvent {
        person_id,
        employee_no: ace.employee_no,
        name: ace.name.filter(|n| !n.is_empty()),
        scan_time: event.date_time.as_deref().and_then(parse_device_time).unwrap_or_else(Utc::now),
        device_id: ace.device_name,
        device_ip: event.ip_address.or_else(|| remote_addr.map(str::to_string)),
    })
}

/// Extract a JSON object from the body text.
///
/// A body that starts with `{` is used verbatim; otherwise the substring
/// between the first `{` and the last `}` is taken, which recovers the event
/// from multipart/form-data wrapping.
fn extract_json(body: &str) -> Option<&str> {
    let trimmed = body.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end > start {
        Some(&body[start..=end])
    } else {
        None
    }
}

/// Parse the device timestamp leniently.
///
/// Firmware emits RFC 3339 with a zone offset; older revisions drop the offset
/// or use a space separator. Offset-free times are taken as UTC.
fn parse_device_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FACE_EVENT: &str = r#"{
        "ipAddress": "192.168.1.50",
        "dateTime": "2024-03-01T09:30:00+05:00",
        "eventType": "AccessControllerEvent",
        "AccessControllerEvent": {
            "deviceName": "Entrance",
            "employeeNoString": "E1",
            "name": "Jane Doe",
            "majorEventType": 5,
            "subEventType": 75
        }
    }"#;

    #[test]
    fn test_decode_valid_face_event() {
        let event = decode(FACE_EVENT.as_bytes(), Some("10.0.0.1")).unwrap();
        assert_eq!(event.person_id, "E1");
        assert_eq!(event.employee_no.as_deref(), Some("E1"));
        assert_eq!(event.name.as_deref(), Some("Jane Doe"));
        assert_eq!(event.device_id.as_deref(), Some("Entrance"));
        assert_eq!(event.device_ip.as_deref(), Some("192.168.1.50"));
        assert_eq!(event.scan_time.to_rfc3339(), "2024-03-01T04:30:00+00:00");
    }

    #[test]
    fn test_decode_multipart_wrapped_body() {
        let wrapped = format!(
            "--boundary\r\nContent-Disposition: form-data; name=\"event_log\"\r\n\r\n{}\r\n--boundary--",
            FACE_EVENT
        );
        let event = decode(wrapped.as_bytes(), None).unwrap();
        assert_eq!(event.person_id, "E1");
        assert_eq!(event.name.as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_decode_empty_employee_no_is_not_a_face_event() {
        let body = r#"{"AccessControllerEvent":{"employeeNoString":"","name":"x"}}"#;
        assert_eq!(decode(body.as_bytes(), None), Err(DecodeError::NotAFaceEvent));
    }

    #[test]
    fn test_decode_missing_employee_no_is_not_a_face_event() {
        let body = r#"{"AccessControllerEvent":{"deviceName":"Entrance"}}"#;
        assert_eq!(decode(body.as_bytes(), None), Err(DecodeError::NotAFaceEvent));
    }

    #[test]
    fn test_decode_heartbeat_is_not_a_face_event() {
        let body = r#"{"ipAddress":"192.168.1.50","eventType":"videoloss","eventState":"inactive"}"#;
        assert_eq!(decode(body.as_bytes(), None), Err(DecodeError::NotAFaceEvent));
    }

    #[test]
    fn test_decode_garbage_is_malformed() {
        assert_eq!(decode(b"not json at all", None), Err(DecodeError::MalformedPayload));
        assert_eq!(decode(b"{truncated", None), Err(DecodeError::MalformedPayload));
        assert_eq!(decode(b"", None), Err(DecodeError::MalformedPayload));
    }

    #[test]
    fn test_decode_falls_back_to_remote_addr_and_receipt_time() {
        let body = r#"{"AccessControllerEvent":{"employeeNoString":"E2"}}"#;
        let before = Utc::now();
        let event = decode(body.as_bytes(), Some("10.0.0.7")).unwrap();
        assert_eq!(event.device_ip.as_deref(), Some("10.0.0.7"));
        assert!(event.scan_time >= before);
        assert!(event.scan_time <= Utc::now());
    }

    #[test]
    fn test_decode_pascal_case_fields() {
        let body = r#"{
            "IpAddress": "192.168.1.51",
            "DateTime": "2024-03-01 09:30:00",
            "accessControllerEvent": {"EmployeeNoString": "E3", "Name": "Bob"}
        }"#;
        let event = decode(body.as_bytes(), None).unwrap();
        assert_eq!(event.person_id, "E3");
        assert_eq!(event.device_ip.as_deref(), Some("192.168.1.51"));
        assert_eq!(event.scan_time.to_rfc3339(), "2024-03-01T09:30:00+00:00");
    }

    #[test]
    fn test_extract_json_bare_and_wrapped() {
        assert_eq!(extract_json("  {\"a\":1}  "), Some("{\"a\":1}"));
        assert_eq!(extract_json("prefix {\"a\":1} suffix"), Some("{\"a\":1}"));
        assert_eq!(extract_json("no braces here"), None);
    }
}
