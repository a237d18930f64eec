//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `decoder` - HikVision callback body -> validated `ScanEvent`
//! - `face_listener` - HTTP listener for scan callbacks
//! - `scale` - Serial monitor and line parser for the weighing scale
//! - `api` - Access-control API client (persons, measurements)

pub mod api;
pub mod decoder;
pub mod face_listener;
pub mod scale;

// Re-export commonly used types
pub use api::{AccessControlApi, WbApiClient};
pub use decoder::DecodeError;
pub use face_listener::{FaceIdListener, FaceIdListenerConfig, ListenerError};
pub use scale::ScaleMonitor;
