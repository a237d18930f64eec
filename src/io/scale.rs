//! Serial monitor for the weighing/height scale
//!
//! Protocol: one message per line, 9600 8N1 by default.
//! - `{real_time: weight; <num>, height; <num>}` - live reading, any time
//! - `{click_button: true}` - operator pressed the measure button
//! - `{weight: <num>, height; <num>}` - sample emitted during a measuring run
//!
//! The firmware is inconsistent about `:` vs `;` between key and value, so the
//! parser accepts either. Anything unrecognized is device chatter and is
//! dropped silently.

use crate::domain::types::{ClassifiedReading, SessionEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::services::sampler::{Sampler, SamplerOutput};
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, warn};

/// Classify a single line of scale telemetry.
///
/// Returns `None` for noise, unknown messages, and malformed numeric fields -
/// a bad line is never fatal to the stream.
pub fn classify(line: &str) -> Option<ClassifiedReading> {
    let inner = line.trim().strip_prefix('{')?.strip_suffix('}')?.trim();

    if let Some(rest) = inner.strip_prefix("real_time") {
        let rest = rest.trim_start_matches([':', ';']).trim_start();
        let (weight, height) = parse_weight_height(rest)?;
        return Some(ClassifiedReading::RealTime { weight, height });
    }

    if let Some(rest) = inner.strip_prefix("click_button") {
        let value = rest.trim_start_matches([':', ';']).trim();
        return (value == "true").then_some(ClassifiedReading::Trigger);
    }

    if inner.starts_with("weight") {
        let (weight, height) = parse_weight_height(inner)?;
        return Some(ClassifiedReading::Sample { weight, height });
    }

    None
}

fn parse_weight_height(s: &str) -> Option<(f64, f64)> {
    let (weight_part, height_part) = s.split_once(',')?;
    let weight = parse_field(weight_part, "weight")?;
    let height = parse_field(height_part, "height")?;
    Some((weight, height))
}

fn parse_field(s: &str, key: &str) -> Option<f64> {
    let (name, value) = s.split_once([':', ';'])?;
    if name.trim() != key {
        return None;
    }
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

enum ReadOutcome {
    Shutdown,
    PortClosed,
}

/// Owns the serial port and the sampling state machine.
///
/// The read loop is strictly sequential: one line at a time, classified and
/// fed through the sampler, results published to the session channel. Buffers
/// are touched only by this task.
pub struct ScaleMonitor {
    device: String,
    baud: u32,
    read_timeout: Duration,
    reconnect_delay: Duration,
    sampler: Sampler,
    event_tx: Option<mpsc::Sender<SessionEvent>>,
    metrics: Option<Arc<Metrics>>,
}

impl ScaleMonitor {
    pub fn new(config: &Config) -> Self {
        Self {
            device: config.scale_device().to_string(),
            baud: config.scale_baud(),
            read_timeout: Duration::from_millis(config.scale_read_timeout_ms()),
            reconnect_delay: Duration::from_millis(config.scale_reconnect_delay_ms()),
            sampler: Sampler::new(),
            event_tx: None,
            metrics: None,
        }
    }

    /// Set the event sender for classified readings
    pub fn with_event_tx(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run the monitor until shutdown.
    ///
    /// The port is reopened after transport failures; read timeouts are not
    /// errors and keep the loop alive.
    pub async fn run(mut self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        info!(
            device = %self.device,
            baud = %self.baud,
            read_timeout_ms = %self.read_timeout.as_millis(),
            "scale_monitor_started"
        );

        loop {
            if *shutdown.borrow() {
                return;
            }

            let port = match tokio_serial::new(&self.device, self.baud)
                .timeout(self.read_timeout)
                .open_native_async()
            {
                Ok(port) => {
                    info!(device = %self.device, "scale_port_opened");
                    port
                }
                Err(e) => {
                    error!(device = %self.device, error = %e, "scale_port_open_failed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => continue,
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                return;
                            }
                            continue;
                        }
                    }
                }
            };

            match self.read_loop(port, &mut shutdown).await {
                ReadOutcome::Shutdown => {
                    info!("scale_monitor_shutdown");
                    return;
                }
                ReadOutcome::PortClosed => {
                    warn!(device = %self.device, "scale_port_closed");
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
        }
    }

    async fn read_loop(
        &mut self,
        port: tokio_serial::SerialStream,
        shutdown: &mut tokio::sync::watch::Receiver<bool>,
    ) -> ReadOutcome {
        let mut lines = BufReader::new(port).lines();

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return ReadOutcome::Shutdown;
                    }
                }
                result = tokio::time::timeout(self.read_timeout, lines.next_line()) => {
                    match result {
                        Err(_) => {
                            // No data within the window; keep waiting
                        }
                        Ok(Ok(Some(line))) => self.handle_line(line.trim()),
                        Ok(Ok(None)) => return ReadOutcome::PortClosed,
                        Ok(Err(e)) if e.kind() == ErrorKind::TimedOut => {}
                        Ok(Err(e)) => {
                            warn!(error = %e, "scale_read_error");
                            return ReadOutcome::PortClosed;
                        }
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }

        if let Some(m) = &self.metrics {
            m.record_scale_line();
        }

        let Some(reading) = classify(line) else {
            if let Some(m) = &self.metrics {
                m.record_scale_line_ignored();
            }
            debug!(line = %line, "scale_line_ignored");
            return;
        };

        let Some(output) = self.sampler.handle(reading) else {
            return;
        };

        let event = match output {
            SamplerOutput::Live { weight, height } => {
                SessionEvent::LiveReading { weight, height }
            }
            SamplerOutput::Started => {
                info!("scale_collection_started");
                if let Some(m) = &self.metrics {
                    m.record_collection_started();
                }
                SessionEvent::CollectionStarted
            }
            SamplerOutput::Progress { count, target } => {
                debug!(count = %count, target = %target, "scale_collection_progress");
                SessionEvent::CollectionProgress { count, target }
            }
            SamplerOutput::Completed(measurement) => {
                info!(
                    weight = %measurement.weight,
                    height = %measurement.height,
                    "scale_collection_completed"
                );
                if let Some(m) = &self.metrics {
                    m.record_collection_completed();
                }
                SessionEvent::MeasurementComplete(measurement)
            }
        };

        if let Some(tx) = &self.event_tx {
            match tx.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("scale_event_dropped: channel full");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("scale_event_channel_closed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_real_time() {
        assert_eq!(
            classify("{real_time: weight; 72.5, height; 170}"),
            Some(ClassifiedReading::RealTime { weight: 72.5, height: 170.0 })
        );
    }

    #[test]
    fn test_classify_trigger() {
        assert_eq!(classify("{click_button: true}"), Some(ClassifiedReading::Trigger));
        assert_eq!(classify("{click_button: false}"), None);
    }

    #[test]
    fn test_classify_sample() {
        assert_eq!(
            classify("{weight: 70.1, height; 169}"),
            Some(ClassifiedReading::Sample { weight: 70.1, height: 169.0 })
        );
        // Older firmware uses a colon for both fields
        assert_eq!(
            classify("{weight: 70.1, height: 169}"),
            Some(ClassifiedReading::Sample { weight: 70.1, height: 169.0 })
        );
    }

    #[test]
    fn test_classify_noise() {
        assert_eq!(classify("garbage"), None);
        assert_eq!(classify(""), None);
        assert_eq!(classify("{unknown: 1}"), None);
        assert_eq!(classify("{weight: 70.1}"), None);
    }

    #[test]
    fn test_classify_malformed_numeric() {
        assert_eq!(classify("{weight: abc, height; 169}"), None);
        assert_eq!(classify("{real_time: weight; 72.5, height; }"), None);
        assert_eq!(classify("{weight: -5, height; 169}"), None);
        assert_eq!(classify("{weight: NaN, height; 169}"), None);
    }

    #[test]
    fn test_classify_tolerates_whitespace() {
        assert_eq!(
            classify("  {real_time:   weight;72.5,height;170}  "),
            Some(ClassifiedReading::RealTime { weight: 72.5, height: 170.0 })
        );
    }
}
