//! Session correlation between face scans and scale measurements
//!
//! The correlator is the single owner of the `PersonSession`: every producer
//! (HTTP listener, serial monitor, its own background lookup/save tasks)
//! publishes `SessionEvent`s into one bounded channel, and this task applies
//! them in arrival order. Person/history lookups and saves run on spawned
//! tasks so network IO never stalls ingestion; their results come back
//! through the same channel tagged with the person id captured at start, and
//! are discarded when the session has since moved on to someone else.

use crate::domain::session::PersonSession;
use crate::domain::types::{PriorMeasurement, ScanEvent, SessionEvent};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::api::{AccessControlApi, CreateBmiMeasurementDto};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Cloneable handle for issuing commands to a running correlator
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { tx }
    }

    /// Request that the current measurement be persisted
    pub async fn save(&self) {
        let _ = self.tx.send(SessionEvent::SaveRequested).await;
    }

    /// Request an immediate session reset
    pub async fn clear(&self) {
        let _ = self.tx.send(SessionEvent::ClearRequested).await;
    }

    pub fn sender(&self) -> mpsc::Sender<SessionEvent> {
        self.tx.clone()
    }
}

/// Central coordinator holding the one mutable measurement session
pub struct SessionCorrelator {
    session: PersonSession,
    api: Arc<dyn AccessControlApi>,
    metrics: Arc<Metrics>,
    /// Sender cloned into background tasks so results re-enter the event loop
    event_tx: mpsc::Sender<SessionEvent>,
    save_in_flight: bool,
    save_grace: Duration,
    device_id: String,
}

impl SessionCorrelator {
    pub fn new(
        config: &Config,
        api: Arc<dyn AccessControlApi>,
        metrics: Arc<Metrics>,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            session: PersonSession::new(),
            api,
            metrics,
            event_tx,
            save_in_flight: false,
            save_grace: Duration::from_millis(config.save_grace_ms()),
            device_id: config.api_device_id().to_string(),
        }
    }

    /// Override the post-save grace delay (tests use zero)
    pub fn with_save_grace(mut self, grace: Duration) -> Self {
        self.save_grace = grace;
        self
    }

    pub fn session(&self) -> &PersonSession {
        &self.session
    }

    pub fn save_in_flight(&self) -> bool {
        self.save_in_flight
    }

    /// Consume events until the channel closes
    pub async fn run(&mut self, mut event_rx: mpsc::Receiver<SessionEvent>) {
        info!("session_correlator_started");
        while let Some(event) = event_rx.recv().await {
            self.handle_event(event);
        }
        info!("session_correlator_stopped");
    }

    /// Apply one event to the session.
    ///
    /// Synchronous by design: anything that suspends runs on a spawned task
    /// and reports back through the channel.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Scan(scan) => self.handle_scan(scan),
            SessionEvent::LiveReading { weight, height } => {
                self.session.set_measurement(weight, height);
            }
            SessionEvent::CollectionStarted => {
                self.session.reset_measurement();
            }
            SessionEvent::CollectionProgress { count, target } => {
                debug!(count = %count, target = %target, "collection_progress");
            }
            SessionEvent::MeasurementComplete(m) => {
                self.session.set_measurement(m.weight, m.height);
                info!(
                    weight = %m.weight,
                    height = %m.height,
                    bmi = format!("{:.2}", self.session.bmi),
                    category = %self.session.category,
                    "measurement_ready"
                );
            }
            SessionEvent::PersonResolved { person_id, name, position } => {
                if !self.person_matches(&person_id, "person_lookup") {
                    return;
                }
                self.session.apply_person(&name, position.as_deref());
                info!(person_id = %person_id, name = %name, "person_resolved");
            }
            SessionEvent::HistoryResolved { person_id, prior } => {
                if !self.person_matches(&person_id, "history_lookup") {
                    return;
                }
                if let Some(ref p) = prior {
                    info!(
                        person_id = %person_id,
                        prior_bmi = format!("{:.2}", p.bmi),
                        "history_resolved"
                    );
                }
                self.session.apply_prior(prior);
            }
            SessionEvent::SaveRequested => self.handle_save_request(),
            SessionEvent::SaveFinished { person_id, measurement_id, saved } => {
                self.handle_save_finished(&person_id, measurement_id, saved);
            }
            SessionEvent::ClearRequested => {
                self.session.clear();
            }
            SessionEvent::ClearDeferred { person_id } => {
                if self.person_matches(&person_id, "deferred_clear") {
                    self.session.clear();
                }
            }
        }
    }

    /// Late async results must match the session's current person; a newer
    /// scan or an explicit clear invalidates them.
    fn person_matches(&self, person_id: &str, origin: &str) -> bool {
        if self.session.person_id.as_deref() == Some(person_id) {
            return true;
        }
        debug!(
            person_id = %person_id,
            current = self.session.person_id.as_deref().unwrap_or("-"),
            origin = %origin,
            "stale_result_discarded"
        );
        false
    }

    fn handle_scan(&mut self, scan: ScanEvent) {
        info!(
            person_id = %scan.person_id,
            device_id = scan.device_id.as_deref().unwrap_or("-"),
            scan_time = %scan.scan_time,
            "person_scanned"
        );

        // Provisional identity immediately; details refine when lookups land.
        // A later scan simply overwrites - last scan wins.
        self.session.begin(&scan.person_id, scan.name.as_deref());

        let api = self.api.clone();
        let tx = self.event_tx.clone();
        let metrics = self.metrics.clone();
        let person_id = scan.person_id;

        tokio::spawn(async move {
            if let Some(person) = api.get_person_by_id(&person_id).await {
                let _ = tx
                    .send(SessionEvent::PersonResolved {
                        person_id: person_id.clone(),
                        name: person.full_name(),
                        position: person.position,
                    })
                    .await;
            } else {
                metrics.record_lookup_failed();
                warn!(person_id = %person_id, "person_lookup_failed");
            }

            let prior = api.get_latest_measurement(&person_id).await.map(|dto| PriorMeasurement {
                bmi: dto.bmi,
                weight: dto.weight,
                height: dto.height,
                category: dto.bmi_category,
                measured_at: dto.measured_at,
            });
            let _ = tx.send(SessionEvent::HistoryResolved { person_id, prior }).await;
        });
    }

    fn handle_save_request(&mut self) {
        if self.save_in_flight {
            warn!("save_rejected: already in flight");
            return;
        }
        let Some(person_id) = self.session.person_id.clone().filter(|_| self.session.can_save())
        else {
            warn!(
                has_person = %self.session.has_person(),
                bmi = format!("{:.2}", self.session.bmi),
                "save_rejected: nothing to save"
            );
            return;
        };
        let saved = PriorMeasurement {
            bmi: self.session.bmi,
            weight: self.session.weight,
            height: self.session.height,
            category: self.session.category.as_str().to_string(),
            measured_at: Utc::now(),
        };
        let dto = CreateBmiMeasurementDto {
            turnstile_person_id: person_id.clone(),
            weight: saved.weight,
            height: saved.height,
            bmi: saved.bmi,
            bmi_category: saved.category.clone(),
            measured_at: saved.measured_at,
            device_id: Some(self.device_id.clone()),
        };

        self.save_in_flight = true;
        info!(person_id = %person_id, bmi = format!("{:.2}", saved.bmi), "save_started");

        let api = self.api.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let measurement_id = api.create_measurement(&dto).await;
            let _ = tx.send(SessionEvent::SaveFinished { person_id, measurement_id, saved }).await;
        });
    }

    fn handle_save_finished(
        &mut self,
        person_id: &str,
        measurement_id: Option<i64>,
        saved: PriorMeasurement,
    ) {
        self.save_in_flight = false;

        let Some(id) = measurement_id else {
            self.metrics.record_save_failed();
            // Session stays intact so the operator can retry
            warn!(person_id = %person_id, "save_failed");
            return;
        };

        self.metrics.record_save_ok();
        info!(person_id = %person_id, measurement_id = %id, "save_completed");

        if !self.person_matches(person_id, "save") {
            return;
        }

        // The saved values become the baseline, so an immediate re-measure
        // shows a zero delta against itself
        self.session.apply_prior(Some(saved));

        let tx = self.event_tx.clone();
        let grace = self.save_grace;
        let person_id = person_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(SessionEvent::ClearDeferred { person_id }).await;
        });
    }
}
