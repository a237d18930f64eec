//! HTTP listener for HikVision face-scan callbacks
//!
//! The access terminal pushes event notifications to a configured port and
//! path. The listener binds on all interfaces, falling back to loopback when
//! that fails (port in use, insufficient privilege), accepts each connection
//! on its own task so a slow device cannot stall the accept loop, and
//! publishes validated scans to the session channel.
//!
//! Every recognized or ignorable request is acknowledged with 200 - door
//! events and heartbeats are expected traffic, and the device treats anything
//! else as a delivery failure worth retrying.

use crate::domain::types::SessionEvent;
use crate::infra::metrics::Metrics;
use crate::io::decoder::{self, DecodeError};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: std::io::Error },
}

/// Face listener configuration
#[derive(Debug, Clone)]
pub struct FaceIdListenerConfig {
    pub port: u16,
    pub path: String,
}

impl Default for FaceIdListenerConfig {
    fn default() -> Self {
        Self { port: 8080, path: "/hikvision/listen".to_string() }
    }
}

/// HTTP listener with an owned start/stop lifecycle
pub struct FaceIdListener {
    config: FaceIdListenerConfig,
    event_tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    shutdown_tx: Option<watch::Sender<bool>>,
    accept_task: Option<JoinHandle<()>>,
    listen_addr: Option<SocketAddr>,
}

impl FaceIdListener {
    pub fn new(
        config: FaceIdListenerConfig,
        event_tx: mpsc::Sender<SessionEvent>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            config,
            event_tx,
            metrics,
            shutdown_tx: None,
            accept_task: None,
            listen_addr: None,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.accept_task.is_some()
    }

    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    /// Bind the endpoint and start the accept loop.
    ///
    /// Tries all interfaces first, then loopback only on the same port.
    /// Calling `start` while already listening returns the bound address.
    pub async fn start(&mut self) -> Result<SocketAddr, ListenerError> {
        if let (true, Some(addr)) = (self.is_listening(), self.listen_addr) {
            return Ok(addr);
        }

        let any_addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = match TcpListener::bind(any_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(addr = %any_addr, error = %e, "face_listener_bind_retry_loopback");
                let loopback = SocketAddr::from(([127, 0, 0, 1], self.config.port));
                TcpListener::bind(loopback)
                    .await
                    .map_err(|source| ListenerError::Bind { addr: loopback, source })?
            }
        };

        let addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr: any_addr, source })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let path = Arc::new(self.config.path.clone());
        let event_tx = self.event_tx.clone();
        let metrics = self.metrics.clone();

        let task = tokio::spawn(async move {
            accept_loop(listener, path, event_tx, metrics, shutdown_rx).await;
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.accept_task = Some(task);
        self.listen_addr = Some(addr);

        info!(addr = %addr, path = %self.config.path, "face_listener_started");
        Ok(addr)
    }

    /// Stop the listener.
    ///
    /// Idempotent. Blocks until the accept loop and every in-flight
    /// connection task have exited, so no scan event is published after this
    /// returns.
    pub async fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = self.accept_task.take() {
            if task.await.is_err() {
                warn!("face_listener_accept_task_panicked");
            }
            info!("face_listener_stopped");
        }
        self.listen_addr = None;
    }
}

async fn accept_loop(
    listener: TcpListener,
    path: Arc<String>,
    event_tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, peer)) => {
                        let io = TokioIo::new(stream);
                        let path = path.clone();
                        let tx = event_tx.clone();
                        let m = metrics.clone();
                        let mut conn_shutdown = shutdown.clone();

                        connections.spawn(async move {
                            let service = service_fn(move |req| {
                                let path = path.clone();
                                let tx = tx.clone();
                                let m = m.clone();
                                async move { handle_request(req, &path, peer, tx, m).await }
                            });

                            let conn = http1::Builder::new().serve_connection(io, service);
                            tokio::pin!(conn);
                            tokio::select! {
                                result = conn.as_mut() => {
                                    if let Err(e) = result {
                                        debug!(peer = %peer, error = %e, "face_listener_connection_error");
                                    }
                                }
                                // Finish the in-flight request, then close; keeps
                                // keep-alive connections from stalling stop()
                                _ = conn_shutdown.changed() => {
                                    conn.as_mut().graceful_shutdown();
                                    let _ = conn.as_mut().await;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "face_listener_accept_failed");
                    }
                }
            }
            // Reap finished connection tasks so the set does not grow
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    // Drain in-flight connections before reporting the loop as exited
    drop(listener);
    while connections.join_next().await.is_some() {}
    debug!("face_listener_accept_loop_exited");
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    path: &str,
    peer: SocketAddr,
    event_tx: mpsc::Sender<SessionEvent>,
    metrics: Arc<Metrics>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::POST {
        debug!(peer = %peer, method = %req.method(), "face_listener_method_rejected");
        return Ok(status_response(StatusCode::METHOD_NOT_ALLOWED));
    }

    if req.uri().path().trim_end_matches('/') != path.trim_end_matches('/') {
        debug!(peer = %peer, uri_path = %req.uri().path(), "face_listener_unknown_path");
        return Ok(status_response(StatusCode::NOT_FOUND));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(peer = %peer, error = %e, "face_listener_body_read_failed");
            return Ok(status_response(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    metrics.record_callback_received();
    let peer_ip = peer.ip().to_string();

    match decoder::decode(&body, Some(&peer_ip)) {
        Ok(scan) => {
            info!(
                person_id = %scan.person_id,
                device_id = scan.device_id.as_deref().unwrap_or("-"),
                peer_ip = %peer_ip,
                "face_scan_received"
            );
            metrics.record_scan_decoded();

            match event_tx.try_send(SessionEvent::Scan(scan)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    metrics.record_scan_dropped();
                    warn!(peer_ip = %peer_ip, "face_scan_dropped: channel full");
                }
                Err(TrySendError::Closed(_)) => {
                    warn!(peer_ip = %peer_ip, "face_scan_channel_closed");
                }
            }
        }
        Err(DecodeError::NotAFaceEvent) => {
            // Door events, heartbeats, failed matches - expected traffic
            metrics.record_callback_ignored();
            debug!(peer_ip = %peer_ip, "face_event_ignored");
        }
        Err(DecodeError::MalformedPayload) => {
            metrics.record_callback_malformed();
            warn!(peer_ip = %peer_ip, body_len = body.len(), "face_payload_malformed");
        }
    }

    // The device is acknowledged even for dropped payloads; it owns any retry
    Ok(ack_response())
}

fn ack_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(r#"{"status":"ok"}"#)))
        .expect("static response should not fail")
}

fn status_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::new()))
        .expect("static response should not fail")
}
