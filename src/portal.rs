//! Provisioning HTTP portal.
//!
//! Thin request/response glue between the captive-portal UI and the
//! connection orchestrator. Runs on `tiny_http` in a background thread and
//! forwards work over a channel, so the orchestrator stays the only place
//! that touches the radio. Uses `tiny_http` which works on both host and
//! ESP32 (via std::net).
//!
//! # Endpoints
//!
//! - `GET /api/v1/status` - current station connection descriptor
//! - `GET /api/v1/scan` - discovered networks keyed by SSID
//! - `POST /api/v1/store` - validate credentials, connect, persist

use std::io::Read;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use log::{error, info, warn};
use serde::Deserialize;
use tiny_http::{Method, Response, Server};
use tokio::sync::{mpsc, oneshot};

use crate::config::Credentials;
use crate::wifi::orchestrator::{PortalRequest, RequestError};
use crate::wifi::station::ConnectError;

/// Default port for the provisioning portal.
pub const DEFAULT_PORTAL_PORT: u16 = 80;

/// Upper bound on accepted request bodies.
const MAX_BODY_LEN: u64 = 512;

#[derive(Deserialize)]
struct StoreBody {
    ssid: String,
    password: String,
}

/// Validate a store request body into credentials.
///
/// Rejection happens here, before anything is sent to the orchestrator, so
/// malformed input never causes radio side effects.
fn parse_store_body(body: &[u8]) -> Result<Credentials, String> {
    let raw: StoreBody = serde_json::from_slice(body).map_err(|err| err.to_string())?;
    Credentials::new(raw.ssid, raw.password).map_err(|err| err.to_string())
}

fn code_json(code: &str) -> String {
    format!(r#"{{"code":"{}"}}"#, code)
}

/// Provisioning portal server.
///
/// Runs in a background thread and bridges HTTP requests to the
/// orchestrator's request channel.
pub struct PortalServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl PortalServer {
    /// Start the portal.
    ///
    /// Binds to `bind_addr` (0.0.0.0 when `None`) and serves until dropped.
    pub fn start(
        bind_addr: Option<IpAddr>,
        port: u16,
        requests: mpsc::Sender<PortalRequest>,
    ) -> Result<Self, std::io::Error> {
        let addr = match bind_addr {
            Some(ip) => format!("{}:{}", ip, port),
            None => format!("0.0.0.0:{}", port),
        };

        let server = Server::http(&addr)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::AddrInUse, format!("{}", e)))?;

        info!("Provisioning portal listening on http://{}/", addr);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();

        let handle = thread::spawn(move || {
            Self::run_server(server, requests, shutdown_clone);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
        })
    }

    fn run_server(
        server: Server,
        requests: mpsc::Sender<PortalRequest>,
        shutdown: Arc<AtomicBool>,
    ) {
        let content_type =
            tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                .expect("static header");

        loop {
            if shutdown.load(Ordering::Acquire) {
                info!("Provisioning portal shutting down");
                break;
            }

            match server.recv_timeout(std::time::Duration::from_millis(100)) {
                Ok(Some(mut request)) => {
                    let mut body = Vec::new();
                    if *request.method() == Method::Post {
                        if let Err(err) = request
                            .as_reader()
                            .take(MAX_BODY_LEN)
                            .read_to_end(&mut body)
                        {
                            warn!("Failed to read request body: {}", err);
                        }
                    }

                    let path = request.url().split('?').next().unwrap_or("");
                    let (status, json) = dispatch(request.method(), path, &body, &requests);

                    let response = Response::from_string(json)
                        .with_status_code(status)
                        .with_header(content_type.clone());
                    if let Err(err) = request.respond(response) {
                        warn!("Failed to send response: {}", err);
                    }
                }
                Ok(None) => {
                    // Timeout, check shutdown flag and continue
                }
                Err(err) => {
                    error!("Portal server error: {}", err);
                    break;
                }
            }
        }
    }

    /// Stop the portal.
    ///
    /// Note: may take up to 100ms due to the polling interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PortalServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Route one request to the orchestrator and render the response.
fn dispatch(
    method: &Method,
    path: &str,
    body: &[u8],
    requests: &mpsc::Sender<PortalRequest>,
) -> (u16, String) {
    match (method, path) {
        (Method::Get, "/api/v1/status") => status(requests),
        (Method::Get, "/api/v1/scan") => scan(requests),
        (Method::Post, "/api/v1/store") => store(body, requests),
        (Method::Get, _) | (Method::Post, _) => (404, code_json("NOT_FOUND")),
        _ => (405, code_json("METHOD_NOT_ALLOWED")),
    }
}

fn status(requests: &mpsc::Sender<PortalRequest>) -> (u16, String) {
    let (reply, response) = oneshot::channel();
    if requests
        .blocking_send(PortalRequest::Status { reply })
        .is_err()
    {
        return (503, code_json("UNAVAILABLE"));
    }
    match response.blocking_recv() {
        Ok(Ok(report)) => match serde_json::to_string(&report) {
            Ok(json) => (200, json),
            Err(err) => {
                error!("Failed to encode status report: {}", err);
                (500, code_json("INTERNAL"))
            }
        },
        Ok(Err(err)) => {
            error!("Status request failed: {}", err);
            (500, code_json("INTERNAL"))
        }
        Err(_) => (503, code_json("UNAVAILABLE")),
    }
}

fn scan(requests: &mpsc::Sender<PortalRequest>) -> (u16, String) {
    let (reply, response) = oneshot::channel();
    if requests
        .blocking_send(PortalRequest::Scan { reply })
        .is_err()
    {
        return (503, code_json("UNAVAILABLE"));
    }
    match response.blocking_recv() {
        Ok(Ok(entries)) => {
            let mut map = serde_json::Map::new();
            for entry in entries {
                match serde_json::to_value(&entry) {
                    Ok(value) => {
                        map.insert(entry.ssid.clone(), value);
                    }
                    Err(err) => {
                        error!("Failed to encode scan entry: {}", err);
                        return (500, code_json("INTERNAL"));
                    }
                }
            }
            (200, serde_json::Value::Object(map).to_string())
        }
        Ok(Err(err)) => {
            error!("Scan request failed: {}", err);
            (500, code_json("INTERNAL"))
        }
        Err(_) => (503, code_json("UNAVAILABLE")),
    }
}

fn store(body: &[u8], requests: &mpsc::Sender<PortalRequest>) -> (u16, String) {
    let credentials = match parse_store_body(body) {
        Ok(credentials) => credentials,
        Err(reason) => {
            warn!("Rejected store request: {}", reason);
            return (400, code_json("POST_INVALID"));
        }
    };

    let (reply, response) = oneshot::channel();
    if requests
        .blocking_send(PortalRequest::Store { credentials, reply })
        .is_err()
    {
        return (503, code_json("UNAVAILABLE"));
    }
    match response.blocking_recv() {
        Ok(Ok(_info)) => (200, r#"{"connected":true}"#.to_string()),
        Ok(Err(RequestError::Connect(ConnectError::Failed(failure)))) => (
            400,
            code_json(&format!("WLAN_CONNECT_{}", failure.as_code())),
        ),
        Ok(Err(RequestError::Connect(ConnectError::Cancelled))) => {
            (500, code_json("CONNECT_ABORTED"))
        }
        Ok(Err(err)) => {
            error!("Store request failed: {}", err);
            (500, code_json("INTERNAL"))
        }
        Err(_) => (503, code_json("UNAVAILABLE")),
    }
}
