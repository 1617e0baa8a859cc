//! Station-mode connection state machine.
//!
//! [`StationConnector::connect`] issues one connect request and then polls
//! the classified radio status once per second, yielding to other
//! cooperative work between polls. Two failure statuses (`NO_AP_FOUND`,
//! `AUTH_FAIL`) persist on the hardware even after a disconnect attempt, so
//! they only count once the same classification has been observed
//! continuously for more than five seconds; any status change resets that
//! window. A hard wall-clock timeout bounds the whole attempt so the device
//! can never hang on a dead network.

use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;

use super::events::{emit, NetEvent};
use super::iface::{IfaceError, StationInterface};
use super::status::RadioStatus;

/// Default wall-clock bound for one connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Status poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long a latched failure status must persist before it is believed.
const ERROR_LATCH_WINDOW: Duration = Duration::from_secs(5);

/// Successful connection descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedInfo {
    pub ssid: String,
    pub rssi: i32,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
}

/// Radio-classified reason a connection attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    NoApFound,
    AuthFail,
    AssocFail,
    HandshakeTimeout,
    TimedOut,
}

impl ConnectFailure {
    fn from_status(status: RadioStatus) -> Option<Self> {
        match status {
            RadioStatus::NoApFound => Some(Self::NoApFound),
            RadioStatus::AuthFail => Some(Self::AuthFail),
            RadioStatus::AssocFail => Some(Self::AssocFail),
            RadioStatus::HandshakeTimeout => Some(Self::HandshakeTimeout),
            _ => None,
        }
    }

    /// Wire code used by the provisioning API.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::NoApFound => "NO_AP_FOUND",
            Self::AuthFail => "AUTH_FAIL",
            Self::AssocFail => "ASSOC_FAIL",
            Self::HandshakeTimeout => "HANDSHAKE_TIMEOUT",
            Self::TimedOut => "TIMED_OUT",
        }
    }
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// Outcome of a connection attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The radio classified the attempt as failed.
    Failed(ConnectFailure),
    /// The caller cancelled the attempt.
    Cancelled,
    /// Interface fault; fatal to this attempt, never retried internally.
    Hardware(IfaceError),
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(failure) => write!(f, "connect failed: {}", failure),
            Self::Cancelled => write!(f, "connect cancelled"),
            Self::Hardware(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ConnectError {}

impl From<IfaceError> for ConnectError {
    fn from(err: IfaceError) -> Self {
        Self::Hardware(err)
    }
}

/// Drives station-mode connection attempts.
pub struct StationConnector {
    events: broadcast::Sender<NetEvent>,
}

impl StationConnector {
    pub fn new(events: broadcast::Sender<NetEvent>) -> Self {
        Self { events }
    }

    /// Connect to a network.
    ///
    /// The SSID and password are assumed valid; callers validate before
    /// handing them to the radio. On success the station interface stays
    /// active; every failure path disconnects and deactivates it. The
    /// attempt can be aborted early through `cancel`.
    pub async fn connect(
        &self,
        sta: &mut dyn StationInterface,
        ssid: &str,
        password: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ConnectedInfo, ConnectError> {
        if !sta.is_active() {
            sta.set_active(true)?;
        }

        match self.drive(sta, ssid, password, timeout, cancel).await {
            Ok(info) => Ok(info),
            Err(err) => {
                Self::teardown(sta);
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        sta: &mut dyn StationInterface,
        ssid: &str,
        password: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ConnectedInfo, ConnectError> {
        sta.start_connect(ssid, password)?;
        info!("Connecting to {}", ssid);
        emit(
            &self.events,
            NetEvent::Connecting {
                ssid: ssid.to_string(),
            },
        );

        let started = Instant::now();
        let mut error_since: Option<(RadioStatus, Instant)> = None;

        loop {
            let status = RadioStatus::from_code(sta.raw_status()?)
                .map_err(|err| ConnectError::Hardware(err.into()))?;
            debug!("Connecting... status: {}", status);

            if status == RadioStatus::GotIp {
                let ip_info = sta.ip_info()?;
                let info = ConnectedInfo {
                    ssid: ssid.to_string(),
                    rssi: sta.rssi()?,
                    ip: ip_info.ip,
                    netmask: ip_info.netmask,
                    gateway: ip_info.gateway,
                    dns: ip_info.dns,
                };
                info!("Connected to {}", ssid);
                emit(
                    &self.events,
                    NetEvent::Connected {
                        ssid: info.ssid.clone(),
                        rssi: info.rssi,
                        ip: info.ip,
                    },
                );
                return Ok(info);
            }

            if let Some(failure) = ConnectFailure::from_status(status) {
                if status.latches() {
                    // The window tracks one classification; switching to a
                    // different status restarts it.
                    let since = match error_since {
                        Some((seen, since)) if seen == status => since,
                        _ => {
                            let now = Instant::now();
                            error_since = Some((status, now));
                            now
                        }
                    };
                    if since.elapsed() > ERROR_LATCH_WINDOW {
                        error!("Failed to connect to {}: {}", ssid, status);
                        return Err(ConnectError::Failed(failure));
                    }
                } else {
                    error!("Failed to connect to {}: {}", ssid, status);
                    return Err(ConnectError::Failed(failure));
                }
            } else {
                error_since = None;
            }

            if started.elapsed() > timeout {
                error!("Connection to {} timed out", ssid);
                return Err(ConnectError::Failed(ConnectFailure::TimedOut));
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!("Connection to {} cancelled", ssid);
                    return Err(ConnectError::Cancelled);
                }
                _ = sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Explicit teardown; best-effort, always succeeds.
    pub fn disconnect(&self, sta: &mut dyn StationInterface) {
        let ssid = sta.connected_ssid();
        match &ssid {
            Some(ssid) => info!("Disconnecting from {}", ssid),
            None => info!("Disconnecting station interface"),
        }
        Self::teardown(sta);
        emit(&self.events, NetEvent::Disconnected { ssid });
    }

    fn teardown(sta: &mut dyn StationInterface) {
        if let Err(err) = sta.disconnect() {
            warn!("Station disconnect failed: {}", err);
        }
        if let Err(err) = sta.set_active(false) {
            warn!("Station deactivate failed: {}", err);
        }
    }
}
