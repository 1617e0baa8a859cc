//! Boot-time connectivity orchestration.
//!
//! The orchestrator owns the radio handle and the credential store. At boot
//! it either joins the persisted network (station mode) or stands up the
//! provisioning access point, then serves portal requests until the process
//! ends. Fresh credentials received through the portal are tried first,
//! persisted only on success, and followed by a delayed restart into a clean
//! radio state.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::{Credentials, CredentialStore, StoreError, StoreKey};
use crate::restart::{DelayedRestart, Restarter};

use super::access_point::{AccessPointManager, ApError};
use super::events::NetEvent;
use super::iface::{IfaceError, RadioInterfaces, StationInterface};
use super::scan::{NetworkScanner, ScanEntry};
use super::station::{ConnectError, ConnectedInfo, StationConnector};
use super::status::{RadioStatus, SecurityMode};

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Application name; seeds the derived AP SSID and hostname.
    pub app_name: String,
    /// Wall-clock bound for one station connect attempt.
    pub connect_timeout: Duration,
    /// Delay before the post-provisioning restart fires.
    pub restart_delay: Duration,
    /// Sequential station attempts at boot before falling back to
    /// provisioning.
    pub station_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            app_name: "onboard".to_string(),
            connect_timeout: super::station::CONNECT_TIMEOUT,
            restart_delay: Duration::from_secs(10),
            station_attempts: 1,
        }
    }
}

/// Orchestrator life-cycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Boot,
    StationAttempt,
    Provisioning,
    Operational,
}

/// A request forwarded from the provisioning portal.
///
/// Requests are served strictly in order, so a second connect can never
/// start while one is outstanding.
pub enum PortalRequest {
    Status {
        reply: oneshot::Sender<Result<StationReport, RequestError>>,
    },
    Scan {
        reply: oneshot::Sender<Result<Vec<ScanEntry>, RequestError>>,
    },
    Store {
        credentials: Credentials,
        reply: oneshot::Sender<Result<ConnectedInfo, RequestError>>,
    },
}

/// Station state as reported to the portal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StationReport {
    Connected {
        ssid: String,
        channel: u8,
        is_hidden: bool,
        security: SecurityMode,
        key: String,
        txpower: i8,
    },
    Disconnected {
        status: RadioStatus,
        is_connected: bool,
    },
}

/// Why a portal request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The connect attempt failed; carries the typed reason for the UI.
    Connect(ConnectError),
    /// Persistence failed after a successful connect.
    Store(StoreError),
    /// Interface fault while gathering the response.
    Iface(IfaceError),
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(err) => write!(f, "{}", err),
            Self::Store(err) => write!(f, "{}", err),
            Self::Iface(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RequestError {}

/// Fatal orchestrator errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    Store(StoreError),
    Ap(ApError),
}

impl fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{}", err),
            Self::Ap(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for OrchestratorError {}

/// Top-level connectivity controller.
pub struct ConnectionOrchestrator {
    config: OrchestratorConfig,
    ifaces: RadioInterfaces,
    store: Box<dyn CredentialStore>,
    restarter: Arc<dyn Restarter>,
    station: StationConnector,
    ap: AccessPointManager,
    scanner: NetworkScanner,
    requests: mpsc::Receiver<PortalRequest>,
    state: OrchestratorState,
    pending_restart: Option<DelayedRestart>,
    cancel: CancellationToken,
}

impl ConnectionOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        ifaces: RadioInterfaces,
        store: Box<dyn CredentialStore>,
        restarter: Arc<dyn Restarter>,
        events: broadcast::Sender<NetEvent>,
        requests: mpsc::Receiver<PortalRequest>,
    ) -> Self {
        Self {
            station: StationConnector::new(events.clone()),
            ap: AccessPointManager::new(config.app_name.clone(), events),
            scanner: NetworkScanner,
            config,
            ifaces,
            store,
            restarter,
            requests,
            state: OrchestratorState::Boot,
            pending_restart: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Current life-cycle state.
    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Boot and serve portal requests until the request channel closes.
    pub async fn run(mut self) -> Result<(), OrchestratorError> {
        self.boot().await?;

        while let Some(request) = self.requests.recv().await {
            match request {
                PortalRequest::Status { reply } => {
                    let _ = reply.send(self.handle_status());
                }
                PortalRequest::Scan { reply } => {
                    let _ = reply.send(self.handle_scan());
                }
                PortalRequest::Store { credentials, reply } => {
                    let result = self.handle_store(credentials).await;
                    let _ = reply.send(result);
                }
            }
        }
        Ok(())
    }

    async fn boot(&mut self) -> Result<(), OrchestratorError> {
        match self.load_credentials().map_err(OrchestratorError::Store)? {
            Some(credentials) => {
                info!("WiFi credentials found, starting station mode");
                self.state = OrchestratorState::StationAttempt;
                if self.try_station(&credentials).await {
                    self.state = OrchestratorState::Operational;
                } else {
                    info!("Station mode failed, falling back to provisioning");
                    self.enter_provisioning()?;
                }
            }
            None => {
                info!("No WiFi credentials found, starting captive portal");
                self.enter_provisioning()?;
            }
        }
        Ok(())
    }

    /// Read the persisted credential pair; a missing or malformed pair is
    /// treated as absent, any other store fault is fatal.
    fn load_credentials(&self) -> Result<Option<Credentials>, StoreError> {
        let ssid = self.store.get_opt(&StoreKey::SSID)?;
        let password = self.store.get_opt(&StoreKey::PASSWORD)?;
        match (ssid, password) {
            (Some(ssid), Some(password)) => match Credentials::new(ssid, password) {
                Ok(credentials) => Ok(Some(credentials)),
                Err(err) => {
                    warn!("Persisted credentials are malformed: {}", err);
                    Ok(None)
                }
            },
            _ => Ok(None),
        }
    }

    async fn try_station(&mut self, credentials: &Credentials) -> bool {
        for attempt in 1..=self.config.station_attempts.max(1) {
            let token = self.cancel.child_token();
            match self
                .station
                .connect(
                    self.ifaces.sta.as_mut(),
                    &credentials.ssid,
                    &credentials.password,
                    self.config.connect_timeout,
                    &token,
                )
                .await
            {
                Ok(_) => return true,
                Err(err) => warn!("Station attempt {} failed: {}", attempt, err),
            }
        }
        false
    }

    fn enter_provisioning(&mut self) -> Result<(), OrchestratorError> {
        self.ap
            .start(&mut self.ifaces, self.store.as_mut(), None, None)
            .map_err(OrchestratorError::Ap)?;
        self.state = OrchestratorState::Provisioning;
        Ok(())
    }

    /// Try freshly provisioned credentials; persist them and schedule the
    /// restart only after the connect succeeded.
    async fn handle_store(
        &mut self,
        credentials: Credentials,
    ) -> Result<ConnectedInfo, RequestError> {
        // A connect attempt reconfigures the station; abort any restart
        // still pending from an earlier update first.
        if let Some(pending) = self.pending_restart.take() {
            pending.cancel();
        }

        let previous = self.state;
        self.state = OrchestratorState::StationAttempt;
        let token = self.cancel.child_token();
        let result = self
            .station
            .connect(
                self.ifaces.sta.as_mut(),
                &credentials.ssid,
                &credentials.password,
                self.config.connect_timeout,
                &token,
            )
            .await;
        self.state = previous;

        let info = result.map_err(RequestError::Connect)?;
        self.persist_credentials(&credentials)
            .map_err(RequestError::Store)?;
        self.pending_restart = Some(DelayedRestart::schedule(
            self.config.restart_delay,
            self.restarter.clone(),
        ));
        Ok(info)
    }

    /// Persist the pair; never leave a torn pair behind.
    fn persist_credentials(&mut self, credentials: &Credentials) -> Result<(), StoreError> {
        let store = self.store.as_mut();
        store.set(&StoreKey::SSID, &credentials.ssid)?;
        if let Err(err) = store.set(&StoreKey::PASSWORD, &credentials.password) {
            let _ = store.delete(&StoreKey::SSID);
            return Err(err);
        }
        Ok(())
    }

    fn handle_status(&mut self) -> Result<StationReport, RequestError> {
        let sta = self.ifaces.sta.as_mut();
        let was_active = sta.is_active();
        if !was_active {
            sta.set_active(true).map_err(RequestError::Iface)?;
        }

        if !sta.is_connected() {
            let raw = sta.raw_status().map_err(RequestError::Iface)?;
            let status = RadioStatus::from_code(raw)
                .map_err(|err| RequestError::Iface(err.into()))?;
            if !was_active {
                let _ = sta.set_active(false);
            }
            return Ok(StationReport::Disconnected {
                status,
                is_connected: false,
            });
        }

        let link = sta
            .link()
            .map_err(RequestError::Iface)?
            .ok_or_else(|| {
                RequestError::Iface(IfaceError::Driver(
                    "link configuration unavailable".to_string(),
                ))
            })?;
        let security = SecurityMode::from_code(link.auth_code)
            .map_err(|err| RequestError::Iface(err.into()))?;
        Ok(StationReport::Connected {
            ssid: link.ssid,
            channel: link.channel,
            is_hidden: link.hidden,
            security,
            key: link.key,
            txpower: link.tx_power,
        })
    }

    fn handle_scan(&mut self) -> Result<Vec<ScanEntry>, RequestError> {
        self.scanner
            .scan(self.ifaces.sta.as_mut())
            .map_err(RequestError::Iface)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, STORE_SECTION};
    use crate::wifi::iface::AccessPointInterface;
    use crate::wifi::sim::{
        sim_interfaces, SimAccessPoint, SimHost, SimNetwork, SimRestarter, SimStation,
    };
    use crate::wifi::station::ConnectFailure;
    use tokio::time::{sleep, Instant};

    struct Fixture {
        orchestrator: ConnectionOrchestrator,
        sta: SimStation,
        ap: SimAccessPoint,
        #[allow(dead_code)]
        host: SimHost,
        store: MemoryStore,
        restarter: SimRestarter,
        events: broadcast::Receiver<NetEvent>,
        requests: mpsc::Sender<PortalRequest>,
    }

    fn home_network() -> SimNetwork {
        SimNetwork {
            ssid: "HomeNet".to_string(),
            bssid: [2, 0, 0, 0, 0, 1],
            channel: 6,
            rssi: -52,
            auth_code: 3,
            hidden: false,
            password: Some("hunter22".to_string()),
        }
    }

    fn fixture(networks: Vec<SimNetwork>) -> Fixture {
        let (ifaces, sta, ap, host) = sim_interfaces(networks);
        let store = MemoryStore::new(STORE_SECTION);
        let restarter = SimRestarter::default();
        let (events_tx, events) = broadcast::channel(16);
        let (requests, requests_rx) = mpsc::channel(4);
        let orchestrator = ConnectionOrchestrator::new(
            OrchestratorConfig {
                app_name: "Onboard".to_string(),
                ..OrchestratorConfig::default()
            },
            ifaces,
            Box::new(store.clone()),
            Arc::new(restarter.clone()),
            events_tx,
            requests_rx,
        );
        Fixture {
            orchestrator,
            sta,
            ap,
            host,
            store,
            restarter,
            events,
            requests,
        }
    }

    fn seed_credentials(store: &mut MemoryStore, ssid: &str, password: &str) {
        store.set(&StoreKey::SSID, ssid).unwrap();
        store.set(&StoreKey::PASSWORD, password).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_without_credentials_enters_provisioning() {
        let mut fix = fixture(vec![home_network()]);
        fix.orchestrator.boot().await.unwrap();

        assert_eq!(fix.orchestrator.state(), OrchestratorState::Provisioning);
        assert!(fix.ap.is_active());
        assert!(!fix.sta.is_active());
        // Provisioning resolved and persisted a hostname
        assert!(fix
            .store
            .get(&StoreKey::HOSTNAME)
            .unwrap()
            .starts_with("onboard_"));
        assert!(matches!(
            fix.events.try_recv().unwrap(),
            NetEvent::ApStarted { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_with_credentials_goes_operational() {
        let mut fix = fixture(vec![home_network()]);
        seed_credentials(&mut fix.store, "HomeNet", "hunter22");

        fix.orchestrator.boot().await.unwrap();

        assert_eq!(fix.orchestrator.state(), OrchestratorState::Operational);
        assert!(fix.sta.is_connected());
        assert!(!fix.ap.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_with_unreachable_network_falls_back() {
        let mut fix = fixture(vec![home_network()]);
        seed_credentials(&mut fix.store, "gone-net", "hunter22");

        let started = Instant::now();
        fix.orchestrator.boot().await.unwrap();

        // NO_AP_FOUND is declared after the debounce window, not the full
        // connect timeout
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(fix.orchestrator.state(), OrchestratorState::Provisioning);
        assert!(fix.ap.is_active());
        assert!(!fix.sta.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_with_malformed_credentials_skips_radio() {
        let mut fix = fixture(vec![home_network()]);
        // Too short to ever have passed portal validation
        seed_credentials(&mut fix.store, "x", "hunter22");

        let started = Instant::now();
        fix.orchestrator.boot().await.unwrap();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(fix.orchestrator.state(), OrchestratorState::Provisioning);
        // No connect attempt reached the station interface
        assert_eq!(fix.sta.status_code(), 1000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_success_persists_and_schedules_restart() {
        let mut fix = fixture(vec![home_network()]);
        fix.orchestrator.boot().await.unwrap();

        let credentials = Credentials::new("HomeNet", "hunter22").unwrap();
        let info = fix.orchestrator.handle_store(credentials).await.unwrap();
        assert_eq!(info.ssid, "HomeNet");

        assert_eq!(fix.store.get(&StoreKey::SSID).unwrap(), "HomeNet");
        assert_eq!(fix.store.get(&StoreKey::PASSWORD).unwrap(), "hunter22");

        // The restart fires after the delay, not immediately
        assert!(!fix.restarter.restart_requested());
        sleep(Duration::from_secs(11)).await;
        assert!(fix.restarter.restart_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_persists_nothing() {
        let mut fix = fixture(vec![home_network()]);
        fix.orchestrator.boot().await.unwrap();

        let credentials = Credentials::new("gone-net", "hunter22").unwrap();
        let result = fix.orchestrator.handle_store(credentials).await;

        assert_eq!(
            result,
            Err(RequestError::Connect(ConnectError::Failed(
                ConnectFailure::NoApFound
            )))
        );
        assert!(fix.store.get_opt(&StoreKey::SSID).unwrap().is_none());
        assert!(fix.store.get_opt(&StoreKey::PASSWORD).unwrap().is_none());
        assert_eq!(fix.orchestrator.state(), OrchestratorState::Provisioning);

        sleep(Duration::from_secs(60)).await;
        assert!(!fix.restarter.restart_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_store_cancels_pending_restart() {
        let mut fix = fixture(vec![home_network()]);
        fix.orchestrator.boot().await.unwrap();

        let credentials = Credentials::new("HomeNet", "hunter22").unwrap();
        fix.orchestrator.handle_store(credentials).await.unwrap();

        // A second update arrives before the restart fires and fails; the
        // earlier restart must have been aborted
        sleep(Duration::from_secs(5)).await;
        let bad = Credentials::new("gone-net", "hunter22").unwrap();
        let _ = fix.orchestrator.handle_store(bad).await;

        sleep(Duration::from_secs(120)).await;
        assert!(!fix.restarter.restart_requested());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_deletes_torn_pair_on_persist_failure() {
        let long_password = "p".repeat(40);
        let network = SimNetwork {
            password: Some(long_password.clone()),
            ..home_network()
        };
        let mut fix = fixture(vec![network]);
        fix.orchestrator.boot().await.unwrap();

        // Valid for the portal (<= 63 bytes) but beyond the password key's
        // 32-byte store capacity: connect succeeds, persistence fails
        let credentials = Credentials::new("HomeNet", long_password).unwrap();
        let result = fix.orchestrator.handle_store(credentials).await;

        assert!(matches!(result, Err(RequestError::Store(_))));
        assert!(fix.store.get_opt(&StoreKey::SSID).unwrap().is_none());
        assert!(fix.store.get_opt(&StoreKey::PASSWORD).unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_report_when_connected() {
        let mut fix = fixture(vec![home_network()]);
        seed_credentials(&mut fix.store, "HomeNet", "hunter22");
        fix.orchestrator.boot().await.unwrap();

        let report = fix.orchestrator.handle_status().unwrap();
        assert_eq!(
            report,
            StationReport::Connected {
                ssid: "HomeNet".to_string(),
                channel: 6,
                is_hidden: false,
                security: SecurityMode::Wpa2Psk,
                key: "hunter22".to_string(),
                txpower: 20,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_report_when_disconnected_restores_interface() {
        let mut fix = fixture(vec![home_network()]);
        fix.orchestrator.boot().await.unwrap();
        assert!(!fix.sta.is_active());

        let report = fix.orchestrator.handle_status().unwrap();
        assert_eq!(
            report,
            StationReport::Disconnected {
                status: RadioStatus::Idle,
                is_connected: false,
            }
        );
        assert!(!fix.sta.is_active());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "IDLE");
        assert_eq!(json["is_connected"], false);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_serves_portal_requests() {
        let fix = fixture(vec![home_network()]);
        let requests = fix.requests.clone();
        let task = tokio::spawn(fix.orchestrator.run());

        let (reply, rx) = oneshot::channel();
        requests
            .send(PortalRequest::Scan { reply })
            .await
            .unwrap();
        let entries = rx.await.unwrap().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ssid, "HomeNet");

        drop(requests);
        drop(fix.requests);
        task.await.unwrap().unwrap();
    }
}
