//! Onboard firmware binary.
//!
//! On ESP32 this boots the real radio; on the host it runs the same
//! orchestrator and portal against the in-process radio simulator, which is
//! handy for driving the provisioning flow from a workstation.

use std::sync::Arc;

use log::{error, info};
use tokio::sync::{broadcast, mpsc};

use onboard_esp32::config::STORE_SECTION;
use onboard_esp32::portal::PortalServer;
use onboard_esp32::wifi::{ConnectionOrchestrator, NetEvent, OrchestratorConfig, RadioInterfaces};

fn serve(
    ifaces: RadioInterfaces,
    store: Box<dyn onboard_esp32::CredentialStore>,
    restarter: Arc<dyn onboard_esp32::Restarter>,
    bind_addr: Option<std::net::IpAddr>,
    port: u16,
) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    runtime.block_on(async move {
        let (events_tx, mut events_rx) = broadcast::channel(16);
        let (requests_tx, requests_rx) = mpsc::channel(4);

        let orchestrator = ConnectionOrchestrator::new(
            OrchestratorConfig::default(),
            ifaces,
            store,
            restarter,
            events_tx,
            requests_rx,
        );

        let _portal = match PortalServer::start(bind_addr, port, requests_tx) {
            Ok(portal) => portal,
            Err(err) => {
                error!("Failed to start provisioning portal: {}", err);
                return;
            }
        };

        tokio::spawn(async move {
            while let Ok(event) = events_rx.recv().await {
                match event {
                    NetEvent::Connecting { ssid } => info!("[event] connecting to {}", ssid),
                    NetEvent::Connected { ssid, rssi, ip } => {
                        info!("[event] connected to {} ({} dBm), IP {}", ssid, rssi, ip)
                    }
                    NetEvent::Disconnected { ssid } => {
                        info!("[event] disconnected from {:?}", ssid)
                    }
                    NetEvent::ApStarted { ssid, hostname } => {
                        info!("[event] access point {} up, hostname {}", ssid, hostname)
                    }
                    NetEvent::ApStopped { ssid } => {
                        info!("[event] access point {:?} down", ssid)
                    }
                }
            }
        });

        if let Err(err) = orchestrator.run().await {
            error!("Orchestrator stopped: {}", err);
        }
    });
}

#[cfg(feature = "esp32")]
fn main() {
    // Link ESP-IDF patches (must be first!)
    esp_idf_sys::link_patches();

    esp_idf_svc::log::EspLogger::initialize_default();
    info!("=== Onboard firmware starting ===");

    use esp_idf_hal::peripherals::Peripherals;
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::nvs::{EspNvsPartition, NvsDefault};
    use onboard_esp32::config::NvsStore;
    use onboard_esp32::portal::DEFAULT_PORTAL_PORT;
    use onboard_esp32::wifi::esp::{esp_interfaces, EspRestarter};

    let peripherals = Peripherals::take().expect("peripherals");
    let sysloop = EspSystemEventLoop::take().expect("system event loop");
    let partition = EspNvsPartition::<NvsDefault>::take().expect("NVS partition");

    let ifaces =
        esp_interfaces(peripherals.modem, sysloop, partition.clone()).expect("wifi driver");
    let store = NvsStore::open(partition, STORE_SECTION).expect("NVS store");

    serve(
        ifaces,
        Box::new(store),
        Arc::new(EspRestarter),
        None,
        DEFAULT_PORTAL_PORT,
    );
}

#[cfg(not(feature = "esp32"))]
fn main() {
    env_logger::init();
    info!("=== Onboard simulator starting ===");

    use onboard_esp32::config::MemoryStore;
    use onboard_esp32::wifi::sim::{sim_interfaces, SimNetwork, SimRestarter};

    // A small fake neighborhood so /api/v1/scan and /api/v1/store have
    // something to work with
    let networks = vec![
        SimNetwork {
            ssid: "HomeNet".to_string(),
            bssid: [0x02, 0x00, 0x00, 0x00, 0x00, 0x01],
            channel: 6,
            rssi: -52,
            auth_code: 3,
            hidden: false,
            password: Some("hunter22".to_string()),
        },
        SimNetwork {
            ssid: "cafe-guest".to_string(),
            bssid: [0x02, 0x00, 0x00, 0x00, 0x00, 0x02],
            channel: 11,
            rssi: -74,
            auth_code: 0,
            hidden: false,
            password: None,
        },
    ];

    let (ifaces, _sta, _ap, _host) = sim_interfaces(networks);
    let store = MemoryStore::new(STORE_SECTION);
    let restarter = SimRestarter::default();

    info!("Portal on http://127.0.0.1:8080/ (try POST /api/v1/store with {{\"ssid\":\"HomeNet\",\"password\":\"hunter22\"}})");
    serve(
        ifaces,
        Box::new(store),
        Arc::new(restarter),
        Some(std::net::IpAddr::from([127, 0, 0, 1])),
        8080,
    );
}
