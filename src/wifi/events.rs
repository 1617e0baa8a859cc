//! Typed connectivity lifecycle events.
//!
//! Components publish these on a broadcast channel instead of taking
//! callback parameters; interested parties (status LED, diagnostics)
//! subscribe. Publishing never fails: events sent with no subscribers are
//! simply dropped.

use std::net::Ipv4Addr;

use tokio::sync::broadcast;

/// A connectivity lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetEvent {
    /// A station connection attempt started.
    Connecting { ssid: String },
    /// The station associated and obtained an address.
    Connected {
        ssid: String,
        rssi: i32,
        ip: Ipv4Addr,
    },
    /// The station was explicitly disconnected.
    Disconnected { ssid: Option<String> },
    /// The access point is up.
    ApStarted { ssid: String, hostname: String },
    /// The access point was shut down.
    ApStopped { ssid: Option<String> },
}

/// Send an event, ignoring the no-subscribers case.
pub(crate) fn emit(events: &broadcast::Sender<NetEvent>, event: NetEvent) {
    let _ = events.send(event);
}
