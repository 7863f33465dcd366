//! Adapter connection: TCP client, reconnection, heartbeat, and hand-off
//! to the ingestion pipeline (spec §4.3).

mod connection;

pub use connection::AdapterConnection;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};

/// Copy-on-write snapshot of the adapter's protocol-command-mutable options
/// (spec §9: "Represent adapter options as a copy-on-write snapshot that
/// the pipeline captures at the start of each observation processing, so
/// concurrent updates from protocol commands never tear a record").
#[derive(Debug, Clone, Default)]
pub struct AdapterOptions {
    pub conversion_required: bool,
    pub relative_time: bool,
    pub real_time: bool,
    pub device: Option<String>,
    pub shdr_version: Option<String>,
}

/// Shared, swappable options cell: readers call [`OptionsCell::snapshot`] to
/// get a cheap `Arc` clone that will never be mutated out from under them;
/// writers (the `* key: value` command handler) install a wholesale new
/// `Arc`.
#[derive(Debug, Clone, Default)]
pub struct OptionsCell(Arc<RwLock<Arc<AdapterOptions>>>);

impl OptionsCell {
    pub fn new(options: AdapterOptions) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(options))))
    }

    pub fn snapshot(&self) -> Arc<AdapterOptions> {
        self.0.read().unwrap().clone()
    }

    pub fn apply_command(&self, key: &str, value: &str) {
        let current = self.snapshot();
        let mut next = (*current).clone();
        match key {
            "conversionRequired" => next.conversion_required = is_true(value),
            "relativeTime" => next.relative_time = is_true(value),
            "realTime" => next.real_time = is_true(value),
            "device" => next.device = Some(value.to_string()),
            "shdrVersion" => next.shdr_version = Some(value.to_string()),
            other => {
                tracing::debug!(command = other, value, "unrecognized protocol command, ignoring");
                return;
            }
        }
        *self.0.write().unwrap() = Arc::new(next);
    }
}

/// `true`/`yes` both accepted as boolean-true (`is_true()` in `adapter.cpp`).
fn is_true(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionStatus {
    Closed = 0,
    Connecting = 1,
    Established = 2,
    Stopped = 3,
}

impl ConnectionStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionStatus::Connecting,
            2 => ConnectionStatus::Established,
            3 => ConnectionStatus::Stopped,
            _ => ConnectionStatus::Closed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Closed => "CLOSED",
            ConnectionStatus::Connecting => "CONNECTING",
            ConnectionStatus::Established => "ESTABLISHED",
            ConnectionStatus::Stopped => "STOPPED",
        }
    }
}

/// Atomically-readable connection status, so HTTP handlers can report it
/// without taking any adapter-internal lock.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    pub fn set(&self, status: ConnectionStatus) {
        self.0.store(status as u8, Ordering::Release);
    }

    pub fn get(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.load(Ordering::Acquire))
    }
}

/// Adapter identity string `_host_port`, used to scope log spans and route
/// ingestion messages (`adapter.cpp`; spec §4.3).
pub fn adapter_identity(host: &str, port: u16) -> String {
    format!("_{host}_{port}")
}
