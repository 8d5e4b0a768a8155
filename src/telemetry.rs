//! Telemetry sources and the per-source response cache
//!
//! Every vehicle data category is fetched and cached independently. A slot
//! keeps the most recent resolution of its source, success or error, so the
//! diagnostic fingerprint always shows what the cloud last answered.

use crate::transport::NetworkError;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock};

/// One distinct category of vehicle data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum TelemetrySource {
    Status,
    LastTrip,
    AllTrips,
    ChargeProfile,
    Destinations,
    RangeMap,
    Image,
}

impl TelemetrySource {
    pub const ALL: [TelemetrySource; 7] = [
        TelemetrySource::Status,
        TelemetrySource::LastTrip,
        TelemetrySource::AllTrips,
        TelemetrySource::ChargeProfile,
        TelemetrySource::Destinations,
        TelemetrySource::RangeMap,
        TelemetrySource::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::LastTrip => "last-trip",
            Self::AllTrips => "all-trips",
            Self::ChargeProfile => "charge-profile",
            Self::Destinations => "destinations",
            Self::RangeMap => "range-map",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for TelemetrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response body as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            Payload::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(s) => s.len(),
            Payload::Bytes(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Content of a filled cache slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    /// Most recent successful payload
    Data(Payload),
    /// Most recent failure, kept for diagnostics
    Error(NetworkError),
}

impl CacheEntry {
    pub fn is_error(&self) -> bool {
        matches!(self, CacheEntry::Error(_))
    }

    /// Printable form used by the fingerprint; errors render as their JSON record
    pub fn render(&self) -> String {
        match self {
            CacheEntry::Data(Payload::Text(s)) => s.clone(),
            CacheEntry::Data(Payload::Bytes(b)) => format!("<{} bytes>", b.len()),
            CacheEntry::Error(e) => e.to_json(),
        }
    }
}

/// One slot per telemetry source, most recent resolution wins
#[derive(Debug, Default)]
pub struct SourceCache {
    slots: RwLock<HashMap<TelemetrySource, CacheEntry>>,
}

impl SourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot unconditionally
    pub fn store(&self, source: TelemetrySource, entry: CacheEntry) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.insert(source, entry);
    }

    pub fn store_data(&self, source: TelemetrySource, payload: Payload) {
        self.store(source, CacheEntry::Data(payload));
    }

    pub fn store_error(&self, source: TelemetrySource, error: NetworkError) {
        self.store(source, CacheEntry::Error(error));
    }

    pub fn read(&self, source: TelemetrySource) -> Option<CacheEntry> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(&source).cloned()
    }

    /// Successful text payload of a slot, if any
    pub fn read_text(&self, source: TelemetrySource) -> Option<String> {
        match self.read(source) {
            Some(CacheEntry::Data(Payload::Text(s))) => Some(s),
            _ => None,
        }
    }

    /// Successful byte payload of a slot, if any
    pub fn read_bytes(&self, source: TelemetrySource) -> Option<Vec<u8>> {
        match self.read(source) {
            Some(CacheEntry::Data(Payload::Bytes(b))) => Some(b),
            _ => None,
        }
    }

    pub fn is_empty(&self, source: TelemetrySource) -> bool {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        !slots.contains_key(&source)
    }

    /// Wipe the image slot after its viewing parameters changed
    pub fn decommission_image(&self) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.remove(&TelemetrySource::Image);
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
