//! Vehicle status ingest
//!
//! The status source doubles as the reachability probe of the vehicle: a
//! parsed status puts the device Online, a failed one puts it Offline.
//! Status is requested through one of two protocol variants. A not-found
//! answer on the current variant switches to the legacy variant for good.

pub mod legacy;

use crate::error::{DriveLinkError, Result};
use crate::telemetry::lock;
use crate::transport::{FetchRequest, NetworkError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

/// Wire variant used to request vehicle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProtocolMode {
    Current,
    Legacy,
}

impl ProtocolMode {
    /// Request issued for the status source under this mode
    pub fn status_request(&self) -> FetchRequest {
        match self {
            ProtocolMode::Current => FetchRequest::Status,
            ProtocolMode::Legacy => FetchRequest::LegacyStatus,
        }
    }
}

/// Why a device is offline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OfflineDetail {
    CommunicationError,
    ConfigurationError,
}

/// Reachability of the vehicle as reported to the state sink
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Unknown,
    Online,
    Offline {
        detail: OfflineDetail,
        reason: String,
    },
}

impl DeviceStatus {
    pub fn offline<S: Into<String>>(detail: OfflineDetail, reason: S) -> Self {
        DeviceStatus::Offline {
            detail,
            reason: reason.into(),
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, DeviceStatus::Online)
    }

    /// Statuses that count as the same announcement
    fn same_kind(&self, other: &DeviceStatus) -> bool {
        match (self, other) {
            (DeviceStatus::Unknown, DeviceStatus::Unknown) => true,
            (DeviceStatus::Online, DeviceStatus::Online) => true,
            (DeviceStatus::Offline { detail: a, .. }, DeviceStatus::Offline { detail: b, .. }) => {
                a == b
            }
            _ => false,
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Unknown => f.write_str("UNKNOWN"),
            DeviceStatus::Online => f.write_str("ONLINE"),
            DeviceStatus::Offline { detail, reason } => {
                write!(f, "OFFLINE ({:?}: {})", detail, reason)
            }
        }
    }
}

/// What the caller must do after a failed status fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDecision {
    /// Re-issue the status request through the legacy variant
    pub fallback: Option<FetchRequest>,
    /// New device status to announce, if it changed
    pub announce: Option<DeviceStatus>,
}

impl ErrorDecision {
    /// Protocol fallback to report when the legacy variant takes over
    pub fn fallback_error(&self) -> Option<DriveLinkError> {
        self.fallback.as_ref().map(|request| {
            DriveLinkError::protocol_fallback(format!(
                "status endpoint not found, retrying with {}",
                request.name()
            ))
        })
    }
}

#[derive(Debug)]
struct IngestState {
    mode: ProtocolMode,
    device: DeviceStatus,
}

/// Protocol mode and device status of one vehicle
#[derive(Debug)]
pub struct StatusIngest {
    state: Mutex<IngestState>,
}

impl Default for StatusIngest {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusIngest {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(IngestState {
                mode: ProtocolMode::Current,
                device: DeviceStatus::Unknown,
            }),
        }
    }

    pub fn mode(&self) -> ProtocolMode {
        lock(&self.state).mode
    }

    pub fn device_status(&self) -> DeviceStatus {
        lock(&self.state).device.clone()
    }

    /// Status request for the active protocol mode
    pub fn request(&self) -> FetchRequest {
        self.mode().status_request()
    }

    /// Record a device status; returns it only if it differs from the last one
    pub fn transition(&self, status: DeviceStatus) -> Option<DeviceStatus> {
        let mut state = lock(&self.state);
        if state.device.same_kind(&status) {
            return None;
        }
        state.device = status.clone();
        Some(status)
    }

    /// Classify a failed status fetch. A not-found on the current variant
    /// flips the mode to legacy and asks for the legacy request.
    pub fn on_error(&self, request: &FetchRequest, error: &NetworkError) -> ErrorDecision {
        let fallback = {
            let mut state = lock(&self.state);
            if *request == FetchRequest::Status
                && error.is_not_found()
                && state.mode == ProtocolMode::Current
            {
                state.mode = ProtocolMode::Legacy;
                Some(FetchRequest::LegacyStatus)
            } else {
                None
            }
        };
        let announce = self.transition(DeviceStatus::offline(
            OfflineDetail::CommunicationError,
            error.reason.clone(),
        ));
        ErrorDecision { fallback, announce }
    }
}

/// Geographic position of the vehicle
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub heading: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Active check-control message
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckControlMessage {
    pub ccm_description_short: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccm_description_long: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ccm_mileage: Option<f64>,
}

/// Upcoming service item
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceItem {
    pub cbs_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cbs_state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cbs_due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cbs_remaining_mileage: Option<f64>,
}

/// Read-only projection of the status slot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleStatusView {
    pub vin: String,
    pub mileage: Option<f64>,
    pub door_lock_state: Option<String>,
    pub remaining_fuel: Option<f64>,
    pub remaining_range_fuel: Option<f64>,
    pub remaining_range_electric: Option<f64>,
    pub charging_level_hv: Option<f64>,
    pub charging_status: Option<String>,
    pub connection_status: Option<String>,
    pub updated_at: Option<String>,
    pub position: Option<Position>,
    pub check_control_messages: Vec<CheckControlMessage>,
    pub cbs_data: Vec<ServiceItem>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VehicleStatusContainer {
    vehicle_status: Option<VehicleStatusView>,
}

impl VehicleStatusView {
    /// Parse a canonical status payload
    pub fn from_json(content: &str) -> Result<Self> {
        let container: VehicleStatusContainer = serde_json::from_str(content)
            .map_err(|e| DriveLinkError::parse(format!("vehicle status: {}", e)))?;
        container
            .vehicle_status
            .ok_or_else(|| DriveLinkError::parse("vehicle status: missing vehicleStatus"))
    }

    /// Canonical payload wrapping this view
    pub fn to_json(&self) -> Result<String> {
        let container = VehicleStatusContainer {
            vehicle_status: Some(self.clone()),
        };
        Ok(serde_json::to_string(&container)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> NetworkError {
        NetworkError::new("status", 404, "Not Found")
    }

    #[test]
    fn not_found_on_current_flips_to_legacy_once() {
        let ingest = StatusIngest::new();
        assert_eq!(ingest.request(), FetchRequest::Status);

        let decision = ingest.on_error(&FetchRequest::Status, &not_found());
        assert_eq!(decision.fallback, Some(FetchRequest::LegacyStatus));
        assert!(matches!(
            decision.fallback_error(),
            Some(DriveLinkError::ProtocolFallback { .. })
        ));
        assert_eq!(ingest.mode(), ProtocolMode::Legacy);

        let decision = ingest.on_error(&FetchRequest::LegacyStatus, &not_found());
        assert_eq!(decision.fallback, None);
        assert!(decision.fallback_error().is_none());
        assert_eq!(ingest.request(), FetchRequest::LegacyStatus);
    }

    #[test]
    fn other_errors_keep_current_mode() {
        let ingest = StatusIngest::new();
        let err = NetworkError::new("status", 500, "Internal Server Error");
        let decision = ingest.on_error(&FetchRequest::Status, &err);
        assert_eq!(decision.fallback, None);
        assert_eq!(ingest.mode(), ProtocolMode::Current);
        assert!(matches!(
            decision.announce,
            Some(DeviceStatus::Offline {
                detail: OfflineDetail::CommunicationError,
                ..
            })
        ));
    }

    #[test]
    fn repeated_status_is_suppressed() {
        let ingest = StatusIngest::new();
        assert_eq!(
            ingest.transition(DeviceStatus::Online),
            Some(DeviceStatus::Online)
        );
        assert_eq!(ingest.transition(DeviceStatus::Online), None);
        let offline = DeviceStatus::offline(OfflineDetail::CommunicationError, "timeout");
        assert!(ingest.transition(offline.clone()).is_some());
        assert!(
            ingest
                .transition(DeviceStatus::offline(
                    OfflineDetail::CommunicationError,
                    "other"
                ))
                .is_none()
        );
        assert!(ingest.transition(DeviceStatus::Online).is_some());
    }

    #[test]
    fn status_view_parses_nested_items() {
        let json = r#"{"vehicleStatus":{"vin":"X","mileage":1200,"doorLockState":"SECURED",
            "position":{"lat":48.1,"lon":11.5,"heading":90,"status":"OK"},
            "checkControlMessages":[{"ccmDescriptionShort":"Tyre pressure","ccmMileage":1100}],
            "cbsData":[{"cbsType":"OIL","cbsDueDate":"2027-01"}]}}"#;
        let view = VehicleStatusView::from_json(json).unwrap();
        assert_eq!(view.mileage, Some(1200.0));
        assert_eq!(view.position.as_ref().map(|p| p.lat), Some(48.1));
        assert_eq!(view.check_control_messages.len(), 1);
        assert_eq!(view.cbs_data[0].cbs_type, "OIL");
    }

    #[test]
    fn malformed_status_is_parse_error() {
        let err = VehicleStatusView::from_json("{oops").unwrap_err();
        assert!(matches!(err, DriveLinkError::Parse { .. }));
        let err = VehicleStatusView::from_json("{}").unwrap_err();
        assert!(matches!(err, DriveLinkError::Parse { .. }));
    }
}
