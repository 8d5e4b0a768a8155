//! Transport contract towards the vehicle cloud
//!
//! A `Fetcher` turns a `FetchRequest` into exactly one `FetchResult`. It never
//! retries on its own; callers decide what a failure means for their source.

pub mod http;

use crate::remote::RemoteService;
use crate::telemetry::{Payload, TelemetrySource};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use http::{HttpFetcher, Region};

/// Transport failure as cached and shown in diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkError {
    pub url: String,
    pub status: u16,
    pub reason: String,
}

impl NetworkError {
    pub fn new<U: Into<String>, R: Into<String>>(url: U, status: u16, reason: R) -> Self {
        Self {
            url: url.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Not-found on the status endpoint triggers the legacy protocol
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{}", self))
    }
}

impl fmt::Display for NetworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.status, self.reason, self.url)
    }
}

impl From<NetworkError> for crate::error::DriveLinkError {
    fn from(err: NetworkError) -> Self {
        crate::error::DriveLinkError::transport(err.status, err.reason)
    }
}

/// Expected body type of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Text,
    Bytes,
}

/// Outcome of a single fetch
pub type FetchResult = std::result::Result<Payload, NetworkError>;

/// Every vehicle-facing call the bridge issues
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchRequest {
    Status,
    LegacyStatus,
    LastTrip,
    AllTrips,
    ChargeProfile,
    Destinations,
    RangeMap,
    Image { viewport: String, size: u32 },
    RemoteExecute {
        service: RemoteService,
        payload: Option<String>,
    },
    RemoteStatus { service: RemoteService },
}

impl FetchRequest {
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            FetchRequest::Image { .. } => ResponseKind::Bytes,
            _ => ResponseKind::Text,
        }
    }

    /// Cache slot the response of this request resolves into
    pub fn source(&self) -> Option<TelemetrySource> {
        match self {
            FetchRequest::Status | FetchRequest::LegacyStatus => Some(TelemetrySource::Status),
            FetchRequest::LastTrip => Some(TelemetrySource::LastTrip),
            FetchRequest::AllTrips => Some(TelemetrySource::AllTrips),
            FetchRequest::ChargeProfile => Some(TelemetrySource::ChargeProfile),
            FetchRequest::Destinations => Some(TelemetrySource::Destinations),
            FetchRequest::RangeMap => Some(TelemetrySource::RangeMap),
            FetchRequest::Image { .. } => Some(TelemetrySource::Image),
            FetchRequest::RemoteExecute { .. } | FetchRequest::RemoteStatus { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FetchRequest::Status => "status",
            FetchRequest::LegacyStatus => "legacy-status",
            FetchRequest::LastTrip => "last-trip",
            FetchRequest::AllTrips => "all-trips",
            FetchRequest::ChargeProfile => "charge-profile",
            FetchRequest::Destinations => "destinations",
            FetchRequest::RangeMap => "range-map",
            FetchRequest::Image { .. } => "image",
            FetchRequest::RemoteExecute { .. } => "remote-execute",
            FetchRequest::RemoteStatus { .. } => "remote-status",
        }
    }
}

/// Decode a raw body according to the request's response kind
pub fn decode_body(request: &FetchRequest, url: &str, body: Vec<u8>) -> FetchResult {
    match request.response_kind() {
        ResponseKind::Bytes => Ok(Payload::Bytes(body)),
        ResponseKind::Text => String::from_utf8(body)
            .map(Payload::Text)
            .map_err(|e| NetworkError::new(url, 0, format!("undecodable body: {}", e))),
    }
}

/// Asynchronous transport towards the vehicle cloud
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Resolve one request, exactly once, without retries
    async fn fetch(&self, request: FetchRequest) -> FetchResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_requests_expect_bytes() {
        let req = FetchRequest::Image {
            viewport: "FRONT".into(),
            size: 1024,
        };
        assert_eq!(req.response_kind(), ResponseKind::Bytes);
        assert_eq!(req.source(), Some(TelemetrySource::Image));
        assert_eq!(FetchRequest::Status.response_kind(), ResponseKind::Text);
    }

    #[test]
    fn legacy_status_resolves_into_status_slot() {
        assert_eq!(
            FetchRequest::LegacyStatus.source(),
            Some(TelemetrySource::Status)
        );
        assert_eq!(
            FetchRequest::RemoteStatus {
                service: RemoteService::Horn
            }
            .source(),
            None
        );
    }

    #[test]
    fn invalid_utf8_becomes_network_error() {
        let res = decode_body(&FetchRequest::LastTrip, "u", vec![0xff, 0xfe]);
        let err = res.unwrap_err();
        assert_eq!(err.status, 0);
        assert!(err.reason.contains("undecodable"));
    }
}
