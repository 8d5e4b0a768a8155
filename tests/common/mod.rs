#![allow(dead_code)]

use async_trait::async_trait;
use drivelink::config::Config;
use drivelink::sink::{ChannelStore, ChannelValue};
use drivelink::telemetry::Payload;
use drivelink::transport::{FetchRequest, FetchResult, Fetcher, NetworkError};
use drivelink::vehicle::VehicleHandler;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub const VIN: &str = "WBY1Z21000V000001";

pub const STATUS_JSON: &str = r#"{"vehicleStatus":{"vin":"WBY1Z21000V000001","mileage":17236,
    "doorLockState":"SECURED","chargingLevelHv":80,"remainingRangeElectric":120,
    "position":{"lat":48.1,"lon":11.5,"heading":220,"status":"OK"},
    "checkControlMessages":[],"cbsData":[{"cbsType":"BRAKE_FLUID","cbsState":"OK"}]}}"#;

pub const LEGACY_STATUS_JSON: &str = r#"{"attributesMap":{"mileage":"17236","door_lock_state":"LOCKED",
    "gps_lat":"48.1","gps_lng":"11.5","heading":"220","chargingLevelHv":"80"},
    "vehicleMessages":{"ccmMessages":[],"cbsMessages":[]}}"#;

pub const LAST_TRIP_JSON: &str = r#"{"lastTrip":{"totalDistance":12.5,"avgElectricConsumption":14.1}}"#;
pub const ALL_TRIPS_JSON: &str = r#"{"allTrips":{"totalElectricDistance":{"userTotal":4000}}}"#;
pub const DESTINATIONS_JSON: &str =
    r#"{"destinations":[{"lat":48.2,"lon":11.6,"street":"Petuelring","streetNumber":"130","city":"Munich"}]}"#;
pub const RANGE_MAP_JSON: &str = r#"{"rangemap":{"center":{"lat":48.1,"lon":11.5},"quadrants":[]}}"#;

pub const CHARGE_PROFILE_JSON: &str = r#"{"weeklyPlanner":{"climatizationEnabled":false,
    "chargingMode":"IMMEDIATE_CHARGING","chargingPreferences":"NO_PRESELECTION",
    "timer1":{"departureTime":"07:30","timerEnabled":true,"weekdays":["MONDAY","TUESDAY"]},
    "timer2":{"departureTime":"08:00","timerEnabled":false,"weekdays":[]},
    "timer3":{"departureTime":"00:00","timerEnabled":false,"weekdays":[]},
    "overrideTimer":{"departureTime":"12:00","timerEnabled":false,"weekdays":["SATURDAY"]},
    "preferredChargingWindow":{"enabled":false,"startTime":"22:00","endTime":"05:00"}}}"#;

pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Fetcher whose answers are released by the test. Requests whose name has
/// scripted answers resolve immediately.
#[derive(Default)]
pub struct MockFetcher {
    pending: Mutex<Vec<(FetchRequest, oneshot::Sender<FetchResult>)>>,
    requests: Mutex<Vec<FetchRequest>>,
    scripted: Mutex<HashMap<&'static str, VecDeque<FetchResult>>>,
}

impl MockFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue immediate answers for every request with this name
    pub fn script(&self, name: &'static str, results: Vec<FetchResult>) {
        self.scripted
            .lock()
            .unwrap()
            .entry(name)
            .or_default()
            .extend(results);
    }

    /// Every request seen so far, in issue order
    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, request: &FetchRequest) -> usize {
        self.requests().iter().filter(|r| *r == request).count()
    }

    pub fn pending(&self) -> Vec<FetchRequest> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(r, _)| r.clone())
            .collect()
    }

    /// Wait until the request is pending, then answer it
    pub async fn release(&self, request: &FetchRequest, result: FetchResult) {
        for _ in 0..1000 {
            let sender = {
                let mut pending = self.pending.lock().unwrap();
                let index = pending.iter().position(|(r, _)| r == request);
                index.map(|i| pending.remove(i).1)
            };
            if let Some(sender) = sender {
                let _ = sender.send(result);
                settle().await;
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("request {:?} never issued, pending {:?}", request, self.pending());
    }

    pub async fn release_text(&self, request: &FetchRequest, body: &str) {
        self.release(request, Ok(Payload::Text(body.to_string())))
            .await;
    }

    pub async fn release_error(&self, request: &FetchRequest, status: u16, reason: &str) {
        self.release(request, Err(NetworkError::new(request.name(), status, reason)))
            .await;
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        self.requests.lock().unwrap().push(request.clone());
        let scripted = self
            .scripted
            .lock()
            .unwrap()
            .get_mut(request.name())
            .and_then(|q| q.pop_front());
        if let Some(result) = scripted {
            return result;
        }
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push((request.clone(), tx));
        rx.await
            .unwrap_or_else(|_| Err(NetworkError::new(request.name(), 0, "dropped")))
    }
}

/// Let spawned tasks run until they block again. The short sleep lets the
/// timer driver fire ticks that are already due, such as the first tick of
/// the refresh interval.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(2)).await;
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub fn config(drive_train: &str, services: &[&str]) -> Config {
    let mut config = Config::default();
    config.vehicle.vin = VIN.to_string();
    config.vehicle.drive_train = drive_train.to_string();
    config.vehicle.services_supported = services.iter().map(|s| s.to_string()).collect();
    config.account.access_token = "token".to_string();
    config.vehicle.remote_poll_interval_secs = 1;
    config.vehicle.remote_max_polls = 3;
    config
}

pub struct Harness {
    pub handler: VehicleHandler,
    pub fetcher: Arc<MockFetcher>,
    pub store: Arc<ChannelStore>,
}

impl Harness {
    pub fn new(config: Config) -> Self {
        let fetcher = MockFetcher::new();
        let store = Arc::new(ChannelStore::new());
        let handler = VehicleHandler::new(config, fetcher.clone(), store.clone());
        Self {
            handler,
            fetcher,
            store,
        }
    }

    /// Electric vehicle with every capability listed
    pub fn electric() -> Self {
        Self::new(config("BEV", &["statistics", "lastDestinations"]))
    }

    pub fn channel(&self, id: &str) -> Option<ChannelValue> {
        self.store.get(id)
    }
}

/// Well-formed answer for every telemetry request
pub fn good_response(request: &FetchRequest) -> FetchResult {
    let body = match request {
        FetchRequest::Status => STATUS_JSON,
        FetchRequest::LegacyStatus => LEGACY_STATUS_JSON,
        FetchRequest::LastTrip => LAST_TRIP_JSON,
        FetchRequest::AllTrips => ALL_TRIPS_JSON,
        FetchRequest::Destinations => DESTINATIONS_JSON,
        FetchRequest::RangeMap => RANGE_MAP_JSON,
        FetchRequest::ChargeProfile => CHARGE_PROFILE_JSON,
        FetchRequest::Image { .. } => return Ok(Payload::Bytes(PNG.to_vec())),
        FetchRequest::RemoteExecute { .. } | FetchRequest::RemoteStatus { .. } => {
            r#"{"executionStatus":{"status":"EXECUTED"}}"#
        }
    };
    Ok(Payload::Text(body.to_string()))
}

impl Harness {
    /// Answer every pending request with a well-formed payload
    pub async fn answer_all(&self) {
        settle().await;
        for request in self.fetcher.pending() {
            self.fetcher
                .release(&request, good_response(&request))
                .await;
        }
    }
}

pub fn image_request() -> FetchRequest {
    FetchRequest::Image {
        viewport: "FRONT".to_string(),
        size: 1024,
    }
}
