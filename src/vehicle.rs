//! Vehicle handler
//!
//! Owns everything bridged for one vehicle: the per-source cache, the
//! refresh-cycle tracker, status ingest, the charge profile editor, image
//! parameters and the remote command dispatcher. The handler is cheap to
//! clone; fetch tasks, the periodic refresh and the notification pump hold
//! clones or weak references of the same shared state.

pub mod callbacks;
mod commands;
pub mod render;

use crate::capabilities::{self, Capabilities, VehicleRecord};
use crate::config::Config;
use crate::edit_session::ChargeProfileEditor;
use crate::error::Result;
use crate::image::{ImageProperties, ImageState};
use crate::logging::{StructuredLogger, get_logger};
use crate::remote::{RemoteDispatcher, RemoteNotification};
use crate::sink::{ChannelValue, StateSink};
use crate::status::{DeviceStatus, OfflineDetail, ProtocolMode, StatusIngest};
use crate::telemetry::{SourceCache, TelemetrySource, lock};
use crate::tracker::{CycleId, OutstandingRequests};
use crate::transport::{FetchRequest, Fetcher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use render::Selections;

/// Result of a refresh trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A new cycle was opened for these sources
    Started {
        cycle: CycleId,
        sources: Vec<TelemetrySource>,
    },
    /// The previous cycle still awaits resolutions
    Busy,
    /// Configuration is invalid; refreshes never run
    NotConfigured,
    Disposed,
}

#[derive(Debug, Default)]
struct Tasks {
    refresh_job: Option<JoinHandle<()>>,
    pump: Option<JoinHandle<()>>,
    fetches: Vec<JoinHandle<()>>,
}

pub(crate) struct Shared {
    config: Config,
    configured: AtomicBool,
    disposed: AtomicBool,
    fetcher: Arc<dyn Fetcher>,
    sink: Arc<dyn StateSink>,
    cache: SourceCache,
    tracker: OutstandingRequests,
    status: StatusIngest,
    editor: ChargeProfileEditor,
    image: ImageState,
    remote: RemoteDispatcher,
    notifications: Mutex<Option<mpsc::UnboundedReceiver<RemoteNotification>>>,
    capabilities: RwLock<Capabilities>,
    selections: Mutex<Selections>,
    tasks: Mutex<Tasks>,
    last_fingerprint: RwLock<Option<String>>,
    logger: StructuredLogger,
}

/// Bridge between one vehicle and the state sink
#[derive(Clone)]
pub struct VehicleHandler {
    shared: Arc<Shared>,
}

impl VehicleHandler {
    pub fn new(config: Config, fetcher: Arc<dyn Fetcher>, sink: Arc<dyn StateSink>) -> Self {
        let (remote, notifications) = RemoteDispatcher::new(Arc::clone(&fetcher), &config.vehicle);
        let shared = Shared {
            configured: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            cache: SourceCache::new(),
            tracker: OutstandingRequests::new(),
            status: StatusIngest::new(),
            editor: ChargeProfileEditor::new(Duration::from_secs(
                config.vehicle.edit_timeout_secs,
            )),
            image: ImageState::from_config(&config.vehicle),
            remote,
            notifications: Mutex::new(Some(notifications)),
            capabilities: RwLock::new(Capabilities::from_names(
                &config.vehicle.services_supported,
            )),
            selections: Mutex::new(Selections::default()),
            tasks: Mutex::new(Tasks::default()),
            last_fingerprint: RwLock::new(None),
            logger: get_logger("vehicle"),
            fetcher,
            sink,
            config,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Validate configuration, publish image parameters and start the
    /// periodic refresh plus the remote notification pump. An invalid
    /// configuration leaves the vehicle offline without any schedule.
    pub fn initialize(&self) -> Result<()> {
        let s = &self.shared;
        s.announce(DeviceStatus::Unknown);
        if let Err(e) = s.config.validate() {
            s.configured.store(false, Ordering::SeqCst);
            s.logger.error(&format!("Vehicle not configured: {}", e));
            s.announce(DeviceStatus::offline(
                OfflineDetail::ConfigurationError,
                e.to_string(),
            ));
            return Err(e);
        }
        s.configured.store(true, Ordering::SeqCst);
        s.logger.info(&format!(
            "Vehicle {} initialized, refresh every {} min",
            s.config.vehicle.vin, s.config.vehicle.refresh_interval_minutes
        ));

        self.publish_image_params();
        self.start_schedule();
        self.start_notification_pump();
        Ok(())
    }

    /// Stop every task of this vehicle
    pub fn dispose(&self) {
        let s = &self.shared;
        if s.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let mut tasks = lock(&s.tasks);
            if let Some(job) = tasks.refresh_job.take() {
                job.abort();
            }
            if let Some(pump) = tasks.pump.take() {
                pump.abort();
            }
            for fetch in tasks.fetches.drain(..) {
                fetch.abort();
            }
        }
        s.editor.cancel();
        s.remote.abort_all();
        s.logger.info("Vehicle handler disposed");
    }

    fn start_schedule(&self) {
        let mut tasks = lock(&self.shared.tasks);
        if tasks.refresh_job.as_ref().is_some_and(|j| !j.is_finished()) {
            return;
        }
        let period = Duration::from_secs(
            self.shared
                .config
                .vehicle
                .refresh_interval_minutes
                .saturating_mul(60),
        );
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        tasks.refresh_job = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let handler = VehicleHandler { shared };
                if handler.refresh() == RefreshOutcome::Busy {
                    handler
                        .shared
                        .logger
                        .debug("Previous refresh cycle still in flight, skipping");
                }
            }
        }));
    }

    fn start_notification_pump(&self) {
        let Some(mut rx) = lock(&self.shared.notifications).take() else {
            return;
        };
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let pump = tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                VehicleHandler { shared }.on_remote_notification(notification);
            }
        });
        lock(&self.shared.tasks).pump = Some(pump);
    }

    /// Open a refresh cycle and issue one fetch per applicable source
    pub fn refresh(&self) -> RefreshOutcome {
        let s = &self.shared;
        if s.disposed.load(Ordering::SeqCst) {
            return RefreshOutcome::Disposed;
        }
        if !s.configured.load(Ordering::SeqCst) {
            return RefreshOutcome::NotConfigured;
        }

        let requests = self.cycle_requests();
        let sources: Vec<TelemetrySource> = requests.iter().filter_map(|r| r.source()).collect();
        let Some(cycle) = s.tracker.begin_cycle(sources.iter().copied()) else {
            return RefreshOutcome::Busy;
        };
        s.logger.debug(&format!(
            "Refresh cycle {} requesting {}",
            cycle.0,
            sources
                .iter()
                .map(|src| src.as_str())
                .collect::<Vec<_>>()
                .join(",")
        ));
        for request in requests {
            self.spawn_fetch(Some(cycle), request);
        }
        RefreshOutcome::Started { cycle, sources }
    }

    /// Requests of a cycle under the current capabilities and cache state
    pub fn cycle_requests(&self) -> Vec<FetchRequest> {
        let s = &self.shared;
        let mut requests = vec![s.status.request()];
        if self.is_supported(capabilities::STATISTICS) {
            requests.push(FetchRequest::LastTrip);
            requests.push(FetchRequest::AllTrips);
        }
        if self.is_supported(capabilities::LAST_DESTINATIONS) {
            requests.push(FetchRequest::Destinations);
        }
        if s.config.vehicle.is_electric() {
            requests.push(FetchRequest::ChargeProfile);
            requests.push(FetchRequest::RangeMap);
        }
        let props = s.image.lock();
        if s.cache.is_empty(TelemetrySource::Image) && !props.fail_limit_reached() {
            requests.push(props.params.request());
        }
        requests
    }

    /// A capability is probed when listed, and also while any of the
    /// trip or destination slots has never resolved
    pub fn is_supported(&self, capability: &str) -> bool {
        let s = &self.shared;
        let listed = s
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(capability);
        listed
            || s.cache.is_empty(TelemetrySource::LastTrip)
            || s.cache.is_empty(TelemetrySource::AllTrips)
            || s.cache.is_empty(TelemetrySource::Destinations)
    }

    /// Issue one fetch; its result is routed to the source callback
    pub(crate) fn spawn_fetch(&self, cycle: Option<CycleId>, request: FetchRequest) {
        let handler = self.clone();
        let fetcher = Arc::clone(&self.shared.fetcher);
        let handle = tokio::spawn(async move {
            let result = fetcher.fetch(request.clone()).await;
            handler.on_response(cycle, request, result);
        });
        let mut tasks = lock(&self.shared.tasks);
        tasks.fetches.retain(|t| !t.is_finished());
        tasks.fetches.push(handle);
    }

    fn publish_image_params(&self) {
        let props = self.shared.image.snapshot();
        self.publish(
            render::IMAGE_VIEWPORT,
            ChannelValue::text(props.params.viewport),
        );
        self.publish(
            render::IMAGE_SIZE,
            ChannelValue::Number(props.params.size as f64),
        );
    }

    pub(crate) fn publish(&self, channel: &str, value: ChannelValue) {
        self.shared.sink.publish(channel, value);
    }

    pub(crate) fn publish_all(&self, values: Vec<(String, ChannelValue)>) {
        for (channel, value) in values {
            self.shared.sink.publish(&channel, value);
        }
    }

    /// Replace the capability set with a discovery record
    pub fn set_discovery(&self, record: &VehicleRecord) {
        let caps = Capabilities::from_record(record);
        self.shared.logger.info(&format!(
            "Discovery capabilities: {}",
            caps.names().join(" ")
        ));
        *self
            .shared
            .capabilities
            .write()
            .unwrap_or_else(PoisonError::into_inner) = caps;
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn cache(&self) -> &SourceCache {
        &self.shared.cache
    }

    pub fn tracker(&self) -> &OutstandingRequests {
        &self.shared.tracker
    }

    pub fn editor(&self) -> &ChargeProfileEditor {
        &self.shared.editor
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.shared.status.device_status()
    }

    pub fn protocol_mode(&self) -> ProtocolMode {
        self.shared.status.mode()
    }

    pub fn image_properties(&self) -> ImageProperties {
        self.shared.image.snapshot()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.shared
            .capabilities
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent troubleshooting fingerprint
    pub fn last_fingerprint(&self) -> Option<String> {
        self.shared
            .last_fingerprint
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_configured(&self) -> bool {
        self.shared.configured.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.disposed.load(Ordering::SeqCst)
    }
}

impl Shared {
    /// Forward a device status to the sink unless it repeats the last one
    fn announce(&self, status: DeviceStatus) {
        if let Some(changed) = self.status.transition(status) {
            self.logger.info(&format!("Vehicle status {}", changed));
            self.sink.update_status(&changed);
        }
    }
}
