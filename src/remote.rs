//! Remote vehicle commands
//!
//! Commands are fire-and-forget: `RemoteDispatcher::execute` returns at once
//! and a spawned task posts the command, then polls its execution status.
//! Every observed state change is delivered as a `RemoteNotification` on an
//! unbounded channel drained by the vehicle handler.

use crate::config::VehicleConfig;
use crate::error::{DriveLinkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use crate::sink::title_case;
use crate::telemetry::lock;
use crate::transport::{FetchRequest, Fetcher};
use serde::Deserialize;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Commands the vehicle cloud can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteService {
    LightFlash,
    AirConditioning,
    DoorLock,
    DoorUnlock,
    Horn,
    VehicleFinder,
    ChargeNow,
    ChargingControl,
}

impl RemoteService {
    pub const ALL: [RemoteService; 8] = [
        RemoteService::LightFlash,
        RemoteService::AirConditioning,
        RemoteService::DoorLock,
        RemoteService::DoorUnlock,
        RemoteService::Horn,
        RemoteService::VehicleFinder,
        RemoteService::ChargeNow,
        RemoteService::ChargingControl,
    ];

    /// Identifier accepted on the remote command channel
    pub fn command_id(&self) -> &'static str {
        match self {
            Self::LightFlash => "light",
            Self::AirConditioning => "air-conditioning",
            Self::DoorLock => "lock",
            Self::DoorUnlock => "unlock",
            Self::Horn => "horn",
            Self::VehicleFinder => "vehicle-finder",
            Self::ChargeNow => "charge-now",
            Self::ChargingControl => "charge-control",
        }
    }

    /// Service type sent to the vehicle cloud
    pub fn code(&self) -> &'static str {
        match self {
            Self::LightFlash => "RLF",
            Self::AirConditioning => "RCN",
            Self::DoorLock => "RDL",
            Self::DoorUnlock => "RDU",
            Self::Horn => "RHB",
            Self::VehicleFinder => "RVF",
            Self::ChargeNow => "CHARGE_NOW",
            Self::ChargingControl => "CHARGING_CONTROL",
        }
    }

    /// Upper-case name used in state reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::LightFlash => "LIGHT_FLASH",
            Self::AirConditioning => "AIR_CONDITIONING",
            Self::DoorLock => "DOOR_LOCK",
            Self::DoorUnlock => "DOOR_UNLOCK",
            Self::Horn => "HORN",
            Self::VehicleFinder => "VEHICLE_FINDER",
            Self::ChargeNow => "CHARGE_NOW",
            Self::ChargingControl => "CHARGING_CONTROL",
        }
    }

    pub fn from_command_id(id: &str) -> Result<Self> {
        let id = id.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.command_id().eq_ignore_ascii_case(id) || s.code().eq_ignore_ascii_case(id))
            .ok_or_else(|| {
                DriveLinkError::validation("remote", format!("Unknown remote service {}", id))
            })
    }
}

impl fmt::Display for RemoteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Execution state reported by the vehicle cloud
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Initiated,
    Pending,
    Delivered,
    Executed,
    Error,
    Unknown,
}

impl ExecutionState {
    pub fn from_label(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "INITIATED" => Self::Initiated,
            "PENDING" => Self::Pending,
            "DELIVERED" => Self::Delivered,
            "EXECUTED" => Self::Executed,
            "ERROR" | "FAILED" | "CANCELLED" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "INITIATED",
            Self::Pending => "PENDING",
            Self::Delivered => "DELIVERED",
            Self::Executed => "EXECUTED",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Error)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Asynchronous completion report of a remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNotification {
    pub service: RemoteService,
    pub state: ExecutionState,
    /// Last notification of this execution; no further polling follows
    pub finished: bool,
}

impl RemoteNotification {
    /// Human readable form, e.g. "Light Flash Executed"
    pub fn display(&self) -> String {
        title_case(&format!("{} {}", self.service.label(), self.state.as_str()))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionStatusContainer {
    execution_status: Option<ExecutionStatusBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionStatusBody {
    status: Option<String>,
}

/// Extract the execution state from an execute or status response body
pub fn parse_execution_state(body: &str) -> ExecutionState {
    serde_json::from_str::<ExecutionStatusContainer>(body)
        .ok()
        .and_then(|c| c.execution_status)
        .and_then(|s| s.status)
        .map(|s| ExecutionState::from_label(&s))
        .unwrap_or(ExecutionState::Unknown)
}

/// Spawns and tracks remote command executions
pub struct RemoteDispatcher {
    fetcher: Arc<dyn Fetcher>,
    notify: mpsc::UnboundedSender<RemoteNotification>,
    poll_interval: Duration,
    max_polls: u32,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    logger: StructuredLogger,
}

impl RemoteDispatcher {
    /// Create a dispatcher and the receiving end of its notifications
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        config: &VehicleConfig,
    ) -> (Self, mpsc::UnboundedReceiver<RemoteNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                fetcher,
                notify: tx,
                poll_interval: Duration::from_secs(config.remote_poll_interval_secs.max(1)),
                max_polls: config.remote_max_polls,
                tasks: Mutex::new(Vec::new()),
                logger: get_logger("remote"),
            },
            rx,
        )
    }

    /// Fire-and-forget execution; completion arrives as notifications
    pub fn execute(&self, service: RemoteService, payload: Option<String>) {
        self.logger.info(&format!("Executing remote service {}", service));
        let fetcher = Arc::clone(&self.fetcher);
        let notify = self.notify.clone();
        let poll_interval = self.poll_interval;
        let max_polls = self.max_polls;
        let logger = self.logger.clone();

        let handle = tokio::spawn(async move {
            run_execution(
                fetcher.as_ref(),
                &notify,
                service,
                payload,
                poll_interval,
                max_polls,
                &logger,
            )
            .await;
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    /// Number of executions still polling
    pub fn active(&self) -> usize {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.len()
    }

    /// Abort every running execution
    pub fn abort_all(&self) {
        let mut tasks = lock(&self.tasks);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

async fn run_execution(
    fetcher: &dyn Fetcher,
    notify: &mpsc::UnboundedSender<RemoteNotification>,
    service: RemoteService,
    payload: Option<String>,
    poll_interval: Duration,
    max_polls: u32,
    logger: &StructuredLogger,
) {
    let send = |state: ExecutionState, finished: bool| {
        let _ = notify.send(RemoteNotification {
            service,
            state,
            finished,
        });
    };

    let mut state = match fetcher
        .fetch(FetchRequest::RemoteExecute { service, payload })
        .await
    {
        Ok(body) => parse_execution_state(body.as_text().unwrap_or_default()),
        Err(e) => {
            logger.warn(&format!("Remote service {} rejected: {}", service, e));
            send(ExecutionState::Error, true);
            return;
        }
    };
    if state == ExecutionState::Unknown {
        state = ExecutionState::Initiated;
    }
    send(state, state.is_terminal());
    if state.is_terminal() {
        return;
    }

    for _ in 0..max_polls {
        tokio::time::sleep(poll_interval).await;
        let next = match fetcher.fetch(FetchRequest::RemoteStatus { service }).await {
            Ok(body) => parse_execution_state(body.as_text().unwrap_or_default()),
            Err(e) => {
                logger.debug(&format!("Status poll for {} failed: {}", service, e));
                send(ExecutionState::Error, true);
                return;
            }
        };
        if next.is_terminal() {
            send(next, true);
            return;
        }
        if next != state && next != ExecutionState::Unknown {
            state = next;
            send(state, false);
        }
    }

    logger.warn(&format!(
        "Remote service {} still {} after {} polls",
        service, state, max_polls
    ));
    send(ExecutionState::Unknown, true);
}
