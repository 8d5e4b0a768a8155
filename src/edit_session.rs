//! Optimistic charge profile editing
//!
//! Edits accumulate in an overlay copied from the cached profile. The
//! overlay is dropped after an idle period without edits, or promoted once
//! the vehicle confirms the charging-control command that carried it.
//! Overlay, timer handle and sent snapshots share one lock. Reads of the
//! cached profile, promotions into the cache and charge channel publication
//! happen under that lock too.

use crate::charge_profile::ChargeProfile;
use crate::charge_profile::channels::{self, ChargeField};
use crate::error::{DriveLinkError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger, get_logger_with_context};
use crate::remote::ExecutionState;
use crate::sink::{ChannelCommand, ChannelValue};
use crate::telemetry::{Payload, SourceCache, TelemetrySource, lock};
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Open edit session
#[derive(Debug, Clone)]
pub struct EditSession {
    pub id: Uuid,
    pub overlay: ChargeProfile,
    pub started: DateTime<Utc>,
    pub last_edit: DateTime<Utc>,
    pub edits: u32,
}

/// Result of a confirmation notification
#[derive(Debug, Clone, PartialEq)]
pub enum Confirmation {
    /// Profile now stored in the cache; the session is closed
    Promote(String),
    /// `promote` is stored in the cache; `resend` was sent while the first
    /// command was in flight and must be submitted now; the session stays open
    PromoteAndResend { promote: String, resend: String },
    /// Command failed; the session stays open for another send
    Failed,
    /// Nothing was awaiting confirmation
    Ignored,
}

#[derive(Debug, Default)]
struct EditorState {
    session: Option<EditSession>,
    /// Latest snapshot handed to `send`
    pending_sent: Option<String>,
    /// Snapshot carried by the command currently executing
    in_flight: Option<String>,
    timeout: Option<JoinHandle<()>>,
    generation: u64,
}

impl EditorState {
    fn cancel_timeout(&mut self) {
        if let Some(timeout) = self.timeout.take() {
            timeout.abort();
        }
    }
}

/// Edit session owner for one vehicle
#[derive(Debug)]
pub struct ChargeProfileEditor {
    state: Mutex<EditorState>,
    idle_timeout: Duration,
    logger: StructuredLogger,
}

impl ChargeProfileEditor {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(EditorState::default()),
            idle_timeout,
            logger: get_logger("edit"),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Apply one edit. A new session is opened from the cached profile;
    /// `schedule` spawns the idle timer for the given generation. Returns the
    /// channels to echo. A rejected edit changes no state.
    pub fn apply<F>(
        &self,
        channel: &str,
        command: &ChannelCommand,
        cache: &SourceCache,
        schedule: F,
    ) -> Result<Vec<(String, ChannelValue)>>
    where
        F: FnOnce(u64, Duration) -> JoinHandle<()>,
    {
        let field: ChargeField = channels::lookup(channel).ok_or_else(|| {
            DriveLinkError::validation(channel, "unknown charge profile channel")
        })?;

        let mut state = lock(&self.state);
        let mut overlay = match &state.session {
            Some(session) => session.overlay.clone(),
            None => {
                let content = cache.read_text(TelemetrySource::ChargeProfile).ok_or_else(|| {
                    DriveLinkError::validation(channel, "no charge profile received yet")
                })?;
                ChargeProfile::from_json(&content)?
            }
        };

        channels::apply(&mut overlay, channel, field, command)?;
        let echo = channels::render_field(&overlay, field);

        let now = Utc::now();
        match state.session.as_mut() {
            Some(session) => {
                session.overlay = overlay;
                session.last_edit = now;
                session.edits += 1;
            }
            None => {
                let session = EditSession {
                    id: Uuid::new_v4(),
                    overlay,
                    started: now,
                    last_edit: now,
                    edits: 1,
                };
                get_logger_with_context(
                    LogContext::new("edit").with_session_id(session.id.to_string()),
                )
                .info("Charge profile editing started");
                state.session = Some(session);
            }
        }

        state.cancel_timeout();
        state.generation += 1;
        let generation = state.generation;
        state.timeout = Some(schedule(generation, self.idle_timeout));
        Ok(echo)
    }

    /// Idle timer fired. Returns true if the overlay was discarded.
    pub fn expire(&self, generation: u64) -> bool {
        let mut state = lock(&self.state);
        if state.generation != generation || state.session.is_none() {
            return false;
        }
        state.timeout = None;
        if let Some(session) = state.session.take() {
            self.logger.info(&format!(
                "Charge profile edit session {} timed out after {} edits",
                session.id, session.edits
            ));
        }
        true
    }

    /// Prepare a charging-control submission. With an open session the
    /// overlay is sent, otherwise the cached profile verbatim. Returns the
    /// payload to dispatch now, or `None` while an earlier submission is
    /// still executing (the newer snapshot replaces the pending one).
    pub fn send(&self, cache: &SourceCache) -> Result<Option<String>> {
        let mut state = lock(&self.state);
        let json = match &state.session {
            Some(session) => session.overlay.to_json()?,
            None => cache.read_text(TelemetrySource::ChargeProfile).ok_or_else(|| {
                DriveLinkError::validation("charge-control", "no charge profile to send")
            })?,
        };
        state.pending_sent = Some(json.clone());
        if state.in_flight.is_some() {
            self.logger
                .debug("Charging control in flight, pending snapshot replaced");
            return Ok(None);
        }
        state.in_flight = Some(json.clone());
        Ok(Some(json))
    }

    /// Handle a charging-control notification. An executed snapshot is
    /// written to the cache before the session lock is released, so an edit
    /// racing the confirmation opens its session from the promoted profile.
    pub fn confirm_into(
        &self,
        cache: &SourceCache,
        state_reported: ExecutionState,
        finished: bool,
    ) -> Confirmation {
        let mut state = lock(&self.state);
        match state_reported {
            ExecutionState::Executed => {
                let Some(executed) = state.in_flight.take() else {
                    return Confirmation::Ignored;
                };
                cache.store_data(
                    TelemetrySource::ChargeProfile,
                    Payload::Text(executed.clone()),
                );
                match state.pending_sent.take() {
                    Some(latest) if latest != executed => {
                        state.in_flight = Some(latest.clone());
                        state.pending_sent = Some(latest.clone());
                        Confirmation::PromoteAndResend {
                            promote: executed,
                            resend: latest,
                        }
                    }
                    _ => {
                        state.cancel_timeout();
                        if let Some(session) = state.session.take() {
                            self.logger.info(&format!(
                                "Charge profile edit session {} confirmed",
                                session.id
                            ));
                        }
                        Confirmation::Promote(executed)
                    }
                }
            }
            _ if finished => {
                if state.in_flight.take().is_none() {
                    return Confirmation::Ignored;
                }
                state.pending_sent = None;
                self.logger.warn(&format!(
                    "Charging control ended {}, edits kept",
                    state_reported
                ));
                Confirmation::Failed
            }
            _ => Confirmation::Ignored,
        }
    }

    /// Run `publish` only while no session is open, holding the session
    /// lock so an edit cannot open one in between
    pub fn publish_if_idle<R, F>(&self, publish: F) -> Option<R>
    where
        F: FnOnce() -> R,
    {
        let state = lock(&self.state);
        if state.session.is_some() {
            return None;
        }
        let result = publish();
        drop(state);
        Some(result)
    }

    /// Hand the charge channels to `publish`: the open overlay first, the
    /// cached profile otherwise, empty values when neither parses
    pub fn publish_profile<F>(&self, cache: &SourceCache, publish: F)
    where
        F: FnOnce(Vec<(String, ChannelValue)>),
    {
        let state = lock(&self.state);
        let values = match &state.session {
            Some(session) => channels::render(&session.overlay),
            None => cache
                .read_text(TelemetrySource::ChargeProfile)
                .and_then(|text| ChargeProfile::from_json(&text).ok())
                .map(|profile| channels::render(&profile))
                .unwrap_or_else(channels::render_empty),
        };
        publish(values);
    }

    /// Overlay of the open session
    pub fn overlay(&self) -> Option<ChargeProfile> {
        lock(&self.state).session.as_ref().map(|s| s.overlay.clone())
    }

    pub fn session(&self) -> Option<EditSession> {
        lock(&self.state).session.clone()
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).session.is_some()
    }

    pub fn pending_sent(&self) -> Option<String> {
        lock(&self.state).pending_sent.clone()
    }

    /// Whether an idle timer is armed and still running
    pub fn timeout_scheduled(&self) -> bool {
        lock(&self.state)
            .timeout
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Abort the idle timer on shutdown
    pub fn cancel(&self) {
        lock(&self.state).cancel_timeout();
    }
}
