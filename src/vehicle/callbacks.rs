//! Per-source response handling
//!
//! Every fetch resolves here exactly once. Failures are cached as error
//! payloads and never escape the source they belong to.

use super::VehicleHandler;
use super::render;
use crate::charge_profile::ChargeProfile;
use crate::charge_profile::channels as charge_channels;
use crate::diagnostics;
use crate::edit_session::Confirmation;
use crate::image::{ImageParams, sniff_content_type};
use crate::remote::{RemoteNotification, RemoteService};
use crate::sink::ChannelValue;
use crate::status::{DeviceStatus, OfflineDetail, VehicleStatusView, legacy};
use crate::telemetry::{Payload, TelemetrySource, lock};
use crate::tracker::{Completion, CycleId};
use crate::transport::{FetchRequest, FetchResult, NetworkError};
use std::sync::PoisonError;
use std::sync::atomic::Ordering;

impl VehicleHandler {
    /// Route a fetch result to its source callback
    pub fn on_response(&self, cycle: Option<CycleId>, request: FetchRequest, result: FetchResult) {
        if self.shared.disposed.load(Ordering::SeqCst) {
            return;
        }
        match &request {
            FetchRequest::Status | FetchRequest::LegacyStatus => {
                self.on_status(cycle, &request, result)
            }
            FetchRequest::Image { .. } => self.on_image(cycle, &request, result),
            FetchRequest::ChargeProfile => self.on_charge_profile(cycle, result),
            FetchRequest::LastTrip
            | FetchRequest::AllTrips
            | FetchRequest::Destinations
            | FetchRequest::RangeMap => {
                if let Some(source) = request.source() {
                    self.on_text_source(cycle, source, &request, result);
                }
            }
            FetchRequest::RemoteExecute { .. } | FetchRequest::RemoteStatus { .. } => {}
        }
    }

    fn on_status(&self, cycle: Option<CycleId>, request: &FetchRequest, result: FetchResult) {
        let s = &self.shared;
        match result {
            Ok(payload) => {
                let text = payload.as_text().unwrap_or_default();
                let canonical = match request {
                    FetchRequest::LegacyStatus => legacy::transform(text, &s.config.vehicle.vin),
                    _ => Ok(text.to_string()),
                };
                let parsed = canonical
                    .and_then(|content| VehicleStatusView::from_json(&content).map(|v| (content, v)));
                match parsed {
                    Ok((content, view)) => {
                        s.announce(DeviceStatus::Online);
                        s.cache
                            .store_data(TelemetrySource::Status, Payload::Text(content));
                        let selections = *lock(&s.selections);
                        self.publish_all(render::status_channels(&view, &selections));
                    }
                    Err(e) => {
                        s.logger.debug(&format!("Status not parsed: {}", e));
                        s.cache.store_error(
                            TelemetrySource::Status,
                            NetworkError::new(request.name(), 0, e.to_string()),
                        );
                        s.announce(DeviceStatus::offline(
                            OfflineDetail::CommunicationError,
                            e.to_string(),
                        ));
                    }
                }
            }
            Err(error) => {
                s.logger
                    .debug(&format!("{} failed: {}", request.name(), error));
                let decision = s.status.on_error(request, &error);
                s.cache.store_error(TelemetrySource::Status, error);
                if let Some(ref status) = decision.announce {
                    s.logger.info(&format!("Vehicle status {}", status));
                    s.sink.update_status(status);
                }
                if let Some(notice) = decision.fallback_error() {
                    s.logger.info(&notice.to_string());
                }
                if let Some(fallback) = decision.fallback {
                    // status stays in flight until the legacy answer resolves
                    self.spawn_fetch(cycle, fallback);
                    return;
                }
            }
        }
        self.complete(cycle, TelemetrySource::Status);
    }

    fn on_text_source(
        &self,
        cycle: Option<CycleId>,
        source: TelemetrySource,
        request: &FetchRequest,
        result: FetchResult,
    ) {
        let s = &self.shared;
        match result {
            Ok(payload) => {
                let text = payload.as_text().unwrap_or_default().to_string();
                let selections = *lock(&s.selections);
                match render::source_channels(source, &text, &selections) {
                    Ok(values) => {
                        s.cache.store_data(source, Payload::Text(text));
                        self.publish_all(values);
                    }
                    Err(e) => {
                        s.logger.debug(&format!("{} not parsed: {}", source, e));
                        s.cache
                            .store_error(source, NetworkError::new(request.name(), 0, e.to_string()));
                        self.publish_all(render::undefined(source));
                    }
                }
            }
            Err(error) => {
                s.logger.debug(&format!("{} failed: {}", source, error));
                s.cache.store_error(source, error);
                self.publish_all(render::undefined(source));
            }
        }
        self.complete(cycle, source);
    }

    fn on_charge_profile(&self, cycle: Option<CycleId>, result: FetchResult) {
        let s = &self.shared;
        let source = TelemetrySource::ChargeProfile;
        match result {
            Ok(payload) => {
                let text = payload.as_text().unwrap_or_default().to_string();
                match ChargeProfile::from_json(&text) {
                    Ok(profile) => {
                        s.cache.store_data(source, Payload::Text(text));
                        // an open overlay keeps priority over background refreshes
                        s.editor.publish_if_idle(|| {
                            self.publish_all(charge_channels::render(&profile))
                        });
                    }
                    Err(e) => {
                        s.logger.debug(&format!("Charge profile not parsed: {}", e));
                        s.cache.store_error(
                            source,
                            NetworkError::new(FetchRequest::ChargeProfile.name(), 0, e.to_string()),
                        );
                        s.editor
                            .publish_if_idle(|| self.publish_all(charge_channels::render_empty()));
                    }
                }
            }
            Err(error) => {
                s.logger.debug(&format!("Charge profile failed: {}", error));
                s.cache.store_error(source, error);
                s.editor
                    .publish_if_idle(|| self.publish_all(charge_channels::render_empty()));
            }
        }
        self.complete(cycle, source);
    }

    fn on_image(&self, cycle: Option<CycleId>, request: &FetchRequest, result: FetchResult) {
        let s = &self.shared;
        let requested = ImageParams::of(request);
        {
            let mut props = s.image.lock();
            if requested.as_ref() != Some(&props.params) {
                s.logger.debug(&format!(
                    "Dropping image for outdated parameters {:?}",
                    requested
                ));
            } else {
                match result {
                    Ok(Payload::Bytes(data)) if !data.is_empty() => {
                        let content_type = sniff_content_type(&data).to_string();
                        s.cache
                            .store_data(TelemetrySource::Image, Payload::Bytes(data.clone()));
                        self.publish(render::IMAGE, ChannelValue::Raw { content_type, data });
                    }
                    Ok(_) => {
                        props.failed();
                        s.logger.debug(&format!(
                            "Empty image received, {} failures",
                            props.failed_count
                        ));
                    }
                    Err(error) => {
                        props.failed();
                        s.logger.debug(&format!(
                            "Image failed ({} failures): {}",
                            props.failed_count, error
                        ));
                    }
                }
            }
        }
        self.complete(cycle, TelemetrySource::Image);
    }

    /// Remove a resolved source from its cycle; the last one emits the
    /// fingerprint
    fn complete(&self, cycle: Option<CycleId>, source: TelemetrySource) {
        let Some(cycle) = cycle else {
            return;
        };
        if self.shared.tracker.complete(cycle, source) == Completion::CycleComplete {
            self.log_fingerprint();
        }
    }

    fn log_fingerprint(&self) {
        let s = &self.shared;
        let capabilities = self.capabilities();
        let dump = diagnostics::fingerprint(
            &s.config.vehicle.vin,
            &capabilities,
            &s.cache,
            s.config.vehicle.is_electric(),
        );
        get_diagnostics_logger().debug(&dump);
        *s.last_fingerprint
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(dump);
    }

    /// Completion report of a remote command
    pub fn on_remote_notification(&self, notification: RemoteNotification) {
        let s = &self.shared;
        self.publish(render::REMOTE_STATE, ChannelValue::text(notification.display()));
        if notification.service != RemoteService::ChargingControl {
            return;
        }
        match s
            .editor
            .confirm_into(&s.cache, notification.state, notification.finished)
        {
            Confirmation::Promote(_) => self.render_charge_profile(),
            Confirmation::PromoteAndResend { resend, .. } => {
                s.remote
                    .execute(RemoteService::ChargingControl, Some(resend));
            }
            Confirmation::Failed | Confirmation::Ignored => {}
        }
    }

    /// Publish the charge channels: open overlay first, cache otherwise
    pub(crate) fn render_charge_profile(&self) {
        let s = &self.shared;
        s.editor
            .publish_profile(&s.cache, |values| self.publish_all(values));
    }
}

fn get_diagnostics_logger() -> crate::logging::StructuredLogger {
    crate::logging::get_logger("diagnostics")
}
