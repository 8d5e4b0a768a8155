//! Channel commands: refresh, selections, image parameters, charge profile
//! edits and remote services

use super::render::{self, ChannelGroup};
use super::{Shared, VehicleHandler};
use crate::charge_profile::channels as charge_channels;
use crate::error::{DriveLinkError, Result};
use crate::image::{parse_size, parse_viewport};
use crate::remote::RemoteService;
use crate::sink::{ChannelCommand, ChannelValue};
use crate::status::VehicleStatusView;
use crate::telemetry::{TelemetrySource, lock};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

impl VehicleHandler {
    /// Dispatch a command received on a channel
    pub fn handle_command(&self, channel: &str, command: ChannelCommand) -> Result<()> {
        let s = &self.shared;
        if s.disposed.load(Ordering::SeqCst) {
            return Err(DriveLinkError::generic("vehicle handler disposed"));
        }
        let group = ChannelGroup::of(channel)
            .ok_or_else(|| DriveLinkError::validation(channel, "unknown channel"))?;
        s.logger
            .debug(&format!("Command {:?} on {}", command, channel));

        if command == ChannelCommand::Refresh {
            self.refresh_group(group);
            return Ok(());
        }

        match group {
            ChannelGroup::Remote if channel == render::REMOTE_COMMAND => match command {
                ChannelCommand::Text(id) => self.execute_remote_service(&id, None),
                other => Err(unsupported(channel, &other)),
            },
            ChannelGroup::Image if channel == render::IMAGE_VIEWPORT => match command {
                ChannelCommand::Text(value) => {
                    let viewport = parse_viewport(&value)?;
                    self.change_image(Some(viewport), None)
                }
                other => Err(unsupported(channel, &other)),
            },
            ChannelGroup::Image if channel == render::IMAGE_SIZE => match command {
                ChannelCommand::Number(value) => {
                    let size = parse_size(value)?;
                    self.change_image(None, Some(size))
                }
                other => Err(unsupported(channel, &other)),
            },
            ChannelGroup::Destinations if channel == render::DESTINATION_INDEX => {
                let index = selection(channel, &command)?;
                lock(&s.selections).destination = index;
                self.refresh_group(ChannelGroup::Destinations);
                Ok(())
            }
            ChannelGroup::Status if channel == render::CHECK_CONTROL_INDEX => {
                let index = selection(channel, &command)?;
                lock(&s.selections).check_control = index;
                self.render_status_list(|view| render::check_control_channels(view, index));
                Ok(())
            }
            ChannelGroup::Status if channel == render::SERVICE_INDEX => {
                let index = selection(channel, &command)?;
                lock(&s.selections).service = index;
                self.render_status_list(|view| render::service_channels(view, index));
                Ok(())
            }
            ChannelGroup::Charge => self.edit_charge_profile(channel, &command),
            _ => Err(DriveLinkError::validation(
                channel,
                "channel does not accept commands",
            )),
        }
    }

    /// Trigger a remote service by its command id or vendor code
    pub fn execute_remote_service(&self, id: &str, payload: Option<String>) -> Result<()> {
        let s = &self.shared;
        if !s.configured.load(Ordering::SeqCst) {
            return Err(DriveLinkError::config("vehicle not configured"));
        }
        let service = RemoteService::from_command_id(id)?;
        if service == RemoteService::ChargingControl {
            return self.send_charge_profile();
        }
        s.remote.execute(service, payload);
        Ok(())
    }

    /// Submit the edited profile, or the cached one when nothing was edited
    pub fn send_charge_profile(&self) -> Result<()> {
        let s = &self.shared;
        if let Some(json) = s.editor.send(&s.cache)? {
            s.remote.execute(RemoteService::ChargingControl, Some(json));
        }
        Ok(())
    }

    /// Re-render one channel group from the cache
    pub fn refresh_group(&self, group: ChannelGroup) {
        let s = &self.shared;
        match group {
            ChannelGroup::Charge => self.render_charge_profile(),
            ChannelGroup::Image => {
                if let Some(data) = s.cache.read_bytes(TelemetrySource::Image) {
                    let content_type = crate::image::sniff_content_type(&data).to_string();
                    self.publish(render::IMAGE, ChannelValue::Raw { content_type, data });
                }
                self.publish_image_params();
            }
            ChannelGroup::Remote => {}
            other => {
                let Some(source) = other.source() else {
                    return;
                };
                let Some(content) = s.cache.read_text(source) else {
                    return;
                };
                let selections = *lock(&s.selections);
                match render::source_channels(source, &content, &selections) {
                    Ok(values) => self.publish_all(values),
                    Err(_) => self.publish_all(render::undefined(source)),
                }
            }
        }
    }

    fn render_status_list<F>(&self, render_list: F)
    where
        F: FnOnce(&VehicleStatusView) -> Vec<(String, ChannelValue)>,
    {
        let view = self
            .shared
            .cache
            .read_text(TelemetrySource::Status)
            .and_then(|content| VehicleStatusView::from_json(&content).ok());
        if let Some(view) = view {
            self.publish_all(render_list(&view));
        }
    }

    /// Switch image parameters. The change, the counter reset and the new
    /// request happen under the image lock so a late response for the old
    /// parameters is recognized as stale.
    fn change_image(&self, viewport: Option<String>, size: Option<u32>) -> Result<()> {
        let s = &self.shared;
        if !s.configured.load(Ordering::SeqCst) {
            return Err(DriveLinkError::config("vehicle not configured"));
        }
        {
            let mut props = s.image.lock();
            let mut next = props.params.clone();
            if let Some(viewport) = viewport {
                next.viewport = viewport;
            }
            if let Some(size) = size {
                next.size = size;
            }
            if next != props.params {
                s.logger.info(&format!(
                    "Image parameters changed to {} {}",
                    next.viewport, next.size
                ));
                props.params = next.clone();
                props.failed_count = 0;
                s.cache.decommission_image();
                self.spawn_fetch(None, next.request());
            }
        }
        self.publish_image_params();
        Ok(())
    }

    fn edit_charge_profile(&self, channel: &str, command: &ChannelCommand) -> Result<()> {
        let s = &self.shared;
        if !charge_channels::is_charge_channel(channel) {
            return Err(DriveLinkError::validation(channel, "unknown channel"));
        }
        let weak = Arc::downgrade(&self.shared);
        let echo = s.editor.apply(channel, command, &s.cache, |generation, timeout| {
            tokio::spawn(expire_after(weak, generation, timeout))
        })?;
        self.publish_all(echo);
        Ok(())
    }
}

async fn expire_after(weak: Weak<Shared>, generation: u64, timeout: std::time::Duration) {
    tokio::time::sleep(timeout).await;
    let Some(shared) = weak.upgrade() else {
        return;
    };
    if shared.editor.expire(generation) {
        VehicleHandler { shared }.render_charge_profile();
    }
}

fn selection(channel: &str, command: &ChannelCommand) -> Result<usize> {
    let index = match command {
        ChannelCommand::Number(n) if *n >= 0.0 && n.fract() == 0.0 => Some(*n as usize),
        ChannelCommand::Text(t) => render::parse_index(t),
        _ => None,
    };
    index.ok_or_else(|| DriveLinkError::validation(channel, format!("invalid selection {:?}", command)))
}

fn unsupported(channel: &str, command: &ChannelCommand) -> DriveLinkError {
    DriveLinkError::validation(channel, format!("unsupported command {:?}", command))
}
