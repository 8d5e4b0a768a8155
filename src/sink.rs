//! State sink seam
//!
//! The vehicle handler reports channel values and device status through
//! `StateSink`. `ChannelStore` is the in-process implementation read by the
//! HTTP surface.

use crate::status::DeviceStatus;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Value published on a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelValue {
    /// No data available
    Undef,
    Text(String),
    Number(f64),
    Switch(bool),
    Raw { content_type: String, data: Vec<u8> },
}

impl ChannelValue {
    pub fn text<S: Into<String>>(s: S) -> Self {
        ChannelValue::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ChannelValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ChannelValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_switch(&self) -> Option<bool> {
        match self {
            ChannelValue::Switch(b) => Some(*b),
            _ => None,
        }
    }

    /// JSON view; raw payloads are summarized instead of inlined
    pub fn to_json(&self) -> Value {
        match self {
            ChannelValue::Undef => Value::Null,
            ChannelValue::Text(s) => json!(s),
            ChannelValue::Number(n) => json!(n),
            ChannelValue::Switch(b) => json!(b),
            ChannelValue::Raw { content_type, data } => json!({
                "content_type": content_type,
                "bytes": data.len(),
            }),
        }
    }
}

/// Command received on a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    /// Re-render the channel group from cached data
    Refresh,
    OnOff(bool),
    Number(f64),
    Text(String),
}

impl ChannelCommand {
    /// Map a JSON body onto a command; the string "REFRESH" requests a refresh
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ChannelCommand::OnOff(*b)),
            Value::Number(n) => n.as_f64().map(ChannelCommand::Number),
            Value::String(s) if s.eq_ignore_ascii_case("REFRESH") => Some(ChannelCommand::Refresh),
            Value::String(s) if s.eq_ignore_ascii_case("ON") => Some(ChannelCommand::OnOff(true)),
            Value::String(s) if s.eq_ignore_ascii_case("OFF") => Some(ChannelCommand::OnOff(false)),
            Value::String(s) => Some(ChannelCommand::Text(s.clone())),
            _ => None,
        }
    }
}

/// Display form of an enumerated value: "CHARGING_CONTROL EXECUTED" -> "Charging Control Executed"
pub fn title_case(s: &str) -> String {
    s.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let lower = w.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Receiver of channel updates and device status transitions.
/// Must tolerate calls from concurrent tasks.
pub trait StateSink: Send + Sync {
    fn publish(&self, channel: &str, value: ChannelValue);

    fn update_status(&self, status: &DeviceStatus);
}

/// In-memory sink keeping the latest value per channel
#[derive(Debug, Default)]
pub struct ChannelStore {
    channels: RwLock<BTreeMap<String, ChannelValue>>,
    status: RwLock<DeviceStatus>,
}

impl ChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, channel: &str) -> Option<ChannelValue> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(channel).cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, ChannelValue> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StateSink for ChannelStore {
    fn publish(&self, channel: &str, value: ChannelValue) {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        channels.insert(channel.to_string(), value);
    }

    fn update_status(&self, status: &DeviceStatus) {
        let mut current = self.status.write().unwrap_or_else(PoisonError::into_inner);
        *current = status.clone();
    }
}
