//! Vehicle capabilities
//!
//! A discovery record lists per-service availability as individual fields.
//! The table below names every capability field explicitly and extracts
//! its value; the set of supported names drives which telemetry sources a
//! refresh cycle requests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const STATISTICS: &str = "statistics";
pub const LAST_DESTINATIONS: &str = "lastDestinations";

const ACTIVATED: &str = "ACTIVATED";
const SUPPORTED: &str = "SUPPORTED";

/// Dealer block of a discovery record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Dealer {
    pub name: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub phone: Option<String>,
}

/// One vehicle as listed by the discovery endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VehicleRecord {
    pub vin: String,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub drive_train: Option<String>,
    pub year_of_construction: Option<u16>,
    pub color: Option<String>,
    pub bodytype: Option<String>,
    pub has_alarm_system: bool,
    pub statistics_available: bool,
    pub breakdown_number: Option<String>,
    pub supported_charging_modes: Vec<String>,
    pub dealer: Option<Dealer>,
    pub charging_control: Option<String>,
    pub last_destinations: Option<String>,
    pub range_map: Option<String>,
    pub climate_now: Option<String>,
    pub charge_now: Option<String>,
    pub door_lock: Option<String>,
    pub door_unlock: Option<String>,
    pub horn_blow: Option<String>,
    pub light_flash: Option<String>,
    pub vehicle_finder: Option<String>,
    pub send_poi: Option<String>,
}

/// Raw value of one capability field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityValue {
    Flag(bool),
    Text(String),
}

impl CapabilityValue {
    pub fn is_supported(&self) -> bool {
        match self {
            CapabilityValue::Flag(b) => *b,
            CapabilityValue::Text(s) => s == ACTIVATED || s == SUPPORTED,
        }
    }
}

type Extractor = fn(&VehicleRecord) -> Option<CapabilityValue>;

fn text(v: &Option<String>) -> Option<CapabilityValue> {
    v.as_ref().map(|s| CapabilityValue::Text(s.trim().to_uppercase()))
}

/// Capability name to record field
const CAPABILITY_TABLE: &[(&str, Extractor)] = &[
    (STATISTICS, |r| Some(CapabilityValue::Flag(r.statistics_available))),
    (LAST_DESTINATIONS, |r| text(&r.last_destinations)),
    ("chargingControl", |r| text(&r.charging_control)),
    ("rangeMap", |r| {
        r.range_map
            .as_ref()
            .map(|s| CapabilityValue::Flag(!s.is_empty() && s != "NONE"))
    }),
    ("climateNow", |r| text(&r.climate_now)),
    ("chargeNow", |r| text(&r.charge_now)),
    ("doorLock", |r| text(&r.door_lock)),
    ("doorUnlock", |r| text(&r.door_unlock)),
    ("hornBlow", |r| text(&r.horn_blow)),
    ("lightFlash", |r| text(&r.light_flash)),
    ("vehicleFinder", |r| text(&r.vehicle_finder)),
    ("sendPoi", |r| text(&r.send_poi)),
];

/// Evaluate every table entry present in the record
pub fn capability_values(record: &VehicleRecord) -> Vec<(&'static str, CapabilityValue)> {
    CAPABILITY_TABLE
        .iter()
        .filter_map(|(name, extract)| extract(record).map(|v| (*name, v)))
        .collect()
}

/// Supported capability names plus the discovery properties shown in
/// diagnostics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capabilities {
    supported: BTreeSet<String>,
    properties: Vec<(String, String)>,
}

impl Capabilities {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let supported: BTreeSet<String> = names
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let properties = vec![(
            "Services Supported".to_string(),
            supported.iter().cloned().collect::<Vec<_>>().join(" "),
        )];
        Self {
            supported,
            properties,
        }
    }

    pub fn from_record(record: &VehicleRecord) -> Self {
        let values = capability_values(record);
        let supported: BTreeSet<String> = values
            .iter()
            .filter(|(_, v)| v.is_supported())
            .map(|(n, _)| n.to_string())
            .collect();
        let not_supported: Vec<&str> = values
            .iter()
            .filter(|(_, v)| !v.is_supported())
            .map(|(n, _)| *n)
            .collect();

        let mut properties = vec![
            (
                "Services Supported".to_string(),
                supported.iter().cloned().collect::<Vec<_>>().join(" "),
            ),
            ("Services Not Supported".to_string(), not_supported.join(" ")),
        ];
        let mut push = |key: &str, value: Option<String>| {
            if let Some(v) = value.filter(|v| !v.is_empty()) {
                properties.push((key.to_string(), v));
            }
        };
        push("Vehicle Brand", record.brand.clone());
        push("Vehicle Model", record.model.clone());
        push("Vehicle Drive Train", record.drive_train.clone());
        push("Vehicle Bodytype", record.bodytype.clone());
        push("Vehicle Color", record.color.clone());
        push(
            "Vehicle Construction Year",
            record.year_of_construction.map(|y| y.to_string()),
        );
        push(
            "Vehicle Charge Modes",
            Some(record.supported_charging_modes.join(" ")),
        );
        push(
            "Vehicle Alarm System",
            Some(if record.has_alarm_system { "Available" } else { "Not Available" }.to_string()),
        );
        push("Support Breakdown Number", record.breakdown_number.clone());
        if let Some(dealer) = &record.dealer {
            push("Dealer", dealer.name.clone());
            push("Dealer Phone", dealer.phone.clone());
        }

        Self {
            supported,
            properties,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.supported.iter().any(|s| s.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.supported.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.supported.iter().cloned().collect()
    }

    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }
}
