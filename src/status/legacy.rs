//! Legacy status payload
//!
//! Older vehicles answer on the dynamic endpoint with a flat map of string
//! attributes plus a message block. The payload is converted into the
//! canonical status view so both protocol variants share one success path.

use super::{CheckControlMessage, Position, ServiceItem, VehicleStatusView};
use crate::error::{DriveLinkError, Result};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContainer {
    attributes_map: Option<HashMap<String, String>>,
    #[serde(default)]
    vehicle_messages: LegacyMessages,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyMessages {
    ccm_messages: Vec<LegacyMessage>,
    cbs_messages: Vec<LegacyMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyMessage {
    id: Option<serde_json::Value>,
    text: String,
    status: Option<String>,
    date: Option<String>,
    unit_of_length_remaining: Option<String>,
}

fn number(attrs: &HashMap<String, String>, key: &str) -> Option<f64> {
    attrs.get(key).and_then(|v| v.trim().parse::<f64>().ok())
}

fn text(attrs: &HashMap<String, String>, key: &str) -> Option<String> {
    attrs
        .get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Convert a legacy payload into the canonical status JSON
pub fn transform(content: &str, vin: &str) -> Result<String> {
    let container: LegacyContainer = serde_json::from_str(content)
        .map_err(|e| DriveLinkError::parse(format!("legacy status: {}", e)))?;
    let attrs = container
        .attributes_map
        .ok_or_else(|| DriveLinkError::parse("legacy status: missing attributesMap"))?;

    let position = match (number(&attrs, "gps_lat"), number(&attrs, "gps_lng")) {
        (Some(lat), Some(lon)) => Some(Position {
            lat,
            lon,
            heading: number(&attrs, "heading").unwrap_or_default(),
            status: Some("OK".to_string()),
        }),
        _ => None,
    };

    let check_control_messages = container
        .vehicle_messages
        .ccm_messages
        .into_iter()
        .map(|m| CheckControlMessage {
            ccm_description_short: m.text,
            ccm_description_long: m.id.map(|id| id.to_string()),
            ccm_mileage: m
                .unit_of_length_remaining
                .and_then(|v| v.trim().parse::<f64>().ok()),
        })
        .collect();

    let cbs_data = container
        .vehicle_messages
        .cbs_messages
        .into_iter()
        .map(|m| ServiceItem {
            cbs_type: m.text,
            cbs_state: m.status,
            cbs_due_date: m.date,
            cbs_remaining_mileage: m
                .unit_of_length_remaining
                .and_then(|v| v.trim().parse::<f64>().ok()),
        })
        .collect();

    let view = VehicleStatusView {
        vin: vin.to_string(),
        mileage: number(&attrs, "mileage"),
        door_lock_state: text(&attrs, "door_lock_state"),
        remaining_fuel: number(&attrs, "remaining_fuel"),
        remaining_range_fuel: number(&attrs, "beRemainingRangeFuelKm"),
        remaining_range_electric: number(&attrs, "beRemainingRangeElectricKm"),
        charging_level_hv: number(&attrs, "chargingLevelHv"),
        charging_status: text(&attrs, "charging_status"),
        connection_status: text(&attrs, "connectorStatus"),
        updated_at: text(&attrs, "updateTime"),
        position,
        check_control_messages,
        cbs_data,
    };
    view.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = r#"{
        "attributesMap": {
            "mileage": "17236",
            "door_lock_state": "SECURED",
            "gps_lat": "48.1",
            "gps_lng": "11.5",
            "heading": "211",
            "beRemainingRangeElectricKm": "120.0",
            "chargingLevelHv": "78",
            "updateTime": "22.08.2020 12:55:51 UTC"
        },
        "vehicleMessages": {
            "ccmMessages": [],
            "cbsMessages": [
                {"id": 3, "text": "Vehicle check", "status": "OK", "date": "2022-05", "unitOfLengthRemaining": "20000"}
            ]
        }
    }"#;

    #[test]
    fn legacy_payload_becomes_canonical() {
        let json = transform(LEGACY, "WBA0").unwrap();
        let view = VehicleStatusView::from_json(&json).unwrap();
        assert_eq!(view.vin, "WBA0");
        assert_eq!(view.mileage, Some(17236.0));
        assert_eq!(view.door_lock_state.as_deref(), Some("SECURED"));
        let pos = view.position.unwrap();
        assert_eq!((pos.lat, pos.lon, pos.heading), (48.1, 11.5, 211.0));
        assert_eq!(view.cbs_data.len(), 1);
        assert_eq!(view.cbs_data[0].cbs_remaining_mileage, Some(20000.0));
        assert_eq!(view.charging_level_hv, Some(78.0));
    }

    #[test]
    fn missing_attributes_is_parse_error() {
        assert!(transform(r#"{"vehicleMessages":{}}"#, "X").is_err());
        assert!(transform("[]", "X").is_err());
    }
}
