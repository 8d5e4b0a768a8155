//! Troubleshooting fingerprint
//!
//! Once every source of a refresh cycle resolved, the cached responses are
//! dumped as one multi-line block. Vehicle identifiers are anonymized: the
//! VIN is replaced everywhere, coordinates are zeroed and destination
//! addresses are blanked.

use crate::capabilities::Capabilities;
use crate::telemetry::{CacheEntry, SourceCache, TelemetrySource};
use serde_json::Value;

pub const ANONYMOUS: &str = "ANONYMOUS";

const COORDINATE_KEYS: [&str; 7] = [
    "lat",
    "lon",
    "latitude",
    "longitude",
    "gps_lat",
    "gps_lng",
    "heading",
];
const ADDRESS_KEYS: [&str; 6] = [
    "city",
    "street",
    "streetNumber",
    "country",
    "postalCode",
    "formattedAddress",
];

fn section_title(source: TelemetrySource) -> &'static str {
    match source {
        TelemetrySource::Status => "Vehicle Status",
        TelemetrySource::LastTrip => "Last Trip",
        TelemetrySource::AllTrips => "All Trips",
        TelemetrySource::ChargeProfile => "Charge Profile",
        TelemetrySource::Destinations => "Destinations",
        TelemetrySource::RangeMap => "Range Map",
        TelemetrySource::Image => "Image",
    }
}

fn redact_value(value: &mut Value, vin: &str) {
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if COORDINATE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                    *v = match v {
                        Value::String(_) => Value::String("0".to_string()),
                        Value::Null => Value::Null,
                        _ => Value::from(0),
                    };
                } else if ADDRESS_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
                    || key.eq_ignore_ascii_case("vin")
                {
                    if !v.is_null() {
                        *v = Value::String(ANONYMOUS.to_string());
                    }
                } else {
                    redact_value(v, vin);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_value(item, vin);
            }
        }
        Value::String(s) => {
            if !vin.is_empty() && s.contains(vin) {
                *s = s.replace(vin, ANONYMOUS);
            }
        }
        _ => {}
    }
}

fn replace_vin(text: &str, vin: &str) -> String {
    if vin.is_empty() {
        text.to_string()
    } else {
        text.replace(vin, ANONYMOUS)
    }
}

/// Anonymize one payload. JSON is redacted structurally; anything else only
/// gets the VIN replaced.
pub fn redact(content: &str, vin: &str) -> String {
    let redacted = match serde_json::from_str::<Value>(content) {
        Ok(mut value) => {
            redact_value(&mut value, vin);
            serde_json::to_string(&value).unwrap_or_else(|_| content.to_string())
        }
        Err(_) => content.to_string(),
    };
    replace_vin(&redacted, vin)
}

/// Build the fingerprint block from the current cache
pub fn fingerprint(
    vin: &str,
    capabilities: &Capabilities,
    cache: &SourceCache,
    is_electric: bool,
) -> String {
    let mut lines = vec![
        "###### Vehicle Troubleshoot Fingerprint Data - BEGIN ######".to_string(),
        "### Discovery Result ###".to_string(),
    ];
    if capabilities.properties().is_empty() {
        lines.push("### Discovery Result Empty ###".to_string());
    }
    for (key, value) in capabilities.properties() {
        lines.push(replace_vin(&format!("{}: {}", key, value), vin));
    }

    for source in TelemetrySource::ALL {
        if matches!(source, TelemetrySource::ChargeProfile | TelemetrySource::RangeMap)
            && !is_electric
        {
            continue;
        }
        let title = section_title(source);
        match cache.read(source) {
            Some(entry @ CacheEntry::Data(_)) if source == TelemetrySource::Image => {
                lines.push(format!("### {} ###", title));
                lines.push(entry.render());
            }
            Some(entry) => {
                let marker = if entry.is_error() { " (Error)" } else { "" };
                lines.push(format!("### {}{} ###", title, marker));
                lines.push(redact(&entry.render(), vin));
            }
            None => lines.push(format!("### {} Empty ###", title)),
        }
    }

    lines.push("###### Vehicle Troubleshoot Fingerprint Data - END ######".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Payload;
    use crate::transport::NetworkError;

    #[test]
    fn coordinates_and_vin_are_removed() {
        let json = r#"{"vehicleStatus":{"vin":"WBA12345","position":{"lat":48.1,"lon":11.5,"heading":211},
            "note":"car WBA12345 parked"}}"#;
        let out = redact(json, "WBA12345");
        assert!(!out.contains("WBA12345"));
        assert!(!out.contains("48.1"));
        assert!(!out.contains("11.5"));
        assert!(out.contains(ANONYMOUS));
    }

    #[test]
    fn string_coordinates_and_addresses() {
        let json = r#"{"destinations":[{"lat":"48.1","lon":"11.5","city":"Munich","street":"Petuelring","streetNumber":"130"}]}"#;
        let out = redact(json, "X");
        assert!(!out.contains("48.1"));
        assert!(!out.contains("Munich"));
        assert!(!out.contains("Petuelring"));
    }

    #[test]
    fn non_json_only_replaces_vin() {
        assert_eq!(redact("plain WBA1 text", "WBA1"), "plain ANONYMOUS text");
        assert_eq!(redact("plain text", ""), "plain text");
    }

    #[test]
    fn fingerprint_lists_every_section() {
        let cache = SourceCache::new();
        cache.store_data(
            TelemetrySource::Status,
            Payload::Text(r#"{"vehicleStatus":{"vin":"WBA12345"}}"#.into()),
        );
        cache.store_error(
            TelemetrySource::LastTrip,
            NetworkError::new(
                "https://host/webapi/v1/user/vehicles/WBA12345/statistics/lastTrip",
                500,
                "Internal Server Error",
            ),
        );
        cache.store_data(TelemetrySource::Image, Payload::Bytes(vec![1, 2, 3]));
        let dump = fingerprint("WBA12345", &Capabilities::default(), &cache, false);
        assert!(dump.contains("### Vehicle Status ###"));
        assert!(dump.contains("### Last Trip (Error) ###"));
        assert!(dump.contains("### All Trips Empty ###"));
        assert!(dump.contains("<3 bytes>"));
        assert!(!dump.contains("Charge Profile"));
        assert!(!dump.contains("WBA12345"));
    }
}
