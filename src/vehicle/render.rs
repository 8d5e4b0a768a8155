//! Channel ids and rendering of cached payloads into channel values

use crate::charge_profile::channels::CHARGE_GROUP;
use crate::error::{DriveLinkError, Result};
use crate::sink::{ChannelValue, title_case};
use crate::status::VehicleStatusView;
use crate::telemetry::TelemetrySource;
use serde::Deserialize;

pub const STATUS_MILEAGE: &str = "status-mileage";
pub const STATUS_DOORS: &str = "status-doors";
pub const STATUS_FUEL: &str = "status-fuel";
pub const STATUS_RANGE_FUEL: &str = "status-range-fuel";
pub const STATUS_RANGE_ELECTRIC: &str = "status-range-electric";
pub const STATUS_SOC: &str = "status-soc";
pub const STATUS_CHARGE_STATUS: &str = "status-charge-status";
pub const STATUS_CONNECTION: &str = "status-connection";
pub const STATUS_LAST_UPDATE: &str = "status-last-update";

pub const LOCATION_LAT: &str = "location-lat";
pub const LOCATION_LON: &str = "location-lon";
pub const LOCATION_HEADING: &str = "location-heading";

pub const CHECK_CONTROL_COUNT: &str = "check-control-count";
pub const CHECK_CONTROL_INDEX: &str = "check-control-index";
pub const CHECK_CONTROL_NAME: &str = "check-control-name";
pub const CHECK_CONTROL_DETAILS: &str = "check-control-details";
pub const CHECK_CONTROL_MILEAGE: &str = "check-control-mileage";

pub const SERVICE_COUNT: &str = "service-count";
pub const SERVICE_INDEX: &str = "service-index";
pub const SERVICE_NAME: &str = "service-name";
pub const SERVICE_STATE: &str = "service-state";
pub const SERVICE_DATE: &str = "service-date";
pub const SERVICE_MILEAGE: &str = "service-mileage";

pub const LAST_TRIP_DATE: &str = "last-trip-date";
pub const LAST_TRIP_DURATION: &str = "last-trip-duration";
pub const LAST_TRIP_DISTANCE: &str = "last-trip-distance";
pub const LAST_TRIP_ELECTRIC_RATIO: &str = "last-trip-electric-ratio";
pub const LAST_TRIP_AVG_CONSUMPTION: &str = "last-trip-avg-consumption";
pub const LAST_TRIP_AVG_RECUPERATION: &str = "last-trip-avg-recuperation";

pub const ALL_TRIPS_ELECTRIC_DISTANCE: &str = "all-trips-electric-distance";
pub const ALL_TRIPS_AVG_CONSUMPTION: &str = "all-trips-avg-consumption";
pub const ALL_TRIPS_AVG_RECUPERATION: &str = "all-trips-avg-recuperation";
pub const ALL_TRIPS_LONGEST_DISTANCE: &str = "all-trips-longest-distance";
pub const ALL_TRIPS_RESET_DATE: &str = "all-trips-reset-date";

pub const DESTINATION_COUNT: &str = "destination-count";
pub const DESTINATION_INDEX: &str = "destination-index";
pub const DESTINATION_NAME: &str = "destination-name";
pub const DESTINATION_LAT: &str = "destination-lat";
pub const DESTINATION_LON: &str = "destination-lon";

pub const IMAGE: &str = "image";
pub const IMAGE_VIEWPORT: &str = "image-viewport";
pub const IMAGE_SIZE: &str = "image-size";

pub const REMOTE_COMMAND: &str = "remote-command";
pub const REMOTE_STATE: &str = "remote-state";

/// Channel groups; a refresh re-renders one group from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelGroup {
    Status,
    LastTrip,
    AllTrips,
    Destinations,
    RangeMap,
    Charge,
    Image,
    Remote,
}

impl ChannelGroup {
    pub fn of(channel: &str) -> Option<Self> {
        const PREFIXES: [(&str, ChannelGroup); 10] = [
            ("status-", ChannelGroup::Status),
            ("location-", ChannelGroup::Status),
            ("check-control-", ChannelGroup::Status),
            ("service-", ChannelGroup::Status),
            ("last-trip-", ChannelGroup::LastTrip),
            ("all-trips-", ChannelGroup::AllTrips),
            ("destination-", ChannelGroup::Destinations),
            ("range-", ChannelGroup::RangeMap),
            (CHARGE_GROUP, ChannelGroup::Charge),
            ("remote-", ChannelGroup::Remote),
        ];
        if channel == IMAGE || channel.starts_with("image-") {
            return Some(ChannelGroup::Image);
        }
        PREFIXES
            .iter()
            .find(|(prefix, _)| channel.starts_with(prefix))
            .map(|(_, group)| *group)
    }

    /// Cache slot backing the group, if any
    pub fn source(&self) -> Option<TelemetrySource> {
        match self {
            ChannelGroup::Status => Some(TelemetrySource::Status),
            ChannelGroup::LastTrip => Some(TelemetrySource::LastTrip),
            ChannelGroup::AllTrips => Some(TelemetrySource::AllTrips),
            ChannelGroup::Destinations => Some(TelemetrySource::Destinations),
            ChannelGroup::RangeMap => Some(TelemetrySource::RangeMap),
            ChannelGroup::Charge => Some(TelemetrySource::ChargeProfile),
            ChannelGroup::Image => Some(TelemetrySource::Image),
            ChannelGroup::Remote => None,
        }
    }
}

/// Selected entry of each list channel group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selections {
    pub destination: usize,
    pub check_control: usize,
    pub service: usize,
}

/// Leading index of a selection command such as `2` or `2: Oil`
pub fn parse_index(command: &str) -> Option<usize> {
    let head = command.split(':').next().unwrap_or_default().trim();
    head.parse().ok()
}

fn number(v: Option<f64>) -> ChannelValue {
    v.map(ChannelValue::Number).unwrap_or(ChannelValue::Undef)
}

fn text(v: Option<&str>) -> ChannelValue {
    v.map(ChannelValue::text).unwrap_or(ChannelValue::Undef)
}

fn pairs(items: &[(&str, ChannelValue)]) -> Vec<(String, ChannelValue)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

pub fn status_channels(view: &VehicleStatusView, selections: &Selections) -> Vec<(String, ChannelValue)> {
    let position = view.position.as_ref();
    let mut values = pairs(&[
        (STATUS_MILEAGE, number(view.mileage)),
        (
            STATUS_DOORS,
            text(view.door_lock_state.as_deref().map(title_case).as_deref()),
        ),
        (STATUS_FUEL, number(view.remaining_fuel)),
        (STATUS_RANGE_FUEL, number(view.remaining_range_fuel)),
        (STATUS_RANGE_ELECTRIC, number(view.remaining_range_electric)),
        (STATUS_SOC, number(view.charging_level_hv)),
        (
            STATUS_CHARGE_STATUS,
            text(view.charging_status.as_deref().map(title_case).as_deref()),
        ),
        (
            STATUS_CONNECTION,
            text(view.connection_status.as_deref().map(title_case).as_deref()),
        ),
        (STATUS_LAST_UPDATE, text(view.updated_at.as_deref())),
        (LOCATION_LAT, number(position.map(|p| p.lat))),
        (LOCATION_LON, number(position.map(|p| p.lon))),
        (LOCATION_HEADING, number(position.map(|p| p.heading))),
    ]);
    values.extend(check_control_channels(view, selections.check_control));
    values.extend(service_channels(view, selections.service));
    values
}

pub fn check_control_channels(view: &VehicleStatusView, index: usize) -> Vec<(String, ChannelValue)> {
    let messages = &view.check_control_messages;
    let selected = messages.get(index);
    pairs(&[
        (CHECK_CONTROL_COUNT, ChannelValue::Number(messages.len() as f64)),
        (
            CHECK_CONTROL_INDEX,
            selected
                .map(|_| ChannelValue::Number(index as f64))
                .unwrap_or(ChannelValue::Undef),
        ),
        (
            CHECK_CONTROL_NAME,
            text(selected.map(|m| m.ccm_description_short.as_str())),
        ),
        (
            CHECK_CONTROL_DETAILS,
            text(selected.and_then(|m| m.ccm_description_long.as_deref())),
        ),
        (
            CHECK_CONTROL_MILEAGE,
            number(selected.and_then(|m| m.ccm_mileage)),
        ),
    ])
}

pub fn service_channels(view: &VehicleStatusView, index: usize) -> Vec<(String, ChannelValue)> {
    let items = &view.cbs_data;
    let selected = items.get(index);
    pairs(&[
        (SERVICE_COUNT, ChannelValue::Number(items.len() as f64)),
        (
            SERVICE_INDEX,
            selected
                .map(|_| ChannelValue::Number(index as f64))
                .unwrap_or(ChannelValue::Undef),
        ),
        (
            SERVICE_NAME,
            text(selected.map(|s| title_case(&s.cbs_type)).as_deref()),
        ),
        (
            SERVICE_STATE,
            text(selected.and_then(|s| s.cbs_state.as_deref()).map(title_case).as_deref()),
        ),
        (
            SERVICE_DATE,
            text(selected.and_then(|s| s.cbs_due_date.as_deref())),
        ),
        (
            SERVICE_MILEAGE,
            number(selected.and_then(|s| s.cbs_remaining_mileage)),
        ),
    ])
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LastTrip {
    date: Option<String>,
    duration: Option<f64>,
    total_distance: Option<f64>,
    electric_distance_ratio: Option<f64>,
    avg_electric_consumption: Option<f64>,
    avg_recuperation: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LastTripContainer {
    last_trip: LastTrip,
}

/// Lifetime statistics report a user value next to community averages
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatEntry {
    user_total: Option<f64>,
    user_average: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct AllTrips {
    total_electric_distance: StatEntry,
    avg_electric_consumption: StatEntry,
    avg_recuperation: StatEntry,
    chargecycle_range: StatEntry,
    reset_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AllTripsContainer {
    all_trips: AllTrips,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Destination {
    lat: Option<f64>,
    lon: Option<f64>,
    street: Option<String>,
    street_number: Option<String>,
    city: Option<String>,
    country: Option<String>,
}

impl Destination {
    fn name(&self) -> String {
        let street = [self.street.as_deref(), self.street_number.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        [Some(street.as_str()), self.city.as_deref(), self.country.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DestinationContainer {
    destinations: Vec<Destination>,
}

fn parse<'a, T: Deserialize<'a>>(source: TelemetrySource, content: &'a str) -> Result<T> {
    serde_json::from_str(content)
        .map_err(|e| DriveLinkError::parse(format!("{} payload: {}", source, e)))
}

fn last_trip_channels(content: &str) -> Result<Vec<(String, ChannelValue)>> {
    let trip = parse::<LastTripContainer>(TelemetrySource::LastTrip, content)?.last_trip;
    Ok(pairs(&[
        (LAST_TRIP_DATE, text(trip.date.as_deref())),
        (LAST_TRIP_DURATION, number(trip.duration)),
        (LAST_TRIP_DISTANCE, number(trip.total_distance)),
        (LAST_TRIP_ELECTRIC_RATIO, number(trip.electric_distance_ratio)),
        (LAST_TRIP_AVG_CONSUMPTION, number(trip.avg_electric_consumption)),
        (LAST_TRIP_AVG_RECUPERATION, number(trip.avg_recuperation)),
    ]))
}

fn all_trips_channels(content: &str) -> Result<Vec<(String, ChannelValue)>> {
    let trips = parse::<AllTripsContainer>(TelemetrySource::AllTrips, content)?.all_trips;
    Ok(pairs(&[
        (
            ALL_TRIPS_ELECTRIC_DISTANCE,
            number(trips.total_electric_distance.user_total),
        ),
        (
            ALL_TRIPS_AVG_CONSUMPTION,
            number(trips.avg_electric_consumption.user_average),
        ),
        (
            ALL_TRIPS_AVG_RECUPERATION,
            number(trips.avg_recuperation.user_average),
        ),
        (
            ALL_TRIPS_LONGEST_DISTANCE,
            number(trips.chargecycle_range.user_total),
        ),
        (ALL_TRIPS_RESET_DATE, text(trips.reset_date.as_deref())),
    ]))
}

fn destination_channels(content: &str, index: usize) -> Result<Vec<(String, ChannelValue)>> {
    let list = parse::<DestinationContainer>(TelemetrySource::Destinations, content)?.destinations;
    let selected = list.get(index);
    Ok(pairs(&[
        (DESTINATION_COUNT, ChannelValue::Number(list.len() as f64)),
        (
            DESTINATION_INDEX,
            selected
                .map(|_| ChannelValue::Number(index as f64))
                .unwrap_or(ChannelValue::Undef),
        ),
        (DESTINATION_NAME, text(selected.map(|d| d.name()).as_deref())),
        (DESTINATION_LAT, number(selected.and_then(|d| d.lat))),
        (DESTINATION_LON, number(selected.and_then(|d| d.lon))),
    ]))
}

/// Channels derived from one cached text payload
pub fn source_channels(
    source: TelemetrySource,
    content: &str,
    selections: &Selections,
) -> Result<Vec<(String, ChannelValue)>> {
    match source {
        TelemetrySource::Status => {
            let view = VehicleStatusView::from_json(content)?;
            Ok(status_channels(&view, selections))
        }
        TelemetrySource::LastTrip => last_trip_channels(content),
        TelemetrySource::AllTrips => all_trips_channels(content),
        TelemetrySource::Destinations => destination_channels(content, selections.destination),
        TelemetrySource::RangeMap => {
            // polygons are kept for diagnostics only
            parse::<serde_json::Value>(source, content)?;
            Ok(Vec::new())
        }
        TelemetrySource::ChargeProfile | TelemetrySource::Image => Err(DriveLinkError::generic(
            format!("{} is not rendered from text channels", source),
        )),
    }
}

/// Every channel of a source set to UNDEF
pub fn undefined(source: TelemetrySource) -> Vec<(String, ChannelValue)> {
    let ids: &[&str] = match source {
        TelemetrySource::Status => &[
            STATUS_MILEAGE,
            STATUS_DOORS,
            STATUS_FUEL,
            STATUS_RANGE_FUEL,
            STATUS_RANGE_ELECTRIC,
            STATUS_SOC,
            STATUS_CHARGE_STATUS,
            STATUS_CONNECTION,
            STATUS_LAST_UPDATE,
            LOCATION_LAT,
            LOCATION_LON,
            LOCATION_HEADING,
        ],
        TelemetrySource::LastTrip => &[
            LAST_TRIP_DATE,
            LAST_TRIP_DURATION,
            LAST_TRIP_DISTANCE,
            LAST_TRIP_ELECTRIC_RATIO,
            LAST_TRIP_AVG_CONSUMPTION,
            LAST_TRIP_AVG_RECUPERATION,
        ],
        TelemetrySource::AllTrips => &[
            ALL_TRIPS_ELECTRIC_DISTANCE,
            ALL_TRIPS_AVG_CONSUMPTION,
            ALL_TRIPS_AVG_RECUPERATION,
            ALL_TRIPS_LONGEST_DISTANCE,
            ALL_TRIPS_RESET_DATE,
        ],
        TelemetrySource::Destinations => &[
            DESTINATION_COUNT,
            DESTINATION_INDEX,
            DESTINATION_NAME,
            DESTINATION_LAT,
            DESTINATION_LON,
        ],
        TelemetrySource::Image => &[IMAGE],
        TelemetrySource::ChargeProfile | TelemetrySource::RangeMap => &[],
    };
    ids.iter()
        .map(|id| (id.to_string(), ChannelValue::Undef))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{"vehicleStatus":{"vin":"WBY1","mileage":17236,"doorLockState":"SECURED",
        "chargingLevelHv":80,"position":{"lat":48.1,"lon":11.5,"heading":220,"status":"OK"},
        "checkControlMessages":[],
        "cbsData":[{"cbsType":"BRAKE_FLUID","cbsState":"OK","cbsDueDate":"2022-10"},
                   {"cbsType":"VEHICLE_CHECK","cbsState":"OK","cbsRemainingMileage":12000}]}}"#;

    fn lookup(values: &[(String, ChannelValue)], id: &str) -> ChannelValue {
        values
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.clone())
            .unwrap()
    }

    #[test]
    fn groups_from_channel_ids() {
        assert_eq!(ChannelGroup::of("status-mileage"), Some(ChannelGroup::Status));
        assert_eq!(ChannelGroup::of("service-name"), Some(ChannelGroup::Status));
        assert_eq!(ChannelGroup::of("image"), Some(ChannelGroup::Image));
        assert_eq!(ChannelGroup::of("image-size"), Some(ChannelGroup::Image));
        assert_eq!(ChannelGroup::of("charge-mode"), Some(ChannelGroup::Charge));
        assert_eq!(ChannelGroup::of("remote-state"), Some(ChannelGroup::Remote));
        assert_eq!(ChannelGroup::of("nonsense"), None);
    }

    #[test]
    fn status_renders_selected_service() {
        let selections = Selections {
            service: 1,
            ..Default::default()
        };
        let values = source_channels(TelemetrySource::Status, STATUS, &selections).unwrap();
        assert_eq!(lookup(&values, STATUS_MILEAGE), ChannelValue::Number(17236.0));
        assert_eq!(lookup(&values, STATUS_DOORS), ChannelValue::text("Secured"));
        assert_eq!(lookup(&values, SERVICE_COUNT), ChannelValue::Number(2.0));
        assert_eq!(lookup(&values, SERVICE_NAME), ChannelValue::text("Vehicle Check"));
        assert_eq!(lookup(&values, SERVICE_MILEAGE), ChannelValue::Number(12000.0));
        assert_eq!(lookup(&values, CHECK_CONTROL_NAME), ChannelValue::Undef);
        assert_eq!(lookup(&values, LOCATION_LAT), ChannelValue::Number(48.1));
    }

    #[test]
    fn trips_and_destinations() {
        let last = r#"{"lastTrip":{"totalDistance":12.5,"avgElectricConsumption":14.1,"date":"2021-01-01T10:00"}}"#;
        let values = source_channels(TelemetrySource::LastTrip, last, &Selections::default()).unwrap();
        assert_eq!(lookup(&values, LAST_TRIP_DISTANCE), ChannelValue::Number(12.5));
        assert_eq!(lookup(&values, LAST_TRIP_DURATION), ChannelValue::Undef);

        let all = r#"{"allTrips":{"totalElectricDistance":{"userTotal":4000},"avgElectricConsumption":{"userAverage":15.2}}}"#;
        let values = source_channels(TelemetrySource::AllTrips, all, &Selections::default()).unwrap();
        assert_eq!(
            lookup(&values, ALL_TRIPS_ELECTRIC_DISTANCE),
            ChannelValue::Number(4000.0)
        );

        let dest = r#"{"destinations":[{"lat":1.0,"lon":2.0,"street":"Petuelring","streetNumber":"130","city":"Munich"}]}"#;
        let values = source_channels(TelemetrySource::Destinations, dest, &Selections::default()).unwrap();
        assert_eq!(
            lookup(&values, DESTINATION_NAME),
            ChannelValue::text("Petuelring 130, Munich")
        );
        assert_eq!(lookup(&values, DESTINATION_COUNT), ChannelValue::Number(1.0));
    }

    #[test]
    fn malformed_payload_is_parse_error() {
        let err = source_channels(TelemetrySource::LastTrip, "{}", &Selections::default()).unwrap_err();
        assert!(matches!(err, DriveLinkError::Parse { .. }));
        assert!(source_channels(TelemetrySource::RangeMap, "nope", &Selections::default()).is_err());
    }

    #[test]
    fn selection_index_parsing() {
        assert_eq!(parse_index("2"), Some(2));
        assert_eq!(parse_index(" 3: Oil"), Some(3));
        assert_eq!(parse_index("x"), None);
    }

    #[test]
    fn undefined_covers_source_group() {
        assert!(undefined(TelemetrySource::Status)
            .iter()
            .all(|(_, v)| *v == ChannelValue::Undef));
        assert_eq!(undefined(TelemetrySource::Image).len(), 1);
    }
}
