mod common;

use common::*;
use drivelink::sink::ChannelValue;
use drivelink::status::{DeviceStatus, OfflineDetail, ProtocolMode};
use drivelink::telemetry::TelemetrySource;
use drivelink::transport::FetchRequest;
use drivelink::vehicle::render;

#[tokio::test]
async fn not_found_switches_to_legacy_within_the_cycle() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.fetcher
        .release_error(&FetchRequest::Status, 404, "Not Found")
        .await;
    assert_eq!(h.handler.protocol_mode(), ProtocolMode::Legacy);
    assert!(matches!(
        h.store.status(),
        DeviceStatus::Offline {
            detail: OfflineDetail::CommunicationError,
            ..
        }
    ));
    // the status slot stays outstanding until the legacy answer arrives
    assert!(h.handler.tracker().in_flight().contains(&TelemetrySource::Status));
    assert!(h.fetcher.pending().contains(&FetchRequest::LegacyStatus));

    h.answer_all().await;
    assert!(h.handler.tracker().is_idle());
    assert_eq!(h.store.status(), DeviceStatus::Online);
    assert_eq!(h.channel(render::STATUS_MILEAGE), Some(ChannelValue::Number(17236.0)));
    assert_eq!(h.channel(render::LOCATION_LAT), Some(ChannelValue::Number(48.1)));

    // the cached status is stored in canonical form
    let cached = h.handler.cache().read_text(TelemetrySource::Status).unwrap();
    assert!(cached.contains("vehicleStatus"));
}

#[tokio::test]
async fn later_cycles_use_legacy_directly() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;
    h.fetcher
        .release_error(&FetchRequest::Status, 404, "Not Found")
        .await;
    h.answer_all().await;

    h.handler.refresh();
    settle().await;
    let pending = h.fetcher.pending();
    assert!(pending.contains(&FetchRequest::LegacyStatus));
    assert!(!pending.contains(&FetchRequest::Status));
    assert_eq!(h.fetcher.count(&FetchRequest::Status), 1);
}

#[tokio::test]
async fn legacy_not_found_does_not_loop() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.fetcher
        .release_error(&FetchRequest::Status, 404, "Not Found")
        .await;
    h.fetcher
        .release_error(&FetchRequest::LegacyStatus, 404, "Not Found")
        .await;

    assert_eq!(h.fetcher.count(&FetchRequest::LegacyStatus), 1);
    assert!(!h.handler.tracker().in_flight().contains(&TelemetrySource::Status));
    assert!(h.handler.cache().read(TelemetrySource::Status).unwrap().is_error());
}

#[tokio::test]
async fn server_error_keeps_current_protocol() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.fetcher
        .release_error(&FetchRequest::Status, 503, "Service Unavailable")
        .await;
    assert_eq!(h.handler.protocol_mode(), ProtocolMode::Current);
    assert!(!h.fetcher.pending().contains(&FetchRequest::LegacyStatus));
    assert!(matches!(h.store.status(), DeviceStatus::Offline { .. }));

    h.answer_all().await;
    assert!(h.handler.tracker().is_idle());
}

#[tokio::test]
async fn recovery_goes_back_online() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;
    h.fetcher
        .release_error(&FetchRequest::Status, 503, "Service Unavailable")
        .await;
    h.answer_all().await;

    h.handler.refresh();
    h.answer_all().await;
    assert_eq!(h.store.status(), DeviceStatus::Online);
}
