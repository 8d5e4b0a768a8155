mod common;

use common::*;
use drivelink::capabilities::VehicleRecord;
use drivelink::diagnostics::ANONYMOUS;
use drivelink::transport::FetchRequest;

#[tokio::test]
async fn fingerprint_is_anonymized() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    h.answer_all().await;

    let dump = h.handler.last_fingerprint().unwrap();
    assert!(dump.starts_with("###### Vehicle Troubleshoot Fingerprint Data - BEGIN ######"));
    assert!(dump.ends_with("###### Vehicle Troubleshoot Fingerprint Data - END ######"));
    assert!(!dump.contains(VIN));
    assert!(!dump.contains("48.1"));
    assert!(!dump.contains("11.5"));
    assert!(!dump.contains("Petuelring"));
    assert!(dump.contains(ANONYMOUS));
    assert!(dump.contains("### Charge Profile ###"));
    assert!(dump.contains("### Range Map ###"));
    // image bytes are summarized, never dumped
    assert!(dump.contains(&format!("<{} bytes>", PNG.len())));
}

#[tokio::test]
async fn failed_sources_are_marked() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.fetcher
        .release_error(&FetchRequest::Destinations, 500, "Internal Server Error")
        .await;
    h.fetcher
        .release_text(&FetchRequest::AllTrips, "<html>maintenance</html>")
        .await;
    h.answer_all().await;

    let dump = h.handler.last_fingerprint().unwrap();
    assert!(dump.contains("### Destinations (Error) ###"));
    assert!(dump.contains("Internal Server Error"));
    assert!(dump.contains("### All Trips (Error) ###"));
    assert!(dump.contains("### Last Trip ###"));
}

#[tokio::test]
async fn conventional_vehicle_omits_charging_sections() {
    let h = Harness::new(config("CONV", &["statistics", "lastDestinations"]));
    h.handler.initialize().unwrap();
    h.answer_all().await;

    let dump = h.handler.last_fingerprint().unwrap();
    assert!(!dump.contains("Charge Profile"));
    assert!(!dump.contains("Range Map"));
    assert!(dump.contains("### Vehicle Status ###"));
}

#[tokio::test]
async fn discovery_properties_are_listed_without_vin() {
    let h = Harness::electric();
    let record: VehicleRecord = serde_json::from_str(&format!(
        r#"{{"vin":"{}","model":"i3 94","driveTrain":"BEV","statisticsAvailable":true,"lastDestinations":"SUPPORTED"}}"#,
        VIN
    ))
    .unwrap();
    h.handler.set_discovery(&record);
    h.handler.initialize().unwrap();
    h.answer_all().await;

    let dump = h.handler.last_fingerprint().unwrap();
    assert!(!dump.contains("### Discovery Result Empty ###"));
    assert!(dump.contains("i3 94"));
    assert!(!dump.contains(VIN));
}
