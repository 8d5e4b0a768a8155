#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    // Payload parsers and the redactor must reject garbage without panicking
    let _ = drivelink::charge_profile::ChargeProfile::from_json(text);
    let _ = drivelink::status::VehicleStatusView::from_json(text);
    let _ = drivelink::status::legacy::transform(text, "WBY00000000000000");
    let _ = drivelink::diagnostics::redact(text, "WBY00000000000000");
    let _ = drivelink::remote::parse_execution_state(text);
});
