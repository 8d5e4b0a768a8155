mod common;

use common::*;
use drivelink::image::IMAGE_FAIL_LIMIT;
use drivelink::sink::{ChannelCommand, ChannelValue};
use drivelink::telemetry::{Payload, TelemetrySource};
use drivelink::transport::FetchRequest;
use drivelink::vehicle::render;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00];

fn rear() -> FetchRequest {
    FetchRequest::Image {
        viewport: "REAR".to_string(),
        size: 1024,
    }
}

fn image_data(h: &Harness) -> Option<Vec<u8>> {
    match h.channel(render::IMAGE) {
        Some(ChannelValue::Raw { data, .. }) => Some(data),
        _ => None,
    }
}

#[tokio::test]
async fn newer_parameters_win_when_old_response_arrives_last() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.handler
        .handle_command(render::IMAGE_VIEWPORT, ChannelCommand::Text("rear".into()))
        .unwrap();
    assert_eq!(h.channel(render::IMAGE_VIEWPORT), Some(ChannelValue::text("REAR")));

    h.fetcher
        .release(&rear(), Ok(Payload::Bytes(JPEG.to_vec())))
        .await;
    h.fetcher
        .release(&image_request(), Ok(Payload::Bytes(PNG.to_vec())))
        .await;

    assert_eq!(image_data(&h), Some(JPEG.to_vec()));
    assert_eq!(
        h.handler.cache().read_bytes(TelemetrySource::Image),
        Some(JPEG.to_vec())
    );
}

#[tokio::test]
async fn stale_response_is_dropped_on_arrival() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    h.handler
        .handle_command(render::IMAGE_VIEWPORT, ChannelCommand::Text("REAR".into()))
        .unwrap();
    h.fetcher
        .release(&image_request(), Ok(Payload::Bytes(PNG.to_vec())))
        .await;
    assert_eq!(image_data(&h), None);
    // the stale answer still resolves the cycle slot
    assert!(!h
        .handler
        .tracker()
        .in_flight()
        .contains(&TelemetrySource::Image));

    h.fetcher
        .release(&rear(), Ok(Payload::Bytes(JPEG.to_vec())))
        .await;
    assert_eq!(image_data(&h), Some(JPEG.to_vec()));
}

#[tokio::test]
async fn unchanged_parameters_do_not_refetch() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    h.answer_all().await;

    h.handler
        .handle_command(render::IMAGE_SIZE, ChannelCommand::Number(1024.0))
        .unwrap();
    settle().await;
    assert_eq!(h.fetcher.count(&image_request()), 1);

    assert!(h
        .handler
        .handle_command(render::IMAGE_SIZE, ChannelCommand::Number(0.0))
        .unwrap_err()
        .is_validation());
    assert!(h
        .handler
        .handle_command(render::IMAGE_VIEWPORT, ChannelCommand::Text("TOP".into()))
        .is_err());
}

#[tokio::test]
async fn failure_budget_stops_image_requests() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;

    for attempt in 0..IMAGE_FAIL_LIMIT {
        if attempt % 2 == 0 {
            h.fetcher
                .release_error(&image_request(), 500, "Internal Server Error")
                .await;
        } else {
            // an empty body counts as a failure too
            h.fetcher
                .release(&image_request(), Ok(Payload::Bytes(Vec::new())))
                .await;
        }
        h.answer_all().await;
        h.handler.refresh();
        settle().await;
    }

    assert_eq!(h.handler.image_properties().failed_count, IMAGE_FAIL_LIMIT);
    assert!(!h
        .fetcher
        .pending()
        .iter()
        .any(|r| matches!(r, FetchRequest::Image { .. })));
    assert!(h.handler.cache().is_empty(TelemetrySource::Image));
}

#[tokio::test]
async fn parameter_change_resets_failure_budget() {
    let h = Harness::electric();
    h.handler.initialize().unwrap();
    settle().await;
    h.fetcher
        .release_error(&image_request(), 500, "Internal Server Error")
        .await;
    assert_eq!(h.handler.image_properties().failed_count, 1);

    h.handler
        .handle_command(render::IMAGE_SIZE, ChannelCommand::Number(512.0))
        .unwrap();
    let props = h.handler.image_properties();
    assert_eq!(props.failed_count, 0);
    assert_eq!(props.params.size, 512);
    assert_eq!(h.channel(render::IMAGE_SIZE), Some(ChannelValue::Number(512.0)));
    settle().await;
    assert!(h.fetcher.pending().contains(&FetchRequest::Image {
        viewport: "FRONT".to_string(),
        size: 512,
    }));
}
