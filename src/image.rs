//! Vehicle image parameters
//!
//! Images are requested for a viewport and an edge length. Each request
//! carries the parameters it was issued with; a response whose parameters no
//! longer match the active ones is stale and dropped on arrival.

use crate::config::VehicleConfig;
use crate::error::{DriveLinkError, Result};
use crate::telemetry::lock;
use crate::transport::FetchRequest;
use std::sync::{Mutex, MutexGuard};

/// Failed image attempts tolerated before image refreshes stop
pub const IMAGE_FAIL_LIMIT: u32 = 5;

pub const VIEWPORTS: [&str; 5] = ["FRONT", "REAR", "SIDE", "DASHBOARD", "DRIVERDOOR"];

/// Viewport and size of one image request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageParams {
    pub viewport: String,
    pub size: u32,
}

impl ImageParams {
    pub fn request(&self) -> FetchRequest {
        FetchRequest::Image {
            viewport: self.viewport.clone(),
            size: self.size,
        }
    }

    /// Parameters an image request was issued with
    pub fn of(request: &FetchRequest) -> Option<Self> {
        match request {
            FetchRequest::Image { viewport, size } => Some(Self {
                viewport: viewport.clone(),
                size: *size,
            }),
            _ => None,
        }
    }
}

/// Active parameters plus the failure budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageProperties {
    pub params: ImageParams,
    pub failed_count: u32,
}

impl ImageProperties {
    pub fn new(viewport: &str, size: u32) -> Self {
        Self {
            params: ImageParams {
                viewport: viewport.to_uppercase(),
                size,
            },
            failed_count: 0,
        }
    }

    pub fn failed(&mut self) {
        self.failed_count = self.failed_count.saturating_add(1);
    }

    pub fn fail_limit_reached(&self) -> bool {
        self.failed_count >= IMAGE_FAIL_LIMIT
    }
}

/// Image properties behind one lock; parameter changes and response
/// acceptance are decided while holding it
#[derive(Debug)]
pub struct ImageState {
    props: Mutex<ImageProperties>,
}

impl ImageState {
    pub fn from_config(config: &VehicleConfig) -> Self {
        Self {
            props: Mutex::new(ImageProperties::new(
                &config.image_viewport,
                config.image_size,
            )),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ImageProperties> {
        lock(&self.props)
    }

    pub fn snapshot(&self) -> ImageProperties {
        self.lock().clone()
    }
}

/// Validate a viewport name
pub fn parse_viewport(value: &str) -> Result<String> {
    let upper = value.trim().to_uppercase();
    if VIEWPORTS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(DriveLinkError::validation(
            "image-viewport",
            format!("unknown viewport {}", value),
        ))
    }
}

/// Validate an image edge length
pub fn parse_size(value: f64) -> Result<u32> {
    if value.fract() != 0.0 || !(1.0..=4096.0).contains(&value) {
        return Err(DriveLinkError::validation(
            "image-size",
            format!("invalid image size {}", value),
        ));
    }
    Ok(value as u32)
}

/// Content type from the leading magic bytes
pub fn sniff_content_type(data: &[u8]) -> &'static str {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(b"GIF8") {
        "image/gif"
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "application/octet-stream"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fail_budget() {
        let mut props = ImageProperties::new("front", 1024);
        assert_eq!(props.params.viewport, "FRONT");
        for _ in 0..IMAGE_FAIL_LIMIT - 1 {
            props.failed();
        }
        assert!(!props.fail_limit_reached());
        props.failed();
        assert!(props.fail_limit_reached());
    }

    #[test]
    fn request_round_trips_params() {
        let props = ImageProperties::new("SIDE", 512);
        let req = props.params.request();
        assert_eq!(ImageParams::of(&req), Some(props.params.clone()));
        assert_eq!(ImageParams::of(&FetchRequest::Status), None);
    }

    #[test]
    fn viewport_and_size_validation() {
        assert_eq!(parse_viewport("rear").unwrap(), "REAR");
        assert!(parse_viewport("TOP").unwrap_err().is_validation());
        assert_eq!(parse_size(640.0).unwrap(), 640);
        assert!(parse_size(0.0).is_err());
        assert!(parse_size(12.5).is_err());
    }

    #[test]
    fn content_type_sniffing() {
        assert_eq!(sniff_content_type(&[0x89, b'P', b'N', b'G', 0]), "image/png");
        assert_eq!(sniff_content_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_content_type(b"hello"), "application/octet-stream");
    }
}
