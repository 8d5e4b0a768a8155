//! # Drivelink - connected-vehicle cloud bridge
//!
//! Bridges one vehicle of a manufacturer's connected-car cloud into a home
//! automation state model. A periodic refresh fans out to several telemetry
//! endpoints, caches every response (or its error) per source, and publishes
//! derived channel values. Charge profiles can be edited channel by channel
//! and sent back as a remote command.
//!
//! ## Architecture
//!
//! - `config`: YAML configuration and validation
//! - `logging`: Structured logging and tracing
//! - `transport`: Fetch requests, the `Fetcher` seam and the HTTP client
//! - `telemetry`: Per-source cache of payloads and errors
//! - `tracker`: Outstanding requests of a refresh cycle
//! - `status`: Device status, protocol fallback and status payloads
//! - `charge_profile`: Weekly charge planner model and its channels
//! - `edit_session`: Charge profile overlay, idle timeout and confirmation
//! - `remote`: Remote service execution and status polling
//! - `image`: Image parameters and failure budget
//! - `capabilities`: Discovery record to supported services
//! - `diagnostics`: Anonymized troubleshooting fingerprint
//! - `sink`: Channel values, commands and the state sink seam
//! - `vehicle`: The per-vehicle handler tying it together
//! - `web`: HTTP surface

pub mod capabilities;
pub mod charge_profile;
pub mod config;
pub mod diagnostics;
pub mod edit_session;
pub mod error;
pub mod image;
pub mod logging;
pub mod remote;
pub mod sink;
pub mod status;
pub mod telemetry;
pub mod tracker;
pub mod transport;
pub mod vehicle;
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use error::{DriveLinkError, Result};
pub use vehicle::VehicleHandler;
