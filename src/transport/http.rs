use super::{FetchRequest, FetchResult, Fetcher, NetworkError, decode_body};
use crate::config::Config;
use crate::error::{DriveLinkError, Result};
use crate::logging::{StructuredLogger, get_logger};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};

const API_PATH: &str = "/webapi/v1/user/vehicles/";
const LEGACY_API_PATH: &str = "/api/vehicle/dynamic/v1/";

/// Vehicle cloud server region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    RestOfWorld,
    NorthAmerica,
    China,
}

impl Region {
    pub fn from_label(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ROW" => Some(Self::RestOfWorld),
            "NORTH_AMERICA" => Some(Self::NorthAmerica),
            "CHINA" => Some(Self::China),
            _ => None,
        }
    }

    pub fn server(&self) -> &'static str {
        match self {
            Self::RestOfWorld => "b2vapi.bmwgroup.com",
            Self::NorthAmerica => "b2vapi.bmwgroup.us",
            Self::China => "b2vapi.bmwgroup.cn:8592",
        }
    }
}

/// reqwest-backed fetcher with a static bearer token
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    vin: String,
    access_token: String,
    logger: StructuredLogger,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let region = Region::from_label(&config.account.region).ok_or_else(|| {
            DriveLinkError::config(format!("Unknown region {}", config.account.region))
        })?;
        Self::with_base_url(config, format!("https://{}", region.server()))
    }

    /// Fetcher against an explicit server root, used for proxies and tests
    pub fn with_base_url(config: &Config, base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.account.request_timeout_secs.max(1),
            ))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            vin: config.vehicle.vin.clone(),
            access_token: config.account.access_token.trim().to_string(),
            logger: get_logger("transport"),
        })
    }

    /// Absolute URL for a request
    pub fn url_for(&self, request: &FetchRequest) -> String {
        let vehicle = format!("{}{}{}", self.base_url, API_PATH, self.vin);
        match request {
            FetchRequest::Status => format!("{}/status", vehicle),
            FetchRequest::LegacyStatus => {
                format!("{}{}{}?offset=-60", self.base_url, LEGACY_API_PATH, self.vin)
            }
            FetchRequest::LastTrip => format!("{}/statistics/lastTrip", vehicle),
            FetchRequest::AllTrips => format!("{}/statistics/allTrips", vehicle),
            FetchRequest::ChargeProfile => format!("{}/chargingprofile", vehicle),
            FetchRequest::Destinations => format!("{}/destinations", vehicle),
            FetchRequest::RangeMap => format!("{}/rangemap", vehicle),
            FetchRequest::Image { viewport, size } => format!(
                "{}/image?width={}&height={}&view={}",
                vehicle, size, size, viewport
            ),
            FetchRequest::RemoteExecute { .. } => format!("{}/executeService", vehicle),
            FetchRequest::RemoteStatus { service } => format!(
                "{}/serviceExecutionStatus?serviceType={}",
                vehicle,
                service.code()
            ),
        }
    }

    async fn send(&self, request: &FetchRequest, url: &str) -> FetchResult {
        let builder = match request {
            FetchRequest::RemoteExecute { service, payload } => {
                let mut form = vec![("serviceType", service.code().to_string())];
                if let Some(data) = payload {
                    form.push(("data", data.clone()));
                }
                self.client.post(url).form(&form)
            }
            _ => self.client.get(url),
        };

        let resp = builder
            .header(AUTHORIZATION, format!("Bearer {}", self.access_token))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("drivelink/", env!("CARGO_PKG_VERSION")))
            .send()
            .await
            .map_err(|e| {
                NetworkError::new(
                    url,
                    e.status().map(|s| s.as_u16()).unwrap_or(0),
                    e.to_string(),
                )
            })?;

        let status = resp.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("unknown").to_string();
            return Err(NetworkError::new(url, status.as_u16(), reason));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| NetworkError::new(url, status.as_u16(), e.to_string()))?;
        decode_body(request, url, body.to_vec())
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: FetchRequest) -> FetchResult {
        let url = self.url_for(&request);
        self.logger
            .trace(&format!("Requesting {} ({})", request.name(), url));
        let result = self.send(&request, &url).await;
        if let Err(ref e) = result {
            self.logger
                .debug(&format!("Request {} failed: {}", request.name(), e));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteService;

    fn fetcher() -> HttpFetcher {
        let mut config = Config::default();
        config.vehicle.vin = "VIN0001".into();
        config.account.access_token = "t".into();
        HttpFetcher::new(&config).unwrap()
    }

    #[test]
    fn region_labels() {
        assert_eq!(Region::from_label("row"), Some(Region::RestOfWorld));
        assert_eq!(Region::from_label("CHINA"), Some(Region::China));
        assert_eq!(Region::from_label("EU"), None);
    }

    #[test]
    fn urls_follow_region_and_vin() {
        let f = fetcher();
        assert_eq!(
            f.url_for(&FetchRequest::Status),
            "https://b2vapi.bmwgroup.com/webapi/v1/user/vehicles/VIN0001/status"
        );
        assert_eq!(
            f.url_for(&FetchRequest::LegacyStatus),
            "https://b2vapi.bmwgroup.com/api/vehicle/dynamic/v1/VIN0001?offset=-60"
        );
        assert!(
            f.url_for(&FetchRequest::Image {
                viewport: "SIDE".into(),
                size: 512
            })
            .ends_with("/image?width=512&height=512&view=SIDE")
        );
        assert!(
            f.url_for(&FetchRequest::RemoteStatus {
                service: RemoteService::LightFlash
            })
            .ends_with("serviceExecutionStatus?serviceType=RLF")
        );
    }
}
