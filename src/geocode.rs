use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::GeocoderConfig;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("geocoding request timed out")]
    Timeout,
    #[error("geocoding request failed: {0}")]
    Request(String),
    #[error("geocoding service returned {0}")]
    Status(u16),
    #[error("unexpected geocoding response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GeocodeError::Timeout
        } else if e.is_decode() {
            GeocodeError::Decode(e.to_string())
        } else {
            GeocodeError::Request(e.to_string())
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: Option<String>,
}

impl GeocodeHit {
    /// `lat, lon` at 4 decimal places.
    pub fn rounded(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }

    pub fn full(&self) -> String {
        format!("{}, {}", self.latitude, self.longitude)
    }
}

/// Nominatim reports coordinates as strings.
#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

impl TryFrom<Place> for GeocodeHit {
    type Error = GeocodeError;

    fn try_from(place: Place) -> Result<Self, Self::Error> {
        let parse = |raw: &str| {
            raw.trim()
                .parse::<f64>()
                .map_err(|_| GeocodeError::Decode(format!("bad coordinate '{raw}'")))
        };
        Ok(GeocodeHit {
            latitude: parse(&place.lat)?,
            longitude: parse(&place.lon)?,
            display_name: place.display_name,
        })
    }
}

pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// `Ok(None)` when nothing matched.
    pub async fn lookup(&self, address: &str) -> Result<Option<GeocodeHit>, GeocodeError> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }

        debug!("geocoding '{}'", address);
        let resp = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            warn!("geocoder answered {} for '{}'", status, address);
            return Err(GeocodeError::Status(status));
        }

        let places: Vec<Place> = resp.json().await?;
        places.into_iter().next().map(GeocodeHit::try_from).transpose()
    }
}
