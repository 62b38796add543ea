//! Address geocoding via Google Geocoding or OpenStreetMap Nominatim.
//!
//! The Google backend needs the Places API key; without one the free
//! Nominatim service is used. Nominatim's usage policy allows one request
//! per second, which callers enforce with their own pacer.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use expofinder_shared::{ExpoFinderError, GeocodingConfig, Result};

/// Coordinates and the provider's normalized address.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedAddress {
    pub latitude: f64,
    pub longitude: f64,
    pub formatted_address: String,
}

#[derive(Debug, Clone)]
enum Backend {
    Google { api_key: String, base_url: String },
    Nominatim { base_url: String },
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    status: String,
    #[serde(default)]
    results: Vec<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    formatted_address: String,
    geometry: crate::places::Geometry,
}

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    display_name: String,
}

/// Geocoder with a backend chosen at construction time.
#[derive(Debug, Clone)]
pub struct Geocoder {
    http: Client,
    backend: Backend,
}

impl Geocoder {
    /// Pick Google when `google_api_key` is set and non-blank, else Nominatim.
    pub fn new(config: &GeocodingConfig, google_api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExpoFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        let backend = match google_api_key.filter(|k| !k.trim().is_empty()) {
            Some(api_key) => Backend::Google {
                api_key,
                base_url: config.google_base_url.trim_end_matches('/').to_string(),
            },
            None => {
                warn!("Google Maps API key not set, geocoding with OpenStreetMap Nominatim");
                Backend::Nominatim {
                    base_url: config.nominatim_base_url.trim_end_matches('/').to_string(),
                }
            }
        };

        Ok(Self { http, backend })
    }

    /// `"google"` or `"nominatim"`.
    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Google { .. } => "google",
            Backend::Nominatim { .. } => "nominatim",
        }
    }

    /// Resolve `address` to coordinates. `Ok(None)` means the provider found nothing.
    #[instrument(skip_all, fields(backend = self.backend_name()))]
    pub async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>> {
        match &self.backend {
            Backend::Google { api_key, base_url } => {
                self.geocode_google(address, api_key, base_url).await
            }
            Backend::Nominatim { base_url } => self.geocode_nominatim(address, base_url).await,
        }
    }

    async fn geocode_google(
        &self,
        address: &str,
        api_key: &str,
        base_url: &str,
    ) -> Result<Option<GeocodedAddress>> {
        let response = self
            .http
            .get(format!("{base_url}/json"))
            .query(&[("address", address), ("key", api_key)])
            .send()
            .await
            .map_err(|e| ExpoFinderError::Network(format!("google geocoding: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpoFinderError::Network(format!(
                "google geocoding: HTTP {status}"
            )));
        }

        let body: GoogleResponse = response
            .json()
            .await
            .map_err(|e| ExpoFinderError::parse(format!("google geocoding response: {e}")))?;

        if body.status != "OK" {
            warn!(address, status = %body.status, "geocoding found no match");
            return Ok(None);
        }

        Ok(body.results.into_iter().next().map(|r| GeocodedAddress {
            latitude: r.geometry.location.lat,
            longitude: r.geometry.location.lng,
            formatted_address: r.formatted_address,
        }))
    }

    async fn geocode_nominatim(
        &self,
        address: &str,
        base_url: &str,
    ) -> Result<Option<GeocodedAddress>> {
        let response = self
            .http
            .get(format!("{base_url}/search"))
            .query(&[("q", address), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| ExpoFinderError::Network(format!("nominatim: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpoFinderError::Network(format!("nominatim: HTTP {status}")));
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .map_err(|e| ExpoFinderError::parse(format!("nominatim response: {e}")))?;

        let Some(first) = results.into_iter().next() else {
            warn!(address, "geocoding found no match");
            return Ok(None);
        };

        let latitude = first
            .lat
            .parse::<f64>()
            .map_err(|e| ExpoFinderError::parse(format!("nominatim latitude {:?}: {e}", first.lat)))?;
        let longitude = first
            .lon
            .parse::<f64>()
            .map_err(|e| ExpoFinderError::parse(format!("nominatim longitude {:?}: {e}", first.lon)))?;

        debug!(latitude, longitude, "address geocoded");
        Ok(Some(GeocodedAddress {
            latitude,
            longitude,
            formatted_address: first.display_name,
        }))
    }
}
