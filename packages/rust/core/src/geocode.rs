//! Geocoding with the provider's request pacing applied.

use tracing::instrument;

use expofinder_discovery::{GeocodedAddress, Geocoder};
use expofinder_shared::{AppConfig, Result};

use crate::pacing::Pacer;

/// A [`Geocoder`] that waits for its pacer before every request.
///
/// Nominatim allows one request per second, which is the default
/// `[pacing] geocoding_interval_ms`.
#[derive(Debug)]
pub struct PacedGeocoder {
    geocoder: Geocoder,
    pacer: Pacer,
}

impl PacedGeocoder {
    pub fn new(geocoder: Geocoder, pacer: Pacer) -> Self {
        Self { geocoder, pacer }
    }

    /// Build from config. Uses Google when the Places key is set, else Nominatim.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let geocoder = Geocoder::new(&config.geocoding, config.places.api_key())?;
        Ok(Self::new(
            geocoder,
            Pacer::from_millis(config.pacing.geocoding_interval_ms),
        ))
    }

    pub fn backend_name(&self) -> &'static str {
        self.geocoder.backend_name()
    }

    #[instrument(skip_all)]
    pub async fn geocode(&self, address: &str) -> Result<Option<GeocodedAddress>> {
        self.pacer.ready().await;
        self.geocoder.geocode(address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expofinder_shared::GeocodingConfig;
    use std::time::{Duration, Instant};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn consecutive_requests_are_spaced_by_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([{
                "lat": "51.2189",
                "lon": "4.4053",
                "display_name": "Wapper 9-11, Antwerpen, België"
            }])))
            .expect(2)
            .mount(&server)
            .await;

        let config = GeocodingConfig {
            nominatim_base_url: server.uri(),
            ..GeocodingConfig::default()
        };
        let geocoder = PacedGeocoder::new(
            Geocoder::new(&config, None).unwrap(),
            Pacer::from_millis(300),
        );
        assert_eq!(geocoder.backend_name(), "nominatim");

        let start = Instant::now();
        let first = geocoder.geocode("Wapper 9, Antwerpen").await.unwrap();
        assert!(first.is_some());
        geocoder.geocode("Wapper 9, Antwerpen").await.unwrap();
        assert!(
            start.elapsed() >= Duration::from_millis(290),
            "second request was not paced: {:?}",
            start.elapsed()
        );
    }

    #[test]
    fn from_config_uses_geocoding_interval() {
        let mut config = AppConfig::default();
        config.places.api_key_env = "EXPOFINDER_TEST_UNSET_GEOCODING_KEY".into();
        let geocoder = PacedGeocoder::from_config(&config).unwrap();
        assert_eq!(geocoder.pacer.interval(), Duration::from_millis(1000));
        assert_eq!(geocoder.backend_name(), "nominatim");
    }
}
