//! Google Places text search and place details.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use expofinder_shared::{ExpoFinderError, NewVenue, PlacesConfig, Result};

/// A text-search hit; only the ID is needed to ask for details.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaceHit {
    pub place_id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Geometry {
    pub location: LatLng,
}

/// The subset of place details used to create a venue.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaceDetails {
    pub name: String,
    #[serde(default)]
    pub formatted_address: Option<String>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub website: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TextSearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<PlaceHit>,
    #[serde(default)]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    status: String,
    #[serde(default)]
    result: Option<PlaceDetails>,
}

/// Client for the Places web service.
#[derive(Debug, Clone)]
pub struct PlacesClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl PlacesClient {
    pub fn new(api_key: impl Into<String>, base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExpoFinderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Build a client if the API key is present in the environment.
    pub fn from_config(config: &PlacesConfig) -> Result<Option<Self>> {
        match config.api_key() {
            Some(key) => Ok(Some(Self::new(key, &config.base_url, config.timeout())?)),
            None => Ok(None),
        }
    }

    /// Search for `"<category> in <city>"`.
    ///
    /// `ZERO_RESULTS` is an empty list; any other non-`OK` status is an error.
    #[instrument(skip_all, fields(category = %category, city = %city))]
    pub async fn text_search(&self, category: &str, city: &str) -> Result<Vec<PlaceHit>> {
        let query = format!("{category} in {city}");
        let url = format!("{}/textsearch/json", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("query", query.as_str()), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ExpoFinderError::Network(format!("places text search: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpoFinderError::Network(format!(
                "places text search: HTTP {status}"
            )));
        }

        let body: TextSearchResponse = response
            .json()
            .await
            .map_err(|e| ExpoFinderError::parse(format!("places text search response: {e}")))?;

        match body.status.as_str() {
            "OK" => {
                debug!(hits = body.results.len(), "text search finished");
                Ok(body.results)
            }
            "ZERO_RESULTS" => Ok(Vec::new()),
            other => Err(ExpoFinderError::Network(format!(
                "places text search returned {other}{}",
                body.error_message
                    .map(|m| format!(": {m}"))
                    .unwrap_or_default()
            ))),
        }
    }

    /// Fetch name, address, location and website for a place.
    ///
    /// Returns `None` when the service answers with any status but `OK`.
    pub async fn place_details(&self, place_id: &str) -> Result<Option<PlaceDetails>> {
        let url = format!("{}/details/json", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("place_id", place_id),
                ("fields", "name,formatted_address,geometry,website"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ExpoFinderError::Network(format!("place details: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExpoFinderError::Network(format!(
                "place details: HTTP {status}"
            )));
        }

        let body: DetailsResponse = response
            .json()
            .await
            .map_err(|e| ExpoFinderError::parse(format!("place details response: {e}")))?;

        if body.status != "OK" {
            warn!(place_id, status = %body.status, "place details unavailable");
            return Ok(None);
        }
        Ok(body.result)
    }
}

/// Country guess: the last comma-separated segment of a formatted address.
pub fn country_from_address(formatted_address: &str) -> String {
    formatted_address
        .rsplit(',')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Turn place details into a venue for `city`.
///
/// Places without a website cannot be indexed and yield `None`.
pub fn candidate_from_details(details: &PlaceDetails, city: &str) -> Option<NewVenue> {
    let website = details.website.as_deref().map(str::trim).unwrap_or_default();
    if website.is_empty() {
        return None;
    }

    let address = details
        .formatted_address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty());
    let location = details.geometry.as_ref().map(|g| g.location);

    Some(NewVenue {
        name: details.name.trim().to_string(),
        city: city.to_string(),
        country: address.map(country_from_address).unwrap_or_default(),
        address: address.map(str::to_string),
        latitude: location.map(|l| l.lat),
        longitude: location.map(|l| l.lng),
        website_url: Some(website.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PlacesClient {
        PlacesClient::new("test-key", &server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn details(website: Option<&str>) -> PlaceDetails {
        PlaceDetails {
            name: "Museum aan de Stroom".into(),
            formatted_address: Some("Hanzestedenplaats 1, 2000 Antwerpen, Belgium".into()),
            geometry: Some(Geometry {
                location: LatLng {
                    lat: 51.2289,
                    lng: 4.4049,
                },
            }),
            website: website.map(Into::into),
        }
    }

    #[test]
    fn country_is_last_address_segment() {
        assert_eq!(
            country_from_address("Leuvenstraat 32, 2000 Antwerpen, Belgium"),
            "Belgium"
        );
        assert_eq!(country_from_address("Netherlands"), "Netherlands");
        assert_eq!(country_from_address(""), "");
    }

    #[test]
    fn place_without_website_is_not_a_candidate() {
        assert!(candidate_from_details(&details(None), "Antwerp").is_none());
        assert!(candidate_from_details(&details(Some("  ")), "Antwerp").is_none());
    }

    #[test]
    fn candidate_carries_location_and_country() {
        let venue = candidate_from_details(&details(Some("https://mas.be")), "Antwerp").unwrap();
        assert_eq!(venue.city, "Antwerp");
        assert_eq!(venue.country, "Belgium");
        assert_eq!(venue.latitude, Some(51.2289));
        assert_eq!(venue.website_url.as_deref(), Some("https://mas.be"));
    }

    #[tokio::test]
    async fn text_search_sends_query_and_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/textsearch/json"))
            .and(query_param("query", "museum in Ghent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "OK",
                "results": [
                    {"place_id": "p1", "name": "MSK Gent"},
                    {"place_id": "p2", "name": "S.M.A.K."}
                ]
            })))
            .mount(&server)
            .await;

        let hits = client(&server).text_search("museum", "Ghent").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].place_id, "p2");
    }

    #[tokio::test]
    async fn zero_results_is_empty_and_denied_is_error() {
        let server = MockServer::start().await;
        Mock::given(path("/textsearch/json"))
            .and(query_param("query", "museum in Nowhere"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"status": "ZERO_RESULTS", "results": []})),
            )
            .mount(&server)
            .await;
        Mock::given(path("/textsearch/json"))
            .and(query_param("query", "art_gallery in Nowhere"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "REQUEST_DENIED",
                "error_message": "The provided API key is invalid."
            })))
            .mount(&server)
            .await;

        let places = client(&server);
        assert!(places.text_search("museum", "Nowhere").await.unwrap().is_empty());

        let err = places
            .text_search("art_gallery", "Nowhere")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("REQUEST_DENIED"));
    }

    #[tokio::test]
    async fn details_parse_fixture_and_non_ok_is_none() {
        let server = MockServer::start().await;
        let fixture = std::fs::read_to_string("../../../fixtures/json/place_details.json")
            .expect("read fixture");

        Mock::given(path("/details/json"))
            .and(query_param("place_id", "p1"))
            .and(query_param("fields", "name,formatted_address,geometry,website"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture))
            .mount(&server)
            .await;
        Mock::given(path("/details/json"))
            .and(query_param("place_id", "gone"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "NOT_FOUND"})),
            )
            .mount(&server)
            .await;

        let places = client(&server);
        let found = places.place_details("p1").await.unwrap().unwrap();
        assert_eq!(found.name, "MSK Gent");
        assert_eq!(found.website.as_deref(), Some("https://www.mskgent.be/"));
        assert_eq!(found.geometry.unwrap().location.lng, 3.7233);

        assert!(places.place_details("gone").await.unwrap().is_none());
    }

    #[test]
    fn missing_key_means_no_client() {
        let config = PlacesConfig {
            api_key_env: "EF_TEST_NO_SUCH_PLACES_KEY_4242".into(),
            ..PlacesConfig::default()
        };
        assert!(PlacesClient::from_config(&config).unwrap().is_none());
    }
}
