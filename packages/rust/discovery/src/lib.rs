//! Provider side of venue discovery.
//!
//! Before a city can be indexed its venues have to be found. This crate
//! wraps the two location services involved:
//! - [`PlacesClient`], text search plus place details for museums and galleries
//! - [`Geocoder`], address to coordinates for manually added venues
//!
//! The address heuristics ([`country_from_address`], [`candidate_from_details`])
//! live next to the Places client; the discovery loop itself is in the core crate.

pub mod geocoding;
pub mod places;

pub use geocoding::{GeocodedAddress, Geocoder};
pub use places::{
    Geometry, LatLng, PlaceDetails, PlaceHit, PlacesClient, candidate_from_details,
    country_from_address,
};
