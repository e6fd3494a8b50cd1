//! Reverse geocoding: fix in, candidate addresses out.
//!
//! Resolvers return immediately from `reverse_geocode`; the answer is posted
//! back later as `AppEvent::GeocodeCompleted` carrying the request's ticket.

use std::fs;
use std::path::Path;
use std::thread;

use reqwest::{
    blocking::Client,
    header::{HeaderMap, HeaderValue, USER_AGENT},
};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::fix::{Coordinate, Fix};
use crate::placemark::Placemark;
use crate::runtime::{AppEvent, EventSender};

pub const DEFAULT_GAZETTEER_RADIUS_M: f64 = 250.0;
pub const NOMINATIM_REVERSE_URL: &str = "https://nominatim.openstreetmap.org/reverse";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("no address found")]
    NoResults,
    #[error("geocoding request failed: {0}")]
    Request(String),
    #[error("unexpected geocoder response: {0}")]
    Malformed(String),
}

/// Identifies one lookup: the acquisition session it belongs to and its
/// serial number within the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GeocodeTicket {
    pub session: u64,
    pub serial: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeRequest {
    pub ticket: GeocodeTicket,
    pub fix: Fix,
}

pub trait AddressResolver {
    fn reverse_geocode(&mut self, request: GeocodeRequest);
}

impl<A: AddressResolver + ?Sized> AddressResolver for Box<A> {
    fn reverse_geocode(&mut self, request: GeocodeRequest) {
        (**self).reverse_geocode(request)
    }
}

fn post(tx: &EventSender, ticket: GeocodeTicket, result: Result<Vec<Placemark>, GeocodeError>) {
    if tx.send(AppEvent::GeocodeCompleted { ticket, result }).is_err() {
        debug!(?ticket, "event queue closed, dropping geocode result");
    }
}

#[derive(Debug, Error)]
pub enum GazetteerError {
    #[error("cannot read gazetteer: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed gazetteer: {0}")]
    Json(#[from] serde_json::Error),
}

/// A known place: an address pinned to a coordinate
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GazetteerEntry {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(flatten)]
    pub placemark: Placemark,
}

/// Offline resolver over a fixed list of places
pub struct GazetteerResolver {
    entries: Vec<GazetteerEntry>,
    radius_m: f64,
    tx: EventSender,
}

impl GazetteerResolver {
    pub fn new(entries: Vec<GazetteerEntry>, tx: EventSender) -> Self {
        Self {
            entries,
            radius_m: DEFAULT_GAZETTEER_RADIUS_M,
            tx,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P, tx: EventSender) -> Result<Self, GazetteerError> {
        let bytes = fs::read(path)?;
        let entries: Vec<GazetteerEntry> = serde_json::from_slice(&bytes)?;
        Ok(Self::new(entries, tx))
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = radius_m;
        self
    }

    /// Places within the radius, farthest first so the nearest is last
    pub fn lookup(&self, at: &Coordinate) -> Vec<Placemark> {
        let mut hits: Vec<(f64, &GazetteerEntry)> = self
            .entries
            .iter()
            .map(|e| (Coordinate::new(e.latitude, e.longitude).distance_to(at), e))
            .filter(|(d, _)| *d <= self.radius_m)
            .collect();
        hits.sort_by(|a, b| b.0.total_cmp(&a.0));
        hits.into_iter().map(|(_, e)| e.placemark.clone()).collect()
    }
}

impl AddressResolver for GazetteerResolver {
    fn reverse_geocode(&mut self, request: GeocodeRequest) {
        let found = self.lookup(&request.fix.coordinate);
        debug!(ticket = ?request.ticket, candidates = found.len(), "gazetteer lookup");
        post(&self.tx, request.ticket, Ok(found));
    }
}

/// Online resolver backed by the OpenStreetMap Nominatim reverse endpoint.
/// Each lookup runs on its own worker thread.
pub struct NominatimResolver {
    base_url: String,
    user_agent: String,
    tx: EventSender,
}

impl NominatimResolver {
    pub fn new(user_agent: impl Into<String>, tx: EventSender) -> Self {
        Self {
            base_url: NOMINATIM_REVERSE_URL.to_string(),
            user_agent: user_agent.into(),
            tx,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl AddressResolver for NominatimResolver {
    fn reverse_geocode(&mut self, request: GeocodeRequest) {
        let tx = self.tx.clone();
        let base_url = self.base_url.clone();
        let user_agent = self.user_agent.clone();

        thread::spawn(move || {
            let result = request_reverse(&base_url, &user_agent, &request.fix.coordinate)
                .and_then(|json| parse_reverse_response(&json));
            if let Err(e) = &result {
                warn!(ticket = ?request.ticket, error = %e, "reverse geocoding failed");
            }
            post(&tx, request.ticket, result);
        });
    }
}

fn request_reverse(
    base_url: &str,
    user_agent: &str,
    at: &Coordinate,
) -> Result<Value, GeocodeError> {
    let mut headers = HeaderMap::new();
    let agent =
        HeaderValue::from_str(user_agent).map_err(|e| GeocodeError::Request(e.to_string()))?;
    headers.insert(USER_AGENT, agent);

    let lat = at.latitude.to_string();
    let lon = at.longitude.to_string();
    let params = [
        ("format", "jsonv2"),
        ("lat", lat.as_str()),
        ("lon", lon.as_str()),
        ("addressdetails", "1"),
    ];
    let url = reqwest::Url::parse_with_params(base_url, &params)
        .map_err(|e| GeocodeError::Request(e.to_string()))?;

    Client::new()
        .get(url)
        .headers(headers)
        .send()
        .and_then(|res| res.error_for_status())
        .map_err(|e| GeocodeError::Request(e.to_string()))?
        .json::<Value>()
        .map_err(|e| GeocodeError::Malformed(e.to_string()))
}

/// Maps a Nominatim `reverse` response to placemarks. "Unable to geocode"
/// comes back as an `error` member and means no candidates.
pub fn parse_reverse_response(json: &Value) -> Result<Vec<Placemark>, GeocodeError> {
    if json.get("error").is_some() {
        return Ok(vec![]);
    }
    let address = json
        .get("address")
        .and_then(Value::as_object)
        .ok_or_else(|| GeocodeError::Malformed("missing address object".to_string()))?;

    let field = |keys: &[&str]| {
        keys.iter()
            .find_map(|k| address.get(*k).and_then(Value::as_str))
            .map(str::to_string)
    };

    let placemark = Placemark {
        sub_thoroughfare: field(&["house_number"]),
        thoroughfare: field(&["road", "pedestrian", "footway"]),
        locality: field(&["city", "town", "village", "hamlet"]),
        administrative_area: field(&["state", "region"]),
        postal_code: field(&["postcode"]),
        country: field(&["country"]),
    };

    if placemark.is_empty() {
        Ok(vec![])
    } else {
        Ok(vec![placemark])
    }
}
