//! What the current-location screen shows, computed from a controller snapshot.

use crate::acquisition::{AcquisitionError, Snapshot};
use crate::fix::Coordinate;

pub const MSG_START: &str = "Tap 'Get My Location' to Start";
pub const MSG_SEARCHING: &str = "Searching...";
pub const MSG_ACCESS_DENIED: &str = "Location Access Denied";
pub const MSG_SERVICES_DISABLED: &str = "Location Services Disabled";
pub const MSG_ERROR: &str = "Error Getting Location";
pub const MSG_TIMED_OUT: &str = "Timed Out Getting Location";
pub const ADDRESS_SEARCHING: &str = "Searching for Address...";
pub const ADDRESS_NOT_FOUND: &str = "No Address Found";
pub const ACTION_GET: &str = "Get My Location";
pub const ACTION_STOP: &str = "Stop";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Idle,
    Searching,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readout {
    pub latitude: String,
    pub longitude: String,
    pub address: String,
    pub message: String,
    pub action: &'static str,
    pub can_tag: bool,
}

pub fn format_degrees(value: f64) -> String {
    format!("{value:.8}")
}

/// OpenStreetMap page centred on the coordinate
pub fn map_url(coordinate: &Coordinate) -> String {
    let lat = format_degrees(coordinate.latitude);
    let lon = format_degrees(coordinate.longitude);
    format!("https://www.openstreetmap.org/?mlat={lat}&mlon={lon}#map=18/{lat}/{lon}")
}

fn error_message(error: &AcquisitionError) -> &'static str {
    match error {
        AcquisitionError::PermissionDenied => MSG_ACCESS_DENIED,
        AcquisitionError::ServiceDisabled => MSG_SERVICES_DISABLED,
        AcquisitionError::Failed(_) => MSG_ERROR,
        AcquisitionError::TimedOut => MSG_TIMED_OUT,
    }
}

pub fn status(snapshot: &Snapshot) -> Status {
    if let Some(error) = &snapshot.last_error {
        Status::Error(error_message(error).to_string())
    } else if !snapshot.services_enabled {
        Status::Error(MSG_SERVICES_DISABLED.to_string())
    } else if snapshot.is_acquiring() {
        Status::Searching
    } else {
        Status::Idle
    }
}

impl From<&Snapshot> for Readout {
    fn from(snapshot: &Snapshot) -> Self {
        let action = if snapshot.is_acquiring() {
            ACTION_STOP
        } else {
            ACTION_GET
        };

        match &snapshot.best_fix {
            Some(fix) => {
                let address = if let Some(placemark) = &snapshot.placemark {
                    placemark.two_line()
                } else if snapshot.geocoding {
                    ADDRESS_SEARCHING.to_string()
                } else if snapshot.geocode_error.is_some() {
                    ADDRESS_NOT_FOUND.to_string()
                } else {
                    String::new()
                };

                Readout {
                    latitude: format_degrees(fix.latitude()),
                    longitude: format_degrees(fix.longitude()),
                    address,
                    message: String::new(),
                    action,
                    can_tag: true,
                }
            }
            None => {
                let message = match status(snapshot) {
                    Status::Idle => MSG_START.to_string(),
                    Status::Searching => MSG_SEARCHING.to_string(),
                    Status::Error(message) => message,
                };

                Readout {
                    latitude: String::new(),
                    longitude: String::new(),
                    address: String::new(),
                    message,
                    action,
                    can_tag: false,
                }
            }
        }
    }
}
