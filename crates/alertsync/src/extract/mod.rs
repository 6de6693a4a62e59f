//! Field extraction from tracker alert bodies.
//!
//! Every field has its own pattern and is matched independently, so a
//! template change that breaks one line leaves the others intact.

use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use serde::Serialize;

static RE_ALERT_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Alert type:[ \t]*(.+)$").unwrap());
static RE_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Time:[ \t]*([^(\r\n]+)").unwrap());
static RE_LOCATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Location:[ \t]*(.+)$").unwrap());
static RE_COORDINATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Latitude, Longitude:[ \t]*([-\d.]+),[ \t]*([-\d.]+)").unwrap()
});
static RE_DEVICE_SERIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Device Serial Number:[ \t]*(.+)$").unwrap());
static RE_TRACKER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Tracker Name:[ \t]*(.+)$").unwrap());
static RE_ACCOUNT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)Account name:[ \t]*(.+)$").unwrap());

/// Structured fields of one alert email. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerFields {
    pub alert_type: String,
    pub time: String,
    pub location: String,
    pub latitude: String,
    pub longitude: String,
    pub device_serial: String,
    pub tracker_name: String,
    pub account_name: String,
}

fn capture(re: &Regex, body: &str, field: &str) -> String {
    match re.captures(body).and_then(|c| c.get(1)) {
        Some(m) => m.as_str().trim().to_string(),
        None => {
            debug!("Field '{}' not found in alert body", field);
            String::new()
        }
    }
}

/// Extracts the alert fields from a plain-text body. Never fails.
pub fn parse_tracker_email(body: &str) -> TrackerFields {
    let (latitude, longitude) = match RE_COORDINATES.captures(body) {
        Some(c) => (
            c.get(1).map(|m| m.as_str().to_string()).unwrap_or_default(),
            c.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        ),
        None => {
            debug!("Field 'coordinates' not found in alert body");
            (String::new(), String::new())
        }
    };

    TrackerFields {
        alert_type: capture(&RE_ALERT_TYPE, body, "alert_type"),
        time: capture(&RE_TIME, body, "time"),
        location: capture(&RE_LOCATION, body, "location"),
        latitude,
        longitude,
        device_serial: capture(&RE_DEVICE_SERIAL, body, "device_serial"),
        tracker_name: capture(&RE_TRACKER_NAME, body, "tracker_name"),
        account_name: capture(&RE_ACCOUNT_NAME, body, "account_name"),
    }
}
