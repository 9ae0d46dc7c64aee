//! Geolocation parsing and rendering
//!
//! The gateway historically accepted two encodings for a field location:
//! the named form `"Rutigliano (41.1234, 16.1234)"` validated by the field
//! service, and a bare `"41.1234, 16.1234"` pair. The structured type here
//! is canonical; both string forms parse into it and the named form is what
//! gets rendered back out.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A parsed field location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geolocation {
    /// Place name; absent when parsed from a bare coordinate pair
    #[serde(default)]
    pub place: Option<String>,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Geolocation {
    /// Build a named location.
    pub fn new(place: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            place: Some(place.into()),
            latitude,
            longitude,
        }
    }

    /// Render the form the field service validates on creation:
    /// `"Place (lat, lon)"`.
    ///
    /// Falls back to `"lat, lon"` when no place name is known.
    pub fn location_string(&self) -> String {
        match &self.place {
            Some(place) => format!("{} ({}, {})", place, self.latitude, self.longitude),
            None => format!("{}, {}", self.latitude, self.longitude),
        }
    }
}

impl fmt::Display for Geolocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.location_string())
    }
}

impl FromStr for Geolocation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(Error::Parse("empty location string".to_string()));
        }

        // Named form: everything before the final '(...)' is the place.
        if let Some(open) = trimmed.rfind('(') {
            let inner = trimmed[open + 1..]
                .strip_suffix(')')
                .ok_or_else(|| Error::Parse(format!("unterminated coordinates in {:?}", s)))?;
            let place = trimmed[..open].trim();
            if place.is_empty() {
                return Err(Error::Parse(format!("missing place name in {:?}", s)));
            }
            let (latitude, longitude) = parse_pair(inner)?;
            return Ok(Geolocation {
                place: Some(place.to_string()),
                latitude,
                longitude,
            });
        }

        // Bare form: "lat, lon".
        let (latitude, longitude) = parse_pair(trimmed)?;
        Ok(Geolocation {
            place: None,
            latitude,
            longitude,
        })
    }
}

fn parse_pair(s: &str) -> Result<(f64, f64)> {
    let mut parts = s.split(',');
    let lat = parts
        .next()
        .ok_or_else(|| Error::Parse(format!("missing latitude in {:?}", s)))?;
    let lon = parts
        .next()
        .ok_or_else(|| Error::Parse(format!("missing longitude in {:?}", s)))?;
    if parts.next().is_some() {
        return Err(Error::Parse(format!(
            "expected two coordinates in {:?}",
            s
        )));
    }

    let latitude: f64 = lat
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid latitude {:?}", lat.trim())))?;
    let longitude: f64 = lon
        .trim()
        .parse()
        .map_err(|_| Error::Parse(format!("invalid longitude {:?}", lon.trim())))?;

    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Parse(format!("latitude out of range: {}", latitude)));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Parse(format!(
            "longitude out of range: {}",
            longitude
        )));
    }

    Ok((latitude, longitude))
}
