//! Core domain types for fieldscope
//!
//! These mirror the gateway's wire shapes: fields and sensors from the field
//! service, rules and alerts from the intelligent service, users from the
//! auth service, weather from the weather service. Where push frames and
//! stored rows disagree (alerts carry a `rule_name` when pushed and an
//! `alert_name` once stored), the raw payload type absorbs the difference
//! and the client-side type normalizes it.

use crate::geo::Geolocation;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================
// Fields
// ============================================

/// A registered cultivation area, the tenancy scope for sensors, rules,
/// and alerts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    /// Server-assigned field identifier
    #[serde(rename = "field")]
    pub id: String,
    /// Display name
    pub name: String,
    /// City the field belongs to
    pub city: String,
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
    /// Crop grown on the field
    pub cultivation_type: String,
    /// Size in hectares
    pub size: f64,
}

impl Field {
    /// Lightweight reference for session storage.
    pub fn to_ref(&self) -> FieldRef {
        FieldRef {
            id: self.id.clone(),
            name: self.name.clone(),
            location: Some(Geolocation::new(
                self.city.clone(),
                self.latitude,
                self.longitude,
            )),
        }
    }
}

/// The session's handle to the selected field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldRef {
    /// Field identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Parsed location, when known
    #[serde(default)]
    pub location: Option<Geolocation>,
}

/// Creation payload for `POST /fields`.
#[derive(Debug, Clone, Serialize)]
pub struct NewField {
    /// Display name
    pub name: String,
    /// Location in the `"City (lat, lon)"` form the gateway validates
    pub location: String,
    /// Crop grown on the field
    pub cultivation_type: String,
    /// Cultivation start date; gateway assumes today when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Size in hectares
    pub size: f64,
    /// Greenhouse flag
    pub is_indoor: bool,
}

/// Partial update payload for `PUT /fields/{field}`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cultivation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_indoor: Option<bool>,
}

// ============================================
// Readings
// ============================================

/// One timestamped scalar measurement from one sensor.
///
/// Immutable once received. Snapshot rows omit `field_id`; push frames
/// carry it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    /// Originating sensor
    pub sensor_id: String,
    /// Field the reading belongs to (push frames only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    /// Sensor type tag, normalized downstream for grouping
    pub sensor_type: String,
    /// Measured value
    pub value: f64,
    /// Unit of measure
    pub unit: String,
    /// Measurement instant
    pub timestamp: DateTime<Utc>,
}

// ============================================
// Sensors
// ============================================

/// A sensor installed in a field.
///
/// Doubles as the creation payload for `POST /fields/{field}/sensors`;
/// listing responses omit `active`, which defaults to true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sensor {
    /// Sensor identifier
    pub sensor_id: String,
    /// Sensor type tag
    pub sensor_type: String,
    /// Position inside the field
    #[serde(default)]
    pub location: Option<String>,
    /// Whether the sensor is currently reporting
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A sensor type registered by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorType {
    /// Server-assigned identifier, absent on creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor: Option<String>,
    /// Type tag, e.g. "temperature"
    pub type_name: String,
    /// Optional free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit of measure, e.g. "°C"
    pub unit: String,
}

// ============================================
// Rules & alerts
// ============================================

/// Comparison operator a rule applies to incoming readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleCondition {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "==")]
    Equal,
}

impl RuleCondition {
    /// The wire symbol for this condition.
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCondition::GreaterThan => ">",
            RuleCondition::LessThan => "<",
            RuleCondition::Equal => "==",
        }
    }

    /// Evaluate the condition against a reading value.
    pub fn is_violated(&self, value: f64, threshold: f64) -> bool {
        match self {
            RuleCondition::GreaterThan => value > threshold,
            RuleCondition::LessThan => value < threshold,
            RuleCondition::Equal => value == threshold,
        }
    }
}

impl FromStr for RuleCondition {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" => Ok(RuleCondition::GreaterThan),
            "<" => Ok(RuleCondition::LessThan),
            "==" => Ok(RuleCondition::Equal),
            other => Err(crate::error::Error::Parse(format!(
                "unknown rule condition {:?}, expected >, < or ==",
                other
            ))),
        }
    }
}

impl fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored alerting rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    /// Server-assigned rule name
    pub rule_name: String,
    /// Sensor type the rule watches
    pub sensor_type: String,
    /// Comparison operator
    pub condition: RuleCondition,
    /// Trigger threshold
    pub threshold: f64,
    /// Field the rule is scoped to
    pub field: String,
}

/// Creation payload for `POST /rules`.
#[derive(Debug, Clone, Serialize)]
pub struct NewRule {
    pub sensor_type: String,
    pub condition: RuleCondition,
    pub threshold: f64,
    /// Message attached to alerts the rule raises
    pub message: String,
    pub field: String,
}

/// How prominently an alert should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    #[default]
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw alert shape as it appears on the wire.
///
/// Push frames deliver the violated rule (`rule_name`, no timestamp);
/// `GET /alerts/{field}` returns stored rows (`alert_name`, timestamp,
/// `active`). Convert with [`Alert::from_payload`].
#[derive(Debug, Clone, Deserialize)]
pub struct AlertPayload {
    /// `alert_name` on stored rows, `rule_name` on push frames
    #[serde(default, alias = "alert_name", alias = "rule_name")]
    pub name: Option<String>,
    /// Sensor type that triggered the alert
    pub sensor_type: String,
    /// Message configured on the rule
    pub message: String,
    /// Field the alert belongs to
    #[serde(default)]
    pub field: String,
    /// Stored rows carry the server timestamp; push frames do not
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Present on stored rows only
    #[serde(default)]
    pub active: Option<bool>,
    /// Honored if the gateway ever tags severity explicitly
    #[serde(default)]
    pub severity: Option<AlertSeverity>,
}

/// A normalized alert held by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    /// Server alert name, or a client-generated id for push frames
    pub id: String,
    pub sensor_type: String,
    pub field: String,
    pub message: String,
    /// Server timestamp, or arrival time for push frames
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub active: bool,
}

impl Alert {
    /// Normalize a wire payload, stamping missing identity and time.
    pub fn from_payload(payload: AlertPayload) -> Self {
        Alert {
            id: payload
                .name
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            sensor_type: payload.sensor_type,
            field: payload.field,
            message: payload.message,
            timestamp: payload.timestamp.unwrap_or_else(Utc::now),
            severity: payload.severity.unwrap_or_default(),
            active: payload.active.unwrap_or(true),
        }
    }
}

// ============================================
// Users & auth
// ============================================

/// Token envelope from `POST /login`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// The authenticated user's profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
}

/// Partial update payload for `PUT /users/me`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<NaiveDate>,
}

// ============================================
// Weather
// ============================================

/// Present conditions at the field's coordinates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentWeather {
    pub city: String,
    pub temperature: f64,
    pub min_temperature: i32,
    pub max_temperature: i32,
    pub description: String,
    pub icon: String,
}

/// One day of forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyForecast {
    /// Display date, e.g. "20 Dec"
    pub date: String,
    pub min_temperature: i32,
    pub max_temperature: i32,
    pub icon: String,
}

/// Response of `GET /fields/{field}/weather`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldWeather {
    /// Field identifier the forecast was resolved for
    pub field: String,
    pub current_weather: CurrentWeather,
    #[serde(default)]
    pub forecast: Vec<DailyForecast>,
}

// ============================================
// AI advisory & imaging
// ============================================

/// Response of `GET /ai-prediction`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Prediction {
    /// Normalized risk estimate
    pub risk_score: f64,
    /// Whether maintenance is recommended
    pub maintenance_needed: bool,
}

/// Response of `POST /compute-ndvi`.
#[derive(Debug, Clone, Deserialize)]
pub struct NdviReport {
    pub filename: String,
    /// Vegetation assessment text
    pub description: String,
    pub mean_ndvi: f64,
    /// Rendered NDVI map, base64-encoded PNG
    pub ndvi_image_base64: String,
}

/// One geocoder result from the gateway's proxy.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GeocodingHit {
    #[serde(alias = "display_name")]
    pub name: String,
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
}
