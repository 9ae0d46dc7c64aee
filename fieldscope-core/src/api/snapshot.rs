//! Concurrent per-field dashboard fetch
//!
//! Selecting a field triggers one burst of REST calls: weather, recent
//! readings, sensors, rules, stored alerts and the sensor-type catalog.
//! The arms run concurrently and fail independently: a failed arm degrades
//! to empty data and is noted in [`FieldSnapshot::partial`], so one slow or
//! broken service never blanks the whole dashboard. The exception is
//! `Error::Unauthorized`, which aborts the load outright since the session
//! is already torn down by the time it surfaces.

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::types::{Alert, FieldWeather, Reading, Rule, Sensor, SensorType};

/// Everything the dashboard needs about one field, fetched in one burst.
#[derive(Debug, Default)]
pub struct FieldSnapshot {
    /// Field the snapshot was loaded for
    pub field: String,
    /// Current weather and forecast; `None` when that arm failed
    pub weather: Option<FieldWeather>,
    /// Recent readings, newest first as the gateway returns them
    pub readings: Vec<Reading>,
    pub sensors: Vec<Sensor>,
    pub rules: Vec<Rule>,
    pub alerts: Vec<Alert>,
    pub sensor_types: Vec<SensorType>,
    /// Names of arms that failed and were replaced with empty data
    pub partial: Vec<String>,
}

impl FieldSnapshot {
    /// True when every arm of the fetch succeeded.
    pub fn is_complete(&self) -> bool {
        self.partial.is_empty()
    }
}

/// Fetch a complete dashboard snapshot for `field`.
///
/// `limit` bounds both the readings and the stored-alerts arms.
pub async fn load_field_snapshot(
    client: &ApiClient,
    field: &str,
    limit: usize,
) -> Result<FieldSnapshot> {
    let (weather, readings, sensors, rules, alerts, sensor_types) = tokio::join!(
        client.field_weather(field),
        client.readings(field, limit),
        client.sensors(field),
        client.rules(field),
        client.alerts(field, limit),
        client.sensor_types(),
    );

    let mut partial = Vec::new();
    let snapshot = FieldSnapshot {
        field: field.to_string(),
        weather: absorb("weather", weather.map(Some), &mut partial)?,
        readings: absorb("readings", readings, &mut partial)?,
        sensors: absorb("sensors", sensors, &mut partial)?,
        rules: absorb("rules", rules, &mut partial)?,
        alerts: absorb("alerts", alerts, &mut partial)?,
        sensor_types: absorb("sensor_types", sensor_types, &mut partial)?,
        partial,
    };

    tracing::debug!(
        field,
        readings = snapshot.readings.len(),
        sensors = snapshot.sensors.len(),
        alerts = snapshot.alerts.len(),
        failed_arms = snapshot.partial.len(),
        "Loaded field snapshot"
    );
    Ok(snapshot)
}

/// Degrade one arm's failure to empty data, keeping its name for the
/// partial list. Authorization failures abort instead.
fn absorb<T: Default>(
    arm: &'static str,
    result: Result<T>,
    partial: &mut Vec<String>,
) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(Error::Unauthorized) => Err(Error::Unauthorized),
        Err(e) => {
            tracing::warn!(arm, error = %e, "Snapshot arm failed, continuing without it");
            partial.push(arm.to_string());
            Ok(T::default())
        }
    }
}
