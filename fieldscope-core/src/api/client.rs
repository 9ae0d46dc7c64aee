//! HTTP client for the fieldscope gateway
//!
//! One thin wrapper per endpoint. Every authenticated call attaches the
//! session's bearer token and runs through a shared response triage that
//! maps the gateway's failure classes onto [`Error`]: transport problems
//! become `Error::Network`, 401/403 tear the session down exactly once and
//! become `Error::Unauthorized`, 422 envelopes become per-field
//! `Error::Validation`, and everything else becomes `Error::Api` carrying
//! the body's `detail` or `message` text.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::{Error, FieldError, Result};
use crate::session::SessionStore;
use crate::types::{
    Alert, AlertPayload, Field, FieldUpdate, FieldWeather, GeocodingHit, NdviReport, NewField,
    NewRule, Prediction, ProfileUpdate, Reading, Rule, Sensor, SensorType, TokenResponse,
    UserProfile,
};

/// Client for the gateway REST API.
pub struct ApiClient {
    http_client: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    /// Create a client from gateway configuration and a shared session.
    pub fn new(config: &GatewayConfig, session: Arc<SessionStore>) -> Result<Self> {
        let base_url = config.trimmed_base_url().trim().to_string();
        if base_url.is_empty() {
            return Err(Error::Config("gateway.base_url is required".to_string()));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            session,
        })
    }

    /// The session this client authenticates against.
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    // ============================================
    // Authentication
    // ============================================

    /// Exchange credentials for a bearer token, then load the profile.
    ///
    /// On success both land in the session store. A rejected login leaves
    /// any existing session untouched.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserProfile> {
        let url = format!("{}/login", self.base_url);
        let request = LoginRequest { email, password };

        let response = self.http_client.post(&url).json(&request).send().await?;
        let token: TokenResponse = read_body(self.handle_public(response).await?).await?;

        tracing::info!(email, "Signed in");
        self.session.login(token.access_token, None)?;

        let profile = self.me().await?;
        self.session.set_user(profile.clone());
        Ok(profile)
    }

    /// Create an account. Returns the gateway's confirmation message.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String> {
        let url = format!("{}/register", self.base_url);
        let request = RegisterRequest {
            name,
            email,
            password,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        let reply: MessageResponse = read_body(self.handle_public(response).await?).await?;
        Ok(reply.message)
    }

    // ============================================
    // Profile
    // ============================================

    /// Fetch the authenticated user's profile.
    pub async fn me(&self) -> Result<UserProfile> {
        self.get_json(format!("{}/users/me", self.base_url)).await
    }

    /// Update optional profile fields. The refreshed profile is cached in
    /// the session.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile> {
        let url = format!("{}/users/me", self.base_url);
        let response = self
            .send_authorized(self.http_client.put(&url).json(update))
            .await?;
        let profile: UserProfile = read_body(response).await?;
        self.session.set_user(profile.clone());
        Ok(profile)
    }

    /// Change the account password.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<String> {
        let url = format!("{}/users/me/password", self.base_url);
        let request = PasswordUpdateRequest {
            current_password: current,
            new_password: new,
        };
        let response = self
            .send_authorized(self.http_client.put(&url).json(&request))
            .await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    // ============================================
    // Fields
    // ============================================

    /// List the user's fields.
    pub async fn fields(&self) -> Result<Vec<Field>> {
        self.get_json(format!("{}/fields", self.base_url)).await
    }

    /// Register a new field.
    pub async fn create_field(&self, field: &NewField) -> Result<Field> {
        let url = format!("{}/fields", self.base_url);
        let response = self
            .send_authorized(self.http_client.post(&url).json(field))
            .await?;
        read_body(response).await
    }

    /// Update an existing field.
    pub async fn update_field(&self, field: &str, update: &FieldUpdate) -> Result<Field> {
        let url = format!("{}/fields/{}", self.base_url, urlencoding::encode(field));
        let response = self
            .send_authorized(self.http_client.put(&url).json(update))
            .await?;
        read_body(response).await
    }

    /// Delete a field and everything scoped to it.
    pub async fn delete_field(&self, field: &str) -> Result<String> {
        let url = format!("{}/fields/{}", self.base_url, urlencoding::encode(field));
        let response = self.send_authorized(self.http_client.delete(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    /// Current weather and daily forecast for a field's coordinates.
    pub async fn field_weather(&self, field: &str) -> Result<FieldWeather> {
        self.get_json(format!(
            "{}/fields/{}/weather",
            self.base_url,
            urlencoding::encode(field)
        ))
        .await
    }

    /// Latest readings for a field, newest first.
    pub async fn readings(&self, field: &str, limit: usize) -> Result<Vec<Reading>> {
        self.get_json(format!(
            "{}/fields/{}/readings?limit={}",
            self.base_url,
            urlencoding::encode(field),
            limit
        ))
        .await
    }

    // ============================================
    // Sensors
    // ============================================

    /// Sensors installed in a field.
    pub async fn sensors(&self, field: &str) -> Result<Vec<Sensor>> {
        self.get_json(format!(
            "{}/fields/{}/sensors",
            self.base_url,
            urlencoding::encode(field)
        ))
        .await
    }

    /// Install a sensor in a field.
    pub async fn add_sensor(
        &self,
        field: &str,
        sensor_id: &str,
        sensor_type: &str,
        location: &str,
    ) -> Result<Sensor> {
        let url = format!(
            "{}/fields/{}/sensors",
            self.base_url,
            urlencoding::encode(field)
        );
        let request = NewSensorRequest {
            sensor_id,
            sensor_type,
            location,
        };
        let response = self
            .send_authorized(self.http_client.post(&url).json(&request))
            .await?;
        read_body(response).await
    }

    /// Remove a sensor from a field.
    pub async fn remove_sensor(&self, field: &str, sensor_id: &str) -> Result<String> {
        let url = format!(
            "{}/fields/{}/sensors/{}",
            self.base_url,
            urlencoding::encode(field),
            urlencoding::encode(sensor_id)
        );
        let response = self.send_authorized(self.http_client.delete(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    /// Activate or deactivate a sensor without removing it.
    pub async fn set_sensor_active(
        &self,
        field: &str,
        sensor_id: &str,
        active: bool,
    ) -> Result<String> {
        let url = format!(
            "{}/fields/{}/sensors/{}/change_state?active={}",
            self.base_url,
            urlencoding::encode(field),
            urlencoding::encode(sensor_id),
            active
        );
        let response = self.send_authorized(self.http_client.put(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    /// Sensor type catalog.
    pub async fn sensor_types(&self) -> Result<Vec<SensorType>> {
        self.get_json(format!("{}/sensor-types", self.base_url))
            .await
    }

    /// Register a sensor type.
    pub async fn create_sensor_type(
        &self,
        type_name: &str,
        description: Option<&str>,
        unit: &str,
    ) -> Result<SensorType> {
        let url = format!("{}/sensor-types", self.base_url);
        let request = NewSensorTypeRequest {
            type_name,
            description,
            unit,
        };
        let response = self
            .send_authorized(self.http_client.post(&url).json(&request))
            .await?;
        read_body(response).await
    }

    /// Delete a sensor type from the catalog.
    pub async fn delete_sensor_type(&self, type_name: &str) -> Result<String> {
        let url = format!(
            "{}/sensor-types/{}",
            self.base_url,
            urlencoding::encode(type_name)
        );
        let response = self.send_authorized(self.http_client.delete(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    // ============================================
    // Rules & alerts
    // ============================================

    /// Alerting rules scoped to a field.
    pub async fn rules(&self, field: &str) -> Result<Vec<Rule>> {
        self.get_json(format!(
            "{}/rules?field={}",
            self.base_url,
            urlencoding::encode(field)
        ))
        .await
    }

    /// Create an alerting rule.
    pub async fn create_rule(&self, rule: &NewRule) -> Result<Rule> {
        let url = format!("{}/rules", self.base_url);
        let response = self
            .send_authorized(self.http_client.post(&url).json(rule))
            .await?;
        read_body(response).await
    }

    /// Delete a rule by name.
    pub async fn delete_rule(&self, rule_name: &str) -> Result<String> {
        let url = format!("{}/rules/{}", self.base_url, urlencoding::encode(rule_name));
        let response = self.send_authorized(self.http_client.delete(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    /// Stored alerts for a field, normalized into [`Alert`].
    pub async fn alerts(&self, field: &str, limit: usize) -> Result<Vec<Alert>> {
        let url = format!(
            "{}/alerts/{}?limit={}",
            self.base_url,
            urlencoding::encode(field),
            limit
        );
        let payloads: Vec<AlertPayload> = self.get_json(url).await?;
        Ok(payloads
            .into_iter()
            .map(|mut payload| {
                // Stored rows may omit the field they were fetched under
                if payload.field.is_empty() {
                    payload.field = field.to_string();
                }
                Alert::from_payload(payload)
            })
            .collect())
    }

    /// Archive every active alert on a field.
    pub async fn archive_alerts(&self, field: &str) -> Result<String> {
        let url = format!(
            "{}/archive-alerts/{}",
            self.base_url,
            urlencoding::encode(field)
        );
        let response = self.send_authorized(self.http_client.post(&url)).await?;
        Ok(read_body::<MessageResponse>(response).await?.message)
    }

    // ============================================
    // Geocoding
    // ============================================

    /// Resolve a place name into candidate coordinates.
    pub async fn geocode_search(&self, name: &str, limit: usize) -> Result<Vec<GeocodingHit>> {
        self.get_json(format!(
            "{}/fields/geocoding/search?name={}&limit={}",
            self.base_url,
            urlencoding::encode(name),
            limit
        ))
        .await
    }

    /// Resolve coordinates back into a place name.
    pub async fn geocode_reverse(&self, latitude: f64, longitude: f64) -> Result<GeocodingHit> {
        self.get_json(format!(
            "{}/fields/geocoding/reverse?lat={}&lon={}",
            self.base_url, latitude, longitude
        ))
        .await
    }

    // ============================================
    // Intelligence & imaging
    // ============================================

    /// Risk prediction for a field from the analysis service.
    pub async fn ai_prediction(&self, field: &str) -> Result<Prediction> {
        self.get_json(format!(
            "{}/ai-prediction?field={}",
            self.base_url,
            urlencoding::encode(field)
        ))
        .await
    }

    /// Upload a GeoTIFF and receive its NDVI report.
    ///
    /// The gateway only accepts `.tif`/`.tiff`; the extension is checked
    /// here first so an unsupported file never starts uploading.
    pub async fn compute_ndvi(&self, filename: &str, contents: Vec<u8>) -> Result<NdviReport> {
        if !has_tiff_extension(filename) {
            return Err(Error::Validation(vec![FieldError {
                field: "file".to_string(),
                message: "only .tif and .tiff images are supported".to_string(),
            }]));
        }

        let url = format!("{}/compute-ndvi", self.base_url);
        let part = reqwest::multipart::Part::bytes(contents)
            .file_name(filename.to_string())
            .mime_str("image/tiff")?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .send_authorized(self.http_client.post(&url).multipart(form))
            .await?;
        read_body(response).await
    }

    // ============================================
    // Request plumbing
    // ============================================

    /// Attach the bearer token and run the shared triage.
    ///
    /// Fails with `Unauthorized` before touching the network when no
    /// session is held.
    async fn send_authorized(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.session.token().ok_or(Error::Unauthorized)?;
        let response = request.bearer_auth(token).send().await?;
        self.handle(response).await
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: String) -> Result<T> {
        let response = self.send_authorized(self.http_client.get(&url)).await?;
        read_body(response).await
    }

    /// Triage for authenticated endpoints. 401/403 invalidate the session.
    async fn handle(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.session.invalidate();
            return Err(Error::Unauthorized);
        }
        self.handle_public(response).await
    }

    /// Triage for endpoints reachable without a session. A 401 here means
    /// bad credentials, not an expired session, so nothing is invalidated.
    async fn handle_public(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY {
            if let Some(errors) = parse_field_errors(&body) {
                return Err(Error::Validation(errors));
            }
        }

        Err(Error::Api {
            status: status.as_u16(),
            message: extract_message(&body)
                .unwrap_or_else(|| format!("request failed with status {}", status.as_u16())),
        })
    }
}

/// Decode a successful response body.
async fn read_body<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| Error::Parse(format!("invalid response body: {}", e)))
}

/// Pull the `errors: [{field, message}]` envelope out of a 422 body.
fn parse_field_errors(body: &str) -> Option<Vec<FieldError>> {
    serde_json::from_str::<ValidationEnvelope>(body)
        .ok()
        .map(|envelope| envelope.errors)
        .filter(|errors| !errors.is_empty())
}

/// Best-effort human-readable message from an error body.
fn extract_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail").or_else(|| value.get("message"))? {
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn has_tiff_extension(filename: &str) -> bool {
    let lower = filename.to_ascii_lowercase();
    lower.ends_with(".tif") || lower.ends_with(".tiff")
}

/// Request body for `POST /login`
#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Request body for `POST /register`
#[derive(Serialize)]
struct RegisterRequest<'a> {
    name: &'a str,
    email: &'a str,
    password: &'a str,
}

/// Request body for `PUT /users/me/password`
#[derive(Serialize)]
struct PasswordUpdateRequest<'a> {
    current_password: &'a str,
    new_password: &'a str,
}

/// Request body for `POST /fields/{field}/sensors`
#[derive(Serialize)]
struct NewSensorRequest<'a> {
    sensor_id: &'a str,
    sensor_type: &'a str,
    location: &'a str,
}

/// Request body for `POST /sensor-types`
#[derive(Serialize)]
struct NewSensorTypeRequest<'a> {
    type_name: &'a str,
    description: Option<&'a str>,
    unit: &'a str,
}

/// Validation envelope on 422 responses
#[derive(Deserialize)]
struct ValidationEnvelope {
    errors: Vec<FieldError>,
}

/// `{"message": ...}` reply from mutation endpoints
#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}
