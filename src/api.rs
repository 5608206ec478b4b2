// Remote API client for the Holidaze venues / bookings / profiles endpoints.
// All persistence, authentication and availability enforcement lives behind this API.

use crate::models::{
    ApiErrorBody, ApiResponse, Booking, BookingRequest, Credentials, LoginData, Profile,
    ProfileUpdate, Registration, Venue, VenuePayload,
};
use crate::session::Session;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://v2.api.noroff.dev";
pub const API_KEY_HEADER: &str = "X-Noroff-API-Key";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {message}")]
    ApiResponseError {
        status_code: u16,
        message: String,
        is_retryable: bool,
    },

    #[error("Not authorized")]
    Unauthorized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::NetworkError(_) | ApiError::Timeout(_) => true,
            ApiError::ApiResponseError { is_retryable, .. } => *is_retryable,
            _ => false,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: String::new(),
            timeout_ms: 10000,
            retry_config: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `HOLIDAZE_API_BASE_URL`, `HOLIDAZE_API_KEY` and
    /// `HOLIDAZE_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ClientError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(base_url) = lookup("HOLIDAZE_API_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(api_key) = lookup("HOLIDAZE_API_KEY") {
            config.api_key = api_key;
        }
        if let Some(timeout) = lookup("HOLIDAZE_TIMEOUT_MS") {
            config.timeout_ms = timeout.trim().parse().map_err(|_| {
                ClientError::ConfigError(format!("invalid HOLIDAZE_TIMEOUT_MS: {}", timeout))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        self.parsed_base_url()?;
        if self.api_key.trim().is_empty() {
            return Err(ClientError::ConfigError("api_key is required".to_string()));
        }
        if self.timeout_ms == 0 {
            return Err(ClientError::ConfigError(
                "timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_config.backoff_multiplier < 1.0
            || !(0.0..=1.0).contains(&self.retry_config.jitter_factor)
        {
            return Err(ClientError::ConfigError(
                "retry_config is out of range".to_string(),
            ));
        }
        Ok(())
    }

    fn parsed_base_url(&self) -> Result<Url, ClientError> {
        match Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => {
                Ok(url)
            }
            _ => Err(ClientError::ConfigError(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            ))),
        }
    }
}

// Retry policy for idempotent requests
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
    pub average_response_time_ms: f64,
    pub max_response_time_ms: f64,
}

impl ClientStats {
    fn record(&mut self, elapsed: Duration, succeeded: bool) {
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let completed = (self.requests_succeeded + self.requests_failed) as f64;

        self.average_response_time_ms =
            (self.average_response_time_ms * completed + elapsed_ms) / (completed + 1.0);
        self.max_response_time_ms = self.max_response_time_ms.max(elapsed_ms);
        if succeeded {
            self.requests_succeeded += 1;
        } else {
            self.requests_failed += 1;
        }
    }
}

/// Operations of the remote API used by the application.
///
/// Every authenticated call takes the [`Session`] explicitly.
#[async_trait]
pub trait HolidazeApi: Send + Sync {
    async fn list_venues(&self) -> Result<Vec<Venue>, ApiError>;

    // Venue with owner and bookings expanded
    async fn get_venue(&self, id: &str) -> Result<Venue, ApiError>;

    async fn create_venue(&self, session: &Session, payload: &VenuePayload)
        -> Result<Venue, ApiError>;

    async fn update_venue(
        &self,
        session: &Session,
        id: &str,
        payload: &VenuePayload,
    ) -> Result<Venue, ApiError>;

    async fn delete_venue(&self, session: &Session, id: &str) -> Result<(), ApiError>;

    async fn create_booking(
        &self,
        session: &Session,
        request: &BookingRequest,
    ) -> Result<Booking, ApiError>;

    async fn get_profile(&self, session: &Session, name: &str) -> Result<Profile, ApiError>;

    async fn profile_venues(&self, session: &Session, name: &str)
        -> Result<Vec<Venue>, ApiError>;

    async fn profile_bookings(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<Booking>, ApiError>;

    async fn update_profile(
        &self,
        session: &Session,
        name: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ApiError>;

    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError>;

    async fn register(&self, registration: &Registration) -> Result<Profile, ApiError>;
}

const NO_BODY: Option<&()> = None;

/// reqwest-backed client for the hosted API.
pub struct HttpApiClient {
    config: ClientConfig,
    base_url: Url,
    http: reqwest::Client,
    stats: Mutex<ClientStats>,
}

impl HttpApiClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let base_url = config.parsed_base_url()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            config,
            base_url,
            http,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    // Helper to calculate exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    /// Appends each segment to the base path, percent-encoding `/`, `?` and the like
    /// so an id or profile name always stays a single path segment.
    pub fn endpoint(&self, segments: &[&str], query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        // http(s) bases always carry a path, checked in ClientConfig::validate
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.set_query(query);
        url
    }

    async fn call<B, T>(
        &self,
        method: Method,
        url: Url,
        session: Option<&Session>,
        body: Option<&B>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned + Send,
    {
        let response = self.execute(method, url, session, body).await?;
        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| ApiError::DecodeError(e.to_string()))?;
        Ok(envelope.data)
    }

    // GET requests are retried on retryable failures, everything else is sent once
    async fn execute<B>(
        &self,
        method: Method,
        url: Url,
        session: Option<&Session>,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ApiError>
    where
        B: Serialize + ?Sized + Sync,
    {
        let max_retries = if method == Method::GET {
            self.config.retry_config.max_retries
        } else {
            0
        };
        let mut attempt = 0;

        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header(API_KEY_HEADER, &self.config.api_key);
            if let Some(session) = session {
                request = request.bearer_auth(&session.access_token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            debug!(%method, path = url.path(), attempt, "sending request");
            self.stats.lock().requests_sent += 1;
            let started = Instant::now();

            let result = match request.send().await {
                Ok(response) if response.status().is_success() => Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    Err(classify_response(status, &body))
                }
                Err(e) if e.is_timeout() => Err(ApiError::Timeout(self.config.timeout_ms)),
                Err(e) => Err(ApiError::NetworkError(e.to_string())),
            };
            self.stats.lock().record(started.elapsed(), result.is_ok());

            match result {
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    let backoff = Self::calculate_backoff(attempt, &self.config.retry_config);
                    warn!(
                        %method,
                        path = url.path(),
                        attempt,
                        ?backoff,
                        error = %err,
                        "retrying request"
                    );
                    self.stats.lock().requests_retried += 1;
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

/// Maps a non-success status and its body onto an [`ApiError`].
pub fn classify_response(status: StatusCode, body: &str) -> ApiError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.first_message().map(str::to_string))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        });

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        StatusCode::NOT_FOUND => ApiError::NotFound(message),
        _ => ApiError::ApiResponseError {
            status_code: status.as_u16(),
            message,
            is_retryable: status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS,
        },
    }
}

#[async_trait]
impl HolidazeApi for HttpApiClient {
    async fn list_venues(&self) -> Result<Vec<Venue>, ApiError> {
        let url = self.endpoint(&["holidaze", "venues"], Some("sort=created"));
        self.call(Method::GET, url, None, NO_BODY).await
    }

    async fn get_venue(&self, id: &str) -> Result<Venue, ApiError> {
        let url = self.endpoint(&["holidaze", "venues", id], Some("_owner=true&_bookings=true"));
        self.call(Method::GET, url, None, NO_BODY).await
    }

    async fn create_venue(
        &self,
        session: &Session,
        payload: &VenuePayload,
    ) -> Result<Venue, ApiError> {
        let url = self.endpoint(&["holidaze", "venues"], None);
        self.call(Method::POST, url, Some(session), Some(payload))
            .await
    }

    async fn update_venue(
        &self,
        session: &Session,
        id: &str,
        payload: &VenuePayload,
    ) -> Result<Venue, ApiError> {
        let url = self.endpoint(&["holidaze", "venues", id], None);
        self.call(Method::PUT, url, Some(session), Some(payload))
            .await
    }

    async fn delete_venue(&self, session: &Session, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["holidaze", "venues", id], None);
        self.execute(Method::DELETE, url, Some(session), NO_BODY)
            .await?;
        Ok(())
    }

    async fn create_booking(
        &self,
        session: &Session,
        request: &BookingRequest,
    ) -> Result<Booking, ApiError> {
        let url = self.endpoint(&["holidaze", "bookings"], None);
        self.call(Method::POST, url, Some(session), Some(request))
            .await
    }

    async fn get_profile(&self, session: &Session, name: &str) -> Result<Profile, ApiError> {
        let url = self.endpoint(&["holidaze", "profiles", name], None);
        self.call(Method::GET, url, Some(session), NO_BODY).await
    }

    async fn profile_venues(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<Venue>, ApiError> {
        let url = self.endpoint(
            &["holidaze", "profiles", name, "venues"],
            Some("_bookings=true"),
        );
        self.call(Method::GET, url, Some(session), NO_BODY).await
    }

    async fn profile_bookings(
        &self,
        session: &Session,
        name: &str,
    ) -> Result<Vec<Booking>, ApiError> {
        let url = self.endpoint(
            &["holidaze", "profiles", name, "bookings"],
            Some("_venue=true"),
        );
        self.call(Method::GET, url, Some(session), NO_BODY).await
    }

    async fn update_profile(
        &self,
        session: &Session,
        name: &str,
        update: &ProfileUpdate,
    ) -> Result<Profile, ApiError> {
        let url = self.endpoint(&["holidaze", "profiles", name], None);
        self.call(Method::PUT, url, Some(session), Some(update))
            .await
    }

    async fn login(&self, credentials: &Credentials) -> Result<Session, ApiError> {
        let data: LoginData = self
            .call(
                Method::POST,
                self.endpoint(&["auth", "login"], Some("_holidaze=true")),
                None,
                Some(credentials),
            )
            .await?;
        Ok(Session::from(data))
    }

    async fn register(&self, registration: &Registration) -> Result<Profile, ApiError> {
        let url = self.endpoint(&["auth", "register"], None);
        self.call(Method::POST, url, None, Some(registration))
            .await
    }
}
