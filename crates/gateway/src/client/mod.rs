//! Catalogue client.
//!
//! The transport trait hides the catalogue's wire protocol; the HTTP
//! implementation speaks the catalogue's JSON/REST session API. Sessions are
//! pooled by [`pool::SessionPool`] and cached per-identity by
//! [`auth_cache::AuthCache`].

pub mod auth_cache;
pub mod pool;

pub use auth_cache::AuthCache;
pub use pool::{PoolConfig, PooledSession, SessionPool};

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::error::GatewayError;
use crate::schema;

/// An authenticated catalogue session.
///
/// Remaining lifetime is derived locally from the minutes the catalogue
/// reported at last contact, so pool decisions never need a network call.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    expires_at: Instant,
}

impl Session {
    /// Wrap a session id with the lifetime the catalogue just reported.
    pub fn new(id: impl Into<String>, remaining_minutes: f64) -> Self {
        Session {
            id: id.into(),
            expires_at: Instant::now() + minutes(remaining_minutes),
        }
    }

    /// Minutes until the session expires, by the local clock.
    pub fn remaining_minutes(&self) -> f64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs_f64()
            / 60.0
    }

    /// Record a successful refresh.
    pub fn refreshed(&mut self, remaining_minutes: f64) {
        self.expires_at = Instant::now() + minutes(remaining_minutes);
    }
}

fn minutes(m: f64) -> Duration {
    Duration::from_secs_f64((m * 60.0).max(0.0))
}

/// Details of a session, as reported by the catalogue.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDetails {
    #[serde(rename = "userName")]
    pub user_name: String,
    #[serde(rename = "remainingMinutes")]
    pub remaining_minutes: f64,
}

/// Errors from the catalogue boundary.
#[derive(Debug, Error)]
pub enum CatalogueError {
    #[error("catalogue request timed out")]
    Timeout,

    #[error("catalogue transport error: {0}")]
    Http(reqwest::Error),

    #[error("catalogue returned status {status}: {message}")]
    BadStatus { status: u16, message: String },

    #[error("catalogue session expired or invalid")]
    SessionExpired,

    #[error("catalogue denied the operation: {0}")]
    Denied(String),

    #[error("no such record in the catalogue")]
    NotFound,

    #[error("catalogue returned an invalid response")]
    InvalidResponse,
}

impl From<reqwest::Error> for CatalogueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            CatalogueError::Timeout
        } else {
            CatalogueError::Http(err)
        }
    }
}

impl From<CatalogueError> for GatewayError {
    fn from(err: CatalogueError) -> Self {
        match err {
            CatalogueError::Timeout | CatalogueError::Http(_) => {
                GatewayError::CatalogueUnavailable
            }
            CatalogueError::SessionExpired => GatewayError::SessionExpired,
            CatalogueError::Denied(message) => GatewayError::Forbidden(message),
            CatalogueError::NotFound => GatewayError::NotFound,
            CatalogueError::BadStatus { status, message } => GatewayError::Internal(
                anyhow::anyhow!("catalogue returned status {status}: {message}"),
            ),
            CatalogueError::InvalidResponse => {
                GatewayError::Internal(anyhow::anyhow!("catalogue returned an invalid response"))
            }
        }
    }
}

/// The catalogue wire protocol.
///
/// `search` returns rows with the catalogue's bean-name wrapper already
/// removed, so callers see plain entity objects (or bare values for
/// aggregate queries).
#[async_trait]
pub trait CatalogueTransport: Send + Sync {
    /// Authenticate and obtain a fresh session.
    async fn login(
        &self,
        mechanism: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, CatalogueError>;

    /// Extend a session's lifetime; returns the new remaining minutes.
    async fn refresh(&self, session_id: &str) -> Result<f64, CatalogueError>;

    /// Invalidate a session on the catalogue side.
    async fn logout(&self, session_id: &str) -> Result<(), CatalogueError>;

    /// Introspect a session.
    async fn session_details(&self, session_id: &str) -> Result<SessionDetails, CatalogueError>;

    /// Execute a query.
    async fn search(&self, session_id: &str, query: &str) -> Result<Vec<Value>, CatalogueError>;

    /// Create records; returns the new ids in input order.
    async fn create(
        &self,
        session_id: &str,
        entity: &str,
        records: &[Value],
    ) -> Result<Vec<i64>, CatalogueError>;

    /// Update one record identified by its embedded id.
    async fn update(
        &self,
        session_id: &str,
        entity: &str,
        record: &Value,
    ) -> Result<(), CatalogueError>;

    /// Delete one record by id.
    async fn delete(&self, session_id: &str, entity: &str, id: i64)
        -> Result<(), CatalogueError>;
}

/// JSON/REST transport against a real catalogue server.
#[derive(Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Deserialize)]
struct CatalogueErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl HttpTransport {
    /// Build a transport for `base_url`, optionally skipping certificate
    /// verification for test catalogues with self-signed certificates.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        check_cert: bool,
    ) -> Result<Self, CatalogueError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(!check_cert)
            .build()
            .map_err(CatalogueError::Http)?;

        Ok(HttpTransport {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/icat{path}", self.base_url)
    }

    /// Map a non-success response onto a typed error using the catalogue's
    /// `{code, message}` error body.
    async fn error_from(response: reqwest::Response) -> CatalogueError {
        let status = response.status().as_u16();
        let body = response
            .json::<CatalogueErrorBody>()
            .await
            .unwrap_or_else(|_| CatalogueErrorBody {
                code: String::new(),
                message: String::new(),
            });

        match body.code.as_str() {
            "SESSION" => CatalogueError::SessionExpired,
            "INSUFFICIENT_PRIVILEGES" => CatalogueError::Denied(body.message),
            "NO_SUCH_OBJECT_FOUND" => CatalogueError::NotFound,
            _ => CatalogueError::BadStatus {
                status,
                message: body.message,
            },
        }
    }

    /// Strip the single-key bean-name wrapper the catalogue puts around
    /// entity rows; aggregate results come through unwrapped already.
    fn unwrap_row(row: Value) -> Value {
        if let Value::Object(map) = &row {
            if map.len() == 1 {
                if let Some((key, inner)) = map.iter().next() {
                    if schema::descriptor(key).is_some() {
                        return inner.clone();
                    }
                }
            }
        }
        row
    }
}

#[async_trait]
impl CatalogueTransport for HttpTransport {
    async fn login(
        &self,
        mechanism: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, CatalogueError> {
        let credentials = serde_json::json!({
            "plugin": mechanism,
            "credentials": [
                {"username": username},
                {"password": password},
            ],
        });

        let response = self
            .http
            .post(self.url("/session"))
            .form(&[("json", credentials.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|_| CatalogueError::InvalidResponse)?;

        let details = self.session_details(&login.session_id).await?;
        tracing::debug!(user = %details.user_name, "catalogue login");
        Ok(Session::new(login.session_id, details.remaining_minutes))
    }

    async fn refresh(&self, session_id: &str) -> Result<f64, CatalogueError> {
        let response = self
            .http
            .put(self.url(&format!("/session/{session_id}")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let details = self.session_details(session_id).await?;
        Ok(details.remaining_minutes)
    }

    async fn logout(&self, session_id: &str) -> Result<(), CatalogueError> {
        let response = self
            .http
            .delete(self.url(&format!("/session/{session_id}")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    async fn session_details(&self, session_id: &str) -> Result<SessionDetails, CatalogueError> {
        let response = self
            .http
            .get(self.url(&format!("/session/{session_id}")))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|_| CatalogueError::InvalidResponse)
    }

    async fn search(&self, session_id: &str, query: &str) -> Result<Vec<Value>, CatalogueError> {
        let response = self
            .http
            .get(self.url("/entityManager"))
            .query(&[("sessionId", session_id), ("query", query)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let rows: Vec<Value> = response
            .json()
            .await
            .map_err(|_| CatalogueError::InvalidResponse)?;

        Ok(rows.into_iter().map(Self::unwrap_row).collect())
    }

    async fn create(
        &self,
        session_id: &str,
        entity: &str,
        records: &[Value],
    ) -> Result<Vec<i64>, CatalogueError> {
        let wrapped: Vec<Value> = records
            .iter()
            .map(|r| serde_json::json!({ entity: r }))
            .collect();

        let response = self
            .http
            .post(self.url("/entityManager"))
            .form(&[
                ("sessionId", session_id.to_string()),
                ("entities", Value::Array(wrapped).to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        response
            .json()
            .await
            .map_err(|_| CatalogueError::InvalidResponse)
    }

    async fn update(
        &self,
        session_id: &str,
        entity: &str,
        record: &Value,
    ) -> Result<(), CatalogueError> {
        let response = self
            .http
            .put(self.url("/entityManager"))
            .form(&[
                ("sessionId", session_id.to_string()),
                ("entity", serde_json::json!({ entity: record }).to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }

    async fn delete(
        &self,
        session_id: &str,
        entity: &str,
        id: i64,
    ) -> Result<(), CatalogueError> {
        let target = serde_json::json!({ entity: {"id": id} });
        let response = self
            .http
            .delete(self.url("/entityManager"))
            .query(&[("sessionId", session_id), ("entities", &target.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }
        Ok(())
    }
}
