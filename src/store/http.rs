//! HTTP state store.
//!
//! Protocol, relative to the configured API base:
//!
//! - `GET {base}/state` → `200 {"state": AppState}` | `404` (nothing stored)
//! - `PUT {base}/state` with body `{"state": AppState}` → any `2xx`
//!
//! Every request carries the client identity in [`CLIENT_HEADER`] and, when
//! configured, `Authorization: Bearer <token>`. Any other status is a
//! transport error.

use crate::error::{Result, TimeslicerError};
use crate::model::AppState;
use crate::store::{StateStore, accept_loaded};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, header};
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the client identity.
pub const CLIENT_HEADER: &str = "X-TimeSlicer-Client";

/// State store backed by the remote state service.
pub struct HttpStateStore {
    endpoint: String,
    client_id: String,
    bearer_token: Option<String>,
    client: reqwest::Client,
}

impl HttpStateStore {
    /// Create a store for `api_base` (without the trailing `/state`).
    ///
    /// `timeout` bounds every request; a timed-out request is reported as
    /// [`TimeslicerError::Timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`TimeslicerError::Config`] if the HTTP client cannot be built.
    pub fn new(
        api_base: &str,
        client_id: &str,
        bearer_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TimeslicerError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: format!("{}/state", api_base.trim_end_matches('/')),
            client_id: client_id.to_owned(),
            bearer_token: bearer_token
                .map(|t| t.trim().to_owned())
                .filter(|t| !t.is_empty()),
            client,
        })
    }

    fn request(&self, method: Method) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, &self.endpoint)
            .header(CLIENT_HEADER, &self.client_id);
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl StateStore for HttpStateStore {
    async fn load(&self) -> Result<Option<AppState>> {
        let resp = self
            .request(Method::GET)
            .header(header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            debug!(endpoint = %self.endpoint, "no remote state stored yet");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TimeslicerError::Status(status.as_u16()));
        }

        let body: serde_json::Value = resp.json().await?;
        match body.get("state") {
            Some(state) if !state.is_null() => Ok(accept_loaded(state.clone(), &self.endpoint)),
            _ => {
                warn!(endpoint = %self.endpoint, "remote response has no state field");
                Ok(None)
            }
        }
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        let resp = self
            .request(Method::PUT)
            .json(&serde_json::json!({ "state": state }))
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TimeslicerError::Status(status.as_u16()))
        }
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}
