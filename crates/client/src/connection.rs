//! Connection management for the pull channel
//!
//! A [`Connection`] wraps a `reqwest::Client` with the API base URL and the
//! session's bearer token. Successful responses arrive in a `{data}`
//! envelope; a non-2xx status or an envelope without `data` is a fetch
//! failure. Calls are timeout-bounded and never retried here: retry policy
//! belongs to the refresh scheduler.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::errors::ClientError;

/// Default per-call timeout. A hung call must not be able to starve the
/// engine's single-writer queue.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Success envelope returned by every pull-channel endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Clone, Debug)]
pub struct Connection {
    client: Client,
    api_url: Url,
    auth_token: Option<String>,
}

impl Connection {
    pub fn new(api_url: Url, auth_token: Option<String>) -> Result<Self, ClientError> {
        Self::with_timeout(api_url, auth_token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        api_url: Url,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_url,
            auth_token,
        })
    }

    #[must_use]
    pub const fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.get_with_query(path, &[]).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let mut url = self.api_url.clone();
        url.set_path(path);

        debug!(%url, "pull request");

        let mut builder = self.client.get(url);

        if !query.is_empty() {
            builder = builder.query(query);
        }

        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            return Err(ClientError::Status { status });
        }

        let envelope = response.json::<Envelope<T>>().await?;

        envelope.data.ok_or(ClientError::MissingData)
    }
}
