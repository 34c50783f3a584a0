//! # HTTP Retrieval Utilities
//!
//! An asynchronous API client wrapper around `reqwest` for the scheduling
//! service's REST boundary. Transient failures are retried with exponential
//! backoff by `reqwest-retry`, and non-2xx answers are returned as data,
//! not errors.

use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Errors raised before or while talking to the REST service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The base URL or a joined path is not a valid absolute URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The middleware stack (including retries) failed to get a response.
    #[error("Request failed: {0}")]
    Middleware(#[from] reqwest_middleware::Error),
    /// Reading or decoding the response failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// The request body could not be encoded.
    #[error("Failed to encode request body: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A standardized container for API responses.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The deserialized body of a 2xx response.
    pub data: Option<T>,
    /// The raw body of a non-2xx response.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Whether the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

/// A retrying HTTP client bound to one base URL.
#[derive(Clone)]
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth_token: Option<String>,
}

impl ApiClient {
    /// Creates a client with three exponential-backoff retries.
    ///
    /// `base_url` must be absolute. A missing trailing slash is added so that
    /// relative paths join beneath it.
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self, ApiError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let url = Url::parse(&normalized)?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth_token,
        })
    }

    /// The base URL every path is joined to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Replaces the bearer token, e.g. after a refresh.
    pub fn set_token(&mut self, token: Option<String>) {
        self.auth_token = token;
    }

    /// URL of `id` inside the collection at `collection_path`.
    ///
    /// The id is pushed as one percent-encoded path segment, so `/`, `?`
    /// and `#` in it stay part of the id.
    pub fn item_url(&self, collection_path: &str, id: &str) -> Result<Url, ApiError> {
        let mut url = self.base_url.join(collection_path.trim_start_matches('/'))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push(id);
        Ok(url)
    }

    /// Performs a request relative to the base URL.
    ///
    /// The bearer token, when set, is sent as `Authorization: Bearer <token>`.
    /// A body is sent as JSON.
    ///
    /// # Errors
    /// Fails on URL joining, body encoding, transport errors after retries,
    /// and undecodable 2xx bodies. Non-2xx statuses are not errors.
    pub async fn request<T, B>(
        &self,
        method: Method,
        path: &str,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let full_url = self.base_url.join(path.trim_start_matches('/'))?;
        self.request_url(method, full_url, headers, body).await
    }

    /// Same as [`ApiClient::request`] for an already built absolute URL.
    pub async fn request_url<T, B>(
        &self,
        method: Method,
        full_url: Url,
        headers: Option<HeaderMap>,
        body: Option<B>,
    ) -> Result<ApiResponse<T>, ApiError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        log::debug!("{} {}", method, full_url);
        let mut req = self.inner.request(method, full_url);

        if let Some(h) = headers {
            req = req.headers(h);
        }

        if let Some(token) = &self.auth_token {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            let json_body = serde_json::to_string(&b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let resp_headers = response.headers().clone();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers: resp_headers,
            })
        } else {
            let error_text = response.text().await.ok();
            log::warn!("HTTP {} from REST service", status.as_u16());
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
                headers: resp_headers,
            })
        }
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.auth_token.is_some())
            .finish()
    }
}
