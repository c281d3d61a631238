//! # HTTP Retrieval Utilities
//!
//! JSON-over-HTTP client for REST APIs addressed by path segments (the Google
//! Sheets v4 API in this crate). Transient failures are retried with
//! exponential backoff before a call gives up.
//!
//! Google APIs are authorized through `gcp_auth`, which discovers service
//! account credentials from the environment and hands out a fresh access token
//! whenever the cached one is about to expire.

use std::sync::Arc;

use gcp_auth::TokenProvider;
use reqwest::{header::AUTHORIZATION, Method, Url};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{de::DeserializeOwned, Serialize};

/// Outcome of one API call that reached the server.
///
/// Transport failures are an `Err` from [`ApiClient::request`]; a non-2xx reply
/// lands here with `success == false` and the raw body kept for the log.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// Decoded body of a 2xx reply.
    pub data: Option<T>,
    /// Body text of a failed reply.
    pub error_body: Option<String>,
    pub status: u16,
    pub success: bool,
}

/// How requests are authorized.
#[derive(Clone, Default)]
pub enum Authorization {
    #[default]
    Anonymous,
    /// A fixed bearer token, sent as-is on every request.
    Bearer(String),
    /// A token asked of `provider` for every request; the provider caches and
    /// refreshes it.
    Google {
        provider: Arc<dyn TokenProvider>,
        scopes: &'static [&'static str],
    },
}

impl Authorization {
    /// Google credentials discovered from the environment
    /// (`GOOGLE_APPLICATION_CREDENTIALS`, gcloud config or the metadata server).
    ///
    /// # Errors
    /// No usable credentials were found.
    pub async fn google(scopes: &'static [&'static str]) -> anyhow::Result<Self> {
        let provider = gcp_auth::provider()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize Google authentication: {e}"))?;
        Ok(Self::Google { provider, scopes })
    }

    async fn bearer(&self) -> anyhow::Result<Option<String>> {
        match self {
            Authorization::Anonymous => Ok(None),
            Authorization::Bearer(token) => Ok(Some(token.clone())),
            Authorization::Google { provider, scopes } => {
                let token = provider
                    .token(scopes)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to get Google access token: {e}"))?;
                Ok(Some(token.as_str().to_string()))
            }
        }
    }
}

/// Retrying client bound to one API root.
pub struct ApiClient {
    inner: ClientWithMiddleware,
    base_url: Url,
    auth: Authorization,
}

impl ApiClient {
    /// Creates a client for the API rooted at `base_url`
    /// (e.g. `https://sheets.googleapis.com/v4/`).
    ///
    /// `max_retries` bounds the retries of transient failures (5xx, 429,
    /// connection resets) per call.
    ///
    /// # Errors
    /// `base_url` is not an absolute URL that can carry path segments.
    pub fn new(base_url: &str, auth: Authorization, max_retries: u32) -> anyhow::Result<Self> {
        Self::with_client(base_url, reqwest::Client::new(), auth, max_retries)
    }

    /// Like [`ApiClient::new`], over an existing `reqwest` client.
    pub fn with_client(
        base_url: &str,
        client: reqwest::Client,
        auth: Authorization,
        max_retries: u32,
    ) -> anyhow::Result<Self> {
        let url = Url::parse(base_url)?;
        if url.cannot_be_a_base() {
            anyhow::bail!("Base URL {base_url} cannot carry path segments");
        }

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);

        let client = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            inner: client,
            base_url: url,
            auth,
        })
    }

    /// Builds an absolute URL by appending percent-encoded `segments` to the base URL.
    ///
    /// Segments may contain characters such as spaces, quotes or `!` (A1 ranges);
    /// they are encoded as single path segments.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends one request to `url` (normally from [`ApiClient::endpoint`]) with
    /// `body` serialized as JSON, and decodes a 2xx reply as `T`.
    ///
    /// # Errors
    /// Body serialization, transport failures after retries, or a 2xx reply
    /// that does not decode as `T`.
    pub async fn request<T, B>(
        &self,
        method: Method,
        url: Url,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> anyhow::Result<ApiResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let mut req = self.inner.request(method, url);

        if !query.is_empty() {
            req = req.query(query);
        }

        if let Some(token) = self.auth.bearer().await? {
            req = req.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        if let Some(b) = body {
            use reqwest::header::CONTENT_TYPE;
            let json_body = serde_json::to_string(b)?;
            req = req.header(CONTENT_TYPE, "application/json").body(json_body);
        }

        let response: reqwest::Response = req.send().await?;
        let status = response.status();

        if status.is_success() {
            let data = response.json::<T>().await?;
            Ok(ApiResponse {
                data: Some(data),
                error_body: None,
                status: status.as_u16(),
                success: true,
            })
        } else {
            let error_text = response.text().await.ok();
            Ok(ApiResponse {
                data: None,
                error_body: error_text,
                status: status.as_u16(),
                success: false,
            })
        }
    }
}
