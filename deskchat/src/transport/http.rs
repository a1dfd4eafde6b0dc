//! REST transport for the support chat backend.
//!
//! Talks to three endpoints under the configured base URL:
//!
//! ```text
//! GET  {base}/support/chat/messages        -> history
//! POST {base}/support/chat/messages        -> send   {"message": "..."}
//! POST {base}/support/chat/messages/read   -> mark all read
//! ```
//!
//! Response envelopes are unwrapped by [`deskchat_proto::codec`]; a history
//! body of unknown shape is logged and treated as empty.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use deskchat_proto::codec;
use deskchat_proto::message::{RawMessage, SendRequest};

use super::{ChatTransport, TransportError, TransportType};

const HISTORY_PATH: &str = "support/chat/messages";
const READ_PATH: &str = "support/chat/messages/read";
const JSON: &str = "application/json";

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the API, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    /// Bearer token sent with every call, if any.
    pub token: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Creates a config with no token and a 10 second timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`ChatTransport`] over HTTP using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    messages_url: Url,
    read_url: Url,
    token: Option<String>,
}

impl HttpTransport {
    /// Builds a transport for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] if the base URL does not parse
    /// or [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &BackendConfig) -> Result<Self, TransportError> {
        let mut base = Url::parse(config.base_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("deskchat/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            messages_url: base.join(HISTORY_PATH)?,
            read_url: base.join(READ_PATH)?,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    /// URL of the history/send endpoint.
    #[must_use]
    pub const fn messages_url(&self) -> &Url {
        &self.messages_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn body(response: reqwest::Response) -> Result<Vec<u8>, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

impl ChatTransport for HttpTransport {
    async fn fetch_history(&self) -> Result<Vec<RawMessage>, TransportError> {
        let request = self
            .client
            .get(self.messages_url.clone())
            .header(ACCEPT, JSON);
        let response = self.authorize(request).send().await?;
        let body = Self::body(response).await?;

        match codec::decode_history(&body) {
            Ok(page) => {
                if page.skipped > 0 {
                    tracing::warn!(skipped = page.skipped, "dropped malformed history records");
                }
                Ok(page.records)
            }
            Err(e) => {
                tracing::warn!(error = %e, "unrecognised history response, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    async fn send(&self, request: &SendRequest) -> Result<RawMessage, TransportError> {
        let payload = codec::encode_send_request(request)?;
        let builder = self
            .client
            .post(self.messages_url.clone())
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .body(payload);
        let response = self.authorize(builder).send().await?;
        let body = Self::body(response).await?;
        Ok(codec::decode_sent(&body)?)
    }

    async fn mark_all_read(&self) -> Result<(), TransportError> {
        let builder = self.client.post(self.read_url.clone()).header(ACCEPT, JSON);
        let response = self.authorize(builder).send().await?;
        Self::body(response).await.map(|_| ())
    }

    fn transport_type(&self) -> TransportType {
        TransportType::Http
    }
}
