//! Sending notifications back
//!
//! Hooks often need to answer the customer. This crate does not compose
//! outbound messages; it only needs something that can deliver a payload,
//! the [`SendNotification`] capability. [`Client`] is a thin implementation
//! over the Graph API `/{phone_number_id}/messages` endpoint.
//!
//! # Example
//! ```rust,no_run
//! use serde_json::json;
//! use whatsapp_webhooks::client::{Client, SendNotification};
//!
//! # async fn example() -> Result<(), whatsapp_webhooks::Error> {
//! let client = Client::builder()
//!     .api_version("22.0")
//!     .build("YOUR_ACCESS_TOKEN", "PHONE_NUMBER_ID")?;
//!
//! let sent = client
//!     .send("16505551234", &json!({ "type": "text", "text": { "body": "Thanks!" } }))
//!     .await?;
//! println!("sent {}", sent.messages[0].id);
//! # Ok(()) }
//! ```

use std::{fmt, future::Future, sync::Arc, time::Duration};

use reqwest::{header::HeaderValue, Client as HttpClient, ClientBuilder as HttpClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, ProviderError, ServiceError, ServiceErrorKind};

/// Default API version for the Graph API
const DEFAULT_API_VERSION: &str = "22.0";
const DEFAULT_BASE_URL: &str = "https://graph.facebook.com";
/// Default user agent for the client
const USER_AGENT: &str = concat!("whatsapp-webhooks/", env!("CARGO_PKG_VERSION"), " (Rust)");

/// The capability of delivering a message payload to a recipient.
pub trait SendNotification: Send + Sync {
    /// Sends `payload` to `recipient` (a phone number or WhatsApp ID).
    ///
    /// `payload` is the message body without addressing, e.g.
    /// `{"type": "text", "text": {"body": "hi"}}`.
    fn send<P>(
        &self,
        recipient: &str,
        payload: &P,
    ) -> impl Future<Output = Result<ResponseMessage, Error>> + Send
    where
        P: Serialize + Sync + ?Sized;
}

/// What the Graph API answers for an accepted message.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ResponseMessage {
    pub messaging_product: String,
    #[serde(default)]
    pub contacts: Vec<ResponseContact>,
    #[serde(default)]
    pub messages: Vec<ResponseMessageId>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ResponseContact {
    /// The recipient as it was sent.
    pub input: String,
    pub wa_id: String,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ResponseMessageId {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_status: Option<String>,
}

/// A Graph API client bound to one business phone number.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Client {
    inner: Arc<InnerClient>,
}

struct InnerClient {
    http: HttpClient,
    messages_url: String,
    access_token: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("messages_url", &self.inner.messages_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client with default configuration.
    ///
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn new(
        access_token: impl Into<String>,
        phone_number_id: impl AsRef<str>,
    ) -> Result<Self, Error> {
        ClientBuilder::new().build(access_token, phone_number_id)
    }

    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The URL messages are posted to.
    pub fn messages_url(&self) -> &str {
        &self.inner.messages_url
    }

    async fn post_message(&self, body: Json) -> Result<ResponseMessage, Error> {
        let response = self
            .inner
            .http
            .post(&self.inner.messages_url)
            .bearer_auth(&self.inner.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            serde_json::from_slice(&body).map_err(|source| {
                ServiceError {
                    status,
                    kind: ServiceErrorKind::Parse {
                        source,
                        body: String::from_utf8_lossy(&body).into_owned(),
                    },
                }
                .into()
            })
        } else {
            Err(ServiceError {
                status,
                kind: Self::handle_not_ok(&body),
            }
            .into())
        }
    }

    fn handle_not_ok(body: &[u8]) -> ServiceErrorKind {
        #[derive(Deserialize)]
        struct Envelope {
            error: ProviderError,
        }

        match serde_json::from_slice::<Envelope>(body) {
            Ok(envelope) => ServiceErrorKind::Api(Box::new(envelope.error)),
            Err(source) => ServiceErrorKind::Parse {
                source,
                body: String::from_utf8_lossy(body).into_owned(),
            },
        }
    }
}

impl SendNotification for Client {
    fn send<P>(
        &self,
        recipient: &str,
        payload: &P,
    ) -> impl Future<Output = Result<ResponseMessage, Error>> + Send
    where
        P: Serialize + Sync + ?Sized,
    {
        let body = addressed(recipient, payload);

        async move {
            let body = body?;
            tracing::debug!(%recipient, "sending message");
            self.post_message(body).await
        }
    }
}

// Adds the addressing fields to a message payload.
fn addressed<P>(recipient: &str, payload: &P) -> Result<Json, Error>
where
    P: Serialize + ?Sized,
{
    let mut body = match serde_json::to_value(payload) {
        Ok(Json::Object(body)) => body,
        Ok(other) => {
            return Err(Error::internal(
                format!("message payload must be a JSON object, got {other}").into(),
            ))
        }
        Err(err) => return Err(Error::internal(err.into())),
    };

    body.insert("messaging_product".into(), "whatsapp".into());
    body.entry("recipient_type")
        .or_insert_with(|| "individual".into());
    body.insert("to".into(), recipient.into());

    Ok(Json::Object(body))
}

/// Builder for a [`Client`]
#[must_use]
pub struct ClientBuilder {
    http: HttpClientBuilder,
    api_version: String,
    base_url: String,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            http: HttpClientBuilder::new().user_agent(HeaderValue::from_static(USER_AGENT)),
            api_version: DEFAULT_API_VERSION.to_owned(),
            base_url: DEFAULT_BASE_URL.to_owned(),
        }
    }
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the request timeout for all Graph API calls.
    pub fn timeout(mut self, duration: Duration) -> Self {
        self.http = self.http.timeout(duration);
        self
    }

    /// Sets the Graph API version to use (e.g. `"19.0"`).
    ///
    /// If you add the `"v"` prefix, it will be removed.
    pub fn api_version(mut self, version: impl AsRef<str>) -> Self {
        let version = version.as_ref();
        self.api_version = version.strip_prefix('v').unwrap_or(version).to_owned();
        self
    }

    /// Overrides `https://graph.facebook.com`, e.g. to point at a mock.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Builds a client sending from `phone_number_id`.
    ///
    /// # Errors
    /// Fails if the underlying HTTP client cannot be built.
    pub fn build(
        self,
        access_token: impl Into<String>,
        phone_number_id: impl AsRef<str>,
    ) -> Result<Client, Error> {
        let messages_url = format!(
            "{}/v{}/{}/messages",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            phone_number_id.as_ref()
        );

        Ok(Client {
            inner: Arc::new(InnerClient {
                http: self.http.build()?,
                messages_url,
                access_token: access_token.into(),
            }),
        })
    }
}
