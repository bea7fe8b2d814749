//! The webhook event listener.
//!
//! [`EventListener`] is the terminal handler of the pipeline. It reads the
//! whole request body, optionally checks the `X-Hub-Signature-256` header,
//! decodes the [`Notification`], runs the dispatcher and answers WhatsApp.
//!
//! It is framework agnostic in the same way the rest of the pipeline is: it
//! takes an `http::Request` and returns an `http::Response`, so it can be
//! mounted on any `http`-compatible server. For a fully managed server, see
//! [`crate::server`].
//!
//! # Usage Example (with axum)
//!
//! ```rust,no_run
//! use axum::{extract::Request, routing::any, Router};
//! use whatsapp_webhooks::{hooks::NotificationHooks, listener::EventListener};
//!
//! struct MyHooks;
//! impl NotificationHooks for MyHooks {}
//!
//! #[tokio::main]
//! async fn main() {
//!     let listener = EventListener::builder()
//!         .verify_token("my_secret_token")
//!         .verify_payload("my_app_secret")
//!         .build(MyHooks);
//!
//!     let app = Router::new().route(
//!         "/webhooks",
//!         any(move |req: Request| {
//!             let listener = listener.clone();
//!             async move { listener.handle(req).await }
//!         }),
//!     );
//!
//!     let tcp = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(tcp, app).await.unwrap();
//! }
//! ```
//!
//! # Responses
//! | Situation                         | Status |
//! |-----------------------------------|--------|
//! | notification decoded              | `200`, the notification echoed as JSON |
//! | signature enabled and mismatching | `401`  |
//! | body unreadable or not a notification | `400` |
//! | verification token mismatch       | `403`  |
//!
//! Hook failures and timeouts never change the status code: WhatsApp retries
//! deliveries that are not acknowledged, and the failed items have already
//! been reported through
//! [`NotificationHooks::handle_error`](crate::hooks::NotificationHooks::handle_error).

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::Query,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::time::Instant;

use crate::{
    dispatch::dispatch_into,
    error::{DispatchError, Error, SignatureError},
    event::Notification,
    hooks::{MessageHooks, NotificationHooks, RequestMeta},
    middleware::{Next, Request, Response, StartTime},
};

/// Bodies larger than this are rejected unless configured otherwise.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// The **Meta App Secret** used to verify payload signatures.
///
/// # Example
/// ```rust
/// use whatsapp_webhooks::listener::AppSecret;
///
/// let app_secret = AppSecret::from("YOUR_APP_SECRET_STRING_HERE");
/// ```
#[derive(PartialEq, Eq, Clone)]
pub struct AppSecret(pub String);

impl fmt::Debug for AppSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AppSecret(..)")
    }
}

impl From<&str> for AppSecret {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for AppSecret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A builder for creating an [`EventListener`].
///
/// It does **not** configure server details like endpoint or shutdown
/// signals; see [`crate::server::ServerBuilder`] for that.
#[derive(Debug, Clone)]
#[must_use]
pub struct EventListenerBuilder {
    pub(crate) app_secret: Option<AppSecret>,
    pub(crate) verify_token: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) body_limit: usize,
}

impl Default for EventListenerBuilder {
    fn default() -> Self {
        Self {
            app_secret: None,
            verify_token: None,
            timeout: None,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

impl EventListenerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Verify the `X-Hub-Signature-256` header of every `POST` against
    /// `app_secret`. Requests that fail are answered with `401` and never
    /// dispatched.
    pub fn verify_payload(mut self, app_secret: impl Into<AppSecret>) -> Self {
        self.app_secret = Some(app_secret.into());
        self
    }

    /// Answer the `GET` verification handshake for this token.
    ///
    /// Without a token, `GET` requests are answered with `405`.
    pub fn verify_token(mut self, verify_token: impl Into<String>) -> Self {
        self.verify_token = Some(verify_token.into());
        self
    }

    /// Cancel dispatch after `timeout`.
    ///
    /// Hooks can see the deadline through
    /// [`RequestMeta::remaining`](crate::hooks::RequestMeta::remaining).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Maximum accepted body size in bytes.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Builds a listener that only has notification hooks. Messages are
    /// classified and then ignored.
    pub fn build<H: NotificationHooks>(self, hooks: H) -> EventListener<H> {
        self.build_with(hooks, ())
    }

    /// Builds a listener with both notification and message hooks.
    pub fn build_with<H, M>(self, hooks: H, message_hooks: M) -> EventListener<H, M>
    where
        H: NotificationHooks,
        M: MessageHooks,
    {
        EventListener {
            inner: Arc::new(Inner {
                hooks,
                message_hooks,
                config: self,
            }),
        }
    }
}

struct Inner<H, M> {
    hooks: H,
    message_hooks: M,
    config: EventListenerBuilder,
}

/// The terminal webhook handler.
///
/// Cheap to clone; clones share the hooks.
pub struct EventListener<H, M = ()> {
    inner: Arc<Inner<H, M>>,
}

impl<H, M> Clone for EventListener<H, M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl EventListener<()> {
    /// Returns a new builder to create an `EventListener`.
    pub fn builder() -> EventListenerBuilder {
        EventListenerBuilder::new()
    }
}

impl<H, M> EventListener<H, M>
where
    H: NotificationHooks + 'static,
    M: MessageHooks + 'static,
{
    /// Handles any request for the webhook route.
    ///
    /// `GET` is the verification handshake, `POST` a notification; everything
    /// else is answered with `405`.
    pub async fn handle(&self, req: Request) -> Response {
        match *req.method() {
            Method::GET => self.handle_verification(req.uri()),
            Method::POST => self.handle_event(req).await,
            _ => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        }
    }

    /// Handles one notification delivery.
    pub async fn handle_event(&self, req: Request) -> Response {
        let config = &self.inner.config;

        let mut meta = RequestMeta::new();
        if let Some(StartTime(started_at)) = req.extensions().get::<StartTime>() {
            meta = meta.with_started_at(*started_at);
        }

        let (parts, body) = req.into_parts();
        let body = match axum::body::to_bytes(body, config.body_limit).await {
            Ok(body) => body,
            Err(err) => {
                self.handle_error(Some(&Error::Body(err.into()))).await;
                return (StatusCode::BAD_REQUEST, "Failed to read request body").into_response();
            }
        };

        if let Some(secret) = &config.app_secret {
            if let Err(err) = verify_signature(secret, &parts.headers, &body) {
                self.handle_error(Some(&err.into())).await;
                return (StatusCode::UNAUTHORIZED, "Signature verification failed").into_response();
            }
        }

        let notification = match Notification::from_slice(&body) {
            Ok(notification) => notification,
            Err(err) => {
                self.handle_error(Some(&err.into())).await;
                return (
                    StatusCode::BAD_REQUEST,
                    "Invalid JSON payload. Please ensure the body is a webhook notification.",
                )
                    .into_response();
            }
        };

        tracing::debug!(
            entries = notification.entries.len(),
            "dispatching webhook notification"
        );

        if let Some(limit) = config.timeout {
            meta = meta.with_deadline(Instant::now() + limit);
        }

        // Failures land here as they happen, so a timeout keeps the ones
        // recorded before it.
        let mut failures = Vec::new();
        let timed_out = {
            let dispatched = dispatch_into(
                &notification,
                &meta,
                &self.inner.hooks,
                &self.inner.message_hooks,
                &mut failures,
            );
            match config.timeout {
                Some(limit) => tokio::time::timeout(limit, dispatched)
                    .await
                    .err()
                    .map(|_| limit),
                None => {
                    dispatched.await;
                    None
                }
            }
        };

        if let Err(err) = DispatchError::from_failures(failures) {
            self.handle_error(Some(&err.into())).await;
        }
        if let Some(limit) = timed_out {
            self.handle_error(Some(&Error::Timeout(limit))).await;
        }

        let echo = match notification.to_vec() {
            Ok(echo) => Bytes::from(echo),
            Err(err) => {
                self.handle_error(Some(&Error::internal(err.into()))).await;
                body
            }
        };

        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            echo,
        )
            .into_response()
    }

    /// Reports `error` to the hooks. `None` is tolerated.
    pub async fn handle_error(&self, error: Option<&Error>) {
        self.inner.hooks.handle_error(error).await
    }

    /// Answers the `GET` challenge WhatsApp sends when the webhook is
    /// registered: `hub.challenge` is echoed if `hub.verify_token` matches.
    pub fn handle_verification(&self, uri: &Uri) -> Response {
        let Some(expected) = &self.inner.config.verify_token else {
            return (
                StatusCode::METHOD_NOT_ALLOWED,
                "GET method not supported without a verify_token configured.",
            )
                .into_response();
        };

        let query = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let token = query.get("hub.verify_token").map(String::as_str);

        if token == Some(expected.as_str()) {
            let challenge = query.get("hub.challenge").cloned().unwrap_or_default();
            (StatusCode::OK, challenge).into_response()
        } else {
            tracing::warn!(received = ?token, "invalid verification token");
            (StatusCode::FORBIDDEN, "Invalid verification token").into_response()
        }
    }

    /// Erases the listener into a pipeline handler, ready for
    /// [`middleware::wrap`](crate::middleware::wrap).
    pub fn into_next(self) -> Next {
        Next::new(move |req| {
            let listener = self.clone();
            async move { listener.handle(req).await }
        })
    }
}

/// Checks `body` against the `X-Hub-Signature-256` header.
pub fn verify_signature(
    secret: &AppSecret,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .ok_or(SignatureError::MissingHeader)?
        .to_str()
        .map_err(|_| SignatureError::InvalidHeader)?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.0.as_bytes())
        .map_err(|_| SignatureError::InvalidSecret)?;

    mac.update(body);
    let expected = format!("sha256={}", hex::encode(mac.finalize().into_bytes()));

    // Constant-time comparison
    if subtle::ConstantTimeEq::ct_eq(signature.as_bytes(), expected.as_bytes()).into() {
        Ok(())
    } else {
        Err(SignatureError::Mismatch {
            received: signature.to_owned(),
        })
    }
}
