//! Error Handling
//!
//! This module defines the crate's error taxonomy. Errors fall in two groups:
//!
//! - **Structural** failures abort a request: a body that is not a notification
//!   ([`DecodeError`]), a payload whose signature does not match
//!   ([`SignatureError`]), a body that could not be read.
//! - **Semantic** failures are isolated per item and never cascade: a message
//!   whose type cannot be classified ([`ClassificationError`]), an error object
//!   embedded by WhatsApp itself ([`ProviderError`]), a failure returned by your
//!   hooks (collected into a [`DispatchError`]).

use std::{error::Error as StdError, fmt, time::Duration};

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// The **top-level error enum** for the `whatsapp-webhooks` crate.
///
/// This is what [`NotificationHooks::handle_error`] receives. It uses
/// `#[non_exhaustive]` to allow for future additions of error variants without
/// breaking client code.
///
/// [`NotificationHooks::handle_error`]: crate::hooks::NotificationHooks::handle_error
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The request body is not a well-formed webhook notification.
    ///
    /// No hook is invoked for such a request.
    #[error("Failed to decode the webhook notification: {0}")]
    Decode(#[from] DecodeError),

    /// One or more hooks failed while the notification was dispatched.
    ///
    /// The remaining items were still processed and the provider still
    /// received its acknowledgement.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The payload signature did not verify against the configured app secret.
    #[error("Webhook signature verification failed: {0}")]
    Signature(#[from] SignatureError),

    /// Dispatch did not complete before the configured request timeout.
    #[error("Notification dispatch did not finish within {0:?}")]
    Timeout(Duration),

    /// The request body could not be collected (e.g. it exceeded the body limit).
    #[error("Failed to read the request body: {0}")]
    Body(BoxError),

    /// Invalid configuration, usually read from the environment.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error occurring during network operations (e.g., HTTP requests,
    /// connection issues, binding the listener socket).
    #[error("A network error occurred: {0}")]
    Network(#[from] BoxError),

    /// The Graph API answered a send request with an error.
    #[error("An API service error occurred: {0}")]
    Service(#[from] ServiceError),

    /// Represents an **I/O error**.
    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),

    /// Represents an **internal logic error**, or invalid input that should
    /// have been caught earlier (e.g. a send payload that is not a JSON object).
    #[error("An internal library error occurred: {0}")]
    Internal(BoxError),
}

impl Error {
    pub(crate) fn network(err: BoxError) -> Self {
        Self::Network(err)
    }

    pub(crate) fn internal(err: BoxError) -> Self {
        Self::Internal(err)
    }

    /// Returns `true` if this error means the request body was not a notification.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_builder() || value.is_redirect() {
            Self::internal(value.into())
        } else {
            Self::network(value.into())
        }
    }
}

/// A request body that could not be decoded into a [`Notification`].
///
/// Only structure is checked: the bytes must be JSON and carry the mandatory
/// `object` / `entry` shape. Unknown message types are not decode errors.
///
/// [`Notification`]: crate::event::Notification
#[derive(thiserror::Error, Debug)]
#[error("{source}")]
pub struct DecodeError {
    #[from]
    source: serde_json::Error,
}

/// Broad classification of a [`DecodeError`].
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum DecodeErrorKind {
    /// The body is not syntactically valid JSON.
    Syntax,
    /// The JSON is valid but does not have the notification shape.
    Shape,
    /// The body ended before the JSON document was complete.
    Truncated,
}

impl DecodeError {
    /// What went wrong while decoding.
    pub fn kind(&self) -> DecodeErrorKind {
        use serde_json::error::Category;

        match self.source.classify() {
            Category::Syntax | Category::Io => DecodeErrorKind::Syntax,
            Category::Data => DecodeErrorKind::Shape,
            Category::Eof => DecodeErrorKind::Truncated,
        }
    }

    /// One-based line of the body at which decoding failed.
    pub fn line(&self) -> usize {
        self.source.line()
    }

    /// One-based column of the body at which decoding failed.
    pub fn column(&self) -> usize {
        self.source.column()
    }
}

/// A message item whose type tag does not map onto a known message kind.
///
/// Such a message is routed to [`MessageHooks::on_unknown_message`]; its
/// siblings are unaffected.
///
/// [`MessageHooks::on_unknown_message`]: crate::hooks::MessageHooks::on_unknown_message
#[derive(thiserror::Error, PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub enum ClassificationError {
    /// The message has no `type` tag at all.
    #[error("message has no type tag")]
    MissingType,

    /// The `type` tag is not one this crate understands (this includes
    /// WhatsApp's own `unknown` tag).
    #[error("unrecognized message type '{0}'")]
    UnknownType(String),

    /// The `type` tag is known but the matching payload object is absent.
    #[error("message of type '{kind}' carries no '{kind}' payload")]
    MissingPayload { kind: &'static str },

    /// The payload object is present but does not have the expected shape.
    #[error("message of type '{kind}' carries an invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        source: PayloadError,
    },
}

/// A provider object inside a notification that did not have the expected
/// shape.
///
/// Only that object is affected: its siblings are decoded and dispatched as
/// usual.
#[derive(thiserror::Error, PartialEq, Eq, Clone, Debug)]
#[error("{0}")]
pub struct PayloadError(String);

impl From<serde_json::Error> for PayloadError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.to_string())
    }
}

/// An error object **reported by WhatsApp itself** inside a notification.
///
/// These show up at the notification level (`value.errors`), inside a
/// message (`messages[].errors`, e.g. an unsupported message type) and inside
/// a status (`statuses[].errors`, e.g. why delivery failed). They are also
/// what the Graph API returns when a send request is rejected.
///
/// # Example (from a webhook payload)
/// ```json
/// {
///   "code": 131051,
///   "title": "Unsupported message type",
///   "error_data": { "details": "Message type is not currently supported" }
/// }
/// ```
#[derive(thiserror::Error, Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ProviderError {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fbtrace_id: Option<String>,
    #[serde(rename = "href", default, skip_serializing_if = "Option::is_none")]
    pub support: Option<String>,
    #[serde(
        rename = "error_data",
        default,
        skip_serializing_if = "ProviderErrorData::is_none"
    )]
    pub error_data: ProviderErrorData,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(code: {})", self.code)?;

        if let Some(title) = &self.title {
            write!(f, " - {title}")?;
        }

        if let Some(r#type) = &self.r#type {
            write!(f, " (type: {type})")?;
        }

        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }

        if let Some(details) = &self.error_data.details {
            write!(f, "\n  Details: {details}")?;
        }

        if let Some(support) = &self.support {
            write!(f, "\n  More info: {support}")?;
        }

        if let Some(id) = &self.fbtrace_id {
            write!(f, "\n  Trace ID: {id}")?;
        }

        Ok(())
    }
}

impl ProviderError {
    /// The human readable details, if WhatsApp included any.
    pub fn details(&self) -> Option<&str> {
        self.error_data.details.as_deref()
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ProviderErrorData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ProviderErrorData {
    fn is_none(&self) -> bool {
        self.details.is_none()
    }
}

/// Why a payload signature was rejected.
#[derive(thiserror::Error, PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub enum SignatureError {
    #[error("Missing X-Hub-Signature-256 header")]
    MissingHeader,
    #[error("Invalid X-Hub-Signature-256 header")]
    InvalidHeader,
    #[error("Invalid webhook secret")]
    InvalidSecret,
    /// This usually indicates an incorrect app secret or a tampered payload.
    #[error("Signature mismatch. Received: {received}")]
    Mismatch { received: String },
}

/// Aggregate of every item that failed while dispatching one notification:
/// hooks that returned an error, and items too malformed to hand to a hook.
///
/// The dispatcher never stops at the first failure, so this can hold several
/// entries, in dispatch order.
#[derive(thiserror::Error, Debug)]
pub struct DispatchError {
    failures: Vec<ItemFailure>,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} notification item(s) failed", self.failures.len())?;
        if let Some(first) = self.failures.first() {
            write!(f, "; first: {first}")?;
        }
        Ok(())
    }
}

impl DispatchError {
    pub(crate) fn from_failures(failures: Vec<ItemFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }

    /// The individual failures, in dispatch order.
    pub fn failures(&self) -> &[ItemFailure] {
        &self.failures
    }

    /// Consumes the error and returns the individual failures.
    pub fn into_failures(self) -> Vec<ItemFailure> {
        self.failures
    }
}

/// A single item failure together with where the item lives.
#[derive(thiserror::Error, Debug)]
#[error("{location}: {source}")]
#[non_exhaustive]
pub struct ItemFailure {
    pub location: ItemLocation,
    pub source: BoxError,
}

/// Where in a notification a failed item lives.
#[derive(PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub struct ItemLocation {
    /// Index into `Notification::entries`.
    pub entry: usize,
    /// Index into `Entry::changes`.
    pub change: usize,
    pub item: Item,
}

impl fmt::Display for ItemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entry[{}].changes[{}] {}", self.entry, self.change, self.item)
    }
}

/// The kind of notification item a hook was invoked for.
#[derive(PartialEq, Eq, Clone, Debug)]
#[non_exhaustive]
pub enum Item {
    Status { id: String },
    NotificationError { code: i64 },
    Message { id: String },
    Change { field: String },
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Status { id } => write!(f, "status '{id}'"),
            Item::NotificationError { code } => write!(f, "notification error {code}"),
            Item::Message { id } => write!(f, "message '{id}'"),
            Item::Change { field } => write!(f, "change '{field}'"),
        }
    }
}

/// A configuration value that could not be used.
#[derive(thiserror::Error, Debug)]
#[error("{var}: {message}")]
pub struct ConfigError {
    pub(crate) var: &'static str,
    pub(crate) message: String,
}

impl ConfigError {
    /// The environment variable (or setting) at fault.
    pub fn var(&self) -> &'static str {
        self.var
    }
}

/// Represents **Graph API errors** returned for a send request.
#[derive(thiserror::Error, Debug)]
#[error("{kind} (HTTP status {status})")]
#[non_exhaustive]
pub struct ServiceError {
    pub(crate) status: StatusCode,
    pub(crate) kind: ServiceErrorKind,
}

impl ServiceError {
    /// Returns the HTTP status code associated with this service error.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the specific kind of service error.
    pub fn kind(&self) -> &ServiceErrorKind {
        &self.kind
    }
}

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ServiceErrorKind {
    /// The API answered with a structured error object.
    #[error("The API returned an error: {0}")]
    Api(Box<ProviderError>),

    /// The API answered with a body that could not be parsed.
    #[error("Failed to parse the response body. Raw body content was: '{body}'.")]
    Parse {
        #[source]
        source: serde_json::Error,
        body: String,
    },
}

/// A convenient type alias for a boxed, trait-object error that can be sent across threads.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// What every hook returns.
///
/// A failure is recorded against the item that triggered it; it never stops
/// the remaining items from being dispatched.
pub type HookResult = Result<(), BoxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_kinds() {
        let syntax = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert_eq!(DecodeError::from(syntax).kind(), DecodeErrorKind::Syntax);

        let truncated = serde_json::from_str::<serde_json::Value>("{\"a\":").unwrap_err();
        assert_eq!(DecodeError::from(truncated).kind(), DecodeErrorKind::Truncated);

        let shape = serde_json::from_str::<ProviderError>("{\"title\":\"no code\"}").unwrap_err();
        assert_eq!(DecodeError::from(shape).kind(), DecodeErrorKind::Shape);
    }

    #[test]
    fn dispatch_error_reports_every_failure() {
        assert!(DispatchError::from_failures(Vec::new()).is_ok());

        let err = DispatchError::from_failures(vec![
            ItemFailure {
                location: ItemLocation {
                    entry: 0,
                    change: 1,
                    item: Item::Message { id: "wamid.A".into() },
                },
                source: "database down".into(),
            },
            ItemFailure {
                location: ItemLocation {
                    entry: 1,
                    change: 0,
                    item: Item::Status { id: "wamid.B".into() },
                },
                source: "boom".into(),
            },
        ])
        .unwrap_err();

        assert_eq!(err.failures().len(), 2);
        let rendered = err.to_string();
        assert!(rendered.starts_with("2 notification item(s) failed"));
        assert!(rendered.contains("entry[0].changes[1] message 'wamid.A': database down"));
    }

    #[test]
    fn provider_error_display() {
        let err: ProviderError = serde_json::from_str(
            r#"{"code":131051,"title":"Unsupported message type","error_data":{"details":"Message type is not currently supported"}}"#,
        )
        .unwrap();

        assert_eq!(err.details(), Some("Message type is not currently supported"));
        let rendered = err.to_string();
        assert!(rendered.starts_with("(code: 131051) - Unsupported message type"));
        assert!(rendered.contains("Details: Message type is not currently supported"));
    }
}
