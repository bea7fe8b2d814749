//! Hook contracts
//!
//! Implement [`NotificationHooks`] to receive statuses, notification-level
//! errors and messages, and [`MessageHooks`] to receive messages already
//! classified into a [`MessageKind`]. Every method has a no-op default, so an
//! implementation only overrides what it cares about.
//!
//! Hooks get borrowed, read-only views of the notification:
//! [`NotificationContext`] for the change being dispatched and
//! [`MessageContext`] for the message at hand. Neither outlives the request.
//!
//! # Example
//! ```rust
//! use whatsapp_webhooks::{
//!     dispatch::MessageKind,
//!     event::{Status, Text},
//!     hooks::{MessageContext, MessageHooks, NotificationContext, NotificationHooks},
//!     HookResult,
//! };
//!
//! struct Receipts;
//!
//! impl NotificationHooks for Receipts {
//!     async fn on_message_status_change(
//!         &self,
//!         _nctx: &NotificationContext<'_>,
//!         status: &Status,
//!     ) -> HookResult {
//!         println!("{} is now {:?}", status.id, status.status);
//!         Ok(())
//!     }
//! }
//!
//! struct Echo;
//!
//! impl MessageHooks for Echo {
//!     async fn on_text(
//!         &self,
//!         _nctx: &NotificationContext<'_>,
//!         mctx: &MessageContext<'_>,
//!         text: &Text,
//!     ) -> HookResult {
//!         println!("{} says {}", mctx.from(), text.body);
//!         Ok(())
//!     }
//! }
//! ```

use std::future::Future;
use std::time::{Duration, SystemTime};

use tokio::time::Instant;

use crate::{
    dispatch::{self, MessageKind},
    error::{ClassificationError, Error, HookResult, ProviderError},
    event::{
        Button, Change, Contact, ContactCard, Identity, Interactive, Location, MediaInfo, Message,
        Metadata, Order, Reaction, Referral, ReferredProduct, ReplyContext, Status, System, Text,
        Timestamp,
    },
};

/// Request-level metadata shared by every hook call of one delivery.
#[derive(Clone, Debug)]
pub struct RequestMeta {
    received_at: SystemTime,
    started_at: Option<SystemTime>,
    deadline: Option<Instant>,
}

impl Default for RequestMeta {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestMeta {
    /// Metadata for a request received now.
    pub fn new() -> Self {
        Self {
            received_at: SystemTime::now(),
            started_at: None,
            deadline: None,
        }
    }

    /// Records when the pipeline started working on the request.
    pub fn with_started_at(mut self, started_at: SystemTime) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Records when dispatch will be cancelled.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// When the listener received the request.
    pub fn received_at(&self) -> SystemTime {
        self.received_at
    }

    /// When the pipeline started working on the request, if a
    /// [`start_time`](crate::middleware::start_time) middleware ran.
    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before dispatch is cancelled. `None` when there is no
    /// deadline.
    ///
    /// Hooks about to start expensive work can check this and bail out early.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

/// What a hook knows about the change being dispatched.
#[derive(Clone, Copy, Debug)]
pub struct NotificationContext<'a> {
    pub(crate) account_id: &'a str,
    pub(crate) entry_time: Option<&'a Timestamp>,
    pub(crate) field: &'a str,
    pub(crate) messaging_product: Option<&'a str>,
    pub(crate) metadata: Option<&'a Metadata>,
    pub(crate) contacts: &'a [Contact],
    pub(crate) request: &'a RequestMeta,
}

impl<'a> NotificationContext<'a> {
    /// The WhatsApp Business Account the change belongs to.
    pub fn account_id(&self) -> &'a str {
        self.account_id
    }

    /// When WhatsApp sent the notification.
    pub fn entry_time(&self) -> Option<&'a Timestamp> {
        self.entry_time
    }

    /// The change's `field`, e.g. `messages`.
    pub fn field(&self) -> &'a str {
        self.field
    }

    pub fn messaging_product(&self) -> Option<&'a str> {
        self.messaging_product
    }

    /// The business phone number the change is about.
    pub fn metadata(&self) -> Option<&'a Metadata> {
        self.metadata
    }

    /// Shorthand for the receiving `phone_number_id`.
    pub fn phone_number_id(&self) -> Option<&'a str> {
        self.metadata
            .and_then(|metadata| metadata.phone_number_id.as_deref())
    }

    /// Sender profiles listed alongside the messages.
    pub fn contacts(&self) -> &'a [Contact] {
        self.contacts
    }

    pub fn request(&self) -> &'a RequestMeta {
        self.request
    }
}

/// What a hook knows about the message being dispatched.
#[derive(Clone, Copy, Debug)]
pub struct MessageContext<'a> {
    pub(crate) message: &'a Message,
    pub(crate) contact: Option<&'a Contact>,
}

impl<'a> MessageContext<'a> {
    /// The sender's phone number.
    pub fn from(&self) -> &'a str {
        &self.message.from
    }

    pub fn id(&self) -> &'a str {
        &self.message.id
    }

    pub fn timestamp(&self) -> &'a Timestamp {
        &self.message.timestamp
    }

    /// The raw `type` tag.
    pub fn kind(&self) -> Option<&'a str> {
        self.message.kind.as_deref()
    }

    /// Reply or forward metadata.
    pub fn reply(&self) -> Option<&'a ReplyContext> {
        self.message.context.as_ref()
    }

    /// The sender's profile, when the notification lists one.
    pub fn contact(&self) -> Option<&'a Contact> {
        self.contact
    }

    /// The whole message, for fields this context does not surface.
    pub fn message(&self) -> &'a Message {
        self.message
    }
}

/// Notification-level hooks
///
/// The dispatcher calls these for each `messages` change of a notification,
/// statuses first, then notification errors, then messages. A hook that
/// fails does not stop its siblings; the failure is recorded and later
/// reported through [`handle_error`](NotificationHooks::handle_error).
pub trait NotificationHooks: Send + Sync {
    /// Handle one inbound message.
    ///
    /// The default classifies the message and forwards it to `message_hooks`;
    /// see [`dispatch::route_message`]. Override it to take over routing
    /// completely.
    fn on_message_received<M: MessageHooks>(
        &self,
        nctx: &NotificationContext<'_>,
        message: &Message,
        message_hooks: &M,
    ) -> impl Future<Output = HookResult> + Send {
        dispatch::route_message(nctx, message, message_hooks)
    }

    /// Handle a delivery state transition of a message you sent.
    fn on_message_status_change(
        &self,
        _nctx: &NotificationContext<'_>,
        _status: &Status,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Handle an error WhatsApp reported for the change as a whole.
    ///
    /// Called once per error.
    fn on_notification_error(
        &self,
        _nctx: &NotificationContext<'_>,
        _error: &ProviderError,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Handle a change whose `field` is not `messages` (`account_update`,
    /// `message_template_status_update`, ...). Its body is in
    /// [`Value::extra`](crate::event::Value::extra).
    fn on_unhandled_change(
        &self,
        _nctx: &NotificationContext<'_>,
        _change: &Change,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Report a failure that happened outside of any single hook: a body that
    /// did not decode, failed hooks collected during dispatch, a timeout.
    ///
    /// `None` is tolerated and means "something failed without detail".
    fn handle_error(&self, error: Option<&Error>) -> impl Future<Output = ()> + Send {
        async move {
            match error {
                Some(error) => tracing::error!(%error, "webhook notification failed"),
                None => tracing::error!("webhook notification failed without an error"),
            }
        }
    }
}

/// Acknowledges everything; failures are only logged.
impl NotificationHooks for () {}

/// Per-message hooks
///
/// [`on_message`](MessageHooks::on_message) receives every classified
/// message and, by default, calls the one method matching its
/// [`MessageKind`].
pub trait MessageHooks: Send + Sync {
    /// Handle a classified message.
    fn on_message(
        &self,
        nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        kind: MessageKind<'_>,
    ) -> impl Future<Output = HookResult> + Send {
        async move {
            match kind {
                MessageKind::Text(text) => self.on_text(nctx, mctx, text).await,
                MessageKind::Referral { text, referral } => {
                    self.on_referral(nctx, mctx, text, referral).await
                }
                MessageKind::ProductEnquiry { text, product } => {
                    self.on_product_enquiry(nctx, mctx, text, product).await
                }
                MessageKind::CustomerIdChange { identity, .. } => {
                    self.on_customer_id_change(nctx, mctx, identity).await
                }
                MessageKind::System(system) => self.on_system(nctx, mctx, system).await,
                MessageKind::Image(media) => self.on_image(nctx, mctx, media).await,
                MessageKind::Audio(media) => self.on_audio(nctx, mctx, media).await,
                MessageKind::Video(media) => self.on_video(nctx, mctx, media).await,
                MessageKind::Document(media) => self.on_document(nctx, mctx, media).await,
                MessageKind::Sticker(media) => self.on_sticker(nctx, mctx, media).await,
                MessageKind::Order(order) => self.on_order(nctx, mctx, order).await,
                MessageKind::Button(button) => self.on_button(nctx, mctx, button).await,
                MessageKind::Location(location) => self.on_location(nctx, mctx, location).await,
                MessageKind::Contacts(cards) => self.on_contacts(nctx, mctx, cards).await,
                MessageKind::Reaction(reaction) => self.on_reaction(nctx, mctx, reaction).await,
                MessageKind::Interactive(interactive) => {
                    self.on_interactive(nctx, mctx, interactive).await
                }
            }
        }
    }

    /// Plain text.
    fn on_text(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _text: &Text,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Text sent from a click-to-WhatsApp ad or post.
    fn on_referral(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _text: &Text,
        _referral: &Referral,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Text asking about a product of a catalog message.
    fn on_product_enquiry(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _text: &Text,
        _product: &ReferredProduct,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// The customer's security identity changed.
    fn on_customer_id_change(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _identity: &Identity,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// Any other system notice, e.g. a changed phone number.
    fn on_system(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _system: &System,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_image(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _image: &MediaInfo,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_audio(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _audio: &MediaInfo,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_video(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _video: &MediaInfo,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_document(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _document: &MediaInfo,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_sticker(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _sticker: &MediaInfo,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_order(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _order: &Order,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// A quick-reply button of a template was tapped.
    fn on_button(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _button: &Button,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_location(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _location: &Location,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_contacts(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _cards: &[ContactCard],
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    fn on_reaction(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _reaction: &Reaction,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// A reply to a button, list or flow message.
    fn on_interactive(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _interactive: &Interactive,
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// A message that could not be classified: no `type`, an unrecognized
    /// `type`, or a `type` without its payload.
    fn on_unknown_message(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _errors: &[ClassificationError],
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }

    /// A message WhatsApp attached errors to. Called instead of the typed
    /// hook.
    fn on_message_errors(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        _errors: &[ProviderError],
    ) -> impl Future<Output = HookResult> + Send {
        async { Ok(()) }
    }
}

/// Ignores every message.
impl MessageHooks for () {}
