//! Webhook notification model
//!
//! Typed representation of what WhatsApp `POST`s to your webhook. The tree
//! mirrors the wire format one to one:
//!
//! ```text
//! Notification
//! └── entry[]: Entry            one business account
//!     └── changes[]: Change     one field-scoped delta ("messages", ...)
//!         └── value: Value
//!             ├── metadata      the receiving business phone number
//!             ├── contacts[]    sender profiles
//!             ├── messages[]    inbound content
//!             ├── statuses[]    delivery state transitions
//!             └── errors[]      notification-level provider errors
//! ```
//!
//! Decoding is purely structural. A message with an unrecognized `type` tag
//! decodes fine and keeps its tag; deciding what it *is* happens in
//! [`crate::dispatch`].
//!
//! Messages, statuses, errors and message payloads are each wrapped in a
//! [`Payload`], which decodes them one by one. A malformed item only fails
//! itself; the rest of the notification is still usable.
//!
//! Every type here is also `Serialize`, and encoding a decoded notification
//! gives back the same document minus whitespace: a [`Payload`] encodes the
//! exact JSON it was decoded from, and unknown keys are kept in `extra` maps.

use std::str::FromStr;

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value as Json};

use crate::error::{DecodeError, PayloadError, ProviderError};

/// The `object` every WhatsApp Business Account notification carries.
pub const WHATSAPP_BUSINESS_ACCOUNT: &str = "whatsapp_business_account";

/// The `field` of changes that carry messages, statuses and errors.
pub const MESSAGES_FIELD: &str = "messages";

/// One inbound webhook delivery.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct Notification {
    /// The webhook the business is subscribed to; always
    /// `whatsapp_business_account` for WhatsApp.
    pub object: String,

    /// Changes batched per business account.
    ///
    /// A notification without entries is valid but has nothing to dispatch.
    #[serde(rename = "entry")]
    pub entries: Vec<Entry>,
}

impl Notification {
    /// Decodes a notification from the raw request body.
    ///
    /// # Errors
    /// Fails with a [`DecodeError`] if `bytes` is not JSON or lacks the
    /// mandatory `object` / `entry` shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encodes the notification back to JSON.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// `true` when there is nothing to dispatch.
    pub fn is_inert(&self) -> bool {
        self.entries.iter().all(|entry| entry.changes.is_empty())
    }
}

impl FromStr for Notification {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(s.as_bytes())
    }
}

/// One business account's batch of changes.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct Entry {
    /// The WhatsApp Business Account ID (or business portfolio ID for
    /// account-level events); not an id of the entry itself.
    pub id: String,

    /// When the notification was sent, not when the change happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Timestamp>,

    #[serde(default)]
    pub changes: Vec<Change>,
}

/// One field-scoped state delta.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct Change {
    /// Discriminates the change class: [`MESSAGES_FIELD`] for messages,
    /// statuses and errors; other values (e.g. `account_update`) for
    /// account-level events.
    pub field: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Change {
    /// Whether this change carries messages, statuses or errors.
    pub fn is_messages(&self) -> bool {
        self.field == MESSAGES_FIELD
    }
}

/// The payload of a [`Change`].
///
/// For `messages` changes at most one of `messages` / `statuses` is normally
/// present. Keys this model does not know (the `event` / `waba_info` of an
/// `account_update`, say) land in [`Value::extra`] untouched.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messaging_product: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Vec<Contact>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<Payload<Message>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<Vec<Payload<Status>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<Payload<ProviderError>>>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Value {
    pub fn contacts(&self) -> &[Contact] {
        self.contacts.as_deref().unwrap_or_default()
    }

    pub fn messages(&self) -> &[Payload<Message>] {
        self.messages.as_deref().unwrap_or_default()
    }

    pub fn statuses(&self) -> &[Payload<Status>] {
        self.statuses.as_deref().unwrap_or_default()
    }

    /// Notification-level errors.
    pub fn errors(&self) -> &[Payload<ProviderError>] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// No contacts, messages, statuses or errors.
    pub fn is_empty(&self) -> bool {
        self.contacts().is_empty()
            && self.messages().is_empty()
            && self.statuses().is_empty()
            && self.errors().is_empty()
    }
}

/// The business phone number that received the notification.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_phone_number: Option<String>,

    /// A business can respond to a message using this ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

/// Profile of the customer who sent a message.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Contact {
    /// The customer's WhatsApp ID. May differ from their phone number.
    #[serde(default)]
    pub wa_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Profile>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Contact {
    pub fn name(&self) -> Option<&str> {
        self.profile.as_ref().map(|profile| profile.name.as_str())
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Profile {
    #[serde(default)]
    pub name: String,
}

/// One inbound message.
///
/// `kind` holds the raw `type` tag; exactly one of the payload fields is
/// expected to match it. Use [`MessageKind::classify`] for a typed view.
/// The payload of a type this model does not know stays in `extra` under
/// its tag.
///
/// [`MessageKind::classify`]: crate::dispatch::MessageKind::classify
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Message {
    /// The sender's phone number.
    #[serde(default)]
    pub from: String,

    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub timestamp: Timestamp,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Present when the message is a reply, was forwarded, or asks about a
    /// catalog product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ReplyContext>,

    /// Errors WhatsApp attached to the message, e.g. for unsupported types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ProviderError>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Payload<Text>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referral: Option<Payload<Referral>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<Payload<System>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Payload<Identity>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<Payload<MediaInfo>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<Payload<MediaInfo>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<Payload<MediaInfo>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<Payload<MediaInfo>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker: Option<Payload<MediaInfo>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Payload<Order>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button: Option<Payload<Button>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Payload<Location>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contacts: Option<Payload<Vec<ContactCard>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<Payload<Reaction>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive: Option<Payload<Interactive>>,

    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Message {
    /// Provider errors attached to this message.
    pub fn errors(&self) -> &[ProviderError] {
        self.errors.as_deref().unwrap_or_default()
    }
}

/// Reply / forward metadata of a [`Message`].
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ReplyContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forwarded: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequently_forwarded: Option<bool>,

    /// Sender of the message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// ID of the message being replied to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Set when the customer asks about a product from a catalog message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_product: Option<ReferredProduct>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ReferredProduct {
    #[serde(default)]
    pub catalog_id: String,
    #[serde(default)]
    pub product_retailer_id: String,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Text {
    #[serde(default)]
    pub body: String,
}

/// Metadata of an image, audio, video, document or sticker.
///
/// Download the bytes with the media `id`; that transport is out of this
/// crate's scope.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct MediaInfo {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,

    /// Documents only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Stickers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub animated: Option<bool>,

    /// Audio only; `true` for voice notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<bool>,
}

/// An emoji reaction to a previous message.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Reaction {
    #[serde(default)]
    pub message_id: String,

    /// Absent when the customer removed their reaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A contact card shared by the customer.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ContactCard {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,

    /// `YYYY-MM-DD`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birthday: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<Email>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<Org>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phones: Option<Vec<Phone>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<Url>>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub street: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Email {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Name {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Org {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Phone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wa_id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Url {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// An order placed from a catalog.
#[doc(alias = "Cart")]
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Order {
    #[serde(default)]
    pub catalog_id: String,

    /// Note sent along with the order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default)]
    pub product_items: Vec<ProductItem>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ProductItem {
    #[serde(default)]
    pub product_retailer_id: String,

    #[serde(deserialize_with = "number_or_string")]
    pub quantity: u64,

    /// Price per unit.
    #[serde(deserialize_with = "number_or_string")]
    pub item_price: f64,

    #[serde(default)]
    pub currency: String,
}

/// A quick-reply button of a template message was tapped.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Button {
    /// Developer-defined payload of the button.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,

    /// Button label.
    #[serde(default)]
    pub text: String,
}

/// Click-to-WhatsApp ad or post the customer came from.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Referral {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// `ad` or `post`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ctwa_clid: Option<String>,
}

/// The customer's answer to an interactive message.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Interactive {
    /// `button_reply`, `list_reply` or `nfm_reply`.
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_reply: Option<ButtonReply>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_reply: Option<ListReply>,

    /// Flow completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfm_reply: Option<FlowReply>,
}

impl Interactive {
    /// The id of the chosen button or list row, whichever was answered.
    pub fn reply_id(&self) -> Option<&str> {
        self.button_reply
            .as_ref()
            .map(|reply| reply.id.as_str())
            .or_else(|| self.list_reply.as_ref().map(|reply| reply.id.as_str()))
    }
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ButtonReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ListReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct FlowReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// The flow's response, JSON encoded in a string.
    #[serde(default)]
    pub response_json: String,
}

/// A system notice, e.g. the customer changed their phone number.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct System {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_wa_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wa_id: Option<String>,
    /// e.g. `customer_changed_number`, `customer_identity_changed`.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
}

/// Security identity of a customer; changes when they reinstall WhatsApp or
/// switch devices.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acknowledged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_timestamp: Option<Timestamp>,
    /// Identifier for the latest identity of the customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// A delivery state transition of a message the business sent.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[non_exhaustive]
pub struct Status {
    /// The message this status is about.
    pub id: String,

    pub status: DeliveryStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,

    /// The customer's WhatsApp ID.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<Conversation>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,

    /// Why delivery failed, for `failed` statuses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ProviderError>>,

    /// Data originally attached to the message when it was sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biz_opaque_callback_data: Option<String>,

    /// Keys this model does not know, e.g. the `type` of payment statuses.
    #[serde(flatten)]
    pub extra: Map<String, Json>,
}

impl Status {
    pub fn errors(&self) -> &[ProviderError] {
        self.errors.as_deref().unwrap_or_default()
    }
}

/// Delivery state of a message.
///
/// A read status implies delivery; WhatsApp may skip the delivered
/// notification when both happen at once.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
    /// Message was deleted by the sender.
    Deleted,
    /// Catalog item in message is unavailable.
    Warning,
    /// Any status not enumerated.
    #[serde(untagged)]
    Other(String),
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Conversation {
    #[serde(default)]
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ConversationOrigin>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_timestamp: Option<Timestamp>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct ConversationOrigin {
    #[serde(rename = "type", default)]
    pub kind: String,
}

#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[non_exhaustive]
pub struct Pricing {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable: Option<bool>,

    /// e.g. `CBP`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing_model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// A provider object decoded on its own.
///
/// Decoding a `Payload` never fails as long as the input is JSON: when the
/// object does not fit `T`, the error is kept instead and only this object
/// is affected. Either way the payload encodes back to exactly the JSON it
/// was decoded from, numbers and unknown keys included.
#[derive(Clone, Debug)]
pub struct Payload<T> {
    raw: Json,
    decoded: Result<T, PayloadError>,
}

impl<T> Payload<T> {
    /// The decoded object, or why it could not be decoded.
    pub fn get(&self) -> Result<&T, &PayloadError> {
        self.decoded.as_ref()
    }

    /// The decoded object, if it could be decoded.
    pub fn ok(&self) -> Option<&T> {
        self.decoded.as_ref().ok()
    }

    /// The JSON as received.
    pub fn raw(&self) -> &Json {
        &self.raw
    }

    /// Looks up a string field of the raw object, e.g. its `id`.
    pub(crate) fn raw_str(&self, key: &str) -> Option<&str> {
        self.raw.get(key).and_then(Json::as_str)
    }
}

impl<T: DeserializeOwned> Payload<T> {
    /// Decodes `raw` as a `T`.
    pub fn from_json(raw: Json) -> Self {
        let decoded = T::deserialize(&raw).map_err(PayloadError::from);
        Self { raw, decoded }
    }
}

impl<T> PartialEq for Payload<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Serialize for Payload<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Payload<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Json::deserialize(deserializer).map(Self::from_json)
    }
}

/// A timestamp as sent by WhatsApp.
///
/// Webhooks carry UNIX seconds, sometimes as a JSON string and sometimes as
/// a number. The original text is kept so a notification encodes back to
/// what was received; [`Timestamp::seconds`] gives the numeric value.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Timestamp {
    raw: String,
    numeric: bool,
}

impl Timestamp {
    /// The raw timestamp in seconds, if it is numeric.
    pub fn seconds(&self) -> Option<i64> {
        self.raw.parse().ok()
    }

    /// The timestamp exactly as received.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl From<i64> for Timestamp {
    fn from(seconds: i64) -> Self {
        Self {
            raw: seconds.to_string(),
            numeric: true,
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.seconds() {
            Some(seconds) if self.numeric => serializer.serialize_i64(seconds),
            _ => serializer.serialize_str(&self.raw),
        }
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(seconds) => seconds.into(),
            Raw::Text(raw) => Self {
                raw,
                numeric: false,
            },
        })
    }
}

// Catalog numbers arrive as JSON numbers or as strings depending on the
// message source.
fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr + Deserialize<'de>,
    T::Err: std::fmt::Display,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        Number(T),
        Text(String),
    }

    match Raw::<T>::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(raw) => raw.trim().parse().map_err(|err| {
            <D::Error as serde::de::Error>::custom(format!("invalid number '{raw}': {err}"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeErrorKind;

    // We only test for successful deserialization
    macro_rules! test_payload {
        (|$title:ident|: $($payload:tt)*) => {
            #[test]
            fn $title() {
                Notification::from_str(stringify!($($payload)*)).unwrap();
            }
        }
    }

    test_payload! {
        |unsupported_message|: {
          "object": "whatsapp_business_account",
          "entry": [{
            "id": "WHATSAPP_BUSINESS_ACCOUNT_ID",
            "changes": [{
              "value": {
                "messaging_product": "whatsapp",
                "metadata": {
                  "display_phone_number": "PHONE_NUMBER",
                  "phone_number_id": "PHONE_NUMBER_ID"
                },
                "contacts": [{ "profile": { "name": "NAME" }, "wa_id": "WHATSAPP_ID" }],
                "messages": [{
                  "from": "PHONE_NUMBER",
                  "id": "wamid.ID",
                  "timestamp": "1731617831",
                  "errors": [{
                    "code": 131051,
                    "details": "Message type is not currently supported",
                    "title": "Unsupported message type"
                  }],
                  "type": "unknown"
                }]
              },
              "field": "messages"
            }]
          }]
        }
    }

    test_payload! {
        |account_update|: {
          "entry": [{
            "id": "35602282435505",
            "time": 1731617831,
            "changes": [{
              "value": {
                "event": "PARTNER_ADDED",
                "waba_info": {
                  "waba_id": "495709166956424",
                  "owner_business_id": "942647313864044"
                }
              },
              "field": "account_update"
            }]
          }],
          "object": "whatsapp_business_account"
        }
    }

    test_payload! {
        |order_message|: {
          "object": "whatsapp_business_account",
          "entry": [{
            "id": "8856996819413533",
            "changes": [{
              "value": {
                "messaging_product": "whatsapp",
                "metadata": {
                  "display_phone_number": "16505553333",
                  "phone_number_id": "phone-number-id"
                },
                "contacts": [{ "profile": { "name": "Kerry Fisher" }, "wa_id": "16315551234" }],
                "messages": [{
                  "from": "16315551234",
                  "id": "wamid.ABGGFlCGg0cvAgo6cHbBhfK5760V",
                  "order": {
                    "catalog_id": "the-catalog_id",
                    "product_items": [
                      { "product_retailer_id": "SKU-1", "quantity": 50, "item_price": 308, "currency": "USD" },
                      { "product_retailer_id": "SKU-2", "quantity": "2", "item_price": "12.5", "currency": "USD" }
                    ],
                    "text": "text-message-sent-along-with-the-order"
                  },
                  "context": { "from": "16315551234", "id": "wamid.gBGGFlaCGg0xcvAdgmZ9plHrf2Mh-o" },
                  "timestamp": 1603069091,
                  "type": "order"
                }]
              },
              "field": "messages"
            }]
          }]
        }
    }

    test_payload! {
        |interactive_list_reply|: {
          "object": "whatsapp_business_account",
          "entry": [{
            "id": "WHATSAPP_BUSINESS_ACCOUNT_ID",
            "changes": [{
              "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "PHONE_NUMBER", "phone_number_id": "PHONE_NUMBER_ID" },
                "contacts": [{ "profile": { "name": "NAME" }, "wa_id": "PHONE_NUMBER_ID" }],
                "messages": [{
                  "from": "PHONE_NUMBER_ID",
                  "id": "wamid.ID",
                  "timestamp": "178999000",
                  "interactive": {
                    "list_reply": { "id": "list_reply_id", "title": "list_reply_title", "description": "list_reply_description" },
                    "type": "list_reply"
                  },
                  "type": "interactive"
                }]
              },
              "field": "messages"
            }]
          }]
        }
    }

    test_payload! {
        |contacts_message|: {
          "object": "whatsapp_business_account",
          "entry": [{
            "id": "WHATSAPP_BUSINESS_ACCOUNT_ID",
            "changes": [{
              "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "PHONE_NUMBER", "phone_number_id": "PHONE_NUMBER_ID" },
                "contacts": [{ "profile": { "name": "NAME" }, "wa_id": "WHATSAPP_ID" }],
                "messages": [{
                  "from": "PHONE_NUMBER",
                  "id": "wamid.ID",
                  "timestamp": "1694431200",
                  "contacts": [{
                    "addresses": [{ "city": "Menlo Park", "country": "United States", "type": "WORK" }],
                    "birthday": "2012-08-18",
                    "emails": [{ "email": "bjohnson@example.com", "type": "WORK" }],
                    "name": { "formatted_name": "Barbara J. Johnson", "first_name": "Barbara" },
                    "org": { "company": "Example Inc", "title": "Manager" },
                    "phones": [{ "phone": "+1 (940) 555-1234", "wa_id": "19405551234", "type": "WORK" }],
                    "urls": [{ "url": "https://www.example.com", "type": "WORK" }]
                  }],
                  "type": "contacts"
                }]
              },
              "field": "messages"
            }]
          }]
        }
    }

    test_payload! {
        |status_failed|: {
          "object": "whatsapp_business_account",
          "entry": [{
            "id": "WHATSAPP_BUSINESS_ACCOUNT_ID",
            "changes": [{
              "value": {
                "messaging_product": "whatsapp",
                "metadata": { "display_phone_number": "BUSINESS_PHONE_NUMBER", "phone_number_id": "BUSINESS_PHONE_NUMBER_ID" },
                "statuses": [{
                  "id": "WHATSAPP_MESSAGE_ID",
                  "status": "failed",
                  "timestamp": "12999990",
                  "recipient_id": "WHATSAPP_USER_PHONE_NUMBER",
                  "errors": [{
                    "code": 131050,
                    "title": "Unable to deliver the message. This recipient has chosen to stop receiving marketing messages on WhatsApp from your business"
                  }]
                }]
              },
              "field": "messages"
            }]
          }]
        }
    }

    const TEXT: &str = r#"{
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "ACC1",
            "time": 1700000000,
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "phone_number_id": "PNI" },
                    "contacts": [{ "profile": { "name": "Ann" }, "wa_id": "255700000000" }],
                    "messages": [{
                        "from": "255700000000",
                        "id": "wamid.X",
                        "timestamp": "1690000000",
                        "type": "text",
                        "text": { "body": "hi" }
                    }]
                }
            }]
        }]
    }"#;

    #[test]
    fn decodes_text_notification() {
        let notification = Notification::from_str(TEXT).unwrap();

        assert_eq!(notification.object, WHATSAPP_BUSINESS_ACCOUNT);
        let entry = &notification.entries[0];
        assert_eq!(entry.id, "ACC1");
        assert_eq!(entry.time.as_ref().and_then(Timestamp::seconds), Some(1700000000));

        let change = &entry.changes[0];
        assert!(change.is_messages());
        let value = change.value.as_ref().unwrap();
        assert_eq!(
            value.metadata.as_ref().unwrap().phone_number_id.as_deref(),
            Some("PNI")
        );
        assert_eq!(value.contacts()[0].name(), Some("Ann"));

        let message = value.messages()[0].get().unwrap();
        assert_eq!(message.kind.as_deref(), Some("text"));
        assert_eq!(message.text.as_ref().and_then(Payload::ok).unwrap().body, "hi");
        assert_eq!(message.timestamp.as_str(), "1690000000");
        assert_eq!(message.timestamp.seconds(), Some(1690000000));
        assert!(value.statuses().is_empty());
    }

    #[test]
    fn round_trip_preserves_fields() {
        let original: Json = serde_json::from_str(TEXT).unwrap();
        let notification = Notification::from_str(TEXT).unwrap();
        let encoded = serde_json::to_value(&notification).unwrap();

        assert_eq!(encoded, original);
    }

    #[test]
    fn round_trip_keeps_unknown_change_values() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{
                "id": "35602282435505",
                "time": 1731617831,
                "changes": [{
                    "field": "account_update",
                    "value": {
                        "event": "PARTNER_ADDED",
                        "waba_info": { "waba_id": "495709166956424", "owner_business_id": "942647313864044" }
                    }
                }]
            }]
        }"#;

        let notification = Notification::from_str(raw).unwrap();
        let value = notification.entries[0].changes[0].value.as_ref().unwrap();
        assert_eq!(value.extra["event"], "PARTNER_ADDED");
        assert!(value.is_empty());

        let original: Json = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_value(&notification).unwrap(), original);
    }

    #[test]
    fn unknown_types_and_statuses_are_preserved() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{ "id": "A", "changes": [{ "field": "messages", "value": {
                "messages": [{ "from": "1", "id": "m", "timestamp": "1", "type": "bogus", "bogus": { "x": 1 } }],
                "statuses": [{ "id": "s", "status": "queued", "type": "payment" }]
            }}]}]
        }"#;

        let notification = Notification::from_str(raw).unwrap();
        let value = notification.entries[0].changes[0].value.as_ref().unwrap();
        let message = value.messages()[0].ok().unwrap();
        assert_eq!(message.kind.as_deref(), Some("bogus"));
        assert_eq!(message.extra["bogus"]["x"], 1);

        let status = value.statuses()[0].ok().unwrap();
        assert_eq!(status.status, DeliveryStatus::Other("queued".into()));
        assert_eq!(status.extra["type"], "payment");

        let original: Json = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_value(&notification).unwrap(), original);
    }

    #[test]
    fn round_trip_keeps_number_forms() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{ "id": "A", "changes": [{ "field": "messages", "value": {
                "metadata": { "phone_number_id": "PNI", "region": "EU" },
                "contacts": [{ "wa_id": "1", "profile": { "name": "Ann" }, "country": "NG" }],
                "messages": [
                    { "from": "1", "id": "m1", "timestamp": 1, "type": "location",
                      "location": { "latitude": 38, "longitude": -9 } },
                    { "from": "1", "id": "m2", "timestamp": "2", "type": "order",
                      "order": { "catalog_id": "C", "product_items": [
                        { "product_retailer_id": "SKU", "quantity": "2", "item_price": "12.50", "currency": "USD" }
                      ] } }
                ]
            }}]}]
        }"#;

        let notification = Notification::from_str(raw).unwrap();
        let value = notification.entries[0].changes[0].value.as_ref().unwrap();
        let location = value.messages()[0].ok().unwrap().location.as_ref().unwrap();
        assert_eq!(location.ok().unwrap().latitude, 38.0);
        assert_eq!(value.metadata.as_ref().unwrap().extra["region"], "EU");
        assert_eq!(value.contacts()[0].extra["country"], "NG");

        let original: Json = serde_json::from_str(raw).unwrap();
        let encoded = serde_json::to_value(&notification).unwrap();
        assert_eq!(encoded["entry"][0]["changes"][0]["value"]["messages"][0]["location"]["latitude"], 38);
        assert_eq!(encoded, original);
    }

    #[test]
    fn malformed_items_only_fail_themselves() {
        let raw = r#"{
            "object": "whatsapp_business_account",
            "entry": [{ "id": "A", "changes": [{ "field": "messages", "value": {
                "messages": [
                    { "from": "1", "id": "m1", "timestamp": "1", "type": "text", "text": { "body": "hi" } },
                    { "from": "1", "id": "m2", "timestamp": "1", "type": "location", "location": { "name": "Lagos" } },
                    { "from": 5, "id": "m3", "type": "text" }
                ],
                "statuses": [
                    { "id": "s1" },
                    { "id": "s2", "status": "read" }
                ]
            }}]}]
        }"#;

        let notification = Notification::from_str(raw).unwrap();
        let value = notification.entries[0].changes[0].value.as_ref().unwrap();
        let messages = value.messages();

        assert!(messages[0].ok().is_some());
        let location = messages[1].ok().unwrap().location.as_ref().unwrap();
        assert!(location.get().unwrap_err().to_string().contains("latitude"));
        assert!(messages[2].get().is_err());
        assert_eq!(messages[2].raw_str("id"), Some("m3"));

        assert!(value.statuses()[0].get().is_err());
        assert_eq!(value.statuses()[1].ok().unwrap().status, DeliveryStatus::Read);

        let original: Json = serde_json::from_str(raw).unwrap();
        assert_eq!(serde_json::to_value(&notification).unwrap(), original);
    }

    #[test]
    fn catalog_numbers_accept_strings() {
        let item: ProductItem = serde_json::from_str(
            r#"{"product_retailer_id":"SKU","quantity":"3","item_price":"9.99","currency":"EUR"}"#,
        )
        .unwrap();
        assert_eq!(item.quantity, 3);
        assert_eq!(item.item_price, 9.99);
    }

    #[test]
    fn empty_entry_list_is_inert() {
        let notification =
            Notification::from_str(r#"{"object":"whatsapp_business_account","entry":[]}"#).unwrap();
        assert!(notification.is_inert());
    }

    #[test]
    fn rejects_malformed_bodies() {
        let err = Notification::from_slice(b"{\"object\": \"whatsapp_business_account\", ").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Truncated);

        let err = Notification::from_slice(b"not json").unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Syntax);

        let err = Notification::from_slice(br#"{"entry": []}"#).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Shape);

        let err = Notification::from_slice(br#"{"object": "whatsapp_business_account"}"#).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Shape);
    }
}
