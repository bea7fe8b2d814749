//! Notification dispatcher
//!
//! Walks a decoded [`Notification`] and calls the matching hook for every
//! item. For each `messages` change the order is fixed:
//!
//! 1. every status, through [`NotificationHooks::on_message_status_change`]
//! 2. every notification-level error, through
//!    [`NotificationHooks::on_notification_error`]
//! 3. every message, through [`NotificationHooks::on_message_received`]
//!
//! Other changes go to [`NotificationHooks::on_unhandled_change`].
//!
//! A failing hook never stops the walk. Neither does an item too malformed
//! to decode: it is recorded as a failure in place of its hook call.
//! Failures are collected with the location of the item that caused them and
//! returned together as a [`DispatchError`].

use std::slice;

use tracing::{debug, warn};

use crate::{
    error::{
        ClassificationError, DispatchError, HookResult, Item, ItemFailure, ItemLocation,
        PayloadError,
    },
    event::{
        Button, Contact, ContactCard, Identity, Interactive, Location, MediaInfo, Message,
        Notification, Order, Payload, Reaction, Referral, ReferredProduct, System, Text, Value,
        WHATSAPP_BUSINESS_ACCOUNT,
    },
    hooks::{MessageContext, MessageHooks, NotificationContext, NotificationHooks, RequestMeta},
};

/// What a message is, decided from its `type` tag and payload.
///
/// Closed on purpose: [`MessageHooks::on_message`] matches it exhaustively,
/// so a new kind cannot be added without deciding where it goes.
#[derive(Clone, Copy, Debug)]
pub enum MessageKind<'a> {
    Text(&'a Text),
    /// Text sent from a click-to-WhatsApp ad or post.
    Referral {
        text: &'a Text,
        referral: &'a Referral,
    },
    /// Text asking about a catalog product.
    ProductEnquiry {
        text: &'a Text,
        product: &'a ReferredProduct,
    },
    /// A system notice carrying the customer's new identity.
    CustomerIdChange {
        system: Option<&'a System>,
        identity: &'a Identity,
    },
    System(&'a System),
    Image(&'a MediaInfo),
    Audio(&'a MediaInfo),
    Video(&'a MediaInfo),
    Document(&'a MediaInfo),
    Sticker(&'a MediaInfo),
    Order(&'a Order),
    Button(&'a Button),
    Location(&'a Location),
    Contacts(&'a [ContactCard]),
    Reaction(&'a Reaction),
    Interactive(&'a Interactive),
}

impl<'a> MessageKind<'a> {
    /// Classifies `message`.
    ///
    /// # Errors
    /// - [`ClassificationError::MissingType`] if there is no `type` tag.
    /// - [`ClassificationError::UnknownType`] if the tag is not recognized,
    ///   including WhatsApp's own `unknown` and `unsupported`.
    /// - [`ClassificationError::MissingPayload`] if the tag is recognized but
    ///   the matching payload is absent.
    /// - [`ClassificationError::InvalidPayload`] if the payload, or a referral
    ///   or identity riding along, does not have the expected shape.
    pub fn classify(message: &'a Message) -> Result<Self, ClassificationError> {
        let tag = message
            .kind
            .as_deref()
            .ok_or(ClassificationError::MissingType)?;

        let kind = match tag {
            "text" => {
                let text = payload(message.text.as_ref(), "text")?;
                let referral = optional(message.referral.as_ref(), "text")?;
                let product = message
                    .context
                    .as_ref()
                    .and_then(|context| context.referred_product.as_ref());

                match (referral, product) {
                    (Some(referral), _) => Self::Referral { text, referral },
                    (None, Some(product)) => Self::ProductEnquiry { text, product },
                    (None, None) => Self::Text(text),
                }
            }
            "system" => {
                let identity = optional(message.identity.as_ref(), "system")?;
                let system = optional(message.system.as_ref(), "system")?;
                match (identity, system) {
                    (Some(identity), system) => Self::CustomerIdChange { system, identity },
                    (None, Some(system)) => Self::System(system),
                    (None, None) => {
                        return Err(ClassificationError::MissingPayload { kind: "system" })
                    }
                }
            }
            "image" => Self::Image(payload(message.image.as_ref(), "image")?),
            "audio" => Self::Audio(payload(message.audio.as_ref(), "audio")?),
            "video" => Self::Video(payload(message.video.as_ref(), "video")?),
            "document" => Self::Document(payload(message.document.as_ref(), "document")?),
            "sticker" => Self::Sticker(payload(message.sticker.as_ref(), "sticker")?),
            "order" => Self::Order(payload(message.order.as_ref(), "order")?),
            "button" => Self::Button(payload(message.button.as_ref(), "button")?),
            "location" => Self::Location(payload(message.location.as_ref(), "location")?),
            "contacts" => {
                Self::Contacts(payload(message.contacts.as_ref(), "contacts")?.as_slice())
            }
            "reaction" => Self::Reaction(payload(message.reaction.as_ref(), "reaction")?),
            "interactive" => {
                Self::Interactive(payload(message.interactive.as_ref(), "interactive")?)
            }
            other => return Err(ClassificationError::UnknownType(other.to_owned())),
        };

        Ok(kind)
    }

    /// A stable, lowercase name for the kind, for logs and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Referral { .. } => "referral",
            Self::ProductEnquiry { .. } => "product_enquiry",
            Self::CustomerIdChange { .. } => "customer_id_change",
            Self::System(_) => "system",
            Self::Image(_) => "image",
            Self::Audio(_) => "audio",
            Self::Video(_) => "video",
            Self::Document(_) => "document",
            Self::Sticker(_) => "sticker",
            Self::Order(_) => "order",
            Self::Button(_) => "button",
            Self::Location(_) => "location",
            Self::Contacts(_) => "contacts",
            Self::Reaction(_) => "reaction",
            Self::Interactive(_) => "interactive",
        }
    }
}

fn payload<'a, T>(
    value: Option<&'a Payload<T>>,
    kind: &'static str,
) -> Result<&'a T, ClassificationError> {
    optional(value, kind)?.ok_or(ClassificationError::MissingPayload { kind })
}

fn optional<'a, T>(
    value: Option<&'a Payload<T>>,
    kind: &'static str,
) -> Result<Option<&'a T>, ClassificationError> {
    value
        .map(|value| {
            value
                .get()
                .map_err(|source| ClassificationError::InvalidPayload {
                    kind,
                    source: source.clone(),
                })
        })
        .transpose()
}

/// Dispatches every item of `notification` to `hooks` and `message_hooks`.
///
/// # Errors
/// Returns a [`DispatchError`] listing every item that failed. All items are
/// dispatched regardless.
pub async fn dispatch<H, M>(
    notification: &Notification,
    request: &RequestMeta,
    hooks: &H,
    message_hooks: &M,
) -> Result<(), DispatchError>
where
    H: NotificationHooks,
    M: MessageHooks,
{
    let mut failures = Vec::new();
    dispatch_into(notification, request, hooks, message_hooks, &mut failures).await;
    DispatchError::from_failures(failures)
}

/// Like [`dispatch`], but appends failures to `failures` as they happen.
///
/// Failures recorded before the future is dropped stay in `failures`, which
/// lets a caller that gives up on a slow dispatch still report them.
pub async fn dispatch_into<H, M>(
    notification: &Notification,
    request: &RequestMeta,
    hooks: &H,
    message_hooks: &M,
    failures: &mut Vec<ItemFailure>,
) where
    H: NotificationHooks,
    M: MessageHooks,
{
    if notification.object != WHATSAPP_BUSINESS_ACCOUNT {
        warn!(object = %notification.object, "unexpected notification object");
    }

    for (entry_index, entry) in notification.entries.iter().enumerate() {
        for (change_index, change) in entry.changes.iter().enumerate() {
            let value = change.value.as_ref();
            let nctx = NotificationContext {
                account_id: &entry.id,
                entry_time: entry.time.as_ref(),
                field: &change.field,
                messaging_product: value.and_then(|value| value.messaging_product.as_deref()),
                metadata: value.and_then(|value| value.metadata.as_ref()),
                contacts: value.map(Value::contacts).unwrap_or_default(),
                request,
            };

            if !change.is_messages() {
                debug!(field = %change.field, "routing unhandled change");
                let result = hooks.on_unhandled_change(&nctx, change).await;
                record(
                    failures,
                    locate(entry_index, change_index, Item::Change {
                        field: change.field.clone(),
                    }),
                    result,
                );
                continue;
            }

            let Some(value) = value else {
                continue;
            };

            for status in value.statuses() {
                let id = status.raw_str("id").unwrap_or_default().to_owned();
                let location = locate(entry_index, change_index, Item::Status { id });
                let result = match status.get() {
                    Ok(status) => {
                        debug!(id = %status.id, status = ?status.status, "routing status");
                        hooks.on_message_status_change(&nctx, status).await
                    }
                    Err(err) => undecodable(err),
                };
                record(failures, location, result);
            }

            for error in value.errors() {
                let code = error.raw().get("code").and_then(|code| code.as_i64());
                let location = locate(entry_index, change_index, Item::NotificationError {
                    code: code.unwrap_or_default(),
                });
                let result = match error.get() {
                    Ok(error) => {
                        debug!(code = error.code, "routing notification error");
                        hooks.on_notification_error(&nctx, error).await
                    }
                    Err(err) => undecodable(err),
                };
                record(failures, location, result);
            }

            for message in value.messages() {
                let id = message.raw_str("id").unwrap_or_default().to_owned();
                let location = locate(entry_index, change_index, Item::Message { id });
                let result = match message.get() {
                    Ok(message) => {
                        debug!(id = %message.id, kind = ?message.kind, "routing message");
                        hooks
                            .on_message_received(&nctx, message, message_hooks)
                            .await
                    }
                    Err(err) => undecodable(err),
                };
                record(failures, location, result);
            }
        }
    }
}

/// Routes one message to `message_hooks`.
///
/// A message WhatsApp attached errors to goes to
/// [`MessageHooks::on_message_errors`] and nowhere else. Otherwise it is
/// classified and handed to [`MessageHooks::on_message`], or to
/// [`MessageHooks::on_unknown_message`] when classification fails.
pub async fn route_message<M: MessageHooks>(
    nctx: &NotificationContext<'_>,
    message: &Message,
    message_hooks: &M,
) -> HookResult {
    let mctx = MessageContext {
        message,
        contact: sender(nctx.contacts, &message.from),
    };

    if !message.errors().is_empty() {
        return message_hooks
            .on_message_errors(nctx, &mctx, message.errors())
            .await;
    }

    match MessageKind::classify(message) {
        Ok(kind) => message_hooks.on_message(nctx, &mctx, kind).await,
        Err(err) => {
            debug!(id = %message.id, error = %err, "message not classified");
            message_hooks
                .on_unknown_message(nctx, &mctx, slice::from_ref(&err))
                .await
        }
    }
}

// The sender is the contact whose wa_id matches; a lone contact is assumed to
// be the sender when ids are formatted differently.
fn sender<'a>(contacts: &'a [Contact], from: &str) -> Option<&'a Contact> {
    contacts
        .iter()
        .find(|contact| contact.wa_id == from)
        .or(match contacts {
            [only] => Some(only),
            _ => None,
        })
}

fn locate(entry: usize, change: usize, item: Item) -> ItemLocation {
    ItemLocation {
        entry,
        change,
        item,
    }
}

fn undecodable(err: &PayloadError) -> HookResult {
    Err(err.clone().into())
}

fn record(failures: &mut Vec<ItemFailure>, location: ItemLocation, result: HookResult) {
    if let Err(source) = result {
        warn!(%location, error = %source, "hook failed");
        failures.push(ItemFailure { location, source });
    }
}
