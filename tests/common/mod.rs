use std::sync::{Arc, Mutex};

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;
use whatsapp_webhooks::{
    error::{ClassificationError, Error, ProviderError},
    event::{Location, Status, Text},
    hooks::{MessageContext, MessageHooks, NotificationContext, NotificationHooks},
    HookResult,
};

// --- CONSTANTS ---
#[allow(dead_code)]
pub const APP_SECRET: &str = "a1b2c3d4e5f6";
#[allow(dead_code)]
pub const VERIFY_TOKEN: &str = "very_secret_token";
#[allow(dead_code)]
pub const ACCOUNT_ID: &str = "987654321098765";
#[allow(dead_code)]
pub const PHONE_ID: &str = "phone_id_222";
#[allow(dead_code)]
pub const ACCESS_TOKEN: &str = "EAAD...";
#[allow(dead_code)]
pub const RECIPIENT_ID: &str = "16505551234";

// --- PAYLOADS ---

/// A `messages` notification carrying `messages`, from [`RECIPIENT_ID`].
#[allow(dead_code)]
pub fn notification(messages: Value) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": ACCOUNT_ID,
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": {
                        "display_phone_number": "15550001111",
                        "phone_number_id": PHONE_ID
                    },
                    "contacts": [{ "profile": { "name": "Kerry Fisher" }, "wa_id": RECIPIENT_ID }],
                    "messages": messages
                }
            }]
        }]
    })
}

#[allow(dead_code)]
pub fn text_notification(body: &str) -> Value {
    notification(json!([{
        "from": RECIPIENT_ID,
        "id": "wamid.TEXT",
        "timestamp": "1690000000",
        "type": "text",
        "text": { "body": body }
    }]))
}

#[allow(dead_code)]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

// --- HOOKS ---

/// Records every hook call as a short string.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct Recorder {
    calls: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl NotificationHooks for Recorder {
    async fn on_message_status_change(
        &self,
        _nctx: &NotificationContext<'_>,
        status: &Status,
    ) -> HookResult {
        self.push(format!("status:{}:{:?}", status.id, status.status));
        Ok(())
    }

    async fn on_notification_error(
        &self,
        _nctx: &NotificationContext<'_>,
        error: &ProviderError,
    ) -> HookResult {
        self.push(format!("notification_error:{}", error.code));
        Ok(())
    }

    async fn handle_error(&self, error: Option<&Error>) {
        let call = match error {
            Some(error) if error.is_decode() => "handle_error:decode".to_owned(),
            Some(Error::Signature(_)) => "handle_error:signature".to_owned(),
            Some(error) => format!("handle_error:{error}"),
            None => "handle_error:none".to_owned(),
        };
        self.push(call);
    }
}

impl MessageHooks for Recorder {
    async fn on_text(
        &self,
        nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        text: &Text,
    ) -> HookResult {
        let started = if nctx.request().started_at().is_some() {
            "started"
        } else {
            "unstamped"
        };
        self.push(format!(
            "text:{}:{}:{}:{}:{}",
            nctx.account_id(),
            nctx.phone_number_id().unwrap_or("-"),
            mctx.from(),
            text.body,
            started
        ));
        Ok(())
    }

    async fn on_location(
        &self,
        _nctx: &NotificationContext<'_>,
        _mctx: &MessageContext<'_>,
        location: &Location,
    ) -> HookResult {
        self.push(format!("location:{}:{}", location.latitude, location.longitude));
        Ok(())
    }

    async fn on_unknown_message(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        errors: &[ClassificationError],
    ) -> HookResult {
        let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
        self.push(format!("unknown:{}:{}", mctx.id(), reasons.join(",")));
        Ok(())
    }

    async fn on_message_errors(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        errors: &[ProviderError],
    ) -> HookResult {
        self.push(format!("message_errors:{}:{}", mctx.id(), errors[0].code));
        Ok(())
    }
}
