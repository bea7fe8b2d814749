//! A webhook listener that logs everything it receives and echoes text
//! messages back when an access token is configured.
//!
//! ```sh
//! WHATSAPP_WEBHOOK_ADDR=0.0.0.0:8080 \
//! WHATSAPP_VERIFY_TOKEN=my-token \
//! WHATSAPP_APP_SECRET=my-secret \
//! WHATSAPP_ACCESS_TOKEN=EAAD... \
//! RUST_LOG=info,whatsapp_webhooks=debug \
//!     cargo run --example listener
//! ```

use std::env;

use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use whatsapp_webhooks::{
    client::{Client, SendNotification},
    error::{ClassificationError, Error, ProviderError},
    event::{Interactive, Location, MediaInfo, Reaction, Status, Text},
    hooks::{MessageContext, MessageHooks, NotificationContext, NotificationHooks},
    middleware, HookResult, ServerBuilder,
};

struct Notifications;

impl NotificationHooks for Notifications {
    async fn on_message_status_change(
        &self,
        nctx: &NotificationContext<'_>,
        status: &Status,
    ) -> HookResult {
        info!(
            account = nctx.account_id(),
            message = %status.id,
            status = ?status.status,
            "status changed"
        );
        Ok(())
    }

    async fn on_notification_error(
        &self,
        nctx: &NotificationContext<'_>,
        error: &ProviderError,
    ) -> HookResult {
        warn!(account = nctx.account_id(), %error, "platform error");
        Ok(())
    }

    async fn handle_error(&self, error: Option<&Error>) {
        if let Some(error) = error {
            warn!(%error, "webhook delivery failed");
        }
    }
}

struct Messages {
    replies: Option<Client>,
}

impl MessageHooks for Messages {
    async fn on_text(
        &self,
        nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        text: &Text,
    ) -> HookResult {
        let name = mctx.contact().and_then(|contact| contact.name()).unwrap_or("someone");
        info!(from = mctx.from(), %name, body = %text.body, "text received");

        if let Some(client) = &self.replies {
            let reply = json!({
                "type": "text",
                "text": { "body": format!("You said: {}", text.body) },
                "context": { "message_id": mctx.id() }
            });
            let sent = client.send(mctx.from(), &reply).await?;
            info!(
                phone_number_id = nctx.phone_number_id().unwrap_or("-"),
                reply = ?sent.messages.first().map(|message| &message.id),
                "replied"
            );
        }
        Ok(())
    }

    async fn on_image(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        image: &MediaInfo,
    ) -> HookResult {
        info!(from = mctx.from(), media = %image.id, caption = ?image.caption, "image received");
        Ok(())
    }

    async fn on_location(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        location: &Location,
    ) -> HookResult {
        info!(
            from = mctx.from(),
            latitude = location.latitude,
            longitude = location.longitude,
            "location received"
        );
        Ok(())
    }

    async fn on_reaction(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        reaction: &Reaction,
    ) -> HookResult {
        info!(from = mctx.from(), to = %reaction.message_id, emoji = ?reaction.emoji, "reaction");
        Ok(())
    }

    async fn on_interactive(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        interactive: &Interactive,
    ) -> HookResult {
        info!(from = mctx.from(), choice = ?interactive.reply_id(), "interactive reply");
        Ok(())
    }

    async fn on_unknown_message(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        errors: &[ClassificationError],
    ) -> HookResult {
        warn!(message = mctx.id(), ?errors, "could not classify message");
        Ok(())
    }

    async fn on_message_errors(
        &self,
        _nctx: &NotificationContext<'_>,
        mctx: &MessageContext<'_>,
        errors: &[ProviderError],
    ) -> HookResult {
        for error in errors {
            warn!(message = mctx.id(), %error, "message carried an error");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let replies = match env::var("WHATSAPP_ACCESS_TOKEN") {
        Ok(token) => {
            let phone_number_id = env::var("WHATSAPP_PHONE_NUMBER_ID")?;
            Some(Client::new(token, phone_number_id)?)
        }
        Err(_) => None,
    };

    let server = ServerBuilder::from_env()?
        .middleware(middleware::start_time())
        .middleware(middleware::end_time())
        .shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(%err, "failed to listen for ctrl-c");
            }
        })
        .build();

    info!(endpoint = %server.endpoint(), route = server.route(), "starting listener");
    server.serve_with(Notifications, Messages { replies }).await?;

    Ok(())
}
