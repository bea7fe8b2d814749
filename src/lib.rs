#![deny(clippy::future_not_send)]
#![deny(clippy::large_enum_variant)]

//! # whatsapp_webhooks
//!
//! Receive WhatsApp Business Platform webhooks with precisely typed hooks.
//!
//! WhatsApp pushes every inbound message, delivery status and platform error
//! to your webhook as one JSON notification. This crate decodes that
//! notification, classifies every item in it and calls the one hook that
//! matches, so your code deals in `Text`, `Location` or `Status` values
//! rather than raw JSON.
//!
//! ## ✨ Features
//!
//! - **Event Model** ([`event`]): typed, lossless notification structures.
//! - **Hooks** ([`hooks`]): [`NotificationHooks`] for statuses and errors,
//!   [`MessageHooks`] with one method per message kind. Override only what
//!   you need.
//! - **Dispatcher** ([`dispatch`]): deterministic routing; one failing hook
//!   never stops the others.
//! - **Middleware** ([`middleware`]): composable handler wrappers, with
//!   start/end timestamps built in.
//! - **Listener & Server** ([`listener`], [`server`]): signature validation,
//!   the verification handshake, timeouts and graceful shutdown.
//! - **Client** ([`client`]): a minimal "send a message back" capability.
//!
//! ## 🚀 Example
//!
//! ```rust,no_run
//! use whatsapp_webhooks::{
//!     event::Text,
//!     hooks::{MessageContext, MessageHooks, NotificationContext, NotificationHooks},
//!     Error, HookResult, Server,
//! };
//!
//! struct Notifications;
//!
//! impl NotificationHooks for Notifications {
//!     async fn handle_error(&self, error: Option<&Error>) {
//!         eprintln!("webhook failed: {error:?}");
//!     }
//! }
//!
//! struct Messages;
//!
//! impl MessageHooks for Messages {
//!     async fn on_text(
//!         &self,
//!         _nctx: &NotificationContext<'_>,
//!         mctx: &MessageContext<'_>,
//!         text: &Text,
//!     ) -> HookResult {
//!         println!("{} wrote: {}", mctx.from(), text.body);
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! Server::builder()
//!     .endpoint("0.0.0.0:8080".parse()?)
//!     .verify_token("MY_VERIFY_TOKEN")
//!     .verify_payload("MY_APP_SECRET")
//!     .build()
//!     .serve_with(Notifications, Messages)
//!     .await?;
//! # Ok(()) }
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod hooks;
pub mod listener;
pub mod middleware;
pub mod server;

pub use client::{Client, SendNotification};
pub use dispatch::{dispatch, dispatch_into, MessageKind};
pub use error::{BoxError, Error, HookResult};
pub use event::Notification;
pub use hooks::{MessageHooks, NotificationHooks};
pub use listener::EventListener;
pub use middleware::{wrap, Middleware, Next};
pub use server::{Server, ServerBuilder};
