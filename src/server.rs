//! WhatsApp webhook server
//!
//! A managed axum server for the listener pipeline. It binds the endpoint,
//! mounts the [`EventListener`] (wrapped in your middlewares) on the webhook
//! route and runs until the shutdown signal resolves.
//!
//! For bring-your-own-server integrations, use [`crate::listener`] directly
//! or mount [`Server::router`] into your own router.
//!
//! # Key Components
//! - [`ServerBuilder`]: endpoint, route, shutdown signal, security and
//!   middlewares.
//! - [`Server`]: the configured server, ready to run.
//! - [`Server::serve`] / [`Server::serve_with`]: run it with your hooks.
//!
//! # Example
//! ```rust,no_run
//! use whatsapp_webhooks::{
//!     event::Status,
//!     hooks::{NotificationContext, NotificationHooks},
//!     middleware, HookResult, Server,
//! };
//!
//! struct MyHooks;
//!
//! impl NotificationHooks for MyHooks {
//!     async fn on_message_status_change(
//!         &self,
//!         _nctx: &NotificationContext<'_>,
//!         status: &Status,
//!     ) -> HookResult {
//!         println!("{status:?}");
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), whatsapp_webhooks::Error> {
//! Server::builder()
//!     .endpoint("0.0.0.0:8080".parse().unwrap())
//!     .verify_token("MY_SECURE_VERIFICATION_TOKEN")
//!     .middleware(middleware::start_time())
//!     .shutdown(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .build()
//!     .serve(MyHooks)
//!     .await
//! # }
//! ```

use std::{
    env,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    pin::Pin,
    time::Duration,
};

use axum::{routing::any, Router};
use tokio::net::TcpListener;

use crate::{
    error::{ConfigError, Error},
    hooks::{MessageHooks, NotificationHooks},
    listener::{AppSecret, EventListenerBuilder},
    middleware::{self, Middleware, Request},
};

// Default Server configuration...
const DEFAULT_ENDPOINT: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
const DEFAULT_ROUTE_PATH: &str = "/webhooks";

const ENV_ADDR: &str = "WHATSAPP_WEBHOOK_ADDR";
const ENV_ROUTE: &str = "WHATSAPP_WEBHOOK_ROUTE";
const ENV_VERIFY_TOKEN: &str = "WHATSAPP_VERIFY_TOKEN";
const ENV_APP_SECRET: &str = "WHATSAPP_APP_SECRET";
const ENV_TIMEOUT_SECS: &str = "WHATSAPP_WEBHOOK_TIMEOUT_SECS";

type Shutdown = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// WhatsApp webhook server
///
/// Create using [`Server::builder()`] or [`Server::new()`].
#[derive(Default)]
pub struct Server {
    pub(crate) config: ServerBuilder,
}

impl Server {
    /// Create a new server with default settings
    pub fn new() -> Self {
        ServerBuilder::new().build()
    }

    /// Create a server builder for custom configuration
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The address the server binds.
    pub fn endpoint(&self) -> SocketAddr {
        self.config.endpoint
    }

    /// The route the listener is mounted on.
    pub fn route(&self) -> &str {
        &self.config.route_path
    }

    /// The webhook route as an axum [`Router`], middlewares applied.
    ///
    /// Useful to merge the webhook into an existing application, or to drive
    /// it in-process in tests.
    pub fn router<H, M>(&self, hooks: H, message_hooks: M) -> Router
    where
        H: NotificationHooks + 'static,
        M: MessageHooks + 'static,
    {
        let listener = self
            .config
            .listener
            .clone()
            .build_with(hooks, message_hooks);
        let next = middleware::wrap(listener.into_next(), &self.config.middlewares);

        Router::new().route(
            &self.config.route_path,
            any(move |req: Request| next.run(req)),
        )
    }

    /// Runs the server with notification hooks only.
    ///
    /// The returned future resolves when the shutdown signal fires, or with an
    /// error if the endpoint cannot be bound.
    pub async fn serve<H>(self, hooks: H) -> Result<(), Error>
    where
        H: NotificationHooks + 'static,
    {
        self.serve_with(hooks, ()).await
    }

    /// Runs the server with notification and message hooks.
    pub async fn serve_with<H, M>(self, hooks: H, message_hooks: M) -> Result<(), Error>
    where
        H: NotificationHooks + 'static,
        M: MessageHooks + 'static,
    {
        let app = self.router(hooks, message_hooks);

        let listener = TcpListener::bind(self.config.endpoint)
            .await
            .map_err(|err| Error::Network(err.into()))?;

        tracing::info!(
            endpoint = %self.config.endpoint,
            route = %self.config.route_path,
            "webhook server listening"
        );

        let served = if let Some(shutdown) = self.config.shutdown {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
        } else {
            axum::serve(listener, app).await
        };

        tracing::info!("webhook server stopped");
        served.map_err(|err| Error::Network(err.into()))
    }
}

/// Builder for creating a [`Server`]
///
/// # Example
/// ```rust
/// use std::time::Duration;
/// use whatsapp_webhooks::Server;
///
/// let server = Server::builder()
///     .endpoint("127.0.0.1:8080".parse().unwrap())
///     .route("/whatsapp")
///     .timeout(Duration::from_secs(10))
///     .build();
/// assert_eq!(server.route(), "/whatsapp");
/// ```
#[must_use]
pub struct ServerBuilder {
    pub(crate) endpoint: SocketAddr,
    pub(crate) route_path: String,
    pub(crate) shutdown: Option<Shutdown>,
    pub(crate) listener: EventListenerBuilder,
    pub(crate) middlewares: Vec<Middleware>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT,
            route_path: DEFAULT_ROUTE_PATH.to_owned(),
            shutdown: None,
            listener: EventListenerBuilder::new(),
            middlewares: Vec::new(),
        }
    }
}

impl ServerBuilder {
    /// Create a new builder with default settings: `127.0.0.1:8080`,
    /// `/webhooks`, no verification, no timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder configured from the environment.
    ///
    /// | Variable | Setting |
    /// |----------|---------|
    /// | `WHATSAPP_WEBHOOK_ADDR` | [`endpoint`](Self::endpoint), e.g. `0.0.0.0:8080` |
    /// | `WHATSAPP_WEBHOOK_ROUTE` | [`route`](Self::route) |
    /// | `WHATSAPP_VERIFY_TOKEN` | [`verify_token`](Self::verify_token) |
    /// | `WHATSAPP_APP_SECRET` | [`verify_payload`](Self::verify_payload) |
    /// | `WHATSAPP_WEBHOOK_TIMEOUT_SECS` | [`timeout`](Self::timeout) |
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// A [`ConfigError`] naming the variable that could not be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut builder = Self::new();

        if let Some(addr) = lookup(ENV_ADDR) {
            let endpoint = addr.trim().parse::<SocketAddr>().map_err(|err| ConfigError {
                var: ENV_ADDR,
                message: format!("'{addr}' is not a socket address: {err}"),
            })?;
            builder = builder.endpoint(endpoint);
        }

        if let Some(route) = lookup(ENV_ROUTE) {
            if !route.starts_with('/') {
                return Err(ConfigError {
                    var: ENV_ROUTE,
                    message: format!("'{route}' must start with '/'"),
                });
            }
            builder = builder.route(route);
        }

        if let Some(token) = lookup(ENV_VERIFY_TOKEN).filter(|token| !token.is_empty()) {
            builder = builder.verify_token(token);
        }

        if let Some(secret) = lookup(ENV_APP_SECRET).filter(|secret| !secret.is_empty()) {
            builder = builder.verify_payload(secret);
        }

        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs = secs.trim().parse::<u64>().map_err(|err| ConfigError {
                var: ENV_TIMEOUT_SECS,
                message: format!("'{secs}' is not a number of seconds: {err}"),
            })?;
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(builder)
    }

    /// Sets the network address and port on which the webhook server will listen.
    ///
    /// For example, `127.0.0.1:8080` for local access or `0.0.0.0:8080` to
    /// listen on all available network interfaces.
    pub fn endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = endpoint;
        self
    }

    /// Sets the URL path for the webhook endpoint. The default is `/webhooks`.
    pub fn route<P: Into<String>>(mut self, path: P) -> Self {
        self.route_path = path.into();
        self
    }

    /// Sets a custom `Future` that, when resolved, will trigger the server to
    /// shut down gracefully: in-flight deliveries are finished first.
    ///
    /// # Example
    /// ```rust,no_run
    /// use whatsapp_webhooks::server::ServerBuilder;
    /// use tokio::signal;
    ///
    /// let builder = ServerBuilder::new().shutdown(async {
    ///     signal::ctrl_c().await.expect("failed to listen for ctrl-c");
    /// });
    /// ```
    pub fn shutdown<F>(mut self, shutdown: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::pin(shutdown));
        self
    }

    /// Configures the server to **verify the authenticity of incoming webhook
    /// payloads** using the app secret.
    ///
    /// The `X-Hub-Signature-256` header is checked against an HMAC-SHA256 of
    /// the body; mismatching requests are rejected with `401` before decoding.
    ///
    /// # Security Note 🔒
    /// It is **highly recommended** to enable payload verification in
    /// production.
    pub fn verify_payload(mut self, app_secret: impl Into<AppSecret>) -> Self {
        self.listener = self.listener.verify_payload(app_secret);
        self
    }

    /// Sets a verification token for the webhook endpoint's challenge-response
    /// handshake.
    ///
    /// When the webhook is registered, WhatsApp sends a `GET` with
    /// `hub.verify_token` and `hub.challenge`; the challenge is echoed if the
    /// token matches this one.
    pub fn verify_token(mut self, verify_token: impl Into<String>) -> Self {
        self.listener = self.listener.verify_token(verify_token);
        self
    }

    /// Cancel dispatch of a delivery after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.listener = self.listener.timeout(timeout);
        self
    }

    /// Maximum accepted body size in bytes.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.listener = self.listener.body_limit(limit);
        self
    }

    /// Appends a middleware. The first one added is the outermost.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middlewares.push(middleware);
        self
    }

    /// Builds and returns a [`Server`] instance.
    pub fn build(self) -> Server {
        Server { config: self }
    }
}
