//! Handler middleware
//!
//! A [`Next`] is a type-erased request handler; a [`Middleware`] turns one
//! `Next` into another. [`wrap`] stacks middlewares around a terminal handler
//! so that the **first middleware is the outermost**: it sees the request
//! first and the response last.
//!
//! Middlewares talk to each other and to the listener only through typed
//! request/response extensions, such as [`StartTime`] and [`EndTime`].
//!
//! ```rust
//! use whatsapp_webhooks::middleware::{self, Middleware, Next};
//!
//! let log = Middleware::from_fn(|req, next: Next| async move {
//!     println!("{} {}", req.method(), req.uri());
//!     next.run(req).await
//! });
//!
//! # let handler = Next::new(|_req| async { axum::response::Response::default() });
//! let pipeline = middleware::wrap(handler, &[middleware::start_time(), log, middleware::end_time()]);
//! ```

use std::{fmt, future::Future, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;

pub use axum::{extract::Request, response::Response};

type Handle = dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync;

/// A type-erased, cloneable request handler.
#[derive(Clone)]
pub struct Next(Arc<Handle>);

impl Next {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self(Arc::new(move |req| Box::pin(handler(req))))
    }

    /// Runs the handler.
    pub fn run(&self, req: Request) -> BoxFuture<'static, Response> {
        (self.0)(req)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Next")
    }
}

/// A handler transformer.
#[derive(Clone)]
pub struct Middleware(Arc<dyn Fn(Next) -> Next + Send + Sync>);

impl Middleware {
    /// A middleware from a function that wraps the next handler.
    pub fn new<F>(transform: F) -> Self
    where
        F: Fn(Next) -> Next + Send + Sync + 'static,
    {
        Self(Arc::new(transform))
    }

    /// A middleware from an async function of the request and the rest of the
    /// pipeline.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |next| {
            let f = f.clone();
            Next::new(move |req| f(req, next.clone()))
        })
    }

    /// Wraps `next`.
    pub fn apply(&self, next: Next) -> Next {
        (self.0)(next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Middleware")
    }
}

/// Composes `middlewares` around `handler`, first one outermost.
///
/// `wrap(h, &[a, b])` behaves as `a(b(h))`.
pub fn wrap(handler: Next, middlewares: &[Middleware]) -> Next {
    middlewares
        .iter()
        .rev()
        .fold(handler, |next, middleware| middleware.apply(next))
}

/// When the pipeline started on a request. Request extension.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StartTime(pub SystemTime);

/// When the handler finished a request. Response extension.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct EndTime(pub SystemTime);

/// Stamps a [`StartTime`] on the request.
///
/// The listener exposes it to hooks as
/// [`RequestMeta::started_at`](crate::hooks::RequestMeta::started_at).
pub fn start_time() -> Middleware {
    Middleware::from_fn(|mut req: Request, next: Next| async move {
        req.extensions_mut().insert(StartTime(SystemTime::now()));
        next.run(req).await
    })
}

/// Stamps an [`EndTime`] on the response once the inner handler returns and
/// logs the elapsed time when a [`StartTime`] is present.
pub fn end_time() -> Middleware {
    Middleware::from_fn(|req: Request, next: Next| async move {
        let start = req.extensions().get::<StartTime>().copied();

        let mut response = next.run(req).await;
        let end = SystemTime::now();
        response.extensions_mut().insert(EndTime(end));

        if let Some(StartTime(start)) = start {
            if let Ok(elapsed) = end.duration_since(start) {
                tracing::debug!(?elapsed, status = %response.status(), "webhook request handled");
            }
        }

        response
    })
}
