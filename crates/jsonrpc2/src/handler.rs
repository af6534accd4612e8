use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::conn::Conn;
use crate::error::{codes, ConnError, Error};
use crate::request::Request;

/// Receives inbound requests and notifications.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Called for each inbound request, in arrival order. No other request
    /// is delivered until this returns; wrap the handler in [`AsyncHandler`]
    /// when strict ordering is not required.
    ///
    /// For a non-notification request the handler is expected to call
    /// [`Conn::reply`] or [`Conn::reply_with_error`] exactly once (or ignore
    /// the request); a notification must not be replied to.
    async fn handle(&self, conn: Conn, req: Request);
}

#[async_trait]
impl<H: Handler + ?Sized> Handler for Arc<H> {
    async fn handle(&self, conn: Conn, req: Request) {
        (**self).handle(conn, req).await;
    }
}

/// Ignores every inbound request. Useful for client-only connections.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

#[async_trait]
impl Handler for NoopHandler {
    async fn handle(&self, _conn: Conn, _req: Request) {}
}

/// Lifts a closure into a [`Handler`].
pub struct HandlerFn<F>(F);

impl<F> HandlerFn<F>
where
    F: Fn(Conn, Request) -> BoxFuture<'static, ()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
    F: Fn(Conn, Request) -> BoxFuture<'static, ()> + Send + Sync,
{
    async fn handle(&self, conn: Conn, req: Request) {
        (self.0)(conn, req).await;
    }
}

/// Wraps a handler so that each request is handled on its own task.
///
/// This trades the engine's arrival-order guarantee for parallelism.
pub struct AsyncHandler<H>(Arc<H>);

impl<H: Handler + 'static> AsyncHandler<H> {
    pub fn new(handler: H) -> Self {
        Self(Arc::new(handler))
    }
}

#[async_trait]
impl<H: Handler + 'static> Handler for AsyncHandler<H> {
    async fn handle(&self, conn: Conn, req: Request) {
        let inner = Arc::clone(&self.0);
        tokio::spawn(async move { inner.handle(conn, req).await });
    }
}

/// Adapts a fallible request function into a [`Handler`] that replies on the
/// function's behalf.
///
/// An `Ok` value is sent back as the result. A [`ConnError::Rpc`] error is
/// sent back as-is; any other error becomes an internal-error response. For
/// notifications nothing is sent.
pub struct HandlerWithError<F>(F);

impl<F> HandlerWithError<F>
where
    F: Fn(Conn, Request) -> BoxFuture<'static, Result<Value, ConnError>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Handler for HandlerWithError<F>
where
    F: Fn(Conn, Request) -> BoxFuture<'static, Result<Value, ConnError>> + Send + Sync,
{
    async fn handle(&self, conn: Conn, req: Request) {
        let id = req.id.clone();
        let notif = req.notif;
        let result = (self.0)(conn.clone(), req).await;
        if notif {
            if let Err(err) = result {
                tracing::debug!(target: "jsonrpc2", %err, "error handling notification");
            }
            return;
        }
        let sent = match result {
            Ok(value) => conn.reply(id, &value).await,
            Err(ConnError::Rpc(err)) => conn.reply_with_error(id, err).await,
            Err(err) => {
                conn.reply_with_error(id, Error::new(codes::INTERNAL_ERROR, err.to_string()))
                    .await
            }
        };
        if let Err(err) = sent {
            tracing::debug!(target: "jsonrpc2", %err, "failed to send reply");
        }
    }
}

/// Wraps a handler with additional behavior.
pub type Middleware = Box<dyn Fn(Arc<dyn Handler>) -> Arc<dyn Handler> + Send + Sync>;

/// A middleware chain: the first middleware is the outermost wrapper.
pub struct Chain {
    middleware: Vec<Middleware>,
}

impl Chain {
    pub fn new(middleware: impl IntoIterator<Item = Middleware>) -> Self {
        Self {
            middleware: middleware.into_iter().collect(),
        }
    }

    /// Wraps `handler` in the chain's middleware.
    pub fn then(self, handler: Arc<dyn Handler>) -> Arc<dyn Handler> {
        self.middleware
            .into_iter()
            .rev()
            .fold(handler, |handler, middleware| middleware(handler))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::BufferedStream;
    use parking_lot::Mutex;

    fn tagging(tag: &'static str, order: Arc<Mutex<Vec<&'static str>>>) -> Middleware {
        Box::new(move |next: Arc<dyn Handler>| {
            let order = Arc::clone(&order);
            Arc::new(HandlerFn::new(move |conn, req| {
                let order = Arc::clone(&order);
                let next = Arc::clone(&next);
                Box::pin(async move {
                    order.lock().push(tag);
                    next.handle(conn, req).await;
                })
            }))
        })
    }

    #[tokio::test]
    async fn test_chain_runs_leftmost_middleware_first() {
        let order: Arc<Mutex<Vec<&'static str>>> = Arc::default();
        let handler = {
            let order = Arc::clone(&order);
            Arc::new(HandlerFn::new(move |_conn, _req| {
                let order = Arc::clone(&order);
                Box::pin(async move { order.lock().push("handler") })
            })) as Arc<dyn Handler>
        };
        let chained = Chain::new([
            tagging("outer", Arc::clone(&order)),
            tagging("inner", Arc::clone(&order)),
        ])
        .then(handler);

        let (a, _b) = tokio::io::duplex(64);
        let conn = Conn::new(BufferedStream::plain(a), NoopHandler);
        chained
            .handle(
                conn.clone(),
                Request {
                    method: "m".into(),
                    notif: true,
                    ..Default::default()
                },
            )
            .await;
        assert_eq!(*order.lock(), vec!["outer", "inner", "handler"]);
        let _ = conn.close().await;
    }
}
