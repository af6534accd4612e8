use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::value::{to_raw_value, RawValue};
use tokio::sync::{oneshot, watch};

use crate::error::{ConnError, ConnResult, Error};
use crate::handler::{Handler, NoopHandler};
use crate::id::Id;
use crate::message::AnyMessage;
use crate::opts::{log_messages_hooks, CallOptions, ConnOptions, Logger, MessageHook};
use crate::request::Request;
use crate::response::Response;
use crate::stream::ObjectStream;

type BoxObjectStream = Box<dyn ObjectStream>;
type WriteHalf = SplitSink<BoxObjectStream, Bytes>;
type ReadHalf = SplitStream<BoxObjectStream>;

/// A bidirectional JSON-RPC 2.0 connection over an [`ObjectStream`].
///
/// Both sides of a connection are peers: each may call, notify, reply, and
/// receive any of the three. Inbound requests go to the connection's
/// [`Handler`], one at a time in arrival order; responses complete the
/// matching pending call. `Conn` is a cheap clone handle, so it can be used
/// from any number of tasks concurrently.
///
/// Construction spawns the connection's reader task and therefore must
/// happen inside a Tokio runtime.
#[derive(Clone)]
pub struct Conn {
    inner: Arc<ConnInner>,
}

struct ConnInner {
    /// Write half of the stream; the single point where outbound messages
    /// are serialized onto the wire. `None` once the connection is closed.
    writer: tokio::sync::Mutex<Option<WriteHalf>>,
    state: parking_lot::Mutex<State>,
    /// Outbound id counter, bumped once per dispatched call.
    seq: AtomicU64,
    handler: Arc<dyn Handler>,
    opts: ConnOptions,
    /// Flipped to `true` exactly once, when the connection tears down.
    disconnect: watch::Sender<bool>,
}

struct State {
    closed: bool,
    pending: HashMap<Id, PendingSlot>,
}

struct PendingSlot {
    tx: oneshot::Sender<Response>,
    /// The originating request, kept so that hooks and traces can name the
    /// method a response belongs to.
    request: Request,
}

/// Configures and starts a [`Conn`].
pub struct ConnBuilder<S> {
    stream: S,
    handler: Arc<dyn Handler>,
    opts: ConnOptions,
}

impl<S: ObjectStream + 'static> ConnBuilder<S> {
    fn new(stream: S) -> Self {
        Self {
            stream,
            handler: Arc::new(NoopHandler),
            opts: ConnOptions::default(),
        }
    }

    /// Sets the handler for inbound requests. Defaults to [`NoopHandler`].
    pub fn handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    /// Sets the sink for engine diagnostics (orphan responses, protocol
    /// errors). Defaults to [`TracingLogger`](crate::TracingLogger).
    pub fn set_logger(mut self, logger: impl Logger + 'static) -> Self {
        self.opts.logger = Arc::new(logger);
        self
    }

    /// Emits a one-line trace to `logger` for every message sent and
    /// received.
    pub fn log_messages(mut self, logger: impl Logger + 'static) -> Self {
        let (recv, send) = log_messages_hooks(Arc::new(logger));
        self.opts.on_recv.push(recv);
        self.opts.on_send.push(send);
        self
    }

    /// Observes each inbound message after classification.
    pub fn on_recv(
        mut self,
        hook: impl Fn(Option<&Request>, Option<&Response>) + Send + Sync + 'static,
    ) -> Self {
        self.opts.on_recv.push(Box::new(hook));
        self
    }

    /// Observes each outbound message before it is written.
    pub fn on_send(
        mut self,
        hook: impl Fn(Option<&Request>, Option<&Response>) + Send + Sync + 'static,
    ) -> Self {
        self.opts.on_send.push(Box::new(hook));
        self
    }

    /// Connection-wide version of [`CallOptions::omit_nil_params`].
    pub fn omit_nil_params(mut self) -> Self {
        self.opts.omit_nil_params = true;
        self
    }

    /// Starts the connection, spawning its reader task.
    pub fn build(self) -> Conn {
        let stream: BoxObjectStream = Box::new(self.stream);
        let (writer, reader) = stream.split();
        let (disconnect, _) = watch::channel(false);
        let conn = Conn {
            inner: Arc::new(ConnInner {
                writer: tokio::sync::Mutex::new(Some(writer)),
                state: parking_lot::Mutex::new(State {
                    closed: false,
                    pending: HashMap::new(),
                }),
                seq: AtomicU64::new(0),
                handler: self.handler,
                opts: self.opts,
                disconnect,
            }),
        };
        conn.spawn_read_loop(reader);
        conn
    }
}

impl Conn {
    /// Starts a connection over `stream`, delivering inbound requests to
    /// `handler`. Use [`Conn::builder`] to set options.
    pub fn new<S: ObjectStream + 'static>(stream: S, handler: impl Handler + 'static) -> Conn {
        Self::builder(stream).handler(handler).build()
    }

    pub fn builder<S: ObjectStream + 'static>(stream: S) -> ConnBuilder<S> {
        ConnBuilder::new(stream)
    }

    /// Sends a request and waits for the correlated response, decoding its
    /// result into `R`.
    ///
    /// `None` params are sent as `"params":null` unless omit-nil-params is
    /// in force. Cancellation is local: wrapping this future in a timeout
    /// and dropping it frees the pending slot, and a late response for the
    /// abandoned id is logged as an orphan.
    pub async fn call<P, R>(&self, method: &str, params: Option<&P>) -> ConnResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with(method, params, CallOptions::new()).await
    }

    /// [`call`](Self::call) with per-call options.
    pub async fn call_with<P, R>(
        &self,
        method: &str,
        params: Option<&P>,
        opts: CallOptions,
    ) -> ConnResult<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.dispatch_call_with(method, params, opts).await?.wait().await
    }

    /// Sends a request and returns a handle for receiving the response
    /// later, so dispatch and completion can be separated.
    pub async fn dispatch_call<P>(&self, method: &str, params: Option<&P>) -> ConnResult<PendingCall>
    where
        P: Serialize + ?Sized,
    {
        self.dispatch_call_with(method, params, CallOptions::new())
            .await
    }

    /// [`dispatch_call`](Self::dispatch_call) with per-call options.
    pub async fn dispatch_call_with<P>(
        &self,
        method: &str,
        params: Option<&P>,
        opts: CallOptions,
    ) -> ConnResult<PendingCall>
    where
        P: Serialize + ?Sized,
    {
        let params = self.resolve_params(params, &opts)?;
        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let id = match opts.pick_id {
            Some(id) => id,
            None if opts.string_id => Id::Str(seq.to_string()),
            None => Id::Number(seq),
        };
        let req = Request {
            method: method.to_owned(),
            params,
            id: id.clone(),
            notif: false,
            extra_fields: opts.extra_fields,
        };
        let rx = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(ConnError::Closed);
            }
            if state.pending.contains_key(&id) {
                return Err(ConnError::DuplicateId(id));
            }
            let (tx, rx) = oneshot::channel();
            state.pending.insert(
                id.clone(),
                PendingSlot {
                    tx,
                    request: req.clone(),
                },
            );
            rx
        };
        let call = PendingCall {
            conn: self.clone(),
            id,
            rx,
        };
        // A send failure (or this future being dropped mid-send) drops
        // `call`, which reclaims the pending slot.
        self.send_request(&req).await?;
        Ok(call)
    }

    /// Sends a notification. No response is expected and none is delivered.
    pub async fn notify<P>(&self, method: &str, params: Option<&P>) -> ConnResult<()>
    where
        P: Serialize + ?Sized,
    {
        self.notify_with(method, params, CallOptions::new()).await
    }

    /// [`notify`](Self::notify) with per-call options.
    pub async fn notify_with<P>(
        &self,
        method: &str,
        params: Option<&P>,
        opts: CallOptions,
    ) -> ConnResult<()>
    where
        P: Serialize + ?Sized,
    {
        let params = self.resolve_params(params, &opts)?;
        let req = Request {
            method: method.to_owned(),
            params,
            id: Id::default(),
            notif: true,
            extra_fields: opts.extra_fields,
        };
        self.send_request(&req).await
    }

    /// Sends a successful response for the request with the given id.
    ///
    /// Replying at most once per inbound request is the caller's
    /// responsibility.
    pub async fn reply<T: Serialize + ?Sized>(&self, id: Id, result: &T) -> ConnResult<()> {
        let resp = Response {
            id,
            result: Some(to_raw_value(result)?),
            error: None,
        };
        self.send_response(&resp).await
    }

    /// Sends an error response for the request with the given id.
    pub async fn reply_with_error(&self, id: Id, error: Error) -> ConnResult<()> {
        let resp = Response {
            id,
            result: None,
            error: Some(error),
        };
        self.send_response(&resp).await
    }

    /// Closes the connection: the stream is closed, every pending call
    /// fails with [`ConnError::Closed`], and [`disconnect_notify`]
    /// resolves. Idempotent; the second and later calls return
    /// [`ConnError::Closed`].
    ///
    /// [`disconnect_notify`]: Self::disconnect_notify
    pub async fn close(&self) -> ConnResult<()> {
        if self.teardown().await {
            Ok(())
        } else {
            Err(ConnError::Closed)
        }
    }

    /// Resolves when the connection is torn down for any reason: an
    /// explicit [`close`](Self::close), stream EOF, or a protocol error.
    /// Resolves immediately on an already-closed connection.
    pub async fn disconnect_notify(&self) {
        let mut rx = self.inner.disconnect.subscribe();
        disconnected(&mut rx).await;
    }

    fn resolve_params<P: Serialize + ?Sized>(
        &self,
        params: Option<&P>,
        opts: &CallOptions,
    ) -> ConnResult<Option<Box<RawValue>>> {
        match params {
            Some(v) => Ok(Some(to_raw_value(v)?)),
            None if opts.omit_nil_params || self.inner.opts.omit_nil_params => Ok(None),
            None => Ok(Some(crate::raw::null()?)),
        }
    }

    async fn send_request(&self, req: &Request) -> ConnResult<()> {
        let data = serde_json::to_vec(req)?;
        fire_hooks(&self.inner.opts.on_send, Some(req), None);
        self.write(data).await
    }

    async fn send_response(&self, resp: &Response) -> ConnResult<()> {
        let data = serde_json::to_vec(resp)?;
        fire_hooks(&self.inner.opts.on_send, None, Some(resp));
        self.write(data).await
    }

    async fn write(&self, data: Vec<u8>) -> ConnResult<()> {
        let mut writer = self.inner.writer.lock().await;
        let Some(writer) = writer.as_mut() else {
            return Err(ConnError::Closed);
        };
        if self.inner.state.lock().closed {
            return Err(ConnError::Closed);
        }
        writer.send(Bytes::from(data)).await?;
        Ok(())
    }

    fn log(&self, line: &str) {
        self.inner.opts.logger.log(line);
    }

    /// Transitions the connection to closed. Returns `false` when another
    /// caller (or the reader task) already did.
    async fn teardown(&self) -> bool {
        let pending = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return false;
            }
            state.closed = true;
            std::mem::take(&mut state.pending)
        };
        // Wake disconnect waiters, then fail pending calls by dropping
        // their response senders.
        self.inner.disconnect.send_replace(true);
        drop(pending);
        if let Some(mut writer) = self.inner.writer.lock().await.take() {
            let _ = writer.close().await;
        }
        true
    }

    fn spawn_read_loop(&self, mut reader: ReadHalf) {
        let conn = self.clone();
        tokio::spawn(async move {
            let mut disconnect = conn.inner.disconnect.subscribe();
            loop {
                let frame = tokio::select! {
                    () = disconnected(&mut disconnect) => break,
                    frame = reader.next() => frame,
                };
                match frame {
                    // Clean EOF from the peer.
                    None => break,
                    Some(Err(err)) => {
                        conn.log(&format!("jsonrpc2: protocol error: {err}\n"));
                        break;
                    }
                    Some(Ok(frame)) => {
                        if !conn.dispatch_incoming(&frame).await {
                            break;
                        }
                    }
                }
            }
            conn.teardown().await;
            // `reader` is dropped here, releasing the transport together
            // with the writer half taken by teardown.
        });
    }

    /// Handles one inbound object. Returns `false` when the connection must
    /// tear down.
    async fn dispatch_incoming(&self, frame: &[u8]) -> bool {
        match AnyMessage::from_slice(frame) {
            Err(err) => {
                self.log(&format!("jsonrpc2: protocol error: {err}\n"));
                false
            }
            Ok(AnyMessage::Request(req)) => {
                fire_hooks(&self.inner.opts.on_recv, Some(&req), None);
                self.inner.handler.handle(self.clone(), req).await;
                true
            }
            Ok(AnyMessage::Response(resp)) => {
                let slot = self.inner.state.lock().pending.remove(&resp.id);
                match slot {
                    Some(slot) => {
                        fire_hooks(&self.inner.opts.on_recv, Some(&slot.request), Some(&resp));
                        // The waiter may have gone away; that is not an error.
                        let _ = slot.tx.send(resp);
                    }
                    None => {
                        fire_hooks(&self.inner.opts.on_recv, None, Some(&resp));
                        self.log(&format!(
                            "jsonrpc2: ignoring response #{} with no corresponding request\n",
                            resp.id
                        ));
                    }
                }
                true
            }
        }
    }
}

impl fmt::Debug for Conn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Conn")
            .field("closed", &state.closed)
            .field("pending", &state.pending.len())
            .finish_non_exhaustive()
    }
}

fn fire_hooks(hooks: &[MessageHook], req: Option<&Request>, resp: Option<&Response>) {
    for hook in hooks {
        hook(req, resp);
    }
}

/// Resolves once the disconnect flag is raised.
async fn disconnected(rx: &mut watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
}

/// A dispatched call whose response has not been received yet.
///
/// Dropping the handle abandons the call and frees its pending slot; a late
/// response for that id is then logged as an orphan. Wrapping
/// [`wait`](Self::wait) in `tokio::time::timeout` therefore cancels a call
/// without leaking state.
pub struct PendingCall {
    conn: Conn,
    id: Id,
    rx: oneshot::Receiver<Response>,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall").field("id", &self.id).finish()
    }
}

impl PendingCall {
    /// The id this call was dispatched with.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Receives the response and decodes its result into `R`.
    ///
    /// Returns [`ConnError::Rpc`] when the peer answered with an error and
    /// [`ConnError::Closed`] when the connection went away first.
    pub async fn wait<R: DeserializeOwned>(mut self) -> ConnResult<R> {
        let resp = match (&mut self.rx).await {
            Ok(resp) => resp,
            Err(_) => return Err(ConnError::Closed),
        };
        if let Some(err) = resp.error {
            return Err(ConnError::Rpc(err));
        }
        let result = match &resp.result {
            Some(raw) => serde_json::from_str(raw.get())?,
            // Unreachable from the wire: decode rejects a response with
            // neither result nor error.
            None => serde_json::from_str("null")?,
        };
        Ok(result)
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // Reclaim the slot only while the response is still outstanding;
        // after delivery the id may already belong to a newer call.
        if matches!(self.rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            self.conn.inner.state.lock().pending.remove(&self.id);
        }
    }
}
