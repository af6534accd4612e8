//! Connection and per-call configuration.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::value::RawValue;
use serde_json::Value;

use crate::id::Id;
use crate::request::{ExtraField, Request};
use crate::response::Response;

/// Sink for engine diagnostics and message traces.
///
/// Lines arrive fully formatted, trailing newline included.
pub trait Logger: Send + Sync {
    fn log(&self, line: &str);
}

/// The default logger: forwards each line to `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, line: &str) {
        tracing::debug!(target: "jsonrpc2", "{}", line.trim_end());
    }
}

/// Hook observing one message after classification: `(request, response)`
/// with exactly one of the two present, except that a response correlated to
/// a pending call also carries that call's request.
pub type MessageHook = Box<dyn Fn(Option<&Request>, Option<&Response>) + Send + Sync>;

/// Resolved connection-level options.
pub(crate) struct ConnOptions {
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) on_recv: Vec<MessageHook>,
    pub(crate) on_send: Vec<MessageHook>,
    pub(crate) omit_nil_params: bool,
}

impl Default for ConnOptions {
    fn default() -> Self {
        Self {
            logger: Arc::new(TracingLogger),
            on_recv: Vec::new(),
            on_send: Vec::new(),
            omit_nil_params: false,
        }
    }
}

/// Per-call modifiers, applied when the outbound request is built.
#[derive(Debug, Default)]
pub struct CallOptions {
    pub(crate) pick_id: Option<Id>,
    pub(crate) string_id: bool,
    pub(crate) extra_fields: Vec<ExtraField>,
    pub(crate) omit_nil_params: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `id` instead of an allocated one. The id must not collide with
    /// a call already in flight.
    pub fn pick_id(mut self, id: impl Into<Id>) -> Self {
        self.pick_id = Some(id.into());
        self
    }

    /// Allocates the id as a decimal string (`"0"`, `"1"`, …) instead of a
    /// number.
    pub fn string_id(mut self) -> Self {
        self.string_id = true;
        self
    }

    /// Appends a non-standard top-level member to the request.
    pub fn extra_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra_fields.push(ExtraField {
            name: name.into(),
            value,
        });
        self
    }

    /// Omits the `params` key entirely when no params are given, instead of
    /// emitting `"params":null`.
    pub fn omit_nil_params(mut self) -> Self {
        self.omit_nil_params = true;
        self
    }
}

fn payload(raw: Option<&RawValue>) -> &str {
    raw.map_or("null", RawValue::get)
}

/// Builds the `on_recv`/`on_send` hook pair behind
/// [`log_messages`](crate::ConnBuilder::log_messages).
///
/// Replies name a method the response object does not carry, so the hooks
/// share a map remembering methods of in-flight requests by id.
pub(crate) fn log_messages_hooks(logger: Arc<dyn Logger>) -> (MessageHook, MessageHook) {
    let methods: Arc<Mutex<HashMap<Id, String>>> = Arc::default();
    let recv: MessageHook = {
        let logger = Arc::clone(&logger);
        let methods = Arc::clone(&methods);
        Box::new(move |req: Option<&Request>, resp: Option<&Response>| {
            trace_message(logger.as_ref(), &methods, "<--", req, resp);
        })
    };
    let send: MessageHook = Box::new(move |req: Option<&Request>, resp: Option<&Response>| {
        trace_message(logger.as_ref(), &methods, "-->", req, resp);
    });
    (recv, send)
}

fn trace_message(
    logger: &dyn Logger,
    methods: &Mutex<HashMap<Id, String>>,
    arrow: &str,
    req: Option<&Request>,
    resp: Option<&Response>,
) {
    match (req, resp) {
        (Some(req), None) if req.notif => {
            logger.log(&format!(
                "jsonrpc2: {arrow} notif: {}: {}\n",
                req.method,
                payload(req.params.as_deref())
            ));
        }
        (Some(req), None) => {
            methods.lock().insert(req.id.clone(), req.method.clone());
            logger.log(&format!(
                "jsonrpc2: {arrow} request #{}: {}: {}\n",
                req.id,
                req.method,
                payload(req.params.as_deref())
            ));
        }
        (req, Some(resp)) => {
            let remembered = methods.lock().remove(&resp.id);
            let method = req
                .map(|r| r.method.clone())
                .or(remembered)
                .unwrap_or_else(|| "(no matching request)".to_owned());
            match &resp.error {
                None => logger.log(&format!(
                    "jsonrpc2: {arrow} result #{}: {}: {}\n",
                    resp.id,
                    method,
                    payload(resp.result.as_deref())
                )),
                Some(err) => {
                    if let Ok(err) = serde_json::to_string(err) {
                        logger.log(&format!(
                            "jsonrpc2: {arrow} error #{}: {}: {}\n",
                            resp.id, method, err
                        ));
                    }
                }
            }
        }
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct BufferLogger(Arc<Mutex<Vec<String>>>);

    impl Logger for BufferLogger {
        fn log(&self, line: &str) {
            self.0.lock().push(line.to_owned());
        }
    }

    #[test]
    fn test_trace_lines_for_requests_and_replies() {
        let logger = BufferLogger::default();
        let (recv, send) = log_messages_hooks(Arc::new(logger.clone()));

        let req = Request {
            method: "f".into(),
            id: Id::Number(1),
            params: Some(RawValue::from_string("[1,2,3]".into()).unwrap()),
            ..Default::default()
        };
        recv(Some(&req), None);

        // The engine passes no request when it sends a reply; the method
        // comes from the shared map.
        let resp = Response {
            id: Id::Number(1),
            result: Some(RawValue::from_string(r#""ok""#.into()).unwrap()),
            error: None,
        };
        send(None, Some(&resp));

        let notif = Request {
            method: "n".into(),
            notif: true,
            ..Default::default()
        };
        send(Some(&notif), None);

        assert_eq!(
            *logger.0.lock(),
            vec![
                "jsonrpc2: <-- request #1: f: [1,2,3]\n".to_owned(),
                "jsonrpc2: --> result #1: f: \"ok\"\n".to_owned(),
                "jsonrpc2: --> notif: n: null\n".to_owned(),
            ]
        );
    }

    #[test]
    fn test_trace_line_for_unmatched_response() {
        let logger = BufferLogger::default();
        let (recv, _send) = log_messages_hooks(Arc::new(logger.clone()));
        let resp = Response {
            id: Id::Number(9),
            result: Some(RawValue::from_string("null".into()).unwrap()),
            error: None,
        };
        recv(None, Some(&resp));
        assert_eq!(
            *logger.0.lock(),
            vec!["jsonrpc2: <-- result #9: (no matching request): null\n".to_owned()]
        );
    }
}
