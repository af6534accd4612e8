//! Connection-level options: loggers, message traces, hooks, and the
//! connection-wide nil-params switch.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{duplex, DuplexStream};
use tokio::time::{sleep, timeout};

use jsonrpc2::{
    BufferedStream, Conn, ConnBuilder, HandlerFn, HandlerWithError, Id, Logger, NoopHandler,
    Request,
};

#[derive(Clone, Default)]
struct BufferLogger(Arc<Mutex<Vec<String>>>);

impl BufferLogger {
    fn lines(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

impl Logger for BufferLogger {
    fn log(&self, line: &str) {
        self.0.lock().push(line.to_owned());
    }
}

fn pipe() -> (DuplexStream, DuplexStream) {
    duplex(64 * 1024)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !check() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_set_logger_records_orphan_response() {
    let (a, b) = pipe();
    let logger = BufferLogger::default();
    let conn_a = Conn::builder(BufferedStream::plain(a))
        .handler(NoopHandler)
        .set_logger(logger.clone())
        .build();
    let conn_b = Conn::new(BufferedStream::plain(b), NoopHandler);

    // A response with no corresponding request.
    conn_b.reply(Id::Number(0), &Value::Null).await.unwrap();

    let want = "jsonrpc2: ignoring response #0 with no corresponding request\n";
    wait_until(|| logger.lines().iter().any(|l| l == want)).await;

    conn_a.close().await.unwrap();
    conn_b.close().await.ok();
}

#[tokio::test]
async fn test_log_messages_traces_both_directions() {
    let (a, b) = pipe();
    let server = Conn::new(
        BufferedStream::plain(a),
        HandlerFn::new(|conn: Conn, req: Request| {
            Box::pin(async move {
                if req.notif {
                    return;
                }
                conn.reply(req.id.clone(), "ok").await.unwrap();
            })
        }),
    );
    let logger = BufferLogger::default();
    let client = Conn::builder(BufferedStream::plain(b))
        .handler(NoopHandler)
        .log_messages(logger.clone())
        .build();

    let got: String = client.call("f", Some(&[1, 2, 3])).await.unwrap();
    assert_eq!(got, "ok");
    client.notify("n", Some(&true)).await.unwrap();

    wait_until(|| logger.lines().len() >= 3).await;
    assert_eq!(
        logger.lines()[..3],
        [
            "jsonrpc2: --> request #0: f: [1,2,3]\n".to_owned(),
            "jsonrpc2: <-- result #0: f: \"ok\"\n".to_owned(),
            "jsonrpc2: --> notif: n: true\n".to_owned(),
        ]
    );

    client.close().await.unwrap();
    server.close().await.ok();
}

#[tokio::test]
async fn test_log_messages_traces_inbound_requests_and_replies() {
    let (a, b) = pipe();
    let logger = BufferLogger::default();
    let server = Conn::builder(BufferedStream::plain(a))
        .handler(HandlerFn::new(|conn: Conn, req: Request| {
            Box::pin(async move {
                conn.reply(req.id.clone(), "ok").await.unwrap();
            })
        }))
        .log_messages(logger.clone())
        .build();
    let client = Conn::new(BufferedStream::plain(b), NoopHandler);

    let _: String = client.call::<(), _>("f", None).await.unwrap();

    wait_until(|| logger.lines().len() >= 2).await;
    assert_eq!(
        logger.lines()[..2],
        [
            "jsonrpc2: <-- request #0: f: null\n".to_owned(),
            // The reply names the method remembered from the request.
            "jsonrpc2: --> result #0: f: \"ok\"\n".to_owned(),
        ]
    );

    client.close().await.unwrap();
    server.close().await.ok();
}

#[tokio::test]
async fn test_on_send_and_on_recv_hooks() {
    let (a, b) = pipe();
    let server = Conn::new(
        BufferedStream::plain(a),
        HandlerFn::new(|conn: Conn, req: Request| {
            Box::pin(async move {
                conn.reply(req.id.clone(), "ok").await.unwrap();
            })
        }),
    );

    let sent: Arc<Mutex<Vec<String>>> = Arc::default();
    let received: Arc<Mutex<Vec<String>>> = Arc::default();
    let client = Conn::builder(BufferedStream::plain(b))
        .handler(NoopHandler)
        .on_send({
            let sent = Arc::clone(&sent);
            move |req, resp| {
                sent.lock().push(match (req, resp) {
                    (Some(req), None) => format!("request {}", req.method),
                    (_, Some(resp)) => format!("response #{}", resp.id),
                    (None, None) => "empty".to_owned(),
                });
            }
        })
        .on_recv({
            let received = Arc::clone(&received);
            move |req, resp| {
                // A response matched to a pending call carries its request.
                if let (Some(req), Some(resp)) = (req, resp) {
                    received.lock().push(format!("{} #{}", req.method, resp.id));
                }
            }
        })
        .build();

    let _: String = client.call::<(), _>("f", None).await.unwrap();

    assert_eq!(*sent.lock(), vec!["request f".to_owned()]);
    assert_eq!(*received.lock(), vec!["f #0".to_owned()]);

    client.close().await.unwrap();
    server.close().await.ok();
}

/// Received params for the four combinations of the connection-wide
/// omit-nil-params option and nil vs. explicit-null params.
#[tokio::test]
async fn test_omit_nil_params_connection_option() {
    struct Case {
        omit: bool,
        send_null: bool,
        want: Option<&'static str>,
    }
    let cases = [
        Case {
            omit: false,
            send_null: false,
            want: Some("null"),
        },
        Case {
            omit: false,
            send_null: true,
            want: Some("null"),
        },
        Case {
            omit: true,
            send_null: false,
            want: None,
        },
        Case {
            omit: true,
            send_null: true,
            want: Some("null"),
        },
    ];

    for (i, case) in cases.iter().enumerate() {
        let (a, b) = pipe();
        let got: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let handler = {
            let got = Arc::clone(&got);
            HandlerWithError::new(move |_conn, req: Request| {
                let got = Arc::clone(&got);
                Box::pin(async move {
                    got.lock()
                        .push(req.params.as_deref().map(|raw| raw.get().to_owned()));
                    Ok(Value::Null)
                })
            })
        };
        let server = apply_omit(Conn::builder(BufferedStream::plain(a)).handler(handler), false);
        let client = apply_omit(
            Conn::builder(BufferedStream::plain(b)).handler(NoopHandler),
            case.omit,
        );

        // Exercise both the call and the notify path.
        let _: Value = if case.send_null {
            client.call("f", Some(&Value::Null)).await.unwrap()
        } else {
            client.call::<(), _>("f", None).await.unwrap()
        };
        if case.send_null {
            client.notify("f", Some(&Value::Null)).await.unwrap();
        } else {
            client.notify::<()>("f", None).await.unwrap();
        }

        wait_until(|| got.lock().len() == 2).await;
        let want = case.want.map(str::to_owned);
        assert_eq!(*got.lock(), vec![want.clone(), want], "case {i}");

        client.close().await.unwrap();
        server.close().await.ok();
    }
}

fn apply_omit<S: jsonrpc2::ObjectStream + 'static>(
    builder: ConnBuilder<S>,
    omit: bool,
) -> Conn {
    if omit {
        builder.omit_nil_params().build()
    } else {
        builder.build()
    }
}
