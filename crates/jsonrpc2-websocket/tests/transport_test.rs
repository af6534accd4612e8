//! End-to-end calls over a real WebSocket pair.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use jsonrpc2::{Conn, HandlerFn, NoopHandler, Request};
use jsonrpc2_websocket::WebSocketObjectStream;

fn params_text(req: &Request) -> &str {
    req.params.as_deref().map_or("null", |raw| raw.get())
}

async fn serve_one(listener: TcpListener) -> Conn {
    let (socket, _) = listener.accept().await.unwrap();
    let ws = tokio_tungstenite::accept_async(socket).await.unwrap();
    Conn::new(
        WebSocketObjectStream::new(ws),
        HandlerFn::new(|conn: Conn, req: Request| {
            Box::pin(async move {
                if req.notif {
                    return;
                }
                let result = format!("hello, #{}: {}", req.id, params_text(&req));
                conn.reply(req.id.clone(), &result).await.unwrap();
            })
        }),
    )
}

#[tokio::test]
async fn test_call_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let conn = serve_one(listener).await;
        conn.disconnect_notify().await;
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let (ws, _) = tokio_tungstenite::client_async(format!("ws://{addr}"), socket)
        .await
        .unwrap();
    let client = Conn::new(WebSocketObjectStream::new(ws), NoopHandler);

    for i in 0..10 {
        let got: String = client.call("f", Some(&[1, 2, 3])).await.unwrap();
        assert_eq!(got, format!("hello, #{i}: [1,2,3]"));
    }

    client.close().await.unwrap();
    timeout(Duration::from_secs(2), server)
        .await
        .expect("server connection did not observe the disconnect")
        .unwrap();
}

#[tokio::test]
async fn test_peer_drop_disconnects() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let conn = serve_one(listener).await;
        conn.disconnect_notify().await;
    });

    let socket = TcpStream::connect(addr).await.unwrap();
    let (ws, _) = tokio_tungstenite::client_async(format!("ws://{addr}"), socket)
        .await
        .unwrap();
    // Drop the client without a closing handshake; the server side must
    // still tear down cleanly.
    drop(ws);

    timeout(Duration::from_secs(2), server)
        .await
        .expect("server connection did not observe the disconnect")
        .unwrap();
}
