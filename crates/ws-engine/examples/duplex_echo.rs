//! An echo server and a client talking over an in-memory duplex stream.
//!
//! Both ends start from an already-upgraded stream, so no HTTP is involved.
//! Run with `RUST_LOG=trace` to see every frame.

use hpx_ws_engine::{
    CloseCode, Connection, Event, EventChannel, Handler, Options, Role, Sender, async_trait,
};
use tracing_subscriber::EnvFilter;

/// Echoes every data message back to the peer.
struct Echo;

#[async_trait]
impl Handler for Echo {
    async fn on_text(&mut self, ws: &Sender, text: String) {
        if let Err(e) = ws.send_text(text).await {
            tracing::error!("echo failed: {e}");
        }
    }

    async fn on_binary(&mut self, ws: &Sender, data: bytes::Bytes) {
        if let Err(e) = ws.send_binary(data).await {
            tracing::error!("echo failed: {e}");
        }
    }

    async fn on_close(&mut self, _ws: &Sender, code: Option<CloseCode>, reason: Option<String>) {
        tracing::info!(?code, ?reason, "server: peer closed");
    }
}

#[tokio::main]
async fn main() -> hpx_ws_engine::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let (server_io, client_io) = tokio::io::duplex(64 * 1024);

    let (server, _) = Connection::builder(Role::Server)
        .options(Options::default().with_max_payload_read(64 * 1024))
        .build(server_io, Echo);
    let server = tokio::spawn(server.run());

    let (events, mut rx) = EventChannel::new(16);
    let (client, ws) = Connection::builder(Role::Client).build(client_io, events);
    let client = tokio::spawn(client.run());

    ws.send_text("Hello, WebSocket!").await?;
    ws.send_binary(vec![0xDE, 0xAD, 0xBE, 0xEF]).await?;
    ws.ping("are you there?").await?;

    while let Some(event) = rx.recv().await {
        match event {
            Event::Open => tracing::info!(id = %ws.id(), "client: open"),
            Event::Text(text) => tracing::info!("client: text {text:?}"),
            Event::Binary(data) => {
                tracing::info!("client: binary {data:?}");
                ws.close_with_reason(CloseCode::Normal, "done").await?;
            }
            Event::Pong(payload) => tracing::info!("client: pong {payload:?}"),
            Event::Close { code, reason } => {
                tracing::info!(?code, ?reason, "client: closed");
                break;
            }
            Event::Error(e) => {
                tracing::error!("client: {e}");
                break;
            }
        }
    }

    if let Ok(Err(e)) = client.await {
        tracing::error!("client connection failed: {e}");
    }
    if let Ok(Err(e)) = server.await {
        tracing::error!("server connection failed: {e}");
    }

    Ok(())
}
