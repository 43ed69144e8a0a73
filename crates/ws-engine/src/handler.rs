//! Application callback surface.
//!
//! A connection reports to exactly one [`Handler`], owned by the connection
//! and passed in at construction. Per connection the handler sees:
//!
//! - exactly one [`Handler::on_open`], first
//! - any number of [`Handler::on_text`] / [`Handler::on_binary`] / [`Handler::on_pong`]
//! - exactly one of [`Handler::on_close`] or [`Handler::on_error`], last
//!
//! Callbacks run on the read loop, one at a time. Frames that arrive while a
//! callback is running wait until it returns.
//!
//! Applications that prefer to consume a stream can use [`EventChannel`].

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::trace;

use crate::{WebSocketError, close::CloseCode, connection::Sender};

/// Receives the events of one connection.
///
/// Every method has a no-op default.
///
/// # Example
///
/// ```rust
/// use hpx_ws_engine::{CloseCode, Handler, Sender, async_trait};
///
/// struct Logger;
///
/// #[async_trait]
/// impl Handler for Logger {
///     async fn on_text(&mut self, _ws: &Sender, text: String) {
///         println!("received {text}");
///     }
///
///     async fn on_close(&mut self, _ws: &Sender, code: Option<CloseCode>, _reason: Option<String>) {
///         println!("closed with {code:?}");
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + 'static {
    /// The connection is ready to send and receive.
    async fn on_open(&mut self, _ws: &Sender) {}

    /// A complete text message arrived.
    async fn on_text(&mut self, _ws: &Sender, _text: String) {}

    /// A complete binary message arrived.
    async fn on_binary(&mut self, _ws: &Sender, _data: Bytes) {}

    /// A pong arrived.
    async fn on_pong(&mut self, _ws: &Sender, _payload: Bytes) {}

    /// The connection ended with a close handshake.
    ///
    /// `code` is `None` when no valid code was exchanged.
    async fn on_close(&mut self, _ws: &Sender, _code: Option<CloseCode>, _reason: Option<String>) {}

    /// The connection ended because of a protocol violation or a transport failure.
    async fn on_error(&mut self, _ws: &Sender, _err: WebSocketError) {}
}

/// A connection event, as forwarded by [`EventChannel`].
#[derive(Debug, Clone)]
pub enum Event {
    Open,
    Text(String),
    Binary(Bytes),
    Pong(Bytes),
    Close {
        code: Option<CloseCode>,
        reason: Option<String>,
    },
    Error(WebSocketError),
}

impl Event {
    /// Returns `true` for the last event of a connection.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Close { .. } | Event::Error(_))
    }
}

/// A [`Handler`] that forwards every callback into a bounded channel.
///
/// The read loop waits when the channel is full. Events are dropped once the
/// receiver is gone.
///
/// ```no_run
/// use hpx_ws_engine::{Connection, Event, EventChannel, Role};
///
/// async fn serve(stream: tokio::net::TcpStream) {
///     let (handler, mut events) = EventChannel::new(32);
///     let (conn, _sender) = Connection::builder(Role::Server).build(stream, handler);
///     tokio::spawn(conn.run());
///
///     while let Some(event) = events.recv().await {
///         if let Event::Text(text) = event {
///             println!("{text}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct EventChannel {
    tx: mpsc::Sender<Event>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    async fn forward(&self, event: Event) {
        if let Err(err) = self.tx.send(event).await {
            trace!(event = ?err.0, "event receiver dropped");
        }
    }
}

#[async_trait]
impl Handler for EventChannel {
    async fn on_open(&mut self, _ws: &Sender) {
        self.forward(Event::Open).await;
    }

    async fn on_text(&mut self, _ws: &Sender, text: String) {
        self.forward(Event::Text(text)).await;
    }

    async fn on_binary(&mut self, _ws: &Sender, data: Bytes) {
        self.forward(Event::Binary(data)).await;
    }

    async fn on_pong(&mut self, _ws: &Sender, payload: Bytes) {
        self.forward(Event::Pong(payload)).await;
    }

    async fn on_close(&mut self, _ws: &Sender, code: Option<CloseCode>, reason: Option<String>) {
        self.forward(Event::Close { code, reason }).await;
    }

    async fn on_error(&mut self, _ws: &Sender, err: WebSocketError) {
        self.forward(Event::Error(err)).await;
    }
}
