//! # Connection
//!
//! Ties the codec, dispatcher, state machine and handler together over one
//! upgraded byte stream.
//!
//! The framed stream is split in two. The read half is owned by
//! [`Connection::run`], which decodes and dispatches one frame at a time; the
//! automatic pong or close answer to a frame is written before the next frame
//! is read. The write half lives behind a mutex shared by every [`Sender`], so
//! frames from the read loop and from application tasks never interleave on
//! the wire.
//!
//! ```text
//!           ┌─────────────── Connection::run ───────────────┐
//! bytes ──▶ │ Decoder ─▶ Dispatcher ─▶ Handler callbacks    │
//!           └───────────────────┬───────────────────────────┘
//!                               │ pong / close echo
//!           ┌───────────────────▼─── Mutex<Writer> ─────────┐
//! bytes ◀── │ Encoder ◀─ StateMachine                       │ ◀── Sender
//!           └───────────────────────────────────────────────┘
//! ```

use std::{fmt, pin::Pin, sync::Arc};

use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt, StreamExt, stream::SplitStream};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{Mutex, watch},
};
use tokio_util::codec::{Framed, FramedParts};
use tracing::{Instrument, debug, debug_span, trace, warn};
use uuid::Uuid;

use crate::{
    Handler, Options, Result, Role, WebSocketError,
    close::{CloseCode, CloseFrame},
    codec::{Codec, Decoder, Encoder},
    dispatch::{Dispatcher, Route},
    frame::{Frame, MAX_CONTROL_PAYLOAD},
    key::{KeySource, MaskKeyProvider},
    state::{CloseState, LocalClose, RemoteClose, StateMachine},
};

/// Identifies a connection in logs and to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type BoxedSink = Pin<Box<dyn Sink<Frame, Error = WebSocketError> + Send>>;

/// How the connection ended, reported once to the handler.
#[derive(Debug)]
enum Terminal {
    Close {
        code: Option<CloseCode>,
        reason: Option<String>,
    },
    Error(WebSocketError),
}

/// The single writer of the transport, together with the close state it guards.
struct Writer {
    sink: BoxedSink,
    machine: StateMachine,
    keys: MaskKeyProvider,
    role: Role,
    terminal: Option<Terminal>,
    state_tx: watch::Sender<CloseState>,
}

impl Writer {
    fn publish(&self) {
        self.state_tx.send_replace(self.machine.state());
    }

    /// Masks `frame` per the role and writes it out.
    async fn write(&mut self, mut frame: Frame) -> Result<()> {
        frame.set_mask(self.keys.next_key(self.role)?);
        trace!(
            opcode = ?frame.opcode(),
            fin = frame.is_fin(),
            len = frame.payload().len(),
            "send frame"
        );
        self.sink.send(frame).await
    }

    /// Like [`Writer::write`], but a failure ends the connection.
    async fn write_or_fail(&mut self, frame: Frame) -> Result<()> {
        match self.write(frame).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.fail(err.clone()).await;
                Err(err)
            }
        }
    }

    async fn fail(&mut self, err: WebSocketError) {
        warn!(error = %err, "connection failed");
        self.terminal.get_or_insert(Terminal::Error(err));
        self.shutdown().await;
    }

    /// Closes the write side of the transport and moves to `Closed`.
    async fn shutdown(&mut self) {
        if let Err(err) = self.sink.close().await {
            debug!(error = %err, "transport shutdown failed");
        }
        self.machine.finish();
        self.publish();
    }
}

struct Shared {
    id: ConnectionId,
    role: Role,
    strict_ping: bool,
    writer: Mutex<Writer>,
    state: watch::Receiver<CloseState>,
}

/// Cloneable handle for writing to a connection.
///
/// Every clone writes through the same serialized writer. Once the connection
/// has started closing, data sends fail with [`WebSocketError::ConnectionClosed`]
/// without touching the transport.
#[derive(Clone)]
pub struct Sender {
    shared: Arc<Shared>,
}

impl Sender {
    pub fn id(&self) -> ConnectionId {
        self.shared.id
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn state(&self) -> CloseState {
        *self.shared.state.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state().is_closed()
    }

    /// Resolves once the connection is `Closed`.
    pub async fn closed(&self) {
        let mut state = self.shared.state.clone();
        let _ = state.wait_for(|state| state.is_closed()).await;
    }

    /// Sends a text message.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let text: String = text.into();
        self.send_data(Frame::text(text)).await
    }

    /// Sends a binary message.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<()> {
        self.send_data(Frame::binary(data)).await
    }

    /// Sends a ping. The payload may hold at most 125 bytes.
    ///
    /// Pings are accepted until the connection is `Closed`, or only while it
    /// is `Open` with [`Options::with_strict_ping`].
    pub async fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        if payload.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlFrameTooLarge);
        }

        let strict = self.shared.strict_ping;
        let state = self.state();
        if state.is_closed() || (strict && !state.is_open()) {
            return Err(WebSocketError::ConnectionClosed);
        }

        let mut writer = self.shared.writer.lock().await;
        if !writer.machine.can_ping(strict) {
            return Err(WebSocketError::ConnectionClosed);
        }
        writer.write_or_fail(Frame::ping(payload)).await
    }

    /// Closes the connection.
    ///
    /// With a code, a close frame is sent and the connection waits for the
    /// peer's answer. Without one, the transport is shut down immediately.
    /// Closing a connection that is already closing is a no-op.
    ///
    /// # Errors
    /// [`WebSocketError::InvalidCloseCode`] if `code` may not be sent on the wire.
    pub async fn close(&self, code: Option<CloseCode>) -> Result<()> {
        self.close_inner(code, "").await
    }

    /// Closes the connection with a code and a reason of at most 123 bytes.
    pub async fn close_with_reason(&self, code: CloseCode, reason: &str) -> Result<()> {
        self.close_inner(Some(code), reason).await
    }

    async fn send_data(&self, frame: Frame) -> Result<()> {
        if !self.state().is_open() {
            return Err(WebSocketError::ConnectionClosed);
        }

        let mut writer = self.shared.writer.lock().await;
        if !writer.machine.can_send() {
            return Err(WebSocketError::ConnectionClosed);
        }
        writer.write_or_fail(frame).await
    }

    async fn close_inner(&self, code: Option<CloseCode>, reason: &str) -> Result<()> {
        if code.is_some_and(|code| !code.is_allowed()) {
            return Err(WebSocketError::InvalidCloseCode);
        }
        if 2 + reason.len() > MAX_CONTROL_PAYLOAD {
            return Err(WebSocketError::ControlFrameTooLarge);
        }

        let mut writer = self.shared.writer.lock().await;
        match writer.machine.local_close(code, reason) {
            LocalClose::SendClose(frame) => {
                writer.publish();
                writer.write_or_fail(frame).await
            }
            LocalClose::Shutdown => {
                writer.terminal.get_or_insert(Terminal::Close {
                    code: None,
                    reason: None,
                });
                writer.shutdown().await;
                Ok(())
            }
            LocalClose::Ignore => Ok(()),
        }
    }

    /// Answers a ping from the peer.
    async fn pong(&self, payload: Bytes) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        match writer.machine.ping(payload) {
            Some(pong) => writer.write_or_fail(pong).await,
            None => Ok(()),
        }
    }

    /// Completes the close handshake for a close frame from the peer.
    async fn remote_close(&self, close: CloseFrame) -> Result<()> {
        let mut writer = self.shared.writer.lock().await;
        match writer.machine.remote_close(&close) {
            RemoteClose::Acknowledged => {
                writer.terminal.get_or_insert(Terminal::Close {
                    code: close.code,
                    reason: close.reason,
                });
                writer.shutdown().await;
            }
            RemoteClose::Echo(echo) => {
                writer.publish();
                writer.write_or_fail(echo).await?;
                writer.terminal.get_or_insert(Terminal::Close {
                    code: close.code,
                    reason: close.reason,
                });
                writer.shutdown().await;
            }
            RemoteClose::Ignore => {}
        }
        Ok(())
    }

    /// The peer broke the protocol: answer with a close frame if possible, then shut down.
    async fn violation(&self, err: WebSocketError) {
        warn!(error = %err, "protocol violation");

        let mut writer = self.shared.writer.lock().await;
        let close = writer.machine.violation(&err);
        writer.terminal.get_or_insert(Terminal::Error(err));
        if let Some(close) = close {
            if let Err(err) = writer.write(close).await {
                debug!(error = %err, "failed to send close frame");
            }
        }
        writer.shutdown().await;
    }

    async fn transport_failed(&self, err: WebSocketError) {
        self.shared.writer.lock().await.fail(err).await;
    }

    /// The peer closed the transport.
    async fn eof(&self) {
        let mut writer = self.shared.writer.lock().await;
        let terminal = if writer.machine.state() == CloseState::CloseSent {
            debug!("transport closed before close acknowledgment");
            Terminal::Close {
                code: None,
                reason: None,
            }
        } else {
            Terminal::Error(std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into())
        };
        writer.terminal.get_or_insert(terminal);
        writer.shutdown().await;
    }

    async fn take_terminal(&self) -> Option<Terminal> {
        self.shared.writer.lock().await.terminal.take()
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("id", &self.shared.id)
            .field("role", &self.shared.role)
            .field("state", &self.state())
            .finish()
    }
}

/// Configures a [`Connection`] before it is bound to a stream.
///
/// ```rust
/// use hpx_ws_engine::{Connection, Options, Role, key::FixedKeySource};
///
/// let builder = Connection::builder(Role::Client)
///     .options(Options::default().with_max_payload_read(64 * 1024))
///     .key_source(FixedKeySource([1, 2, 3, 4]));
/// ```
#[must_use]
pub struct ConnectionBuilder {
    role: Role,
    options: Options,
    keys: Option<MaskKeyProvider>,
    read_buf: Option<BytesMut>,
}

impl ConnectionBuilder {
    pub fn new(role: Role) -> Self {
        Self {
            role,
            options: Options::default(),
            keys: None,
            read_buf: None,
        }
    }

    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Replaces the OS random source used for client masking keys.
    pub fn key_source(mut self, source: impl KeySource) -> Self {
        self.keys = Some(MaskKeyProvider::new(source));
        self
    }

    /// Bytes already read from the stream past the HTTP upgrade.
    ///
    /// They are decoded before anything is read from the stream.
    pub fn read_buf(mut self, buf: impl AsRef<[u8]>) -> Self {
        self.read_buf = Some(BytesMut::from(buf.as_ref()));
        self
    }

    /// Binds the connection to an upgraded stream.
    ///
    /// Returns the connection, which must be [run](Connection::run) to
    /// process inbound frames, and a [`Sender`] for the application.
    pub fn build<S, H>(self, stream: S, handler: H) -> (Connection<S, H>, Sender)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        H: Handler,
    {
        let codec = Codec::from((Decoder::new(self.options.payload_limit()), Encoder));

        let mut parts = FramedParts::new(stream, codec);
        if let Some(read_buf) = self.read_buf {
            parts.read_buf = read_buf;
        }

        let mut framed = Framed::from_parts(parts);
        if let Some(boundary) = self.options.max_backpressure_write_boundary {
            framed.set_backpressure_boundary(boundary);
        }

        let (sink, reader) = framed.split::<Frame>();
        let sink: BoxedSink = Box::pin(sink);

        let (state_tx, state) = watch::channel(CloseState::Open);
        let writer = Writer {
            sink,
            machine: StateMachine::new(),
            keys: self.keys.unwrap_or_default(),
            role: self.role,
            terminal: None,
            state_tx,
        };

        let sender = Sender {
            shared: Arc::new(Shared {
                id: ConnectionId::new(),
                role: self.role,
                strict_ping: self.options.strict_ping,
                writer: Mutex::new(writer),
                state,
            }),
        };

        let connection = Connection {
            reader,
            dispatcher: Dispatcher::new(
                self.role,
                self.options.utf8,
                self.options.read_buffer_limit(),
            ),
            handler,
            sender: sender.clone(),
        };

        (connection, sender)
    }
}

/// One WebSocket connection over an upgraded stream.
///
/// Created with [`Connection::builder`]. Nothing is read until
/// [`Connection::run`] is awaited.
pub struct Connection<S, H> {
    reader: SplitStream<Framed<S, Codec>>,
    dispatcher: Dispatcher,
    handler: H,
    sender: Sender,
}

impl Connection<(), ()> {
    pub fn builder(role: Role) -> ConnectionBuilder {
        ConnectionBuilder::new(role)
    }
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    H: Handler,
{
    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    /// Runs the connection until it is closed.
    ///
    /// Calls [`Handler::on_open`] first, dispatches inbound frames in order,
    /// and ends with exactly one call to [`Handler::on_close`] or
    /// [`Handler::on_error`].
    ///
    /// # Errors
    /// The protocol violation or transport failure that ended the connection,
    /// the same one passed to [`Handler::on_error`].
    pub async fn run(self) -> Result<()> {
        let span = debug_span!(
            "websocket",
            id = %self.sender.id(),
            role = %self.sender.role()
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(self) -> Result<()> {
        let Self {
            mut reader,
            mut dispatcher,
            mut handler,
            sender,
        } = self;

        debug!("connection open");
        handler.on_open(&sender).await;

        loop {
            let item = tokio::select! {
                biased;
                _ = sender.closed() => break,
                item = reader.next() => item,
            };

            let frame = match item {
                Some(Ok(frame)) => frame,
                Some(Err(err)) if err.is_protocol_error() => {
                    sender.violation(err).await;
                    continue;
                }
                Some(Err(err)) => {
                    sender.transport_failed(err).await;
                    continue;
                }
                None => {
                    sender.eof().await;
                    continue;
                }
            };

            trace!(
                opcode = ?frame.opcode(),
                fin = frame.is_fin(),
                len = frame.payload().len(),
                "recv frame"
            );

            match dispatcher.route(frame) {
                Ok(Route::Text(text)) => handler.on_text(&sender, text).await,
                Ok(Route::Binary(data)) => handler.on_binary(&sender, data).await,
                Ok(Route::Pong(payload)) => handler.on_pong(&sender, payload).await,
                Ok(Route::Ping(payload)) => {
                    // a failed pong is recorded as the terminal error
                    let _ = sender.pong(payload).await;
                }
                Ok(Route::Close(close)) => {
                    let _ = sender.remote_close(close).await;
                }
                Ok(Route::Buffered) => {}
                Err(err) => sender.violation(err).await,
            }
        }

        let terminal = sender.take_terminal().await.unwrap_or(Terminal::Close {
            code: None,
            reason: None,
        });
        match terminal {
            Terminal::Close { code, reason } => {
                debug!(?code, "connection closed");
                handler.on_close(&sender, code, reason).await;
                Ok(())
            }
            Terminal::Error(err) => {
                debug!(error = %err, "connection failed");
                handler.on_error(&sender, err.clone()).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    use super::*;
    use crate::key::FixedKeySource;

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<StdMutex<Vec<String>>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn push(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl Handler for Recorder {
        async fn on_open(&mut self, _ws: &Sender) {
            self.push("open".into());
        }

        async fn on_text(&mut self, _ws: &Sender, text: String) {
            self.push(format!("text:{text}"));
        }

        async fn on_close(&mut self, _ws: &Sender, code: Option<CloseCode>, _reason: Option<String>) {
            self.push(format!("close:{code:?}"));
        }

        async fn on_error(&mut self, _ws: &Sender, err: WebSocketError) {
            self.push(format!("error:{err}"));
        }
    }

    #[tokio::test]
    async fn test_local_close_without_code_shuts_down() {
        let (local, mut remote) = duplex(1024);
        let recorder = Recorder::default();
        let (conn, sender) = Connection::builder(Role::Server).build(local, recorder.clone());
        let task = tokio::spawn(conn.run());

        sender.close(None).await.unwrap();
        assert!(sender.is_closed());
        task.await.unwrap().unwrap();

        // the transport was shut down without a close frame
        let mut buf = Vec::new();
        remote.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        assert_eq!(recorder.calls(), vec!["open", "close:None"]);
        assert!(matches!(
            sender.send_text("late").await,
            Err(WebSocketError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_client_frames_use_injected_key() {
        let (local, mut remote) = duplex(1024);
        let (_conn, sender) = Connection::builder(Role::Client)
            .key_source(FixedKeySource([0x37, 0xfa, 0x21, 0x3d]))
            .build(local, Recorder::default());

        sender.send_text("Hello").await.unwrap();

        let mut buf = [0u8; 11];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(
            buf,
            [0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[tokio::test]
    async fn test_read_buf_is_decoded_first() {
        let (local, mut remote) = duplex(1024);
        let recorder = Recorder::default();
        let (conn, _sender) = Connection::builder(Role::Client)
            .read_buf([0x81, 0x02, b'h', b'i'])
            .build(local, recorder.clone());
        let task = tokio::spawn(conn.run());

        remote.write_all(&[0x88, 0x02, 0x03, 0xE8]).await.unwrap();
        task.await.unwrap().unwrap();

        assert_eq!(recorder.calls(), vec!["open", "text:hi", "close:Some(Normal)"]);
    }

    #[tokio::test]
    async fn test_unexpected_eof_is_an_error() {
        let (local, remote) = duplex(1024);
        let recorder = Recorder::default();
        let (conn, _sender) = Connection::builder(Role::Server).build(local, recorder.clone());
        drop(remote);

        let err = conn.run().await.unwrap_err();
        assert_eq!(
            err.as_io_error().map(|e| e.kind()),
            Some(std::io::ErrorKind::UnexpectedEof)
        );
        assert_eq!(recorder.calls().len(), 2);
        assert!(recorder.calls()[1].starts_with("error:"));
    }

    #[tokio::test]
    async fn test_invalid_close_code_rejected() {
        let (local, _remote) = duplex(1024);
        let (_conn, sender) = Connection::builder(Role::Server).build(local, Recorder::default());

        assert!(matches!(
            sender.close(Some(CloseCode::Abnormal)).await,
            Err(WebSocketError::InvalidCloseCode)
        ));
        assert!(matches!(
            sender.ping(vec![0u8; 126]).await,
            Err(WebSocketError::ControlFrameTooLarge)
        ));
        assert_eq!(sender.state(), CloseState::Open);
    }
}
