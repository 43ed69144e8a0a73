//! WebSocket connection configuration options.

/// The maximum allowed payload size for reading, set to 1 MiB.
///
/// Frames with a payload size larger than this limit will be rejected to ensure memory safety
/// and prevent excessively large messages from impacting performance.
pub const MAX_PAYLOAD_READ: usize = 1024 * 1024;

/// The maximum allowed read buffer size, set to 2 MiB.
///
/// When a fragmented message grows beyond this size the connection is closed
/// to prevent unbounded memory growth.
pub const MAX_READ_BUFFER: usize = 2 * 1024 * 1024;

/// How text messages that are not valid UTF-8 are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Utf8Policy {
    /// Invalid UTF-8 is a protocol violation, closed with 1007 (invalid payload data).
    #[default]
    Strict,
    /// Invalid sequences are replaced with U+FFFD and the message is delivered.
    Lossy,
}

/// Configuration options for a WebSocket connection.
///
/// # Example
/// ```rust
/// use hpx_ws_engine::Options;
///
/// let options = Options::default()
///     .with_limits(128 * 1024, 256 * 1024) // Small payload/buffer limits
///     .with_strict_ping();
/// ```
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Maximum allowed payload size for a single incoming frame, in bytes.
    ///
    /// A larger frame is a protocol violation and the connection is closed with 1009.
    ///
    /// Default: 1 MiB (1,048,576 bytes) as defined in [`MAX_PAYLOAD_READ`]
    pub max_payload_read: Option<usize>,

    /// Maximum size of a message reassembled from fragments.
    ///
    /// Default: 2 MiB (2,097,152 bytes) as defined in [`MAX_READ_BUFFER`], or twice the
    /// configured `max_payload_read` value if that is set.
    pub max_read_buffer: Option<usize>,

    /// Handling of invalid UTF-8 in text messages.
    ///
    /// Default: [`Utf8Policy::Strict`]
    pub utf8: Utf8Policy,

    /// Reject application pings once a close frame has been sent or received.
    ///
    /// Default: `false`, pings are allowed until the connection is `Closed`.
    pub strict_ping: bool,

    /// Backpressure boundary for the write buffer in bytes.
    ///
    /// Default: `None` (uses tokio-util default)
    pub max_backpressure_write_boundary: Option<usize>,
}

impl Options {
    /// Configures payload and buffer size limits.
    ///
    /// # Parameters
    /// - `max_payload`: Maximum size for a single frame's payload
    /// - `max_buffer`: Maximum size for a reassembled fragmented message
    pub fn with_limits(self, max_payload: usize, max_buffer: usize) -> Self {
        Self {
            max_payload_read: Some(max_payload),
            max_read_buffer: Some(max_buffer),
            ..self
        }
    }

    /// Sets the maximum allowed payload size for incoming frames.
    pub fn with_max_payload_read(self, size: usize) -> Self {
        Self {
            max_payload_read: Some(size),
            ..self
        }
    }

    /// Sets the maximum size of a reassembled fragmented message.
    pub fn with_max_read_buffer(self, size: usize) -> Self {
        Self {
            max_read_buffer: Some(size),
            ..self
        }
    }

    /// Delivers text messages with invalid UTF-8 lossily instead of closing the connection.
    pub fn with_lossy_utf8(self) -> Self {
        Self {
            utf8: Utf8Policy::Lossy,
            ..self
        }
    }

    /// Rejects application pings with `ConnectionClosed` once closing has started.
    pub fn with_strict_ping(self) -> Self {
        Self {
            strict_ping: true,
            ..self
        }
    }

    /// Sets the backpressure boundary of the write buffer.
    pub fn with_backpressure_boundary(self, size: usize) -> Self {
        Self {
            max_backpressure_write_boundary: Some(size),
            ..self
        }
    }

    /// Effective per-frame payload ceiling.
    pub(crate) fn payload_limit(&self) -> usize {
        self.max_payload_read.unwrap_or(MAX_PAYLOAD_READ)
    }

    /// Effective ceiling for a reassembled message.
    pub(crate) fn read_buffer_limit(&self) -> usize {
        self.max_read_buffer.unwrap_or(
            self.max_payload_read
                .map(|payload_read| payload_read.saturating_mul(2))
                .unwrap_or(MAX_READ_BUFFER),
        )
    }
}
