//! Konfigurasi connection - semua parameter ditentukan saat konstruksi.
//!
//! Tidak ada file config atau env loading: core ini tidak punya
//! persisted state.

use std::time::Duration;

/// Default bound untuk readiness poll - loop re-check interrupted flag
/// setiap interval ini walaupun tidak ada socket activity.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Default ukuran scratch read buffer.
pub const DEFAULT_READ_BUFFER_BYTES: usize = 8 * 1024;

/// Parameter connection, fixed per instance.
///
/// Socket buffer sizes opsional; `None` berarti pakai default OS.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Bound untuk satu readiness poll
    pub poll_timeout: Duration,
    /// Ukuran scratch buffer untuk reads (fixed, reused antar reads)
    pub read_buffer_bytes: usize,
    /// TCP_NODELAY untuk minimal latency
    pub nodelay: bool,
    /// SO_KEEPALIVE
    pub keepalive: bool,
    /// SO_SNDBUF (None = OS default)
    pub send_buffer_bytes: Option<usize>,
    /// SO_RCVBUF (None = OS default)
    pub recv_buffer_bytes: Option<usize>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
            nodelay: true,
            keepalive: true,
            send_buffer_bytes: None,
            recv_buffer_bytes: None,
        }
    }
}

impl ConnectionConfig {
    /// Config dengan poll timeout dan buffer size tertentu,
    /// socket options default.
    pub fn new(poll_timeout: Duration, read_buffer_bytes: usize) -> Self {
        Self {
            poll_timeout,
            read_buffer_bytes,
            ..Self::default()
        }
    }
}
