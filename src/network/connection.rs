//! Connection - socket lifecycle dan readiness-multiplexing loop
//!
//! Satu background thread per session aktif menjalankan poll loop;
//! semua socket I/O dan listener callbacks jalan di thread itu.
//! `connect`/`disconnect`/`send` boleh dipanggil dari thread mana pun
//! (termasuk UI thread) dan tidak pernah block di network I/O.

use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Registry, Token};
use tracing::{debug, info, trace, warn};

use crate::config::ConnectionConfig;
use crate::error::ConnectionError;
use crate::network::listener::{ConnectionListener, ListenerSlot};
use crate::network::write_queue::WriteQueue;
use crate::protocol::{reassemble, EncodedFrame, OutboundMessage};

const CLIENT: Token = Token(0);
const EVENTS_CAPACITY: usize = 16;

/// Target connection: host + port. Immutable per connection attempt,
/// diganti utuh saat reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn resolve(&self) -> Result<SocketAddr, ConnectionError> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ConnectionError::AddressResolution(self.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Lifecycle state satu connection
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Closing = 3,
}

impl ConnectionState {
    #[inline(always)]
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Connected,
            3 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

/// State yang dibagi antara caller threads dan I/O loop.
///
/// Queue dan listener slot hidup melewati reconnect: message yang
/// belum terkirim tetap queued untuk session berikutnya.
struct Shared<M> {
    queue: WriteQueue<M>,
    listener: ListenerSlot,
    state: AtomicU8,
}

/// Handle ke satu session aktif (thread + interrupt flag)
struct SessionHandle {
    interrupt: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Single-socket TCP client dengan non-blocking send queue.
///
/// Caller enqueue message lewat [`send`](Connection::send); I/O loop
/// bangun saat socket writable, serialize lewat codec, tulis ke
/// socket. Inbound bytes di-reassemble jadi frames dan di-dispatch ke
/// [`ConnectionListener`] di I/O thread.
pub struct Connection<M: OutboundMessage + 'static> {
    config: ConnectionConfig,
    shared: Arc<Shared<M>>,
    session: Mutex<Option<SessionHandle>>,
    endpoint: Mutex<Option<Endpoint>>,
}

impl<M: OutboundMessage + 'static> Connection<M> {
    pub fn new(listener: Arc<dyn ConnectionListener>, config: ConnectionConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                queue: WriteQueue::new(),
                listener: ListenerSlot::new(listener),
                state: AtomicU8::new(ConnectionState::Disconnected as u8),
            }),
            session: Mutex::new(None),
            endpoint: Mutex::new(None),
        }
    }

    /// Mulai session baru ke endpoint.
    ///
    /// Session sebelumnya (kalau ada) di-teardown synchronous dulu:
    /// interrupt loop, tunggu thread selesai, `disconnected()` lama
    /// fire sebelum session baru jalan. Handshake session baru
    /// asynchronous - caller tidak menunggu.
    pub fn connect(&self, endpoint: Endpoint) {
        self.teardown_session();

        *self.lock_endpoint() = Some(endpoint.clone());
        self.shared
            .state
            .store(ConnectionState::Connecting as u8, Ordering::Release);

        let interrupt = Arc::new(AtomicBool::new(false));
        let session = Session {
            endpoint,
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
            interrupt: Arc::clone(&interrupt),
        };

        let spawned = thread::Builder::new()
            .name("iris-io".to_string())
            .spawn(move || session.run());

        match spawned {
            Ok(thread) => {
                *self.lock_session() = Some(SessionHandle { interrupt, thread });
            }
            Err(e) => {
                warn!(error = %e, "Failed to spawn I/O thread");
                self.shared
                    .state
                    .store(ConnectionState::Disconnected as u8, Ordering::Release);
            }
        }
    }

    /// Tutup session aktif. Idempotent: tanpa session aktif jadi no-op.
    ///
    /// `disconnected()` fire tepat sekali untuk session yang ditutup,
    /// dari I/O thread-nya sebelum thread selesai.
    pub fn disconnect(&self) {
        self.teardown_session();
    }

    /// Enqueue message untuk dikirim.
    ///
    /// Tidak pernah block di network I/O; aman dari thread mana pun.
    /// Message yang di-enqueue sebelum connect tetap queued dan
    /// terkirim begitu session establish.
    pub fn send(&self, message: M) {
        self.shared.queue.enqueue(message);
    }

    /// Lepas listener: tidak ada callback lagi setelah ini.
    /// I/O loop tetap jalan.
    pub fn detach_listener(&self) {
        self.shared.listener.detach();
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Endpoint dari connect() terakhir
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.lock_endpoint().clone()
    }

    /// Jumlah message yang masih menunggu di write queue
    pub fn pending_sends(&self) -> usize {
        self.shared.queue.len()
    }

    fn teardown_session(&self) {
        let handle = self.lock_session().take();
        if let Some(handle) = handle {
            self.shared
                .state
                .store(ConnectionState::Closing as u8, Ordering::Release);
            handle.interrupt.store(true, Ordering::Release);

            // Dari callback (I/O thread sendiri) tidak boleh join diri
            // sendiri; flag saja sudah menghentikan loop.
            if handle.thread.thread().id() != thread::current().id() {
                let _ = handle.thread.join();
            }
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, Option<SessionHandle>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_endpoint(&self) -> std::sync::MutexGuard<'_, Option<Endpoint>> {
        self.endpoint.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<M: OutboundMessage + 'static> Drop for Connection<M> {
    fn drop(&mut self) {
        self.teardown_session();
    }
}

/// Satu session: socket + poll + loop state. Exclusively owned oleh
/// I/O thread; tidak ada yang menyentuh ini dari luar.
struct Session<M: OutboundMessage> {
    endpoint: Endpoint,
    config: ConnectionConfig,
    shared: Arc<Shared<M>>,
    interrupt: Arc<AtomicBool>,
}

impl<M: OutboundMessage> Session<M> {
    /// Entry point I/O thread. Apa pun hasil loop, state balik ke
    /// Disconnected dan `disconnected()` fire tepat sekali.
    fn run(self) {
        match self.drive() {
            Ok(()) => debug!(endpoint = %self.endpoint, "Session closed"),
            Err(ConnectionError::PeerClosed) => {
                debug!(endpoint = %self.endpoint, "Peer closed connection");
            }
            Err(ConnectionError::Interrupted) => {
                trace!(endpoint = %self.endpoint, "Session interrupted");
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "Session ended with error");
            }
        }

        self.shared
            .state
            .store(ConnectionState::Disconnected as u8, Ordering::Release);
        if let Some(listener) = self.shared.listener.get() {
            listener.disconnected();
        }
    }

    /// Readiness loop. Suspend hanya di dalam poll dengan bounded
    /// timeout, supaya interrupt flag tetap ke-cek walaupun socket
    /// diam total.
    fn drive(&self) -> Result<(), ConnectionError> {
        let addr = self.endpoint.resolve()?;
        info!(host = %self.endpoint.host, port = self.endpoint.port, "Connecting");

        let mut poll = Poll::new()?;
        let mut stream = TcpStream::connect(addr)?;
        stream.set_nodelay(self.config.nodelay)?;
        #[cfg(unix)]
        self.tune_socket(&stream);

        // Selama handshake, writability adalah connect-readiness
        poll.registry()
            .register(&mut stream, CLIENT, Interest::WRITABLE)?;

        let mut events = Events::with_capacity(EVENTS_CAPACITY);
        let mut read_buf = vec![0u8; self.config.read_buffer_bytes].into_boxed_slice();
        let mut in_flight: Option<EncodedFrame> = None;
        let mut connected = false;
        let mut write_interest = false;

        while !self.interrupted() {
            // Toggle write interest di loop thread, bukan di send():
            // reregister cuma flip flags, tidak block caller di tengah
            // poll yang sedang jalan.
            if connected {
                let want = in_flight.is_some() || !self.shared.queue.is_empty();
                if want != write_interest {
                    let interest = if want {
                        Interest::READABLE | Interest::WRITABLE
                    } else {
                        Interest::READABLE
                    };
                    poll.registry().reregister(&mut stream, CLIENT, interest)?;
                    write_interest = want;
                }
            }

            match poll.poll(&mut events, Some(self.config.poll_timeout)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                if event.token() != CLIENT {
                    continue;
                }

                if !connected {
                    // Connect gagal muncul sebagai error event; take_error
                    // di finish_connect yang mengangkatnya
                    if (event.is_writable() || event.is_error())
                        && self.finish_connect(&mut stream, poll.registry())?
                    {
                        connected = true;
                        write_interest = false;
                    }
                    continue;
                }

                if event.is_readable() {
                    self.handle_read(&mut stream, &mut read_buf)?;
                }

                if event.is_writable() {
                    let drained = self.drain_queue(&mut stream, &mut in_flight)?;
                    if drained {
                        // Socket established hampir selalu writable;
                        // lepas write interest saat queue kering supaya
                        // poll tidak jadi readiness storm.
                        poll.registry()
                            .reregister(&mut stream, CLIENT, Interest::READABLE)?;
                        write_interest = false;
                    }
                }
            }
        }

        // Interrupt = close yang diminta, bukan error
        Ok(())
    }

    /// Connect-readiness: handshake selesai saat socket writable dan
    /// tidak menyimpan error. Setelah established, pindah interest ke
    /// read dan fire `connected()`.
    fn finish_connect(
        &self,
        stream: &mut TcpStream,
        registry: &Registry,
    ) -> Result<bool, ConnectionError> {
        if let Some(err) = stream.take_error()? {
            return Err(err.into());
        }
        match stream.peer_addr() {
            Ok(peer) => {
                registry.reregister(stream, CLIENT, Interest::READABLE)?;
                self.shared
                    .state
                    .store(ConnectionState::Connected as u8, Ordering::Release);
                info!(peer = %peer, "Connection established");
                if let Some(listener) = self.shared.listener.get() {
                    listener.connected();
                }
                Ok(true)
            }
            // Spurious wakeup: handshake belum selesai
            Err(ref e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Satu readiness event = satu read ke scratch buffer, lalu
    /// reassembly. Frame yang terpotong dilengkapi codec lewat
    /// follow-up reads dari socket yang sama.
    fn handle_read(
        &self,
        stream: &mut TcpStream,
        read_buf: &mut [u8],
    ) -> Result<(), ConnectionError> {
        let n = match stream.read(read_buf) {
            Ok(0) => return Err(ConnectionError::PeerClosed),
            Ok(n) => n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let interrupt = &self.interrupt;
        let mut frames = reassemble(&read_buf[..n], stream, || {
            interrupt.load(Ordering::Acquire)
        })?;

        // Kebanyakan read event bawa satu frame; batch callback cuma
        // untuk frames yang datang coalesced.
        if let Some(listener) = self.shared.listener.get() {
            match frames.len() {
                0 => {}
                1 => listener.received_frame(frames.remove(0)),
                _ => listener.received_frames(frames),
            }
        }
        Ok(())
    }

    /// Drain write queue. Returns true kalau queue kering dan semua
    /// bytes ter-flush (write interest boleh dilepas).
    ///
    /// Backpressure: write yang tidak diterima socket meninggalkan
    /// message di head queue untuk writability event berikutnya.
    /// Frame tidak pernah di-serialize ulang setelah partial write -
    /// sisa bytes-nya dipegang sampai flush selesai.
    fn drain_queue<W: Write>(
        &self,
        stream: &mut W,
        in_flight: &mut Option<EncodedFrame>,
    ) -> Result<bool, ConnectionError> {
        loop {
            // Sisa frame dari partial write sebelumnya duluan
            if let Some(pending) = in_flight {
                match write_some(stream, pending.remaining())? {
                    Some(n) if n > 0 => {
                        pending.advance(n);
                        if pending.is_done() {
                            *in_flight = None;
                            // Baru sekarang head boleh keluar dari queue
                            self.shared.queue.pop_head();
                            continue;
                        }
                        return Ok(false);
                    }
                    _ => return Ok(false),
                }
            }

            // Peek head, serialize; lock queue tidak dipegang
            // melintasi write syscall.
            let frame = match self.shared.queue.head_frame() {
                Some(frame) => frame,
                None => return Ok(true),
            };
            let mut encoded = EncodedFrame::new(&frame);

            match write_some(stream, encoded.remaining())? {
                Some(n) if n == encoded.remaining().len() => {
                    self.shared.queue.pop_head();
                }
                Some(n) if n > 0 => {
                    encoded.advance(n);
                    *in_flight = Some(encoded);
                    return Ok(false);
                }
                _ => {
                    // Send buffer penuh: head tetap di queue
                    return Ok(false);
                }
            }
        }
    }

    #[inline(always)]
    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::Acquire)
    }

    /// Socket options yang tidak di-expose mio, via setsockopt.
    /// Best-effort: kegagalan tuning bukan alasan gagal connect.
    #[cfg(unix)]
    fn tune_socket(&self, stream: &TcpStream) {
        use std::os::unix::io::AsRawFd;

        let fd = stream.as_raw_fd();

        if self.config.keepalive {
            set_sockopt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, 1);
        }
        if let Some(bytes) = self.config.send_buffer_bytes {
            set_sockopt(fd, libc::SOL_SOCKET, libc::SO_SNDBUF, bytes as libc::c_int);
        }
        if let Some(bytes) = self.config.recv_buffer_bytes {
            set_sockopt(fd, libc::SOL_SOCKET, libc::SO_RCVBUF, bytes as libc::c_int);
        }
    }
}

#[cfg(unix)]
fn set_sockopt(
    fd: std::os::unix::io::RawFd,
    level: libc::c_int,
    name: libc::c_int,
    value: libc::c_int,
) {
    unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Satu non-blocking write. `None` = socket tidak menerima bytes
/// (send buffer penuh), `Some(n)` = n bytes masuk send buffer.
fn write_some<W: Write>(stream: &mut W, buf: &[u8]) -> Result<Option<usize>, ConnectionError> {
    match stream.write(buf) {
        Ok(n) => Ok(Some(n)),
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(ref e) if e.kind() == io::ErrorKind::Interrupted => Ok(Some(0)),
        Err(e) => Err(e.into()),
    }
}
