//! Loopback Integration Tests
//!
//! Semua test jalan melawan real TCP socket di 127.0.0.1 dengan
//! scripted server per test. Fokus: lifecycle events, frame dispatch
//! (single vs batch), wire ordering, dan teardown semantics.
//!
//! Usage:
//!   cargo test --test loopback

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use iris::{
    Connection, ConnectionConfig, ConnectionListener, ConnectionState, Endpoint, Frame,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Connected,
    Disconnected,
    Single(Frame),
    Batch(Vec<Frame>),
}

/// Listener perekam: semua callback masuk satu log berurutan
struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Poll sampai predicate true atau timeout
    fn wait_for<F: Fn(&[Event]) -> bool>(&self, pred: F) -> bool {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if pred(&self.events()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn count_disconnected(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| **e == Event::Disconnected)
            .count()
    }

    /// Semua frame yang diterima, flattened dalam arrival order
    fn frames(&self) -> Vec<Frame> {
        let mut out = Vec::new();
        for event in self.events() {
            match event {
                Event::Single(f) => out.push(f),
                Event::Batch(fs) => out.extend(fs),
                _ => {}
            }
        }
        out
    }
}

impl ConnectionListener for Recorder {
    fn connected(&self) {
        self.events.lock().unwrap().push(Event::Connected);
    }
    fn disconnected(&self) {
        self.events.lock().unwrap().push(Event::Disconnected);
    }
    fn received_frame(&self, frame: Frame) {
        self.events.lock().unwrap().push(Event::Single(frame));
    }
    fn received_frames(&self, frames: Vec<Frame>) {
        self.events.lock().unwrap().push(Event::Batch(frames));
    }
}

/// Config test: poll pendek supaya test cepat responsive
fn test_config() -> ConnectionConfig {
    ConnectionConfig::new(Duration::from_millis(10), 4096)
}

/// Spawn scripted server di port ephemeral; script dapat stream
/// yang sudah accepted.
fn server<F>(script: F) -> (Endpoint, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            stream.set_nodelay(true).ok();
            script(stream);
        }
    });
    (Endpoint::new("127.0.0.1", port), handle)
}

/// Baca dari server side sampai n bytes atau timeout
fn read_exactly(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    stream
        .set_read_timeout(Some(WAIT_TIMEOUT))
        .expect("set timeout");
    let mut out = vec![0u8; n];
    let mut filled = 0;
    while filled < n {
        match stream.read(&mut out[filled..]) {
            Ok(0) => break,
            Ok(got) => filled += got,
            Err(_) => break,
        }
    }
    out.truncate(filled);
    out
}

fn encode(frame: &Frame) -> Vec<u8> {
    let mut bytes = vec![frame.opcode(), frame.len()];
    bytes.extend_from_slice(frame.payload());
    bytes
}

#[test]
fn test_connect_and_disconnect_lifecycle() {
    let (endpoint, server) = server(|stream| {
        // Tahan connection sampai client tutup
        let mut stream = stream;
        let mut buf = [0u8; 64];
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());

    conn.connect(endpoint.clone());
    assert!(recorder.wait_for(|e| e.contains(&Event::Connected)));
    assert_eq!(conn.state(), ConnectionState::Connected);
    assert_eq!(conn.endpoint(), Some(endpoint));

    conn.disconnect();
    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnected)));
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    server.join().unwrap();
}

#[test]
fn test_single_frame_dispatches_single_callback() {
    let (endpoint, server) = server(|mut stream| {
        stream.write_all(&[5, 3, 1, 2, 3]).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);

    assert!(recorder.wait_for(|e| e.iter().any(|ev| matches!(ev, Event::Single(_)))));
    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode(), 5);
    assert_eq!(frames[0].payload(), &[1, 2, 3]);

    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_zero_length_frame_is_valid() {
    let (endpoint, server) = server(|mut stream| {
        stream.write_all(&[42, 0]).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);

    assert!(recorder.wait_for(|e| e.iter().any(|ev| matches!(ev, Event::Single(_)))));
    let frames = recorder.frames();
    assert_eq!(frames[0].opcode(), 42);
    assert!(frames[0].payload().is_empty());

    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_coalesced_frames_dispatch_as_batch() {
    // Banyak frame dalam satu write setelah client settle di poll:
    // semua bytes sudah di receive buffer saat readiness fire, jadi
    // satu read event membawa multi-frame batch.
    let expected: Vec<Frame> = (0..20u8)
        .map(|i| Frame::new(i, vec![i, i.wrapping_mul(2)]).unwrap())
        .collect();
    let wire: Vec<u8> = expected.iter().flat_map(|f| encode(f)).collect();

    let (endpoint, server) = server(move |mut stream| {
        thread::sleep(Duration::from_millis(100));
        stream.write_all(&wire).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);

    assert!(recorder.wait_for(|_| recorder.frames().len() == 20));

    // Stream order terjaga, apa pun pembagian read events-nya
    assert_eq!(recorder.frames(), expected);

    // Burst sebesar ini tidak mungkin datang satu frame per read
    let saw_batch = recorder
        .events()
        .iter()
        .any(|e| matches!(e, Event::Batch(fs) if fs.len() >= 2));
    assert!(saw_batch, "expected at least one batch dispatch");

    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_frame_split_across_writes_reassembles() {
    // Header + 1 payload byte dulu, sisanya nyusul: tidak boleh ada
    // frame sebelum payload lengkap, lalu tepat satu frame utuh.
    let (endpoint, server) = server(|mut stream| {
        stream.write_all(&[5, 3, 1]).unwrap();
        stream.flush().unwrap();
        thread::sleep(Duration::from_millis(150));
        stream.write_all(&[2, 3]).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);

    assert!(recorder.wait_for(|e| e.contains(&Event::Connected)));
    thread::sleep(Duration::from_millis(75));
    // Payload belum lengkap: belum boleh ada frame
    assert!(recorder.frames().is_empty());

    assert!(recorder.wait_for(|_| !recorder.frames().is_empty()));
    let frames = recorder.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].opcode(), 5);
    assert_eq!(frames[0].payload(), &[1, 2, 3]);

    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_sent_messages_arrive_in_enqueue_order() {
    let messages: Vec<Frame> = vec![
        Frame::new(1, b"first".to_vec()).unwrap(),
        Frame::new(2, Vec::new()).unwrap(),
        Frame::new(3, b"third".to_vec()).unwrap(),
        Frame::new(4, vec![0xFF; 255]).unwrap(),
    ];
    let expected: Vec<u8> = messages.iter().flat_map(|f| encode(f)).collect();
    let expected_len = expected.len();

    let (tx, rx) = std::sync::mpsc::channel::<Vec<u8>>();
    let (endpoint, server) = server(move |mut stream| {
        let bytes = read_exactly(&mut stream, expected_len);
        tx.send(bytes).unwrap();
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());

    // Sebagian di-enqueue sebelum connect: tetap terkirim duluan
    conn.send(messages[0].clone());
    conn.connect(endpoint);
    for msg in &messages[1..] {
        conn.send(msg.clone());
    }

    let wire = rx.recv_timeout(WAIT_TIMEOUT).expect("server read");
    assert_eq!(wire, expected);

    conn.disconnect();
    server.join().unwrap();
}

#[test]
fn test_peer_close_fires_disconnected_once() {
    let (endpoint, server) = server(|stream| {
        // Server langsung tutup setelah accept
        drop(stream);
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnected)));
    assert_eq!(recorder.count_disconnected(), 1);
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    server.join().unwrap();
}

#[test]
fn test_double_disconnect_fires_disconnected_once() {
    let (endpoint, server) = server(|stream| {
        let mut stream = stream;
        let mut buf = [0u8; 64];
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);
    assert!(recorder.wait_for(|e| e.contains(&Event::Connected)));

    conn.disconnect();
    conn.disconnect();

    assert!(recorder.wait_for(|e| e.contains(&Event::Disconnected)));
    // Beri waktu kalau ada duplikat yang mau muncul
    thread::sleep(Duration::from_millis(100));
    assert_eq!(recorder.count_disconnected(), 1);
    server.join().unwrap();
}

#[test]
fn test_reconnect_tears_down_prior_session_first() {
    let hold = |stream: TcpStream| {
        let mut stream = stream;
        let mut buf = [0u8; 64];
        while let Ok(n) = stream.read(&mut buf) {
            if n == 0 {
                break;
            }
        }
    };
    let (first, server_a) = server(hold);
    let (second, server_b) = server(hold);

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());

    conn.connect(first);
    assert!(recorder.wait_for(|e| e.contains(&Event::Connected)));

    conn.connect(second.clone());
    assert!(recorder.wait_for(|e| {
        e.iter().filter(|ev| **ev == Event::Connected).count() == 2
    }));

    // disconnected() session lama harus mendahului connected() baru
    let events: Vec<Event> = recorder
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Connected | Event::Disconnected))
        .collect();
    assert_eq!(
        events,
        vec![Event::Connected, Event::Disconnected, Event::Connected]
    );
    assert_eq!(conn.endpoint(), Some(second));

    conn.disconnect();
    server_a.join().unwrap();
    server_b.join().unwrap();
}

#[test]
fn test_detached_listener_gets_no_callbacks() {
    let (endpoint, server) = server(|mut stream| {
        thread::sleep(Duration::from_millis(100));
        // Client mungkin sudah tutup; yang penting tidak ada callback
        let _ = stream.write_all(&[9, 1, 0x77]);
        thread::sleep(Duration::from_millis(200));
    });

    let recorder = Recorder::new();
    let conn: Connection<Frame> = Connection::new(recorder.clone(), test_config());
    conn.connect(endpoint);
    assert!(recorder.wait_for(|e| e.contains(&Event::Connected)));

    conn.detach_listener();
    conn.disconnect();
    thread::sleep(Duration::from_millis(100));

    // Setelah detach: tidak ada frame dan tidak ada disconnected
    assert_eq!(recorder.count_disconnected(), 0);
    assert!(recorder.frames().is_empty());
    server.join().unwrap();
}
