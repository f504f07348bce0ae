//! Iris - Event-Driven TCP Client Core
//!
//! Arsitektur:
//! - Readiness Multiplexing: satu mio poll loop per session di
//!   dedicated thread
//! - Non-Blocking Send: caller enqueue, I/O loop drain saat writable
//! - Packet Framing: `[opcode][length][payload]`, reassembly tahan
//!   partial reads dan multi-frame batches
//! - Callback Listener: lifecycle + data events, semua di I/O thread
//!
//! ```no_run
//! use std::sync::Arc;
//! use iris::{Connection, ConnectionConfig, ConnectionListener, Endpoint, Frame};
//!
//! struct Printer;
//!
//! impl ConnectionListener for Printer {
//!     fn connected(&self) {
//!         println!("connected");
//!     }
//!     fn disconnected(&self) {
//!         println!("disconnected");
//!     }
//!     fn received_frame(&self, frame: Frame) {
//!         println!("frame op={}", frame.opcode());
//!     }
//!     fn received_frames(&self, frames: Vec<Frame>) {
//!         println!("{} frames", frames.len());
//!     }
//! }
//!
//! let conn: Connection<Frame> =
//!     Connection::new(Arc::new(Printer), ConnectionConfig::default());
//! conn.connect(Endpoint::new("127.0.0.1", 40801));
//! conn.send(Frame::new(1, b"hello".to_vec()).unwrap());
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod protocol;

pub use config::ConnectionConfig;
pub use error::{ConnectionError, Result};
pub use network::{Connection, ConnectionListener, ConnectionState, Endpoint};
pub use protocol::{Frame, OutboundMessage};
