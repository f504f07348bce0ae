//! Network Layer: Event-Driven Connection Core
//!
//! Menggunakan mio untuk non-blocking I/O multiplexing.
//!
//! Fitur:
//! - Satu dedicated I/O thread per session, poll dengan bounded timeout
//! - Write interest hanya aktif saat ada data pending (tidak ada
//!   readiness storm di socket yang selalu writable)
//! - Mutex-guarded FIFO untuk outbound, callbacks di I/O thread

mod connection;
mod listener;
mod write_queue;

pub use connection::{Connection, ConnectionState, Endpoint};
pub use listener::ConnectionListener;
