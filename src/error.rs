//! Error types untuk connection core.
//!
//! Semua kegagalan I/O ditangani lokal dengan session teardown;
//! listener tidak pernah melihat error, hanya lifecycle events.

use std::io;
use thiserror::Error;

/// Primary error type untuk operasi connection dan codec
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Payload too large: {0} bytes (max 255)")]
    OversizedPayload(usize),

    #[error("Address resolution failed for {0}")]
    AddressResolution(String),

    #[error("Session interrupted")]
    Interrupted,
}

/// Type alias untuk Results dengan ConnectionError
pub type Result<T> = std::result::Result<T, ConnectionError>;
