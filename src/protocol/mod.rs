//! Protocol Layer: Length-Prefixed Packet Framing
//!
//! Prinsip desain:
//! - Stateless codec: reassembly tidak menyimpan state antar read events
//! - Fixed-size header: 1 byte opcode + 1 byte length
//! - Frame utuh atau tidak sama sekali: partial frame tidak pernah
//!   sampai ke listener

mod codec;
mod frame;

pub use codec::{reassemble, EncodedFrame};
pub use frame::{Frame, OutboundMessage, FRAME_HEADER_SIZE, MAX_FRAME_SIZE, MAX_PAYLOAD_SIZE};
