//! Framing Codec - stateless encode/reassembly
//!
//! Write path: satu message → satu contiguous buffer (header + payload),
//! pre-sized untuk frame terbesar. Tidak ada alokasi di encode path.
//!
//! Read path: cursor di atas bytes hasil satu read event. Kalau payload
//! sebuah frame belum lengkap di buffer, sisa bytes diambil lewat
//! follow-up non-blocking reads - frame tidak pernah di-split atau
//! dikorupsi oleh reassembly.

use std::io::{self, Read};

use crate::error::ConnectionError;
use crate::protocol::frame::{Frame, MAX_FRAME_SIZE};

/// Encoded bytes untuk tepat satu frame, dengan write progress.
///
/// Write offset dipertahankan supaya partial write bisa dilanjutkan
/// tanpa re-serialize; message tetap di head queue sampai semua bytes
/// ter-flush.
pub struct EncodedFrame {
    buf: [u8; MAX_FRAME_SIZE],
    len: usize,
    pos: usize,
}

impl EncodedFrame {
    /// Serialize frame ke buffer internal
    pub fn new(frame: &Frame) -> Self {
        let mut buf = [0u8; MAX_FRAME_SIZE];
        let payload = frame.payload();
        buf[0] = frame.opcode();
        buf[1] = frame.len();
        buf[2..2 + payload.len()].copy_from_slice(payload);
        Self {
            buf,
            len: frame.encoded_size(),
            pos: 0,
        }
    }

    /// Bytes yang belum tertulis ke socket
    #[inline(always)]
    pub fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..self.len]
    }

    /// Catat n bytes berhasil tertulis
    #[inline(always)]
    pub fn advance(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.len);
    }

    /// Semua bytes sudah ter-flush?
    #[inline(always)]
    pub fn is_done(&self) -> bool {
        self.pos >= self.len
    }

    /// Encoded frame lengkap, tanpa memperhitungkan write progress
    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

/// Parse semua frame lengkap dari bytes satu read event.
///
/// `initial` adalah isi scratch buffer setelah read. Kalau sebuah frame
/// terpotong di `initial` (header maupun payload), sisanya dibaca dari
/// `channel` sampai lengkap, peer close, atau `interrupted` true.
///
/// Returns frames dalam stream order. `Err` berarti connection harus
/// ditutup - tidak ada partial frame yang pernah di-dispatch.
pub fn reassemble<R, F>(
    initial: &[u8],
    channel: &mut R,
    interrupted: F,
) -> Result<Vec<Frame>, ConnectionError>
where
    R: Read,
    F: Fn() -> bool,
{
    let mut frames = Vec::new();
    let mut pos = 0;

    while pos < initial.len() {
        let opcode = initial[pos];
        pos += 1;

        // Length byte bisa ikut terpotong di batas read
        let length = if pos < initial.len() {
            let l = initial[pos];
            pos += 1;
            l as usize
        } else {
            let mut b = [0u8; 1];
            fill_from_channel(channel, &mut b, &interrupted)?;
            b[0] as usize
        };

        let available = initial.len() - pos;
        let take = available.min(length);
        let mut payload = Vec::with_capacity(length);
        payload.extend_from_slice(&initial[pos..pos + take]);
        pos += take;

        if payload.len() < length {
            let start = payload.len();
            payload.resize(length, 0);
            fill_from_channel(channel, &mut payload[start..], &interrupted)?;
        }

        frames.push(Frame::from_wire(opcode, payload));
    }

    Ok(frames)
}

/// Baca tepat `buf.len()` bytes dari channel non-blocking.
///
/// WouldBlock berarti sisa frame masih in-flight: spin sampai bytes
/// datang. Check interrupted tiap iterasi supaya disconnect tetap
/// live walaupun peer stall di tengah frame.
fn fill_from_channel<R, F>(
    channel: &mut R,
    buf: &mut [u8],
    interrupted: &F,
) -> Result<(), ConnectionError>
where
    R: Read,
    F: Fn() -> bool,
{
    let mut filled = 0;
    while filled < buf.len() {
        if interrupted() {
            return Err(ConnectionError::Interrupted);
        }
        match channel.read(&mut buf[filled..]) {
            Ok(0) => return Err(ConnectionError::PeerClosed),
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                std::hint::spin_loop();
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
