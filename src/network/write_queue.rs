//! Outbound Write Queue - mutex-guarded FIFO
//!
//! Satu-satunya shared state yang dimutasi lebih dari satu thread:
//! producer (caller thread mana pun) enqueue, I/O loop drain.
//! Message di-remove hanya setelah seluruh bytes-nya tertulis ke
//! socket send buffer.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::protocol::{Frame, OutboundMessage};

/// FIFO unbounded untuk outbound messages.
///
/// Lock dipegang hanya untuk peek/remove, tidak pernah melintasi
/// write syscall - producer tidak pernah stall di belakang network.
pub struct WriteQueue<M> {
    inner: Mutex<VecDeque<M>>,
}

impl<M: OutboundMessage> WriteQueue<M> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue message. Tidak pernah block di network I/O;
    /// aman dipanggil dari thread mana pun.
    pub fn enqueue(&self, message: M) {
        self.lock().push_back(message);
    }

    /// Serialize head queue ke frame tanpa remove.
    ///
    /// Head tetap di queue sampai `pop_head` - backpressure path
    /// (zero-byte write) meninggalkan message untuk drain berikutnya.
    pub fn head_frame(&self) -> Option<Frame> {
        self.lock().front().map(OutboundMessage::to_frame)
    }

    /// Remove head setelah fully written.
    pub fn pop_head(&self) {
        self.lock().pop_front();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Poisoned lock berarti ada panic di critical section pendek
    /// (push/pop); datanya tetap konsisten, lanjut pakai.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<M>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<M: OutboundMessage> Default for WriteQueue<M> {
    fn default() -> Self {
        Self::new()
    }
}
