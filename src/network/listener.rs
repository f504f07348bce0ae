//! Listener surface - satu-satunya jalan event keluar dari core.
//!
//! Semua callback jalan di I/O thread milik session. Consumer yang
//! butuh thread lain harus hand-off sendiri; core ini tidak punya
//! thread pool untuk callback.

use std::sync::{Arc, Mutex};

use crate::protocol::Frame;

/// Events lifecycle dan data dari satu connection.
///
/// `disconnected` fire tepat sekali per session yang selesai, apa pun
/// penyebabnya (explicit close, peer close, I/O error). Error tidak
/// pernah dilempar melewati boundary ini.
pub trait ConnectionListener: Send + Sync {
    /// Handshake TCP selesai, connection established
    fn connected(&self);

    /// Session berakhir
    fn disconnected(&self);

    /// Tepat satu frame ter-parse dari read event terakhir
    fn received_frame(&self, frame: Frame);

    /// Dua frame atau lebih dari satu read event, dalam stream order.
    /// Batch menghindari overhead per-frame callback saat frames
    /// datang coalesced.
    fn received_frames(&self, frames: Vec<Frame>);
}

/// Slot listener yang bisa di-detach dari thread mana pun.
///
/// Detach hanya menghentikan callbacks, bukan I/O loop.
pub(crate) struct ListenerSlot {
    slot: Mutex<Option<Arc<dyn ConnectionListener>>>,
}

impl ListenerSlot {
    pub(crate) fn new(listener: Arc<dyn ConnectionListener>) -> Self {
        Self {
            slot: Mutex::new(Some(listener)),
        }
    }

    /// Snapshot listener saat ini; None kalau sudah di-detach
    pub(crate) fn get(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.lock().clone()
    }

    pub(crate) fn detach(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<dyn ConnectionListener>>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
