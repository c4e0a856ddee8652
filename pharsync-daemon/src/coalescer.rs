//! Merges bursts of change notifications into one wake-up.
//!
//! Producers ([`ChangeNotifier`]) insert identities into a shared pending set
//! and try to fill a single-slot wake-up channel. The consumer
//! ([`ChangeCoalescer`]) waits for the wake-up, then drains the whole set.
//!
//! The set is never lossy. The wake-up is: a full slot means a wake-up is
//! already outstanding, and the drain that follows it sees every identity
//! inserted before the drain.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use pharsync_core::Identity;

type Pending = Arc<Mutex<HashSet<Identity>>>;

/// Creates a connected producer/consumer pair.
pub fn channel() -> (ChangeNotifier, ChangeCoalescer) {
    let pending: Pending = Arc::new(Mutex::new(HashSet::new()));
    let (wake_tx, wake_rx) = mpsc::channel(1);
    (
        ChangeNotifier {
            pending: pending.clone(),
            wake_tx,
        },
        ChangeCoalescer { pending, wake_rx },
    )
}

/// Cloneable producer handle.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    pending: Pending,
    wake_tx: mpsc::Sender<()>,
}

impl ChangeNotifier {
    /// Never blocks, never drops `identity`.
    pub fn notify(&self, identity: Identity) {
        let mut set = lock(&self.pending);
        set.insert(identity);
        // Full means a wake-up is already outstanding.
        let _ = self.wake_tx.try_send(());
    }
}

/// Single consumer side.
#[derive(Debug)]
pub struct ChangeCoalescer {
    pending: Pending,
    wake_rx: mpsc::Receiver<()>,
}

impl ChangeCoalescer {
    /// Removes and returns everything pending. Empty if nothing is.
    pub fn drain(&self) -> HashSet<Identity> {
        std::mem::take(&mut *lock(&self.pending))
    }

    /// Waits for a wake-up. Returns `false` once every [`ChangeNotifier`] has
    /// been dropped and the outstanding wake-up, if any, was consumed.
    ///
    /// Cancel-safe, so it can sit in a `select!` next to a shutdown signal.
    pub async fn wait(&mut self) -> bool {
        self.wake_rx.recv().await.is_some()
    }
}

fn lock(pending: &Pending) -> MutexGuard<'_, HashSet<Identity>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}
