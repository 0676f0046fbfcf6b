use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::trace;

/// Observer told that backup state changed after an operation completes.
///
/// Called synchronously by the orchestrators; implementations must return quickly.
pub trait ResultNotifier: Send + Sync {
    fn notify_changed(&self);
}

/// Publishes a change generation counter on a watch channel
#[derive(Debug, Clone)]
pub struct WatchNotifier {
    watch_tx: watch::Sender<u64>,
}

impl WatchNotifier {
    pub fn new() -> Self {
        Self { watch_tx: watch::Sender::new(0) }
    }

    /// Create a stream of change generations
    pub fn subscribe(&self) -> WatchStream<u64> {
        WatchStream::new(self.watch_tx.subscribe())
    }

    pub fn generation(&self) -> u64 {
        *self.watch_tx.borrow()
    }
}

impl Default for WatchNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultNotifier for WatchNotifier {
    fn notify_changed(&self) {
        self.watch_tx.send_modify(|generation| *generation += 1);
        trace!(generation = self.generation(), "Backup state changed");
    }
}
