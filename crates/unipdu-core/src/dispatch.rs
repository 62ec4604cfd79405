// ── Session-scoped signal dispatcher ──
//
// One broadcast channel per session. Replaces process-wide named signals:
// every listener belongs to exactly one session and stops with it.

use tokio::sync::broadcast;

const SIGNAL_CHANNEL_CAPACITY: usize = 256;

/// A notification fanned out to every entity of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Controller reachability flipped; read [`Session::available`](crate::Session::available).
    Reachable,
    /// Entry options changed; registrars re-scan.
    OptionsUpdated,
    /// A tracked object's heartbeat expired. Carries the object id.
    HeartbeatMissed(String),
}

#[derive(Debug)]
pub struct Dispatcher {
    tx: broadcast::Sender<Signal>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Fan a signal out. Returns how many listeners were reached.
    pub fn send(&self, signal: Signal) -> usize {
        tracing::trace!(?signal, "dispatching signal");
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
