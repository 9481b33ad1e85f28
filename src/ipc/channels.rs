use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

// ============================================================================
// LOOP STATE
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopState::Idle => write!(f, "Idle"),
            LoopState::Running => write!(f, "Running"),
            LoopState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Loop state readable from any thread.
#[derive(Clone)]
pub struct StateCell {
    raw: Arc<AtomicU8>,
}

impl StateCell {
    pub fn new(state: LoopState) -> Self {
        Self {
            raw: Arc::new(AtomicU8::new(state as u8)),
        }
    }

    pub fn get(&self) -> LoopState {
        match self.raw.load(Ordering::Acquire) {
            0 => LoopState::Idle,
            1 => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }

    pub fn set(&self, state: LoopState) {
        self.raw.store(state as u8, Ordering::Release);
    }
}

// ============================================================================
// LOOP EVENTS - Control loop -> user-facing thread
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
pub enum LoopEvent {
    StateChanged(LoopState),
    ReadFailed { tick: u64, message: String },
    WriteFailed { tick: u64, message: String },
    /// The loop gave up after too many consecutive failed ticks.
    Escalated { failures: u32, message: String },
}

/// Bounded event queue. The loop publishes without blocking; when nobody
/// drains the queue the oldest events are evicted, so the latest ones
/// (escalation, final state) are always delivered.
#[derive(Clone)]
pub struct LoopEvents {
    tx: Sender<LoopEvent>,
    rx: Receiver<LoopEvent>,
}

impl LoopEvents {
    pub fn new(buffer_size: usize) -> Self {
        let (tx, rx) = bounded(buffer_size);
        Self { tx, rx }
    }

    /// Returns false if an older event had to be evicted.
    pub fn publish(&self, event: LoopEvent) -> bool {
        let mut pending = event;
        let mut evicted = false;
        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return !evicted,
                Err(TrySendError::Full(back)) => {
                    let _ = self.rx.try_recv();
                    evicted = true;
                    pending = back;
                }
                // Unreachable while `self` holds the receiver.
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }

    pub fn receiver(&self) -> Receiver<LoopEvent> {
        self.rx.clone()
    }

    pub fn drain(&self) -> Vec<LoopEvent> {
        self.rx.try_iter().collect()
    }
}
