//! Process run state.
//!
//! A single [`RunState`] is shared by every task. It moves
//! Starting → Running → Stopping → Stopped and never goes back. Stopping
//! cancels the shared token; tasks observe it at each suspension point.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Starting = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Starting,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Why the bridge is shutting down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// SIGINT / SIGTERM.
    Signal,
    /// The watchdog saw too many consecutive failed probes.
    ConnectionLost,
    /// A periodic task returned while the bridge was still running.
    TaskExited(&'static str),
}

impl StopReason {
    /// Signals are the only clean way out.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Signal)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal => f.write_str("termination signal"),
            Self::ConnectionLost => f.write_str("router connection lost"),
            Self::TaskExited(task) => write!(f, "task '{task}' exited"),
        }
    }
}

#[derive(Debug)]
pub struct RunState {
    phase: AtomicU8,
    token: CancellationToken,
    reason: Mutex<Option<StopReason>>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Starting as u8),
            token: CancellationToken::new(),
            reason: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Running
    }

    /// Token cancelled when stopping begins.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Starting → Running. No-op if a stop already happened.
    pub fn mark_running(&self) {
        let _ = self.phase.compare_exchange(
            Phase::Starting as u8,
            Phase::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Begin stopping. Returns `false` if a stop was already requested;
    /// the first reason wins.
    pub fn request_stop(&self, reason: StopReason) -> bool {
        let mut current = self.phase.load(Ordering::SeqCst);
        loop {
            if current >= Phase::Stopping as u8 {
                return false;
            }
            match self.phase.compare_exchange(
                current,
                Phase::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        tracing::info!(reason = %reason, "stop requested");
        if let Ok(mut slot) = self.reason.lock() {
            *slot = Some(reason);
        }
        self.token.cancel();
        true
    }

    /// Stopping → Stopped.
    pub fn mark_stopped(&self) {
        self.phase.store(Phase::Stopped as u8, Ordering::SeqCst);
    }

    pub fn reason(&self) -> Option<StopReason> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_in_starting_phase() {
        let state = RunState::new();
        assert_eq!(state.phase(), Phase::Starting);
        assert!(!state.is_running());
        state.mark_running();
        assert!(state.is_running());
    }

    #[test]
    fn first_stop_request_wins() {
        let state = RunState::new();
        state.mark_running();

        assert!(state.request_stop(StopReason::ConnectionLost));
        assert!(!state.request_stop(StopReason::Signal));
        assert_eq!(state.phase(), Phase::Stopping);
        assert_eq!(state.reason(), Some(StopReason::ConnectionLost));
        assert!(state.token().is_cancelled());
    }

    #[test]
    fn phases_never_go_back() {
        let state = RunState::new();
        state.request_stop(StopReason::Signal);
        state.mark_running();
        assert_eq!(state.phase(), Phase::Stopping);
        state.mark_stopped();
        assert!(!state.request_stop(StopReason::Signal));
        assert_eq!(state.phase(), Phase::Stopped);
    }

    #[test]
    fn only_signal_is_clean() {
        assert!(StopReason::Signal.is_clean());
        assert!(!StopReason::ConnectionLost.is_clean());
        assert!(!StopReason::TaskExited("poller").is_clean());
    }
}
