use super::id::TransactionId;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle of a transaction. Committed and Aborted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Committed => write!(f, "Committed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub state: TransactionState,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
}

impl TransactionInfo {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            start_time: Instant::now(),
            end_time: None,
        }
    }

    /// Moves to a terminal state. Returns false if already finished.
    pub fn finish(&mut self, state: TransactionState) -> bool {
        if self.state.is_finished() {
            return false;
        }
        self.state = state;
        self.end_time = Some(Instant::now());
        true
    }

    /// Time from start to finish, or to now while still active.
    pub fn duration(&self) -> Duration {
        match self.end_time {
            Some(end) => end.duration_since(self.start_time),
            None => self.start_time.elapsed(),
        }
    }
}
