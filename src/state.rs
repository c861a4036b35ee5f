use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a prober run. Replaces the original's habit of reading
/// the displayed status text: the flag is an explicit atomic owned by
/// the prober. Cancellation is cooperative and coarse-grained, checked
/// once per candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Idle,
    Running,
    CancelRequested,
}

impl ProbeState {
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ProbeState::Running,
            2 => ProbeState::CancelRequested,
            _ => ProbeState::Idle,
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            ProbeState::Idle => 0,
            ProbeState::Running => 1,
            ProbeState::CancelRequested => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProbeState::Idle => "IDLE",
            ProbeState::Running => "RUNNING",
            ProbeState::CancelRequested => "CANCEL_REQUESTED",
        }
    }
}

/// Atomic cell holding a [`ProbeState`].
#[derive(Debug, Default)]
pub(crate) struct ProbeStateCell(AtomicU8);

impl ProbeStateCell {
    pub(crate) fn get(&self) -> ProbeState {
        ProbeState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn set(&self, state: ProbeState) {
        self.0.store(state.to_u8(), Ordering::SeqCst);
    }

    /// Transition Idle -> Running; false if a run is already in flight.
    pub(crate) fn try_start(&self) -> bool {
        self.0
            .compare_exchange(
                ProbeState::Idle.to_u8(),
                ProbeState::Running.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Request that the in-flight run stop at its next checkpoint.
    pub(crate) fn request_cancel(&self) {
        let _ = self.0.compare_exchange(
            ProbeState::Running.to_u8(),
            ProbeState::CancelRequested.to_u8(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}
