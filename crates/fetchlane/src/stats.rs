/// Point-in-time engine counters, updated on the owner thread only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Requests currently alive (accepted by `send`, final callback not yet
    /// delivered).
    pub active: usize,
    /// Requests accepted since setup.
    pub sent: u64,
    /// Requests that delivered their final callback.
    pub completed: u64,
    /// Completions that ended failed, including cancellations.
    pub failed: u64,
}
