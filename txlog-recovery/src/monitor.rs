//! Recovery observation hooks.

use txlog_log::LogPosition;

/// Observer notified when recovery actually runs.
///
/// `recovery_required` and `recovery_completed` are each called exactly
/// once, in that order, and never on a clean startup.
pub trait RecoveryMonitor {
    fn recovery_required(&self, _from: LogPosition) {}

    fn recovery_completed(&self, _transactions: u64) {}
}

/// Monitor that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl RecoveryMonitor for NoopMonitor {}

/// Monitor that reports recovery through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl RecoveryMonitor for TracingMonitor {
    fn recovery_required(&self, from: LogPosition) {
        tracing::warn!("Unclean shutdown detected, recovering from {}", from);
    }

    fn recovery_completed(&self, transactions: u64) {
        tracing::info!("Recovery completed: {} transactions replayed", transactions);
    }
}
