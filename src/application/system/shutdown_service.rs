//! Cooperative-shutdown bookkeeping, invoked once at loop-exit on the
//! cooperative path. A forced exit (`FORCE_EXIT` sentinel content, or a
//! second Ctrl-C) skips this entirely -- force-exit bypasses final
//! bookkeeping.
//!
//! Logs final account/risk state and accounts for anything outstanding.
//! No flatten-on-exit step here -- this engine already has a dedicated,
//! policy-driven carry-over handler
//! ([`crate::application::risk_management::PreviousDayBalanceHandler`],
//! which runs at the *next* session's start), so folding liquidation into
//! shutdown as well would duplicate that responsibility.

use crate::domain::ports::ExecutionPort;
use crate::domain::trading::snapshot::AccountSnapshot;
use std::sync::Arc;
use tracing::info;

pub struct ShutdownService {
    execution: Arc<dyn ExecutionPort>,
}

impl ShutdownService {
    pub fn new(execution: Arc<dyn ExecutionPort>) -> Self {
        Self { execution }
    }

    /// Logs the final account state and the orders the engine still
    /// believes are pending. The broker is the source of truth for
    /// cancellation; this is best-effort bookkeeping, not a retried
    /// operation -- a failure here is logged, never escalated, since the
    /// loop is already exiting.
    pub async fn shutdown(&self, final_snapshot: &AccountSnapshot, cycles_completed: u64) {
        info!("initiating cooperative shutdown sequence");

        info!(
            cycles_completed,
            open_positions = final_snapshot.positions.len(),
            pending_orders = final_snapshot.pending_order_count(),
            cash_balance = %final_snapshot.cash_balance,
            realized_pnl = %final_snapshot.realized_pnl,
            "final account state at shutdown"
        );

        for pending in &final_snapshot.pending_orders {
            info!(order_id = %pending.order_id, symbol = %pending.symbol, "pending order at shutdown, broker retains authority over it");
        }

        info!("cooperative shutdown sequence complete");
    }

    /// Exposed so callers that need to confirm no write capability leaks
    /// past shutdown can assert on the held port directly in tests.
    #[cfg(test)]
    pub(crate) fn execution_port(&self) -> &Arc<dyn ExecutionPort> {
        &self.execution
    }
}
