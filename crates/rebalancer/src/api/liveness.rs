//! Liveness heuristics over a runtime status snapshot. Pure so the exact
//! behavior around staleness boundaries is unit-testable.

use {crate::run_loop::RuntimeStatus, serde::Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub healthy: bool,
    pub ready: bool,
    pub reason: &'static str,
}

/// Applies the staleness window to the tick bookkeeping:
///
/// 1. Before the first tick the process is healthy while younger than the
///    window.
/// 2. A tick in flight is healthy unless it has been running longer than
///    the window (stuck).
/// 3. Without any successful tick yet, recent activity keeps the process
///    healthy but not ready.
/// 4. Otherwise health follows the age of the last successful tick.
pub fn evaluate(status: &RuntimeStatus, now_ts: i64, stale_after_seconds: i64) -> Health {
    let had_success = status.last_successful_tick_at.is_some();

    let Some(last_started) = status.last_tick_started_at else {
        return if now_ts - status.started_at <= stale_after_seconds {
            Health {
                healthy: true,
                ready: false,
                reason: "starting",
            }
        } else {
            Health {
                healthy: false,
                ready: false,
                reason: "tick_not_started",
            }
        };
    };

    if status.in_flight {
        return if now_ts - last_started <= stale_after_seconds {
            Health {
                healthy: true,
                ready: had_success,
                reason: "tick_in_progress",
            }
        } else {
            Health {
                healthy: false,
                ready: had_success,
                reason: "tick_stuck",
            }
        };
    }

    let Some(last_success) = status.last_successful_tick_at else {
        let last_activity = status
            .last_tick_finished_at
            .unwrap_or(last_started)
            .max(last_started);
        return Health {
            healthy: now_ts - last_activity <= stale_after_seconds,
            ready: false,
            reason: "no_successful_tick",
        };
    };

    if now_ts - last_success <= stale_after_seconds {
        Health {
            healthy: true,
            ready: true,
            reason: "ok",
        }
    } else {
        Health {
            healthy: false,
            ready: true,
            reason: "heartbeat_stale",
        }
    }
}
