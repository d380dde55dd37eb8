//! Operator command queue shared between the HTTP handlers and the
//! scheduler. At most one action is pending at a time; consuming it is
//! atomic (read-then-clear under one lock).

use {
    serde::{Deserialize, Serialize},
    std::sync::{Arc, Mutex},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperatorAction {
    /// Park the treasury in the deposit token.
    Exit,
    /// Rotate (or enter) into the named pool.
    Rotate { pool_id: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorState {
    pub paused: bool,
    pub pending_action: Option<OperatorAction>,
    pub last_applied_action: Option<OperatorAction>,
    pub updated_at: i64,
}

#[derive(Clone, Default)]
pub struct OperatorHandle(Arc<Mutex<OperatorState>>);

impl OperatorHandle {
    pub fn paused(&self) -> bool {
        self.0.lock().unwrap().paused
    }

    pub fn set_paused(&self, paused: bool, now_ts: i64) {
        let mut state = self.0.lock().unwrap();
        state.paused = paused;
        state.updated_at = now_ts;
    }

    /// Queues an action, replacing any not-yet-consumed one.
    pub fn request(&self, action: OperatorAction, now_ts: i64) {
        let mut state = self.0.lock().unwrap();
        state.pending_action = Some(action);
        state.updated_at = now_ts;
    }

    /// Takes the pending action, recording it as applied. The scheduler
    /// calls this exactly once per tick before the normal decision flow.
    pub fn consume(&self, now_ts: i64) -> Option<OperatorAction> {
        let mut state = self.0.lock().unwrap();
        let action = state.pending_action.take()?;
        state.last_applied_action = Some(action.clone());
        state.updated_at = now_ts;
        Some(action)
    }

    pub fn snapshot(&self) -> OperatorState {
        self.0.lock().unwrap().clone()
    }
}
