//! Condition bookkeeping on `Blocky.status`

use std::sync::Arc;

use tracing::debug;

use blocky_common::crd::{Blocky, Condition, ObjectKey};
use blocky_common::Result;

use crate::deadline::Deadline;
use crate::store::BlockyStore;

/// Merge `condition` into `conditions`, returning whether anything changed
///
/// - a new type is appended, so first-appearance order is preserved
/// - an identical status/reason/message is a no-op
/// - `lastTransitionTime` only moves when the status changes
/// - stray duplicates of the type are dropped, keeping the first
pub fn set_condition(conditions: &mut Vec<Condition>, condition: Condition) -> bool {
    let before = conditions.len();
    let mut seen = false;
    conditions.retain(|c| {
        if c.type_ != condition.type_ {
            return true;
        }
        let keep = !seen;
        seen = true;
        keep
    });
    let deduplicated = conditions.len() != before;

    let Some(existing) = conditions.iter_mut().find(|c| c.type_ == condition.type_) else {
        conditions.push(condition);
        return true;
    };
    if existing.same_content(&condition) {
        return deduplicated;
    }

    if existing.status != condition.status {
        existing.status = condition.status;
        existing.last_transition_time = condition.last_transition_time;
    }
    existing.reason = condition.reason;
    existing.message = condition.message;
    true
}

/// Persists condition changes on a Blocky
pub struct StatusRecorder {
    store: Arc<dyn BlockyStore>,
}

impl StatusRecorder {
    /// Create a recorder writing through the given store
    pub fn new(store: Arc<dyn BlockyStore>) -> Self {
        Self { store }
    }

    /// Apply `condition` to a copy of `blocky` and persist it if it changed
    ///
    /// Returns `Ok(None)` without any I/O when the condition is already
    /// recorded. The write is conditional on `blocky`'s resourceVersion, so a
    /// stale copy yields `Error::Conflict`.
    pub async fn record_condition(
        &self,
        blocky: &Blocky,
        condition: Condition,
        deadline: &Deadline,
    ) -> Result<Option<Blocky>> {
        let mut updated = blocky.clone();
        let status = updated.status.get_or_insert_with(Default::default);
        let type_ = condition.type_.clone();
        if !set_condition(&mut status.conditions, condition) {
            return Ok(None);
        }

        let key = ObjectKey::of(blocky)?;
        let persisted = deadline
            .write(
                &format!("Blocky {key}"),
                self.store.patch_blocky_status(&updated),
            )
            .await?;
        debug!(blocky = %key, condition = %type_, "recorded condition");
        Ok(Some(persisted))
    }
}
