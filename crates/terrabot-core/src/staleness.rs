//! Out-of-order event detection.

use crate::domain::EventContext;

/// True iff the persisted status was written strictly after the event that
/// triggered this run. An absent status is never stale.
pub fn is_stale(ctx: &EventContext) -> bool {
    ctx.pull_status
        .as_ref()
        .is_some_and(|status| status.updated_at > ctx.trigger_timestamp)
}
