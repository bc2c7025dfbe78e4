use std::time::Duration;

use thiserror::Error;

use parallax_primitives::ids::UserId;

/// A delta referenced an entity the local state has never seen.
///
/// This means a prior update was missed and the local cache has drifted;
/// the delta is discarded and the caller's control loop triggers a full
/// snapshot refresh. Inserting the partial record instead would create a
/// permanently incomplete entity.
#[derive(Debug, Error)]
#[error("delta for unknown friend {id}: local cache has drifted")]
pub struct ConsistencyGap {
    pub id: UserId,
}

/// Failures surfaced through the engine's command interface.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Manual refresh invoked before the cooldown elapsed. Not a failure;
    /// the caller may retry after `retry_after`.
    #[error("refreshed too recently, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The engine task is no longer running.
    #[error("engine has shut down")]
    Stopped,
}
