//! Refresh scheduling
//!
//! The scheduler owns retry and pacing policy for the pull channel: the
//! periodic interval lives in the runtime's timer, the manual-refresh
//! cooldown lives here, and refresh results are tagged with the session
//! they were issued for so a logout can never be overwritten by a stale
//! result.

use std::time::Duration;

use tokio::time::Instant;

/// Outcome of asking for a manual refresh.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ManualDecision {
    Granted,
    /// Invoked before the cooldown elapsed; retry after the given
    /// duration. No network call is performed.
    TooSoon { retry_after: Duration },
}

/// Tag identifying the authenticated session a refresh was issued for.
///
/// Results whose tag no longer matches the current session are discarded:
/// an in-flight refresh must not repopulate a store that logout already
/// cleared.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SessionTag(u64);

impl SessionTag {
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug)]
pub struct RefreshScheduler {
    cooldown: Duration,
    last_manual: Option<Instant>,
}

impl RefreshScheduler {
    #[must_use]
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_manual: None,
        }
    }

    /// Rate-limits manual refreshes to one per cooldown window.
    ///
    /// Callers racing each other are serialized through the engine's
    /// single-writer queue, so every contender observes the same decision
    /// state.
    pub fn try_manual(&mut self) -> ManualDecision {
        let now = Instant::now();

        if let Some(last) = self.last_manual {
            let elapsed = now.saturating_duration_since(last);

            if elapsed < self.cooldown {
                return ManualDecision::TooSoon {
                    retry_after: self.cooldown - elapsed,
                };
            }
        }

        self.last_manual = Some(now);

        ManualDecision::Granted
    }

    /// Forgets pacing state; used at logout.
    pub fn reset(&mut self) {
        self.last_manual = None;
    }
}
