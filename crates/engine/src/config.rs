use std::time::Duration;

/// Tunables for the reconciliation engine.
///
/// Constructed by the embedding application and handed to
/// [`Engine::new`](crate::runtime::Engine::new); there is no ambient
/// configuration.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cadence of the lightweight periodic snapshot refresh.
    pub refresh_interval: Duration,
    /// Minimum wall-clock spacing between manual refreshes.
    pub manual_refresh_cooldown: Duration,
    /// Maximum number of retained activity entries, oldest dropped first.
    pub activity_cap: usize,
    /// Instance-listing category fetched into the directory on full
    /// refreshes.
    pub active_category: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(5 * 60),
            manual_refresh_cooldown: Duration::from_secs(60),
            activity_cap: 250,
            active_category: "active".to_owned(),
        }
    }
}
