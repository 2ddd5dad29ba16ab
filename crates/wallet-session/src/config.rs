use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Session tuning, injected at construction.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Account whose history and coin views get refreshed.
    pub account_index: u32,
    /// Interval of the periodic guarded store.
    pub store_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            account_index: 0,
            store_interval: Duration::from_secs(120),
        }
    }
}

/// Live user preferences the session consults mid-flight, as opposed to the
/// construction-time [`SessionConfig`].
pub trait Settings {
    /// Whether a commit also pushes raw hex to every known peer.
    fn multi_broadcast(&self) -> bool;
    /// Turns off the recurring donation reminder; called once a donation
    /// actually went out.
    fn disable_donation_reminder(&self);
}
