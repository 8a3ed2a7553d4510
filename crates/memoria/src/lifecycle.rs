//! Archival policy for the tiered session lifecycle
//!
//! Sessions age out of the hot tier into cold and deep storage based on the
//! time since their last mutation (`updated_at`). The windows here are policy
//! parameters; the scheduler that applies them is external to this crate.

use chrono::Duration;

use crate::config::ArchivalConfig;
use crate::model::SessionStatus;

/// Time-windowed archival policy.
///
/// `eligible_transition` encodes the forward-only tier movement:
/// Active sessions older than the hot window become cold-archive candidates,
/// cold sessions older than the cold window become deep-archive candidates.
/// Deletion is retention-driven and reported separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivalPolicy {
    /// Maximum age for the hot tier
    pub hot_window: Duration,
    /// Maximum age for the cold tier
    pub cold_window: Duration,
    /// Maximum age for the deep tier before retention expiry
    pub deep_window: Duration,
}

impl Default for ArchivalPolicy {
    fn default() -> Self {
        Self {
            hot_window: Duration::days(7),
            cold_window: Duration::days(180),
            deep_window: Duration::days(1095),
        }
    }
}

impl ArchivalPolicy {
    pub fn from_config(config: &ArchivalConfig) -> Self {
        Self {
            hot_window: Duration::days(config.hot_days),
            cold_window: Duration::days(config.cold_days),
            deep_window: Duration::days(config.deep_days),
        }
    }

    /// The archival transition a session of the given status and age is due
    /// for, if any.
    pub fn eligible_transition(&self, status: SessionStatus, age: Duration) -> Option<SessionStatus> {
        match status {
            SessionStatus::Active if age > self.hot_window => Some(SessionStatus::ColdArchived),
            SessionStatus::ColdArchived if age > self.cold_window => {
                Some(SessionStatus::DeepArchived)
            }
            _ => None,
        }
    }

    /// Whether a deep-archived session has outlived its retention window and
    /// is a candidate for retention-driven deletion.
    pub fn retention_expired(&self, status: SessionStatus, age: Duration) -> bool {
        status == SessionStatus::DeepArchived && age > self.deep_window
    }
}
