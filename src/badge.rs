//! Badge/status announcer boundary
//!
//! The external indicator shows a short text plus a background color. The
//! core only decides what state to show; rendering belongs to the host.

use serde::{Deserialize, Serialize};
use tracing::info;

/// What the external indicator should currently display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BadgeState {
    /// Current number of stored records
    Count { count: u64 },
    /// Transient export progress, 0-100
    Progress { percent: u8 },
    /// Transient export error
    Error { message: String },
    /// Nothing to show
    Clear,
}

impl BadgeState {
    /// Short display text for the indicator
    pub fn text(&self) -> String {
        match self {
            BadgeState::Count { count: 0 } | BadgeState::Clear => String::new(),
            BadgeState::Count { count } => count.to_string(),
            BadgeState::Progress { percent } => format!("{}%", percent),
            BadgeState::Error { .. } => "ERR".to_string(),
        }
    }

    /// Background color as a hex string
    pub fn color(&self) -> &'static str {
        match self {
            BadgeState::Count { .. } | BadgeState::Clear => "#4688F1",
            BadgeState::Progress { .. } => "#FFA500",
            BadgeState::Error { .. } => "#D93025",
        }
    }
}

/// Sink the core pushes badge updates into
pub trait BadgeSink: Send + Sync {
    fn update(&self, state: BadgeState);
}

/// Default sink that only logs; the real indicator lives out of process
pub struct LogBadge;

impl BadgeSink for LogBadge {
    fn update(&self, state: BadgeState) {
        info!(text = %state.text(), color = state.color(), "badge update");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_badge_text() {
        assert_eq!(BadgeState::Count { count: 42 }.text(), "42");
        assert_eq!(BadgeState::Count { count: 0 }.text(), "");
        assert_eq!(BadgeState::Progress { percent: 37 }.text(), "37%");
        assert_eq!(
            BadgeState::Error {
                message: "zip failed".to_string()
            }
            .text(),
            "ERR"
        );
        assert_eq!(BadgeState::Clear.text(), "");
    }

    #[test]
    fn test_badge_colors_distinguish_states() {
        let count = BadgeState::Count { count: 1 }.color();
        let progress = BadgeState::Progress { percent: 1 }.color();
        let error = BadgeState::Error {
            message: String::new(),
        }
        .color();
        assert_ne!(count, progress);
        assert_ne!(progress, error);
    }
}
