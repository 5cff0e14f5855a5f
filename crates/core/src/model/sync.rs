use serde::{Deserialize, Serialize};

/// Delivery state of a locally initiated "lesson complete" request.
///
/// `Pending` lessons count as completed in the effective view while the
/// request is in flight. `Failed` lessons are rolled back out of it and kept
/// around so the caller can offer a retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LessonSync {
    Pending,
    Committed,
    Failed { reason: String },
}

impl LessonSync {
    /// Whether the lesson should be shown as completed right now.
    #[must_use]
    pub fn counts_as_completed(&self) -> bool {
        matches!(self, Self::Pending | Self::Committed)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Stable label used for persistence and display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Committed => "committed",
            Self::Failed { .. } => "failed",
        }
    }

    /// Rebuild a state from its label and optional failure reason.
    #[must_use]
    pub fn from_label(label: &str, reason: Option<String>) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "committed" => Some(Self::Committed),
            "failed" => Some(Self::Failed {
                reason: reason.unwrap_or_default(),
            }),
            _ => None,
        }
    }
}
