use serde::Serialize;

// ============================================================================
// Notices - What the presentation layer shows the user
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeVariant {
    Success,
    Danger,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub message: String,
    pub variant: NoticeVariant,
}

impl Notice {
    pub fn new(message: impl Into<String>, variant: NoticeVariant) -> Self {
        Self {
            message: message.into(),
            variant,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(message, NoticeVariant::Success)
    }

    pub fn danger(message: impl Into<String>) -> Self {
        Self::new(message, NoticeVariant::Danger)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, NoticeVariant::Warning)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, NoticeVariant::Info)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.variant, NoticeVariant::Danger | NoticeVariant::Warning)
    }
}

/// Broadcast to the presentation layer. Timing of auto-dismissal is its
/// business; the session only says when a notice is obsolete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiSignal {
    Notice(Notice),
    Dismiss,
}
