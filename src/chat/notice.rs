//! Toast-style notifications surfaced by the chat session.

use crate::chat::classify::ErrorCategory;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Progress the user may want to know about.
    Info,
    /// An operation finished.
    Success,
    /// An operation failed.
    Error,
}

/// A short message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// The failure category, for error notices.
    pub category: Option<ErrorCategory>,
    /// One-line title.
    pub title: String,
    /// Longer explanation.
    pub description: String,
}

impl Notice {
    /// An informational notice.
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            category: None,
            title: title.into(),
            description: description.into(),
        }
    }

    /// A success notice.
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            category: None,
            title: title.into(),
            description: description.into(),
        }
    }

    /// The error notice for a failure category.
    pub fn for_category(category: ErrorCategory) -> Self {
        Self {
            level: NoticeLevel::Error,
            category: Some(category),
            title: category.title().to_string(),
            description: category.description().to_string(),
        }
    }

    /// An error notice with custom copy.
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            category: None,
            title: title.into(),
            description: description.into(),
        }
    }
}
