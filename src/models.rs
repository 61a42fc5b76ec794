use chrono::{DateTime, Utc};

/// Where a timeline entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrigin {
    User,
    Assistant,
    /// Inline error notes (failed sends, empty replies). Never sent to the server.
    SystemError,
}

/// Lifecycle of a single message. Pending is only ever left for
/// Confirmed or Failed, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Confirmed,
    Pending,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub origin: MessageOrigin,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl ChatMessage {
    /// An optimistic outbound message, inserted before the network call starts.
    pub fn pending_user(text: &str) -> Self {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            origin: MessageOrigin::User,
            created_at: Utc::now(),
            status: MessageStatus::Pending,
        }
    }

    /// A confirmed assistant reply received from the server.
    pub fn assistant_reply(text: &str) -> Self {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            origin: MessageOrigin::Assistant,
            created_at: Utc::now(),
            status: MessageStatus::Confirmed,
        }
    }

    /// An inline error note shown in the timeline.
    pub fn system_error(text: &str) -> Self {
        ChatMessage {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.to_string(),
            origin: MessageOrigin::SystemError,
            created_at: Utc::now(),
            status: MessageStatus::Confirmed,
        }
    }
}

/// Pagination position for backward (older) history loading.
/// `page_number` is the next page to request, not the last one loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    pub page_number: u32,
    pub total_pages: u32,
}

impl PageCursor {
    pub fn start() -> Self {
        // total_pages is unknown until the first page answers; one page
        // is assumed so the initial request is always allowed.
        PageCursor { page_number: 0, total_pages: 1 }
    }

    /// Whether another page can be requested. Computed from the
    /// server-reported total only; a short or empty page is not an
    /// end-of-data signal by itself.
    pub fn has_more(&self) -> bool {
        self.page_number < self.total_pages
    }
}
