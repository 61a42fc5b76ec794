// In-memory message store for one open chat screen.
// Newest-first, deduplicated by id, no I/O. Concurrency is the
// caller's problem: ChatTimeline serializes every mutation behind
// one async mutex.

use log::{debug, warn};

use crate::models::{ChatMessage, MessageStatus};

/// Partial update applied by id. Used to promote a pending message to
/// confirmed or failed, and to adopt a server-assigned identity.
#[derive(Debug, Default, Clone)]
pub struct MessagePatch {
    pub id: Option<String>,
    pub text: Option<String>,
    pub status: Option<MessageStatus>,
}

impl MessagePatch {
    pub fn status(status: MessageStatus) -> Self {
        MessagePatch { status: Some(status), ..Default::default() }
    }
}

pub struct MessageStore {
    // Index 0 is the newest message.
    messages: Vec<ChatMessage>,
    seeded: bool,
}

impl MessageStore {
    pub fn new() -> Self {
        MessageStore { messages: Vec::new(), seeded: false }
    }

    /// Replace the contents with the initial history page. Seeding a
    /// store that already holds messages is a caller bug; the intended
    /// path for that is an explicit `reset` first.
    pub fn seed(&mut self, messages: Vec<ChatMessage>) {
        if self.seeded {
            warn!("Message store seeded twice without a reset; replacing contents");
        }
        self.messages = Self::dedup_newest_first(messages);
        self.seeded = true;
    }

    /// Forget everything, returning the store to its pre-seed state.
    pub fn reset(&mut self) {
        self.messages.clear();
        self.seeded = false;
    }

    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Concatenate an older page at the tail. Records whose id is
    /// already present are skipped, so re-applying a page is harmless.
    pub fn append_older(&mut self, messages: Vec<ChatMessage>) {
        if messages.is_empty() {
            return;
        }
        for message in messages {
            if self.contains(&message.id) {
                debug!("Skipping duplicate history record {}", message.id);
                continue;
            }
            self.messages.push(message);
        }
    }

    /// Insert a new message at the head (newest end).
    pub fn prepend_newer(&mut self, message: ChatMessage) {
        if self.contains(&message.id) {
            debug!("Skipping duplicate live message {}", message.id);
            return;
        }
        self.messages.insert(0, message);
    }

    /// Apply a patch to the message with the given id. Returns false if
    /// no such message exists (e.g. the screen was reset underneath an
    /// in-flight send).
    pub fn update_by_id(&mut self, id: &str, patch: MessagePatch) -> bool {
        let Some(message) = self.messages.iter_mut().find(|m| m.id == id) else {
            debug!("update_by_id: no message with id {}", id);
            return false;
        };
        if let Some(new_id) = patch.id {
            message.id = new_id;
        }
        if let Some(text) = patch.text {
            message.text = text;
        }
        if let Some(status) = patch.status {
            // Pending is entered once at insert time and never re-entered.
            debug_assert!(
                !(status == MessageStatus::Pending && message.status != MessageStatus::Pending),
                "a message must not transition back to Pending"
            );
            message.status = status;
        }
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Read-only copy for rendering, newest first.
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    fn dedup_newest_first(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let mut out: Vec<ChatMessage> = Vec::with_capacity(messages.len());
        for message in messages {
            if out.iter().any(|m| m.id == message.id) {
                debug!("Dropping duplicate id {} from seed page", message.id);
                continue;
            }
            out.push(message);
        }
        out
    }
}
