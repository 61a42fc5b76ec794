// Optimistic send workflow.
//
// The user's message appears in the timeline the moment they hit
// send, marked Pending. The network round-trip then either promotes
// it to Confirmed (and brings the assistant's reply with it) or marks
// it Failed with an inline error note. Either way the message is
// never silently removed, and there is no automatic retry.

use log::{debug, error, info};

use crate::models::{ChatMessage, MessageStatus};

use super::store::MessagePatch;
use super::{ChatTimeline, TimelineEvent};

/// Shown when the server accepts a message but answers with nothing.
const EMPTY_REPLY_NOTE: &str = "Received empty response from server.";

impl ChatTimeline {
    /// Send one message. Blank input is ignored without any visible
    /// effect, matching the screen-level guard. Returns once the
    /// pending message is visible; the network call completes in the
    /// background.
    pub async fn send_message(&self, text: &str) {
        if text.trim().is_empty() {
            debug!("Ignoring blank outbound message");
            return;
        }
        if self.is_disposed() {
            return;
        }

        let pending = ChatMessage::pending_user(text);
        let pending_id = pending.id.clone();
        {
            let mut store = self.inner.store.lock().await;
            store.prepend_newer(pending);
        }
        self.emit(TimelineEvent::MessagesChanged).await;

        let timeline = self.clone();
        let generation = self.current_generation();
        let text = text.to_string();
        tokio::spawn(async move {
            timeline.run_send(pending_id, text, generation).await;
        });
    }

    async fn run_send(&self, pending_id: String, text: String, generation: u64) {
        let outcome = self.inner.backend.send_chat_message(&text).await;

        if self.is_stale(generation) {
            debug!("Dropping send result for {}: timeline disposed or reset", pending_id);
            return;
        }

        // Promotion and the follow-up insert happen under one store
        // lock so no snapshot can see the reply without the confirmed
        // user message.
        {
            let mut store = self.inner.store.lock().await;
            // dispose() or reset() may have landed while we waited
            // for the lock; re-check before applying
            if self.is_stale(generation) {
                debug!("Dropping send result for {}: timeline disposed or reset", pending_id);
                return;
            }
            match outcome {
                Ok(reply) if !reply.trim().is_empty() => {
                    info!("Send {} confirmed, reply is {} chars", pending_id, reply.len());
                    store.update_by_id(&pending_id, MessagePatch::status(MessageStatus::Confirmed));
                    store.prepend_newer(ChatMessage::assistant_reply(&reply));
                }
                Ok(_) => {
                    // The message landed, but produced nothing; the user
                    // still has to know both halves of that.
                    info!("Send {} confirmed with an empty reply", pending_id);
                    store.update_by_id(&pending_id, MessagePatch::status(MessageStatus::Confirmed));
                    store.prepend_newer(ChatMessage::system_error(EMPTY_REPLY_NOTE));
                }
                Err(e) => {
                    error!("Send {} failed: {}", pending_id, e);
                    store.update_by_id(&pending_id, MessagePatch::status(MessageStatus::Failed));
                    store.prepend_newer(ChatMessage::system_error(&format!("Error: {}", e)));
                }
            }
        }

        self.emit(TimelineEvent::MessagesChanged).await;
    }
}
