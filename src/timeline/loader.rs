// History page loader.
//
// Wraps the history endpoint: fetches one page of older messages,
// maps the raw records into confirmed timeline messages, and derives
// the next cursor. Exhaustion comes from the server-reported page
// total and nothing else; a page that happens to be short or empty is
// not treated as the end of history here (the fetch policy decides
// what an empty page means).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::api::{ApiError, ChatBackend, RawMessage};
use crate::models::{ChatMessage, MessageOrigin, MessageStatus, PageCursor};

/// Assistant records in the archive sometimes end with an unclosed
/// emphasis tag leaked by the upstream model's markup. It is stripped
/// only when actually present.
const ASSISTANT_MARKUP_TAIL: &str = "<em>";

/// One mapped page: messages newest-first plus the cursor for the
/// next request.
#[derive(Debug, Clone)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub cursor: PageCursor,
}

pub struct HistoryPageLoader {
    backend: Arc<dyn ChatBackend>,
    page_size: u32,
}

impl HistoryPageLoader {
    pub fn new(backend: Arc<dyn ChatBackend>, page_size: u32) -> Self {
        HistoryPageLoader { backend, page_size }
    }

    /// Fetch and map one page. All failures come back as a typed
    /// `ApiError`; nothing here panics across the boundary.
    pub async fn load_page(&self, page_number: u32) -> Result<HistoryPage, ApiError> {
        let response = self.backend.fetch_history(page_number, self.page_size).await?;

        let mut messages = Vec::with_capacity(response.content.len());
        for raw in response.content {
            if let Some(message) = map_raw_message(raw)? {
                messages.push(message);
            }
        }

        let cursor = PageCursor {
            page_number: response.page.number + 1,
            total_pages: response.page.total_pages,
        };

        debug!(
            "Loaded history page {}: {} messages, has_more={}",
            response.page.number,
            messages.len(),
            cursor.has_more()
        );

        Ok(HistoryPage { messages, cursor })
    }
}

/// Map one archived record into a confirmed timeline message. Blank
/// records are dropped (the archive contains a few), which is why the
/// result is doubly wrapped.
fn map_raw_message(raw: RawMessage) -> Result<Option<ChatMessage>, ApiError> {
    let origin = match raw.kind.as_str() {
        "USER" => MessageOrigin::User,
        "ASSISTANT" => MessageOrigin::Assistant,
        other => {
            warn!("Unknown history record type {:?}, treating as assistant", other);
            MessageOrigin::Assistant
        }
    };

    let text = match origin {
        MessageOrigin::Assistant => raw
            .message
            .strip_suffix(ASSISTANT_MARKUP_TAIL)
            .unwrap_or(&raw.message)
            .to_string(),
        _ => raw.message,
    };

    if text.trim().is_empty() {
        return Ok(None);
    }

    let created_at: DateTime<Utc> = raw
        .created_at
        .parse()
        .map_err(|e| ApiError::Decode(format!("bad createdAt {:?}: {}", raw.created_at, e)))?;

    // Records without a server id get one derived from the creation
    // time and origin, stable across reloads so re-seeding dedups.
    let id = raw
        .id
        .unwrap_or_else(|| format!("{}-{}", raw.created_at, raw.kind.to_lowercase()));

    Ok(Some(ChatMessage {
        id,
        text,
        origin,
        created_at,
        status: MessageStatus::Confirmed,
    }))
}
