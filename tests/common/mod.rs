// Common test utilities for the timeline integration tests
// This module provides a scripted backend standing in for the chat
// service, plus small helpers for waiting on the engine's async work.

// Standard library imports
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

// External crate imports
use async_trait::async_trait;
use log::LevelFilter;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout};

// Import the crate functionality
use careline::api::{ApiError, ChatBackend, HistoryResponse, PageInfo, RawMessage};
use careline::{ChatMessage, ChatTimeline};

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

/// Build one scripted history page. Records are (type, message,
/// createdAt) triples, newest first, the way the server pages them.
pub fn history_page(number: u32, total_pages: u32, records: &[(&str, &str, &str)]) -> HistoryResponse {
    HistoryResponse {
        content: records
            .iter()
            .map(|(kind, message, created_at)| RawMessage {
                id: None,
                kind: kind.to_string(),
                message: message.to_string(),
                created_at: created_at.to_string(),
            })
            .collect(),
        page: PageInfo {
            size: records.len() as u32,
            number,
            total_elements: records.len() as u64,
            total_pages,
        },
    }
}

/// What the scripted backend should answer to the next send call.
pub enum ScriptedSend {
    Reply(&'static str),
    Empty,
    Http(u16),
    Network,
}

/// A chat backend with canned pages and replies. Gates let a test hold
/// a request open to observe the engine mid-flight.
pub struct MockBackend {
    pages: Mutex<HashMap<u32, HistoryResponse>>,
    sends: Mutex<VecDeque<ScriptedSend>>,
    history_calls: AtomicUsize,
    send_calls: AtomicUsize,
    fail_next_history: AtomicBool,
    history_gated: AtomicBool,
    history_gate: Semaphore,
    send_gated: AtomicBool,
    send_gate: Semaphore,
}

impl MockBackend {
    pub fn new() -> Self {
        MockBackend {
            pages: Mutex::new(HashMap::new()),
            sends: Mutex::new(VecDeque::new()),
            history_calls: AtomicUsize::new(0),
            send_calls: AtomicUsize::new(0),
            fail_next_history: AtomicBool::new(false),
            history_gated: AtomicBool::new(false),
            history_gate: Semaphore::new(0),
            send_gated: AtomicBool::new(false),
            send_gate: Semaphore::new(0),
        }
    }

    pub fn add_page(&self, page: HistoryResponse) {
        self.pages.lock().unwrap().insert(page.page.number, page);
    }

    pub fn queue_send(&self, script: ScriptedSend) {
        self.sends.lock().unwrap().push_back(script);
    }

    /// Make the next history call fail with a transport error.
    pub fn fail_next_history(&self) {
        self.fail_next_history.store(true, Ordering::SeqCst);
    }

    /// Hold further history responses until released.
    pub fn gate_history(&self) {
        self.history_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_history(&self, count: usize) {
        self.history_gate.add_permits(count);
    }

    /// Hold further send responses until released.
    pub fn gate_sends(&self) {
        self.send_gated.store(true, Ordering::SeqCst);
    }

    pub fn release_sends(&self, count: usize) {
        self.send_gate.add_permits(count);
    }

    pub fn history_call_count(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn send_call_count(&self) -> usize {
        self.send_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn fetch_history(&self, page: u32, _page_size: u32) -> Result<HistoryResponse, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);

        if self.history_gated.load(Ordering::SeqCst) {
            self.history_gate.acquire().await.unwrap().forget();
        }
        if self.fail_next_history.swap(false, Ordering::SeqCst) {
            return Err(ApiError::Transport("connection reset".to_string()));
        }

        self.pages
            .lock()
            .unwrap()
            .get(&page)
            .cloned()
            .ok_or(ApiError::Status(404))
    }

    async fn send_chat_message(&self, _text: &str) -> Result<String, ApiError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if self.send_gated.load(Ordering::SeqCst) {
            self.send_gate.acquire().await.unwrap().forget();
        }

        match self.sends.lock().unwrap().pop_front() {
            Some(ScriptedSend::Reply(text)) => Ok(text.to_string()),
            Some(ScriptedSend::Empty) => Ok(String::new()),
            Some(ScriptedSend::Http(code)) => Err(ApiError::Status(code)),
            Some(ScriptedSend::Network) => Err(ApiError::Transport("network unreachable".to_string())),
            None => Ok("ok".to_string()),
        }
    }
}

/// Poll the timeline until its snapshot satisfies the predicate.
/// Panics after two seconds; background tasks in these tests finish in
/// milliseconds, so that is a hang, not slowness.
pub async fn wait_for_snapshot<F>(timeline: &ChatTimeline, predicate: F) -> Vec<ChatMessage>
where
    F: Fn(&[ChatMessage]) -> bool,
{
    let deadline = timeout(Duration::from_secs(2), async {
        loop {
            let snapshot = timeline.snapshot().await;
            if predicate(&snapshot) {
                return snapshot;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    deadline.expect("timed out waiting for the expected snapshot")
}

/// Let already-spawned background work run before a negative assertion
/// such as "no further request was made". These tests run on tokio's
/// current-thread scheduler, so yielding drains every ready task
/// regardless of machine load; the short sleep then covers wake-ups
/// parked on a timer or a lock handoff.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    sleep(Duration::from_millis(20)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
