// Chat timeline engine for Careline
// This file is the facade consumed by the renderer; the moving parts
// live in the submodules:
//   store  - ordered, deduplicated message collection (no I/O)
//   loader - fetches and maps one history page at a time
//   policy - decides when a scroll position warrants another page
//   sender - the optimistic send workflow (impl block on ChatTimeline)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use log::{debug, warn};
use tokio::sync::{mpsc, Mutex as TokioMutex};

use crate::api::ChatBackend;
use crate::models::{ChatMessage, PageCursor};

pub mod loader;
pub mod policy;
pub mod store;
mod sender;

use loader::HistoryPageLoader;
use policy::{FetchPolicy, DEFAULT_FETCH_THRESHOLD};
use store::MessageStore;

/// Page size requested from the history endpoint.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Change notifications for the renderer. The renderer reacts to
/// `MessagesChanged` by calling [`ChatTimeline::snapshot`]; the other
/// variants carry state it may want to surface (spinner off, an
/// inline "couldn't load more" toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineEvent {
    MessagesChanged,
    HistoryExhausted,
    HistoryLoadFailed(String),
}

#[derive(Debug, Clone, Copy)]
pub struct TimelineConfig {
    pub page_size: u32,
    pub fetch_threshold: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        TimelineConfig {
            page_size: DEFAULT_PAGE_SIZE,
            fetch_threshold: DEFAULT_FETCH_THRESHOLD,
        }
    }
}

pub(crate) struct TimelineInner {
    pub(crate) store: TokioMutex<MessageStore>,
    pub(crate) loader: HistoryPageLoader,
    pub(crate) policy: FetchPolicy,
    pub(crate) cursor: StdMutex<PageCursor>,
    pub(crate) backend: Arc<dyn ChatBackend>,
    pub(crate) events: mpsc::Sender<TimelineEvent>,
    pub(crate) disposed: AtomicBool,
    // Bumped by reset() so results of requests issued before the reset
    // are dropped instead of landing in the fresh store.
    pub(crate) generation: AtomicU64,
}

/// One chat screen's timeline. Cheap to clone; spawned network tasks
/// hold a clone and apply their results through the shared inner
/// state, all mutations serialized by the store mutex.
#[derive(Clone)]
pub struct ChatTimeline {
    inner: Arc<TimelineInner>,
}

impl ChatTimeline {
    /// Build a timeline over the given backend. Returns the receiver
    /// the renderer should select on for change notifications.
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        config: TimelineConfig,
    ) -> (Self, mpsc::Receiver<TimelineEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let inner = TimelineInner {
            store: TokioMutex::new(MessageStore::new()),
            loader: HistoryPageLoader::new(backend.clone(), config.page_size),
            policy: FetchPolicy::new(config.fetch_threshold),
            cursor: StdMutex::new(PageCursor::start()),
            backend,
            events,
            disposed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        };

        (ChatTimeline { inner: Arc::new(inner) }, events_rx)
    }

    /// Load page 0 and seed the store. Calling this a second time
    /// without a [`reset`](Self::reset) is a no-op; a failed attempt
    /// leaves the timeline re-initializable.
    pub async fn initialize(&self) {
        if self.is_disposed() {
            return;
        }
        {
            let store = self.inner.store.lock().await;
            if store.is_seeded() {
                warn!("initialize() called on a seeded timeline; ignoring (use reset() to reseed)");
                return;
            }
        }
        if !self.inner.policy.try_begin_initial() {
            debug!("Initial load already in flight");
            return;
        }
        self.load_page_and_apply(true).await;
    }

    /// Feed the renderer's visible-window signal. `oldest_visible_index`
    /// is the index into the snapshot of the oldest message currently
    /// on screen. May start (at most) one background page load.
    pub async fn on_scroll_position_changed(&self, oldest_visible_index: usize) {
        if self.is_disposed() {
            return;
        }
        let loaded = {
            let store = self.inner.store.lock().await;
            // A never-seeded timeline has no pages to extend
            if !store.is_seeded() {
                return;
            }
            store.len()
        };
        if !self.inner.policy.try_begin(oldest_visible_index, loaded) {
            return;
        }
        let timeline = self.clone();
        tokio::spawn(async move {
            timeline.load_page_and_apply(false).await;
        });
    }

    /// Current messages, newest first.
    pub async fn snapshot(&self) -> Vec<ChatMessage> {
        self.inner.store.lock().await.snapshot()
    }

    /// Drop everything and re-arm `initialize` ("start new chat").
    /// Results of requests already in flight are discarded.
    pub async fn reset(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut store = self.inner.store.lock().await;
            store.reset();
            *self.inner.cursor.lock().expect("cursor lock poisoned") = PageCursor::start();
            self.inner.policy.reset();
        }
        self.emit(TimelineEvent::MessagesChanged).await;
    }

    /// Tear down on navigation away. In-flight requests finish on
    /// their own but their results are never applied.
    pub fn dispose(&self) {
        self.inner.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub(crate) fn current_generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stale(&self, generation: u64) -> bool {
        self.is_disposed() || self.current_generation() != generation
    }

    /// Fetch the page the cursor points at and fold the result into
    /// the store. The whole apply step runs under the store lock so a
    /// concurrent send never observes a half-applied page.
    async fn load_page_and_apply(&self, seeding: bool) {
        let generation = self.current_generation();
        let page_number = self.inner.cursor.lock().expect("cursor lock poisoned").page_number;

        match self.inner.loader.load_page(page_number).await {
            Ok(page) => {
                if self.is_stale(generation) {
                    debug!("Dropping result of page {}: timeline disposed or reset", page_number);
                    return;
                }
                let empty = page.messages.is_empty();
                let has_more = page.cursor.has_more() && !empty;
                {
                    let mut store = self.inner.store.lock().await;
                    // dispose() or reset() may have landed while we
                    // waited for the lock; re-check before applying
                    if self.is_stale(generation) {
                        debug!("Dropping result of page {}: timeline disposed or reset", page_number);
                        return;
                    }
                    if seeding {
                        store.seed(page.messages);
                    } else {
                        store.append_older(page.messages);
                    }
                    // Cursor only advances on success, so the loaded
                    // pages are always a contiguous 0..=k
                    *self.inner.cursor.lock().expect("cursor lock poisoned") = page.cursor;
                    self.inner.policy.finish(has_more);
                }
                self.emit(TimelineEvent::MessagesChanged).await;
                if !has_more {
                    self.emit(TimelineEvent::HistoryExhausted).await;
                }
            }
            Err(e) => {
                warn!("History page {} failed: {}", page_number, e);
                if self.is_stale(generation) {
                    return;
                }
                // Back to Idle, not Exhausted: scrolling again retries
                self.inner.policy.fail();
                self.emit(TimelineEvent::HistoryLoadFailed(e.to_string())).await;
            }
        }
    }

    pub(crate) async fn emit(&self, event: TimelineEvent) {
        if let Err(e) = self.inner.events.send(event).await {
            debug!("No timeline event listener: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, HistoryResponse, PageInfo, RawMessage};
    use crate::models::MessageStatus;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::sleep;

    // A backend whose responses are held behind a semaphore, so a test
    // can keep a request in flight while it races dispose() against
    // the apply step.
    struct GatedBackend {
        gate: Semaphore,
        history_calls: AtomicUsize,
    }

    impl GatedBackend {
        fn new() -> Self {
            GatedBackend { gate: Semaphore::new(0), history_calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ChatBackend for GatedBackend {
        async fn fetch_history(&self, _page: u32, _page_size: u32) -> Result<HistoryResponse, ApiError> {
            self.history_calls.fetch_add(1, Ordering::SeqCst);
            self.gate.acquire().await.unwrap().forget();
            Ok(HistoryResponse {
                content: vec![RawMessage {
                    id: None,
                    kind: "USER".to_string(),
                    message: "hello".to_string(),
                    created_at: "2025-06-22T10:00:00Z".to_string(),
                }],
                page: PageInfo { size: 1, number: 0, total_elements: 1, total_pages: 1 },
            })
        }

        async fn send_chat_message(&self, _text: &str) -> Result<String, ApiError> {
            self.gate.acquire().await.unwrap().forget();
            Ok("ok".to_string())
        }
    }

    #[tokio::test]
    async fn dispose_while_waiting_for_the_store_lock_discards_the_page() {
        let backend = Arc::new(GatedBackend::new());
        let (timeline, _events) = ChatTimeline::new(backend.clone(), TimelineConfig::default());

        let load = {
            let timeline = timeline.clone();
            tokio::spawn(async move { timeline.initialize().await })
        };
        // Let the fetch start and block on the gate
        sleep(Duration::from_millis(10)).await;
        assert_eq!(backend.history_calls.load(Ordering::SeqCst), 1);

        // Hold the store lock so the apply step passes its early
        // staleness check and then parks on the lock; dispose lands
        // while it is waiting there.
        let guard = timeline.inner.store.lock().await;
        backend.gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;
        timeline.dispose();
        drop(guard);

        load.await.unwrap();
        assert!(timeline.snapshot().await.is_empty(), "late page must not be applied");
    }

    #[tokio::test]
    async fn dispose_while_waiting_for_the_store_lock_discards_the_send_result() {
        let backend = Arc::new(GatedBackend::new());
        let (timeline, _events) = ChatTimeline::new(backend.clone(), TimelineConfig::default());

        timeline.send_message("hi").await;

        let guard = timeline.inner.store.lock().await;
        backend.gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;
        timeline.dispose();
        drop(guard);
        sleep(Duration::from_millis(10)).await;

        // The optimistic insert stays as it was; the reply is dropped
        let snapshot = timeline.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].status, MessageStatus::Pending);
    }

    #[tokio::test]
    async fn reset_while_waiting_for_the_store_lock_discards_the_page() {
        let backend = Arc::new(GatedBackend::new());
        let (timeline, _events) = ChatTimeline::new(backend.clone(), TimelineConfig::default());

        let load = {
            let timeline = timeline.clone();
            tokio::spawn(async move { timeline.initialize().await })
        };
        sleep(Duration::from_millis(10)).await;

        let guard = timeline.inner.store.lock().await;
        backend.gate.add_permits(1);
        sleep(Duration::from_millis(10)).await;
        timeline.inner.generation.fetch_add(1, Ordering::SeqCst);
        drop(guard);

        load.await.unwrap();
        assert!(
            timeline.snapshot().await.is_empty(),
            "a page issued before the reset must not land in the fresh store"
        );
    }
}
