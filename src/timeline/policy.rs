// Scroll-triggered fetch policy.
//
// Decides whether a scroll signal should start another history page
// load. The Idle -> Loading transition happens under one lock together
// with the threshold check, so a burst of scroll callbacks arriving
// while a page is in flight can never start a second request. (The
// original screen used a bare isLoadingMore boolean for this, which is
// exactly the race this replaces.)

use std::sync::Mutex;

use log::debug;

/// How close to the oldest loaded item the viewport must get before
/// the next page is requested. Matches the screen's "last 5 items".
pub const DEFAULT_FETCH_THRESHOLD: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    Idle,
    Loading,
    Exhausted,
}

pub struct FetchPolicy {
    state: Mutex<FetchState>,
    threshold: usize,
}

impl FetchPolicy {
    pub fn new(threshold: usize) -> Self {
        FetchPolicy { state: Mutex::new(FetchState::Idle), threshold }
    }

    pub fn state(&self) -> FetchState {
        *self.state.lock().expect("fetch policy lock poisoned")
    }

    /// Atomically check the scroll position against the threshold and,
    /// if a load is warranted, claim the Loading state. Returns true
    /// exactly when the caller now owns the (single) in-flight load.
    pub fn try_begin(&self, oldest_visible_index: usize, loaded_count: usize) -> bool {
        let mut state = self.state.lock().expect("fetch policy lock poisoned");
        if *state != FetchState::Idle {
            return false;
        }
        if loaded_count == 0 {
            return false;
        }
        if oldest_visible_index + self.threshold < loaded_count {
            return false;
        }
        *state = FetchState::Loading;
        debug!(
            "Fetch policy: loading next page (visible index {}, {} loaded)",
            oldest_visible_index, loaded_count
        );
        true
    }

    /// Claim the Loading state unconditionally (used by the initial
    /// load, which has no scroll position yet).
    pub fn try_begin_initial(&self) -> bool {
        let mut state = self.state.lock().expect("fetch policy lock poisoned");
        if *state != FetchState::Idle {
            return false;
        }
        *state = FetchState::Loading;
        true
    }

    /// A page arrived. `has_more = false` parks the policy in
    /// Exhausted; nothing short of a reset leaves that state.
    pub fn finish(&self, has_more: bool) {
        let mut state = self.state.lock().expect("fetch policy lock poisoned");
        *state = if has_more { FetchState::Idle } else { FetchState::Exhausted };
    }

    /// The in-flight load failed. Back to Idle so a later scroll
    /// signal can retry; a transport error must not look like
    /// exhaustion.
    pub fn fail(&self) {
        let mut state = self.state.lock().expect("fetch policy lock poisoned");
        *state = FetchState::Idle;
    }

    pub fn reset(&self) {
        let mut state = self.state.lock().expect("fetch policy lock poisoned");
        *state = FetchState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_near_the_oldest_loaded_item() {
        let policy = FetchPolicy::new(5);
        // 40 loaded, viewport still in the recent half
        assert!(!policy.try_begin(10, 40));
        assert_eq!(policy.state(), FetchState::Idle);
        // within 5 of the end
        assert!(policy.try_begin(35, 40));
        assert_eq!(policy.state(), FetchState::Loading);
    }

    #[test]
    fn never_fires_on_an_empty_store() {
        let policy = FetchPolicy::new(5);
        assert!(!policy.try_begin(0, 0));
    }

    #[test]
    fn only_one_caller_wins_while_loading() {
        let policy = FetchPolicy::new(5);
        assert!(policy.try_begin(38, 40));
        for _ in 0..10 {
            assert!(!policy.try_begin(39, 40));
        }
        policy.finish(true);
        assert!(policy.try_begin(39, 40));
    }

    #[test]
    fn exhaustion_is_terminal_until_reset() {
        let policy = FetchPolicy::new(5);
        assert!(policy.try_begin(38, 40));
        policy.finish(false);
        assert_eq!(policy.state(), FetchState::Exhausted);
        assert!(!policy.try_begin(39, 41));
        assert!(!policy.try_begin_initial());

        policy.reset();
        assert!(policy.try_begin_initial());
    }

    #[test]
    fn failure_returns_to_idle_for_a_retry() {
        let policy = FetchPolicy::new(5);
        assert!(policy.try_begin(38, 40));
        policy.fail();
        assert_eq!(policy.state(), FetchState::Idle);
        assert!(policy.try_begin(38, 40));
    }
}
