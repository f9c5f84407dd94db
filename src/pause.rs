//! Pause state machine
//!
//! Tracks the runtime's paused/running state as the adapter sees it,
//! classifies stop reasons, orders the `stopped` event after the step
//! response that induced it, and arms the short post-step quiescence
//! window that evaluations wait on.
//!
//! Invariant: `current` is non-empty exactly while the runtime is paused
//! from our perspective.

use crate::dap::events::StopReason;
use crate::rdp::types::{PausedEvent, RemoteObject};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Ceiling on waiting for an in-flight step response before `stopped` is
/// emitted anyway.
pub const STEP_SETTLE_CEILING: Duration = Duration::from_millis(300);

/// Post-step quiescence window; evaluations issued inside it wait it out.
pub const QUIESCENCE_WINDOW: Duration = Duration::from_millis(50);

/// The pause notification remembered for re-firing, with what was
/// expected when it arrived.
#[derive(Debug, Clone)]
pub struct LastPauseState {
    /// The notification itself
    pub event: PausedEvent,
    /// The stop reason a step/pause request had primed
    pub expecting: Option<StopReason>,
}

/// Classify a pause notification into a stop reason.
///
/// Precedence: exception kinds, then hit breakpoints, then whatever a
/// step/pause request primed, then `debugger` statement.
pub fn classify_pause(
    reason: &str,
    has_hit_breakpoints: bool,
    expected: Option<StopReason>,
) -> StopReason {
    match reason {
        "exception" => StopReason::Exception,
        "promiseRejection" => StopReason::PromiseRejection,
        _ if has_hit_breakpoints => StopReason::Breakpoint,
        _ => expected.unwrap_or(StopReason::DebuggerStatement),
    }
}

/// Paused/running state plus step and quiescence gates
pub struct PauseState {
    current: RwLock<Option<PausedEvent>>,
    exception: RwLock<Option<RemoteObject>>,
    expected_stop: RwLock<Option<StopReason>>,
    expecting_resumed: AtomicBool,
    last_pause: RwLock<Option<LastPauseState>>,
    smart_step_run: AtomicU64,
    step_tx: watch::Sender<bool>,
    step_rx: watch::Receiver<bool>,
    quiescence_until: RwLock<Option<Instant>>,
}

impl Default for PauseState {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseState {
    /// Create in the running state.
    pub fn new() -> Self {
        let (step_tx, step_rx) = watch::channel(false);
        Self {
            current: RwLock::new(None),
            exception: RwLock::new(None),
            expected_stop: RwLock::new(None),
            expecting_resumed: AtomicBool::new(false),
            last_pause: RwLock::new(None),
            smart_step_run: AtomicU64::new(0),
            step_tx,
            step_rx,
            quiescence_until: RwLock::new(None),
        }
    }

    /// Record a pause notification as current.
    pub fn set_paused(&self, event: PausedEvent) {
        *self.current.write() = Some(event);
    }

    /// Remember the notification (and what was expected) for re-firing.
    pub fn remember_pause(&self, event: PausedEvent, expecting: Option<StopReason>) {
        *self.last_pause.write() = Some(LastPauseState { event, expecting });
    }

    /// The remembered pause, for `toggleSkipFileStatus` re-firing.
    pub fn last_pause(&self) -> Option<LastPauseState> {
        self.last_pause.read().clone()
    }

    /// Leave the paused state.
    pub fn clear_paused(&self) {
        *self.current.write() = None;
    }

    /// The current pause notification, while paused.
    pub fn current(&self) -> Option<PausedEvent> {
        self.current.read().clone()
    }

    /// Whether the runtime is paused from our perspective.
    pub fn is_paused(&self) -> bool {
        self.current.read().is_some()
    }

    /// Record the current exception.
    pub fn set_exception(&self, exception: Option<RemoteObject>) {
        *self.exception.write() = exception;
    }

    /// The current exception, while paused on one.
    pub fn exception(&self) -> Option<RemoteObject> {
        self.exception.read().clone()
    }

    /// Prime the stop reason the next pause should report.
    pub fn expect_stop(&self, reason: StopReason) {
        *self.expected_stop.write() = Some(reason);
    }

    /// Read what a step/pause request primed, without consuming it.
    pub fn expected_stop(&self) -> Option<StopReason> {
        *self.expected_stop.read()
    }

    /// Consume the primed stop reason.
    pub fn take_expected_stop(&self) -> Option<StopReason> {
        self.expected_stop.write().take()
    }

    /// Mark that the next `resumed` notification belongs to a navigation
    /// request and must not surface as a `continued` event.
    pub fn expect_resumed(&self) {
        self.expecting_resumed.store(true, Ordering::SeqCst);
    }

    /// Consume the expected-resumed mark.
    pub fn take_expecting_resumed(&self) -> bool {
        self.expecting_resumed.swap(false, Ordering::SeqCst)
    }

    /// Mark a step RPC as in flight.
    pub fn begin_step(&self) {
        let _ = self.step_tx.send(true);
    }

    /// Mark the in-flight step RPC as settled (response, error, either).
    pub fn end_step(&self) {
        let _ = self.step_tx.send(false);
    }

    /// Whether a step RPC is outstanding.
    pub fn step_in_flight(&self) -> bool {
        *self.step_rx.borrow()
    }

    /// Wait for the outstanding step RPC to settle, bounded by `ceiling`.
    /// Fires on settle, error or timeout alike.
    pub async fn wait_step_settled(&self, ceiling: Duration) {
        let mut rx = self.step_rx.clone();
        let _ = tokio::time::timeout(ceiling, async {
            while *rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }

    /// Arm the post-step quiescence window.
    pub fn arm_quiescence(&self, window: Duration) {
        *self.quiescence_until.write() = Some(Instant::now() + window);
    }

    /// Wait out the quiescence window, if one is armed and still open.
    pub async fn wait_quiescence(&self) {
        let deadline = self.quiescence_until.write().take();
        if let Some(deadline) = deadline {
            if deadline > Instant::now() {
                tokio::time::sleep_until(deadline).await;
            }
        }
    }

    /// Count one auto-skipped smart-step frame.
    pub fn note_smart_step(&self) -> u64 {
        self.smart_step_run.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Take and reset the smart-step run length, logged when a step
    /// finally lands on an authored frame.
    pub fn take_smart_step_run(&self) -> u64 {
        self.smart_step_run.swap(0, Ordering::Relaxed)
    }

    /// Full reset on detach or context teardown.
    pub fn reset(&self) {
        self.clear_paused();
        self.set_exception(None);
        *self.expected_stop.write() = None;
        self.expecting_resumed.store(false, Ordering::SeqCst);
        *self.last_pause.write() = None;
        self.smart_step_run.store(0, Ordering::Relaxed);
        let _ = self.step_tx.send(false);
        *self.quiescence_until.write() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paused(reason: &str) -> PausedEvent {
        serde_json::from_value(serde_json::json!({
            "callFrames": [],
            "reason": reason,
        }))
        .unwrap()
    }

    #[test]
    fn test_classification_precedence() {
        assert_eq!(
            classify_pause("exception", true, Some(StopReason::Step)),
            StopReason::Exception
        );
        assert_eq!(
            classify_pause("promiseRejection", false, None),
            StopReason::PromiseRejection
        );
        assert_eq!(
            classify_pause("other", true, Some(StopReason::Step)),
            StopReason::Breakpoint
        );
        assert_eq!(
            classify_pause("other", false, Some(StopReason::Step)),
            StopReason::Step
        );
        assert_eq!(
            classify_pause("other", false, Some(StopReason::Pause)),
            StopReason::Pause
        );
        assert_eq!(
            classify_pause("other", false, None),
            StopReason::DebuggerStatement
        );
    }

    #[test]
    fn test_paused_invariant() {
        let state = PauseState::new();
        assert!(!state.is_paused());

        state.set_paused(paused("other"));
        assert!(state.is_paused());
        assert!(state.current().is_some());

        state.clear_paused();
        assert!(!state.is_paused());
        assert!(state.current().is_none());
    }

    #[test]
    fn test_expected_stop_is_consumed() {
        let state = PauseState::new();
        state.expect_stop(StopReason::Step);
        assert_eq!(state.take_expected_stop(), Some(StopReason::Step));
        assert_eq!(state.take_expected_stop(), None);
    }

    #[tokio::test]
    async fn test_step_settle_completes_on_end() {
        let state = std::sync::Arc::new(PauseState::new());
        state.begin_step();
        assert!(state.step_in_flight());

        let waiter = state.clone();
        let task = tokio::spawn(async move {
            waiter.wait_step_settled(Duration::from_secs(5)).await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        state.end_step();
        task.await.unwrap();
        assert!(!state.step_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_step_settle_honors_ceiling() {
        let state = PauseState::new();
        state.begin_step();

        let started = tokio::time::Instant::now();
        state.wait_step_settled(STEP_SETTLE_CEILING).await;
        let elapsed = started.elapsed();
        assert!(elapsed >= STEP_SETTLE_CEILING);
        assert!(elapsed < STEP_SETTLE_CEILING + Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiescence_window() {
        let state = PauseState::new();

        // Nothing armed: returns immediately.
        state.wait_quiescence().await;

        state.arm_quiescence(QUIESCENCE_WINDOW);
        let started = tokio::time::Instant::now();
        state.wait_quiescence().await;
        assert!(started.elapsed() >= QUIESCENCE_WINDOW);

        // The window is consumed by the first waiter.
        let started = tokio::time::Instant::now();
        state.wait_quiescence().await;
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[test]
    fn test_smart_step_run_counter() {
        let state = PauseState::new();
        assert_eq!(state.note_smart_step(), 1);
        assert_eq!(state.note_smart_step(), 2);
        assert_eq!(state.take_smart_step_run(), 2);
        assert_eq!(state.take_smart_step_run(), 0);
    }
}
