use crate::macros::Macro;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Pause/resume signal shared between the scheduler and a running engine.
/// Engines block on `wait_if_paused` at their suspension points; resuming
/// sets the signal again and unblocks them.
#[derive(Debug, Clone)]
pub struct PauseGate {
    running: Arc<watch::Sender<bool>>,
}

impl PauseGate {
    pub fn new() -> Self {
        let (running, _) = watch::channel(true);
        Self {
            running: Arc::new(running),
        }
    }

    pub fn pause(&self) {
        // send_replace updates the value even with no live subscriber.
        self.running.send_replace(false);
    }

    pub fn resume(&self) {
        self.running.send_replace(true);
    }

    pub fn is_paused(&self) -> bool {
        !*self.running.borrow()
    }

    /// Block until the gate is open. Returns true if it had to block, so the
    /// caller can report the pause transition.
    pub async fn wait_if_paused(&self) -> bool {
        let mut rx = self.running.subscribe();
        if *rx.borrow_and_update() {
            return false;
        }
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                break;
            }
        }
        true
    }
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Deferred control requests consulted by loop constructs: "pause at next
/// loop" and "stop at next loop". Set by the scheduler, consumed (and
/// cleared) by the native engine when a loop boundary is reached.
#[derive(Debug, Default)]
pub struct LoopControls {
    pause_at_loop: AtomicBool,
    stop_at_loop: AtomicBool,
}

impl LoopControls {
    pub fn request_pause(&self) {
        self.pause_at_loop.store(true, Ordering::SeqCst);
    }

    pub fn request_stop(&self) {
        self.stop_at_loop.store(true, Ordering::SeqCst);
    }

    pub fn take_pause(&self) -> bool {
        self.pause_at_loop.swap(false, Ordering::SeqCst)
    }

    pub fn take_stop(&self) -> bool {
        self.stop_at_loop.swap(false, Ordering::SeqCst)
    }
}

/// Per-running-macro record owned by the scheduler. Created when a start
/// request is accepted, destroyed when the macro reaches a terminal state.
/// The run token distinguishes this run from a later one under the same id,
/// so teardown paths never remove a successor's entry.
pub struct MacroExecutionState {
    pub definition: Macro,
    pub run_token: uuid::Uuid,
    pub cancel_token: CancellationToken,
    pub pause_gate: PauseGate,
    pub loop_controls: Arc<LoopControls>,
    pub monitor: JoinHandle<()>,
}

impl MacroExecutionState {
    pub fn stop(&self) {
        self.cancel_token.cancel();
        // A paused macro must still observe cancellation promptly.
        self.pause_gate.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_gate_does_not_block() {
        let gate = PauseGate::new();
        assert!(!gate.wait_if_paused().await);
    }

    #[tokio::test]
    async fn test_pause_blocks_until_resume() {
        let gate = PauseGate::new();
        gate.pause();
        assert!(gate.is_paused());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_if_paused().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_loop_controls_clear_on_take() {
        let controls = LoopControls::default();
        controls.request_stop();
        assert!(controls.take_stop());
        assert!(!controls.take_stop());
    }
}
