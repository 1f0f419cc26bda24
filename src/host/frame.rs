use crate::error::HostError;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

type FrameJob = Box<dyn FnOnce() + Send>;

/// Sender half of the host-update thread. Cheap to clone; `run` marshals a
/// closure onto the frame thread and awaits its result.
#[derive(Clone)]
pub struct FrameExecutor {
    job_tx: mpsc::Sender<FrameJob>,
}

impl FrameExecutor {
    pub async fn run<T, F>(&self, job: F) -> Result<T, HostError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        self.job_tx
            .send(Box::new(move || {
                let _ = result_tx.send(job());
            }))
            .await
            .map_err(|_| HostError::Unavailable)?;
        result_rx.await.map_err(|_| HostError::Unavailable)
    }
}

/// The designated host-update thread. Owns a dedicated OS thread whose tick
/// loop drains pending jobs each cycle, the way the emulator loop polls its
/// action channel between frames. Commands with host affinity execute here
/// and nowhere else.
pub struct FrameLoop {
    cancel_token: CancellationToken,
    frame_thread: Option<std::thread::JoinHandle<()>>,
}

impl FrameLoop {
    pub fn start(tick_interval: Duration) -> (Self, FrameExecutor) {
        let cancel_token = CancellationToken::new();
        let (job_tx, mut job_rx) = mpsc::channel::<FrameJob>(100);
        let thread_token = cancel_token.clone();
        let frame_thread = std::thread::spawn(move || {
            tracing::debug!("Frame loop started");
            while !thread_token.is_cancelled() {
                loop {
                    match job_rx.try_recv() {
                        Ok(job) => job(),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            tracing::debug!("Frame job channel closed, stopping frame loop");
                            return;
                        }
                    }
                }
                std::thread::sleep(tick_interval);
            }
            tracing::debug!("Frame loop stopped");
        });
        (
            Self {
                cancel_token,
                frame_thread: Some(frame_thread),
            },
            FrameExecutor { job_tx },
        )
    }

    pub fn stop(&mut self) {
        self.cancel_token.cancel();
        if let Some(thread) = self.frame_thread.take() {
            if thread.join().is_err() {
                tracing::error!("Frame thread panicked");
            }
        }
    }
}

impl Drop for FrameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_jobs_run_on_the_frame_thread() {
        let (mut frame_loop, executor) = FrameLoop::start(Duration::from_millis(5));
        let counter = Arc::new(AtomicU32::new(0));
        let job_counter = counter.clone();
        let value = executor
            .run(move || {
                job_counter.fetch_add(1, Ordering::SeqCst);
                21 * 2
            })
            .await
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        frame_loop.stop();
    }

    #[tokio::test]
    async fn test_run_after_stop_is_unavailable() {
        let (mut frame_loop, executor) = FrameLoop::start(Duration::from_millis(5));
        frame_loop.stop();
        let result = executor.run(|| ()).await;
        assert!(matches!(result, Err(HostError::Unavailable)));
    }
}
