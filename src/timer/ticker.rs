//! Periodic liveness signal for the timer. It knows nothing about phases or
//! deadlines; the consumer recomputes remaining time from the wall clock on
//! every tick, so drift, throttling and dropped ticks are all harmless.

use std::time::Duration;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::log_debug;

pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

pub struct TickSource {
    period: Duration,
    sender: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TickSource {
    /// Ticks are delivered to the single receiver paired with `sender`.
    pub fn new(period: Duration, sender: mpsc::Sender<()>) -> Self {
        Self {
            period,
            sender,
            handle: None,
        }
    }

    /// Begin emitting ticks. Restarts the interval if already running, so at
    /// most one emitter is ever alive.
    pub fn start(&mut self) {
        self.stop();

        let sender = self.sender.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                match sender.try_send(()) {
                    Ok(()) => {}
                    // consumer still has a pending tick; coalesce
                    Err(TrySendError::Full(())) => {}
                    Err(TrySendError::Closed(())) => {
                        log_debug!("tick receiver dropped; stopping tick source");
                        break;
                    }
                }
            }
        });

        self.handle = Some(handle);
    }

    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }
}

impl Drop for TickSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_emits_roughly_every_period() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut ticker = TickSource::new(DEFAULT_TICK_PERIOD, tx);
        ticker.start();
        assert!(ticker.is_running());

        for _ in 0..3 {
            time::timeout(Duration::from_millis(1500), rx.recv())
                .await
                .expect("tick within period")
                .expect("channel open");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_silences_ticks() {
        let (tx, mut rx) = mpsc::channel(1);
        let mut ticker = TickSource::new(DEFAULT_TICK_PERIOD, tx);
        ticker.start();
        rx.recv().await.expect("first tick");

        ticker.stop();
        ticker.stop();
        assert!(!ticker.is_running());

        // drain a tick that may have been queued before stop
        let _ = rx.try_recv();
        let silent = time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(silent.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_emitter() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut ticker = TickSource::new(DEFAULT_TICK_PERIOD, tx);
        ticker.start();
        ticker.start();
        ticker.start();

        time::sleep(Duration::from_millis(3500)).await;
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, 3);
    }
}
