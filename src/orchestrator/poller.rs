//! Interval-driven status fetching for the active run.

use crate::api::ScanApi;
use crate::model::StatusPayload;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};

/// A successfully fetched status payload, stamped with the run generation that asked for it.
#[derive(Debug)]
pub(crate) struct PollMessage {
    pub generation: u64,
    pub payload: StatusPayload,
}

/// Handle to a running poll loop. Dropping it stops the loop.
pub(crate) struct Poller {
    generation: u64,
    stopped: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Poller {
    /// Spawn a loop that fetches `run_id`'s status every `interval`, first tick one interval
    /// from now. Fetches are not serialized: a slow response can still be in flight when the
    /// next tick fires. Failed fetches are dropped and the loop keeps going.
    pub fn start<A: ScanApi>(
        api: Arc<A>,
        run_id: String,
        generation: u64,
        interval: Duration,
        tx: UnboundedSender<PollMessage>,
    ) -> Self {
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped2 = stopped.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Aborting this task drops the set, which aborts every fetch still in flight.
            let mut inflight = JoinSet::new();
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if stopped2.load(Ordering::Relaxed) {
                            break;
                        }
                        let api = api.clone();
                        let run_id = run_id.clone();
                        let stopped = stopped2.clone();
                        let tx = tx.clone();
                        inflight.spawn(async move {
                            match api.poll(&run_id).await {
                                Ok(payload) => {
                                    if stopped.load(Ordering::Relaxed) {
                                        tracing::debug!(
                                            run_id = %run_id,
                                            "dropping poll result after stop"
                                        );
                                        return;
                                    }
                                    let _ = tx.send(PollMessage { generation, payload });
                                }
                                Err(e) => {
                                    tracing::debug!(
                                        run_id = %run_id,
                                        error = %format!("{e:#}"),
                                        "poll failed, waiting for next tick"
                                    );
                                }
                            }
                        });
                    }
                    Some(_) = inflight.join_next(), if !inflight.is_empty() => {}
                }
            }
        });
        Self {
            generation,
            stopped,
            handle,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Cancel the recurring task. Results of fetches already in flight are discarded.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.stopped.load(Ordering::Relaxed) && !self.handle.is_finished()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockScanApi;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn ticks_on_cadence_after_first_interval() {
        let api = Arc::new(
            MockScanApi::accepting("r1")
                .with_poll_json(r#"{"status":"SCANNING"}"#)
                .with_poll_json(r#"{"status":"SCANNING"}"#),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = Poller::start(api.clone(), "r1".into(), 7, Duration::from_secs(2), tx);

        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert_eq!(api.poll_calls(), 0);

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.generation, 7);
        assert_eq!(api.poll_calls(), 1);

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(api.poll_calls(), 2);
        assert!(poller.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_do_not_stop_the_loop() {
        let api = Arc::new(
            MockScanApi::accepting("r1")
                .with_poll_failure()
                .with_poll_failure()
                .with_poll_json(r#"{"status":"COMPLETE"}"#),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _poller = Poller::start(api.clone(), "r1".into(), 1, Duration::from_secs(2), tx);

        let msg = rx.recv().await.unwrap();
        assert_eq!(api.poll_calls(), 3);
        assert_eq!(msg.payload.status, Some(crate::model::RunStatus::Complete));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_discards_inflight_result() {
        let api = Arc::new(
            MockScanApi::accepting("r1")
                .with_poll_json(r#"{"status":"COMPLETE"}"#)
                .with_poll_delay(Duration::from_secs(5)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let poller = Poller::start(api.clone(), "r1".into(), 1, Duration::from_secs(2), tx);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(api.poll_calls(), 1);
        poller.stop();
        assert!(!poller.is_active());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.poll_calls(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_does_not_hold_back_the_timer() {
        let api = Arc::new(
            MockScanApi::accepting("r1")
                .with_poll_json(r#"{"logs":[{"timestamp":"t1","message":"a","type":"info"}]}"#)
                .with_poll_json(r#"{"logs":[{"timestamp":"t2","message":"b","type":"info"}]}"#)
                .with_poll_delay(Duration::from_secs(5)),
        );
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _poller = Poller::start(api.clone(), "r1".into(), 4, Duration::from_secs(2), tx);

        // Ticks at 2s, 4s and 6s have all fired; the 2s fetch resolves at 7s.
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(api.poll_calls(), 3);
        assert!(rx.try_recv().is_err());

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!((first.generation, second.generation), (4, 4));
        assert_eq!(first.payload.logs.unwrap()[0].message, "a");
        assert_eq!(second.payload.logs.unwrap()[0].message, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_polling() {
        let api = Arc::new(MockScanApi::accepting("r1"));
        let (tx, _rx) = mpsc::unbounded_channel();
        let poller = Poller::start(api.clone(), "r1".into(), 1, Duration::from_secs(2), tx);
        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert_eq!(api.poll_calls(), 1);

        drop(poller);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(api.poll_calls(), 1);
    }
}
