//! Windowed event counting on top of an input stream.
//!
//! An [`ActivityRateSampler`] attaches to a stream (typically the receiving
//! half of a channel), counts every item it sees and zeroes that count at the
//! end of each window. Monitors read [`ActivityRateSampler::count`] and
//! [`ActivityRateSampler::last_event_time`] to approximate the arrival rate.
//!
//! The sampler runs two tokio tasks:
//!
//! - a consumer that records each item and stops when the stream ends,
//! - a reset loop that sleeps for `interval_fn()` and then clears the count.
//!
//! Both tasks share one cancellation token. The consumer cancels it when the
//! stream ends, [`ActivityRateSampler::shutdown`] cancels and joins both, and
//! dropping the sampler cancels it as well.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rand::Rng;
use serde::Serialize;
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tokio_stream::{
    wrappers::{ReceiverStream, UnboundedReceiverStream},
    Stream, StreamExt,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{config::SamplerConfig, timestamp::Timestamp, RegistryResult};

/// Lower bound applied to every window so a zero interval cannot spin.
pub const MIN_RESET_INTERVAL: Duration = Duration::from_millis(1);

pub type IntervalFn = Arc<dyn Fn() -> Duration + Send + Sync>;

#[derive(Debug, Default)]
struct SamplerState {
    count: AtomicU64,
    total: AtomicU64,
    last_window: AtomicU64,
    // microseconds since the UNIX epoch, 0 until the first event
    last_event_micros: AtomicU64,
}

impl SamplerState {
    fn record(&self, at: Timestamp) {
        self.count.fetch_add(1, Ordering::AcqRel);
        self.total.fetch_add(1, Ordering::Relaxed);
        self.last_event_micros
            .fetch_max(at.as_micros().max(1), Ordering::AcqRel);
    }

    fn last_event_time(&self) -> Option<Timestamp> {
        match self.last_event_micros.load(Ordering::Acquire) {
            0 => None,
            micros => Some(Timestamp::from_micros(micros)),
        }
    }
}

/// Counters exported for external metrics emission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplerSnapshot {
    pub count: u64,
    pub last_window_count: u64,
    pub total: u64,
    pub last_event_time: Option<Timestamp>,
}

pub struct ActivityRateSampler {
    state: Arc<SamplerState>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ActivityRateSampler {
    /// Starts sampling `stream`, resetting the count every `interval_fn()`.
    ///
    /// `interval_fn` is evaluated again for every window, so it may return a
    /// jittered or otherwise changing period. Must be called from within a
    /// tokio runtime.
    pub fn new<S, F>(stream: S, interval_fn: F) -> Self
    where
        S: Stream + Send + Unpin + 'static,
        S::Item: Send,
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        Self::with_cancellation(stream, interval_fn, CancellationToken::new())
    }

    /// Like [`ActivityRateSampler::new`], but both tasks also stop when
    /// `parent` is cancelled.
    pub fn with_cancellation<S, F>(stream: S, interval_fn: F, parent: CancellationToken) -> Self
    where
        S: Stream + Send + Unpin + 'static,
        S::Item: Send,
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        let state = Arc::new(SamplerState::default());
        let cancel = parent.child_token();
        let interval_fn: IntervalFn = Arc::new(interval_fn);

        let consumer = tokio::spawn(consume(stream, state.clone(), cancel.clone()));
        let resetter = tokio::spawn(reset_windows(state.clone(), interval_fn, cancel.clone()));
        debug!("activity rate sampler started");

        Self {
            state,
            cancel,
            tasks: Mutex::new(vec![consumer, resetter]),
        }
    }

    pub fn from_receiver<T, F>(rx: mpsc::Receiver<T>, interval_fn: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        Self::new(ReceiverStream::new(rx), interval_fn)
    }

    pub fn from_unbounded_receiver<T, F>(rx: mpsc::UnboundedReceiver<T>, interval_fn: F) -> Self
    where
        T: Send + 'static,
        F: Fn() -> Duration + Send + Sync + 'static,
    {
        Self::new(UnboundedReceiverStream::new(rx), interval_fn)
    }

    /// Builds the window function from `config`, applying its jitter.
    pub fn from_config<S>(stream: S, config: &SamplerConfig) -> RegistryResult<Self>
    where
        S: Stream + Send + Unpin + 'static,
        S::Item: Send,
    {
        config.validate()?;
        Ok(Self::new(
            stream,
            jittered_interval(config.window_interval, config.jitter_ratio),
        ))
    }

    /// Events observed since the last reset.
    pub fn count(&self) -> u64 {
        self.state.count.load(Ordering::Acquire)
    }

    /// Events counted in the most recently closed window.
    pub fn last_window_count(&self) -> u64 {
        self.state.last_window.load(Ordering::Acquire)
    }

    /// Events observed since the sampler started. Never reset.
    pub fn total(&self) -> u64 {
        self.state.total.load(Ordering::Relaxed)
    }

    /// Whether at least one event has been observed.
    pub fn any(&self) -> bool {
        self.total() > 0
    }

    /// Time of the most recent event. Read independently of `count`, so it
    /// may trail a concurrent increment.
    pub fn last_event_time(&self) -> Option<Timestamp> {
        self.state.last_event_time()
    }

    pub fn snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            count: self.count(),
            last_window_count: self.last_window_count(),
            total: self.total(),
            last_event_time: self.last_event_time(),
        }
    }

    /// `false` once the input has ended or the sampler was cancelled.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stops both tasks and waits for them to finish.
    #[tracing::instrument(skip(self), level = "debug")]
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!("sampler task ended abnormally: {}", e);
            }
        }
        debug!("activity rate sampler stopped");
    }
}

impl Drop for ActivityRateSampler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ActivityRateSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityRateSampler")
            .field("state", &self.state)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Window function drawing each period uniformly from
/// `base * [1 - jitter_ratio, 1 + jitter_ratio]`.
pub fn jittered_interval(
    base: Duration,
    jitter_ratio: f64,
) -> impl Fn() -> Duration + Send + Sync + 'static {
    let ratio = if jitter_ratio.is_nan() {
        0.0
    } else {
        jitter_ratio.clamp(0.0, 0.99)
    };
    move || {
        if ratio == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - ratio)..=(1.0 + ratio));
        // saturate instead of panicking inside the reset task
        Duration::try_from_secs_f64(base.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }
}

async fn consume<S>(mut stream: S, state: Arc<SamplerState>, cancel: CancellationToken)
where
    S: Stream + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => match item {
                Some(_) => state.record(Timestamp::now()),
                None => {
                    // 入力が閉じたらリセットループも止める
                    debug!("sampler input closed");
                    cancel.cancel();
                    break;
                }
            }
        }
    }
}

async fn reset_windows(state: Arc<SamplerState>, interval_fn: IntervalFn, cancel: CancellationToken) {
    let mut warned = false;
    loop {
        let mut interval = interval_fn();
        if interval < MIN_RESET_INTERVAL {
            if !warned {
                warned = true;
                warn!(
                    ?interval,
                    "sampler window below minimum, clamping to {:?}", MIN_RESET_INTERVAL
                );
            }
            interval = MIN_RESET_INTERVAL;
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let closed = state.count.swap(0, Ordering::AcqRel);
                state.last_window.store(closed, Ordering::Release);
                trace!(closed, "sampler window reset");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_counts_events_from_channel() {
        let (tx, rx) = mpsc::channel::<u32>(16);
        let sampler = ActivityRateSampler::from_receiver(rx, || Duration::from_secs(3600));
        assert!(!sampler.any());
        assert_eq!(sampler.last_event_time(), None);

        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        sleep(Duration::from_millis(20)).await;

        assert_eq!(sampler.count(), 5);
        assert_eq!(sampler.total(), 5);
        assert!(sampler.any());
        assert!(sampler.last_event_time().is_some());
        sampler.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_interval_is_clamped() {
        let (tx, rx) = mpsc::unbounded_channel::<()>();
        let sampler = ActivityRateSampler::from_unbounded_receiver(rx, || Duration::ZERO);

        for _ in 0..5 {
            tx.send(()).unwrap();
        }
        sleep(Duration::from_millis(30)).await;

        assert_eq!(sampler.count(), 0);
        assert_eq!(sampler.total(), 5);
        timeout(Duration::from_secs(1), sampler.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    #[tokio::test]
    async fn test_stream_end_stops_sampler() {
        let (tx, rx) = mpsc::channel::<u8>(4);
        let sampler = ActivityRateSampler::from_receiver(rx, || Duration::from_secs(3600));
        tx.send(1).await.unwrap();
        drop(tx);

        timeout(Duration::from_secs(1), async {
            while sampler.is_running() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sampler should stop after its input closes");

        assert_eq!(sampler.total(), 1);
        timeout(Duration::from_secs(1), sampler.shutdown())
            .await
            .expect("both tasks should already be finished");
    }

    #[tokio::test]
    async fn test_parent_cancellation() {
        let (_tx, rx) = mpsc::channel::<u8>(4);
        let parent = CancellationToken::new();
        let sampler = ActivityRateSampler::with_cancellation(
            ReceiverStream::new(rx),
            || Duration::from_millis(10),
            parent.clone(),
        );
        assert!(sampler.is_running());

        parent.cancel();
        assert!(!sampler.is_running());
        timeout(Duration::from_secs(1), sampler.shutdown())
            .await
            .expect("cancelled sampler should join promptly");
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid() {
        let (_tx, rx) = mpsc::channel::<u8>(1);
        let config = SamplerConfig {
            window_interval: Duration::from_millis(100),
            jitter_ratio: 2.0,
        };
        let result = ActivityRateSampler::from_config(ReceiverStream::new(rx), &config);
        assert!(result.is_err());
    }

    #[test]
    fn test_jittered_interval_stays_in_band() {
        let base = Duration::from_millis(1000);
        let interval = jittered_interval(base, 0.2);
        for _ in 0..200 {
            let d = interval();
            assert!(d >= Duration::from_millis(800), "{:?} below band", d);
            assert!(d <= Duration::from_millis(1200), "{:?} above band", d);
        }
        assert_eq!(jittered_interval(base, 0.0)(), base);
    }

    #[test]
    fn test_jittered_interval_saturates_huge_base() {
        let interval = jittered_interval(Duration::MAX, 0.5);
        for _ in 0..50 {
            let d = interval();
            assert!(d >= Duration::MAX.mul_f64(0.4), "{:?} unexpectedly small", d);
        }
    }

    #[test]
    fn test_record_keeps_latest_time() {
        let state = SamplerState::default();
        let later = Timestamp::now();
        let earlier = later.checked_sub(Duration::from_secs(1)).unwrap();
        state.record(later);
        state.record(earlier);
        assert_eq!(state.count.load(Ordering::Acquire), 2);
        assert_eq!(
            state.last_event_time().map(|t| t.as_micros()),
            Some(later.as_micros())
        );
    }
}
