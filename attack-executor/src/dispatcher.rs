use crate::plan::WorkPlan;
use crate::throttle::Throttle;
use crate::{log_error, Outcome, ProtocolAdapter, ResultSet};
use barrage_metrics::Metrics;
use barrage_target::{AttackConfig, TargetList};
use common_types::RunMode;
use log::{debug, info, trace};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

/// One attack run: a work plan, the pacing of its sends and the adapter doing them.
pub struct Attack {
    job_id: String,
    plan: WorkPlan,
    interval: Duration,
    max_in_flight: usize,
    mode: RunMode,
    duration: Duration,
    adapter: Arc<dyn ProtocolAdapter>,
    metrics: Option<Arc<Metrics>>,
}

impl Attack {
    /// `config` is expected to be validated. The pool size falls back to
    /// `BARRAGE_MAX_IN_FLIGHT`.
    pub fn new(
        job_id: impl Into<String>,
        targets: TargetList,
        config: &AttackConfig,
        adapter: Arc<dyn ProtocolAdapter>,
    ) -> Self {
        let max_in_flight = config
            .max_in_flight
            .map(|n| n.get())
            .unwrap_or_else(common_env::max_in_flight)
            .min(Semaphore::MAX_PERMITS);
        Attack {
            job_id: job_id.into(),
            plan: WorkPlan::new(targets, config.planned_requests()),
            interval: config.interval(),
            max_in_flight,
            mode: config.mode,
            duration: config.duration,
            adapter,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn planned(&self) -> u64 {
        self.plan.total()
    }

    /// Scatter the planned sends and gather their outcomes.
    ///
    /// Runs to completion unless `cancel` fires or, in deadline mode, the attack duration
    /// elapses. Either way sends still in flight are aborted and the outcomes gathered so far
    /// are returned.
    pub async fn run(self, cancel: CancellationToken) -> ResultSet {
        let Attack {
            job_id,
            plan,
            interval,
            max_in_flight,
            mode,
            duration,
            adapter,
            metrics,
        } = self;
        let planned = plan.total();
        info!(
            "[run] - [{}] - dispatching {} requests, interval: {:?}, max in flight: {}, mode: {}",
            &job_id, planned, interval, max_in_flight, mode
        );
        // a child token, so the deadline doesn't cancel the caller's token
        let token = cancel.child_token();
        let capacity = usize::try_from(planned)
            .unwrap_or(usize::MAX)
            .clamp(1, Semaphore::MAX_PERMITS);
        let (tx, mut rx) = mpsc::channel::<Outcome>(capacity);

        let coordinator = tokio::spawn(coordinate(
            job_id.clone(),
            plan,
            Throttle::new(interval),
            Arc::new(Semaphore::new(max_in_flight)),
            adapter,
            metrics,
            tx,
            token.clone(),
        ));

        let deadline = async {
            match mode {
                RunMode::Deadline => sleep(duration).await,
                RunMode::Completion => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let mut outcomes = Vec::with_capacity(capacity.min(1 << 20));
        loop {
            tokio::select! {
                biased;
                outcome = rx.recv() => match outcome {
                    Some(outcome) => outcomes.push(outcome),
                    None => break,
                },
                _ = &mut deadline => {
                    info!("[run] - [{}] - deadline of {:?} reached", &job_id, duration);
                    token.cancel();
                    break;
                },
                _ = token.cancelled() => {
                    info!("[run] - [{}] - attack canceled", &job_id);
                    break;
                },
            }
        }
        // keep what completed before the cut
        rx.close();
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        token.cancel();
        log_error!(coordinator.await);

        debug!(
            "[run] - [{}] - gathered {} of {} outcomes",
            &job_id,
            outcomes.len(),
            planned
        );
        ResultSet::new(planned, outcomes)
    }
}

/// Walk the work plan in order. Each item waits for a throttle permit, then for a pool slot,
/// and is sent from its own task.
#[allow(clippy::too_many_arguments)]
async fn coordinate(
    job_id: String,
    mut plan: WorkPlan,
    mut throttle: Throttle,
    pool: Arc<Semaphore>,
    adapter: Arc<dyn ProtocolAdapter>,
    metrics: Option<Arc<Metrics>>,
    tx: mpsc::Sender<Outcome>,
    token: CancellationToken,
) {
    let mut launched = 0u64;
    while let Some((seq, target)) = plan.next().await {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = throttle.permit() => {},
        }
        let slot = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            slot = pool.clone().acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };
        trace!("[coordinate] - [{}] - launching {}: {}", &job_id, seq, &target);
        let adapter = adapter.clone();
        let metrics = metrics.clone();
        let tx = tx.clone();
        let token = token.clone();
        tokio::spawn(async move {
            if let Some(m) = metrics.as_ref() {
                m.upstream_request_count(1);
                m.in_flight_inc();
            }
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                outcome = adapter.send(seq, &target) => Some(outcome),
            };
            drop(slot);
            if let Some(m) = metrics.as_ref() {
                m.in_flight_dec();
                if let Some(o) = outcome.as_ref() {
                    let status = o.status();
                    m.upstream_request_status_count(1, status);
                    m.upstream_response_time(status, o.latency.as_secs_f64() * 1_000f64);
                    m.upstream_bytes(o.bytes_out, o.bytes_in);
                }
            }
            if let Some(outcome) = outcome {
                // the receiver is gone once the attack got cut, nothing to report to
                let _ = tx.send(outcome).await;
            }
        });
        launched += 1;
    }
    debug!(
        "[coordinate] - [{}] - launched {} of {} sends",
        &job_id,
        launched,
        plan.total()
    );
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_common::init;
    use crate::{Exchange, SendError};
    use async_trait::async_trait;
    use barrage_metrics::MetricsFactory;
    use barrage_target::{parse_lines, Target};
    use common_types::Protocol;
    use more_asserts::{assert_gt, assert_le, assert_lt};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Sleeps for a fixed latency and tracks how many sends overlap
    struct SleepyAdapter {
        latency: Duration,
        current: AtomicUsize,
        max_seen: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SleepyAdapter {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(SleepyAdapter {
                latency,
                current: AtomicUsize::new(0),
                max_seen: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ProtocolAdapter for SleepyAdapter {
        async fn transport(&self, target: &Target) -> Result<Exchange, SendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            sleep(self.latency).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(Exchange {
                bytes_out: target.payload().len() as u64,
                bytes_in: 1,
            })
        }
    }

    fn targets(n: usize) -> TargetList {
        let lines = (0..n)
            .map(|i| format!("GET http://localhost/{}", i))
            .collect::<Vec<_>>();
        parse_lines(
            lines.iter().map(String::as_str),
            Protocol::Http,
            &Default::default(),
        )
        .unwrap()
    }

    fn config(rate: u64, duration: Duration) -> AttackConfig {
        let config = AttackConfig::new(rate, duration);
        config.validate().unwrap();
        config
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_round_robin() {
        init();
        let adapter = SleepyAdapter::new(Duration::from_millis(5));
        let attack = Attack::new(
            "round-robin",
            targets(3),
            &config(10, Duration::from_secs(1)),
            adapter,
        );
        assert_eq!(attack.planned(), 10);
        let result = attack.run(CancellationToken::new()).await;
        assert_eq!(result.len(), 10);
        assert!(result.is_complete());

        let mut by_seq = result.outcomes().to_vec();
        by_seq.sort_by_key(|o| o.seq);
        let paths = by_seq
            .iter()
            .map(|o| o.url.trim_start_matches("http://localhost/").to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            paths,
            vec!["0", "1", "2", "0", "1", "2", "0", "1", "2", "0"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_planned_outcomes_sorted() {
        init();
        let adapter = SleepyAdapter::new(Duration::from_millis(30));
        let config = config(50, Duration::from_millis(1500));
        let result = Attack::new("planned", targets(4), &config, adapter.clone())
            .run(CancellationToken::new())
            .await;
        assert_eq!(result.planned(), 75);
        assert_eq!(result.len(), 75);
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 75);
        assert!(result
            .outcomes()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        let mut seqs = result.iter().map(|o| o.seq).collect::<Vec<_>>();
        seqs.sort_unstable();
        assert_eq!(seqs, (0..75).collect::<Vec<_>>());
        assert!(result.iter().all(|o| o.is_success() && o.bytes_in == 1));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_bounds_in_flight_sends() {
        init();
        let adapter = SleepyAdapter::new(Duration::from_secs(1));
        let mut config = config(100, Duration::from_secs(1));
        config.max_in_flight = NonZeroUsize::new(5);
        let result = Attack::new("bounded", targets(2), &config, adapter.clone())
            .run(CancellationToken::new())
            .await;
        // completion mode waits for every send, however long the pool makes it take
        assert_eq!(result.len(), 100);
        assert_le!(adapter.max_seen.load(Ordering::SeqCst), 5);
        assert_eq!(adapter.max_seen.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_truncates() {
        init();
        let adapter = SleepyAdapter::new(Duration::from_millis(250));
        let mut config = config(10, Duration::from_secs(1));
        config.mode = RunMode::Deadline;
        let result = Attack::new("deadline", targets(1), &config, adapter)
            .run(CancellationToken::new())
            .await;
        assert_eq!(result.planned(), 10);
        assert_lt!(result.len(), 10);
        assert_gt!(result.len(), 0);
        assert!(!result.is_complete());
        assert!(result.iter().all(|o| o.is_success()));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_returns_collected_outcomes() {
        init();
        let adapter = SleepyAdapter::new(Duration::from_millis(10));
        let config = config(10, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(2_050)).await;
            trigger.cancel();
        });
        let result = Attack::new("cancel", targets(3), &config, adapter.clone())
            .run(cancel)
            .await;
        assert_eq!(result.planned(), 100);
        assert_gt!(result.len(), 0);
        assert_lt!(result.len(), 100);
        // no send is launched after the cancel
        assert_le!(adapter.calls.load(Ordering::SeqCst), 22);
    }

    #[tokio::test(start_paused = true)]
    async fn records_metrics() {
        init();
        let factory = MetricsFactory::default();
        let metrics = factory.metrics("metrics").await.unwrap();
        let adapter = SleepyAdapter::new(Duration::from_millis(5));
        let result = Attack::new(
            "metrics",
            targets(1),
            &config(20, Duration::from_secs(1)),
            adapter,
        )
        .with_metrics(metrics.clone())
        .run(CancellationToken::new())
        .await;
        assert_eq!(result.len(), 20);
        assert_eq!(metrics.in_flight(), 0);
    }
}
