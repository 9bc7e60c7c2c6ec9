use log::{debug, error};
use prometheus::process_collector::ProcessCollector;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Response time buckets, in milliseconds
pub const DEFAULT_HISTOGRAM_BUCKET: [f64; 6] = [20f64, 50f64, 100f64, 300f64, 700f64, 1100f64];

/// Label used for outcomes without an error
pub const STATUS_OK: &str = "ok";

pub struct MetricsFactory {
    registry: Registry,
    metrics: RwLock<HashMap<String, Arc<Metrics>>>,
}

impl Default for MetricsFactory {
    fn default() -> Self {
        let registry = Registry::default();
        let pc = ProcessCollector::for_self();
        if let Err(e) = registry.register(Box::new(pc)) {
            error!("[MetricsFactory] - failed to register process collector: {}", e);
        }
        Self {
            registry,
            metrics: RwLock::default(),
        }
    }
}

impl MetricsFactory {
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn metrics(&self, job_id: &str) -> prometheus::Result<Arc<Metrics>> {
        self.metrics_with_buckets(Vec::from(DEFAULT_HISTOGRAM_BUCKET), job_id)
            .await
    }

    /// Metrics of an attack, created on first use. Buckets are ignored if the metrics exist.
    pub async fn metrics_with_buckets(
        &self,
        buckets: Vec<f64>,
        job_id: &str,
    ) -> prometheus::Result<Arc<Metrics>> {
        {
            if let Some(m) = self.metrics.read().await.get(job_id) {
                return Ok(m.clone());
            }
        }

        let mut write_guard = self.metrics.write().await;
        //retry again to check if another task already created metrics
        if let Some(m) = write_guard.get(job_id) {
            return Ok(m.clone());
        }

        let metrics = Arc::new(Metrics::new(buckets, job_id)?);
        metrics.register(&self.registry)?;
        debug!("[metrics_with_buckets] - [{}] - metrics registered", job_id);
        write_guard.insert(String::from(job_id), metrics.clone());
        Ok(metrics)
    }

    pub async fn remove_metrics(&self, job_id: &str) {
        let metrics = { self.metrics.write().await.remove(job_id) };
        if let Some(m) = metrics {
            for result in m.unregister(&self.registry) {
                if let Err(e) = result {
                    error!("[remove_metrics] - [{}] - {}", job_id, e);
                }
            }
        }
    }
}

/// Counters of a single attack, labeled with the attack id
pub struct Metrics {
    upstream_request_count: IntCounter,
    upstream_request_status_count: IntCounterVec,
    upstream_response_time: HistogramVec,
    upstream_bytes_out: IntCounter,
    upstream_bytes_in: IntCounter,
    requests_in_flight: IntGauge,
}

impl Metrics {
    fn new(buckets: Vec<f64>, job_id: &str) -> prometheus::Result<Self> {
        let opts = HistogramOpts::new(
            "upstream_response_time",
            "upstream response time in milliseconds",
        )
        .const_label("job_id", job_id)
        .buckets(buckets);
        let upstream_response_time = HistogramVec::new(opts, &["status"])?;

        let opts = Opts::new(
            "upstream_request_status_count",
            "upstream request count per status",
        )
        .const_label("job_id", job_id);
        let upstream_request_status_count = IntCounterVec::new(opts, &["status"])?;

        let opts = Opts::new("upstream_request_count", "request sent to upstream")
            .const_label("job_id", job_id);
        let upstream_request_count = IntCounter::with_opts(opts)?;

        let opts = Opts::new("upstream_bytes_out", "bytes written to upstream")
            .const_label("job_id", job_id);
        let upstream_bytes_out = IntCounter::with_opts(opts)?;

        let opts = Opts::new("upstream_bytes_in", "bytes read from upstream")
            .const_label("job_id", job_id);
        let upstream_bytes_in = IntCounter::with_opts(opts)?;

        let opts = Opts::new("requests_in_flight", "sends started but not yet completed")
            .const_label("job_id", job_id);
        let requests_in_flight = IntGauge::with_opts(opts)?;

        Ok(Metrics {
            upstream_request_count,
            upstream_request_status_count,
            upstream_response_time,
            upstream_bytes_out,
            upstream_bytes_in,
            requests_in_flight,
        })
    }

    fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.upstream_response_time.clone()))?;
        registry.register(Box::new(self.upstream_request_status_count.clone()))?;
        registry.register(Box::new(self.upstream_request_count.clone()))?;
        registry.register(Box::new(self.upstream_bytes_out.clone()))?;
        registry.register(Box::new(self.upstream_bytes_in.clone()))?;
        registry.register(Box::new(self.requests_in_flight.clone()))?;
        Ok(())
    }

    fn unregister(&self, registry: &Registry) -> Vec<prometheus::Result<()>> {
        vec![
            registry.unregister(Box::new(self.upstream_response_time.clone())),
            registry.unregister(Box::new(self.upstream_request_status_count.clone())),
            registry.unregister(Box::new(self.upstream_request_count.clone())),
            registry.unregister(Box::new(self.upstream_bytes_out.clone())),
            registry.unregister(Box::new(self.upstream_bytes_in.clone())),
            registry.unregister(Box::new(self.requests_in_flight.clone())),
        ]
    }

    pub fn upstream_request_count(&self, increment: u64) {
        self.upstream_request_count.inc_by(increment);
    }

    pub fn upstream_request_status_count(&self, increment: u64, status: &str) {
        self.upstream_request_status_count
            .with_label_values(&[status])
            .inc_by(increment);
    }

    pub fn upstream_response_time(&self, status: &str, elapsed: f64) {
        self.upstream_response_time
            .with_label_values(&[status])
            .observe(elapsed);
    }

    pub fn upstream_bytes(&self, bytes_out: u64, bytes_in: u64) {
        self.upstream_bytes_out.inc_by(bytes_out);
        self.upstream_bytes_in.inc_by(bytes_in);
    }

    pub fn in_flight_inc(&self) {
        self.requests_in_flight.inc();
    }

    pub fn in_flight_dec(&self) {
        self.requests_in_flight.dec();
    }

    pub fn in_flight(&self) -> i64 {
        self.requests_in_flight.get()
    }
}
