//! Constant rate load generation.
//!
//! An attack sends `rate * duration` requests to a list of targets, one every `1/rate`, and
//! reports the outcome of every one of them:
//!
//! ```no_run
//! # async fn run() -> Result<(), barrage::AttackError> {
//! use barrage::{AttackConfig, AttackJob};
//! use std::time::Duration;
//!
//! let config = AttackConfig::new(50, Duration::from_secs(10));
//! let targets = "GET http://localhost:8080/health".as_bytes();
//! let results = AttackJob::new(config, &["X-Test: 1"])?.run(targets).await?;
//! println!("{} outcomes", results.len());
//! # Ok(())
//! # }
//! ```

pub mod encoding;
pub mod report;

pub use attack_executor::{CancellationToken, ErrorKind, Outcome, ResultSet, SendError};
pub use barrage_target::{AttackConfig, ConfigError, LoadError};
pub use common_types::{Ordering, Protocol, RunMode};

use attack_executor::{adapter_for, Attack};
use barrage_metrics::Metrics;
use barrage_target::Headers;
use log::{debug, info};
use std::io;
use std::io::BufRead;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttackError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Targets file: {0}")]
    Load(#[from] LoadError),
    #[error("Output file: {0}")]
    Output(#[source] io::Error),
}

/// A validated attack, waiting for its targets
pub struct AttackJob {
    job_id: String,
    config: AttackConfig,
    headers: Headers,
    seed: u64,
    metrics: Option<Arc<Metrics>>,
    cancel: CancellationToken,
}

impl AttackJob {
    /// Validate the configuration and parse the header flags. Nothing is loaded or sent when
    /// either is wrong.
    pub fn new<S: AsRef<str>>(config: AttackConfig, header_flags: &[S]) -> Result<Self, AttackError> {
        config.validate()?;
        let headers = Headers::from_flags(header_flags).map_err(ConfigError::Headers)?;
        let seed = config.seed.unwrap_or_else(clock_seed);
        Ok(AttackJob {
            job_id: uuid::Uuid::new_v4().to_string(),
            config,
            headers,
            seed,
            metrics: None,
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = job_id.into();
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Cut the attack short when `cancel` fires; the outcomes gathered so far are returned
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Seed of the random ordering, given or picked from the clock
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn config(&self) -> &AttackConfig {
        &self.config
    }

    /// Load and arrange the targets. The attack doesn't start before [`LoadedAttack::run`].
    pub fn load<R: BufRead>(self, targets: R) -> Result<LoadedAttack, AttackError> {
        let AttackJob {
            job_id,
            config,
            headers,
            seed,
            metrics,
            cancel,
        } = self;
        let mut targets = barrage_target::load(targets, config.protocol, &headers)?;
        targets.arrange(config.ordering, seed);
        if config.ordering == Ordering::Random {
            info!("[load] - [{}] - random ordering, seed: {}", &job_id, seed);
        }
        let target_count = targets.len();

        let send_timeout = config
            .send_timeout
            .unwrap_or_else(common_env::send_timeout);
        let adapter = adapter_for(
            config.protocol,
            send_timeout,
            common_env::connect_timeout(),
        );
        let mut attack = Attack::new(job_id.clone(), targets, &config, adapter);
        if let Some(metrics) = metrics {
            attack = attack.with_metrics(metrics);
        }
        Ok(LoadedAttack {
            job_id,
            config,
            target_count,
            attack,
            cancel,
        })
    }

    /// Load the targets, then run the attack to its end
    pub async fn run<R: BufRead>(self, targets: R) -> Result<ResultSet, AttackError> {
        Ok(self.load(targets)?.run().await)
    }
}

/// An attack with its targets loaded, ready to go
pub struct LoadedAttack {
    job_id: String,
    config: AttackConfig,
    target_count: usize,
    attack: Attack,
    cancel: CancellationToken,
}

impl LoadedAttack {
    pub fn target_count(&self) -> usize {
        self.target_count
    }

    pub fn planned(&self) -> u64 {
        self.attack.planned()
    }

    pub async fn run(self) -> ResultSet {
        info!(
            "attacking {} targets in {} order for {:?}",
            self.target_count, self.config.ordering, self.config.duration
        );
        let results = self.attack.run(self.cancel).await;
        debug!(
            "[run] - [{}] - {} of {} planned outcomes",
            &self.job_id,
            results.len(),
            results.planned()
        );
        results
    }
}

/// Validate, load and attack in one go
pub async fn attack<R: BufRead, S: AsRef<str>>(
    config: AttackConfig,
    header_flags: &[S],
    targets: R,
) -> Result<ResultSet, AttackError> {
    AttackJob::new(config, header_flags)?.run(targets).await
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod test_common {
    use env_logger::Env;
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::Builder::from_env(Env::default().default_filter_or("debug"))
                .format_timestamp_millis()
                .try_init();
        });
    }
}
