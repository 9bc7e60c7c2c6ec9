mod config;
mod headers;
mod loader;

pub use config::{parse_duration, AttackConfig, ConfigError, MAX_PLANNED_REQUESTS, MAX_RATE};
pub use headers::{parse_header, HeaderError, Headers};
pub use loader::{load, parse_lines};

use bytes::Bytes;
use common_types::Ordering;
use http::HeaderMap;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::{fmt, io};
use thiserror::Error;
use url::Url;

/// Port used when a publish destination doesn't carry one
pub const DEFAULT_PUBLISH_PORT: u16 = 9092;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("line {line}: invalid target format: `{content}`")]
    InvalidFormat { line: usize, content: String },
    #[error("line {line}: failed to parse URL in `{content}`: {source}")]
    InvalidUrl {
        line: usize,
        content: String,
        source: url::ParseError,
    },
    #[error("line {line}: invalid destination in `{content}`: {reason}")]
    InvalidDestination {
        line: usize,
        content: String,
        reason: String,
    },
    #[error("line {line}: invalid header in `{content}`: {source}")]
    InvalidHeader {
        line: usize,
        content: String,
        source: HeaderError,
    },
    #[error("no targets found")]
    Empty,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Where a message gets published: broker `host:port`, topic and partition.
///
/// Parsed from URIs like `kafka://broker:9092/orders/3`; the partition defaults to 0.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub host: String,
    pub topic: String,
    pub partition: i32,
}

impl Destination {
    pub fn from_url(url: &Url) -> Result<Self, String> {
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| "missing host".to_string())?;
        let port = url.port().unwrap_or(DEFAULT_PUBLISH_PORT);
        let mut segments = url
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).collect::<Vec<_>>())
            .unwrap_or_default()
            .into_iter();
        let topic = segments
            .next()
            .ok_or_else(|| "missing topic".to_string())?
            .to_string();
        let partition = match segments.next() {
            None => 0,
            Some(p) => p
                .parse::<i32>()
                .ok()
                .filter(|p| *p >= 0)
                .ok_or_else(|| format!("invalid partition `{}`", p))?,
        };
        if let Some(extra) = segments.next() {
            return Err(format!("unexpected path segment `{}`", extra));
        }
        Ok(Destination {
            host: format!("{}:{}", host, port),
            topic,
            partition,
        })
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.topic, self.partition)
    }
}

/// One unit of attack. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    action: String,
    url: Url,
    payload: Bytes,
    headers: HeaderMap,
    destination: Option<Destination>,
}

impl Target {
    pub fn http(method: http::Method, url: Url, headers: HeaderMap, body: Bytes) -> Self {
        Target {
            action: method.to_string(),
            url,
            payload: body,
            headers,
            destination: None,
        }
    }

    pub fn publish(action: String, url: Url, payload: Bytes) -> Result<Self, String> {
        let destination = Destination::from_url(&url)?;
        Ok(Target {
            action,
            url,
            payload,
            headers: HeaderMap::new(),
            destination: Some(destination),
        })
    }

    /// HTTP method or publish action, e.g. `GET` or `MESSAGE`
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Only set for publish targets
    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", &self.action, &self.url)
    }
}

/// Non-empty list of targets, in the order they'll be attacked.
#[derive(Debug, Clone)]
pub struct TargetList {
    targets: Vec<Arc<Target>>,
}

impl TargetList {
    pub fn new(targets: Vec<Target>) -> Result<Self, LoadError> {
        if targets.is_empty() {
            return Err(LoadError::Empty);
        }
        Ok(TargetList {
            targets: targets.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Always false, an empty list can't be constructed
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn as_slice(&self) -> &[Arc<Target>] {
        &self.targets
    }

    /// The target for the `nth` request; targets are reused round robin.
    pub fn round_robin(&self, nth: u64) -> Arc<Target> {
        let idx = (nth % self.targets.len() as u64) as usize;
        self.targets[idx].clone()
    }

    /// Randomly permute the targets. Same seed, same order.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        self.targets.shuffle(&mut rng);
    }

    pub fn arrange(&mut self, ordering: Ordering, seed: u64) {
        match ordering {
            Ordering::Sequential => {}
            Ordering::Random => {
                debug!("[arrange] - shuffling {} targets, seed: {}", self.len(), seed);
                self.shuffle(seed)
            }
        }
    }
}
