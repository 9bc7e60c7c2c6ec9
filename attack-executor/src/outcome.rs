use barrage_target::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use std::{fmt, io};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    ConnectionRefused,
    Connect,
    Io,
    Protocol,
    Canceled,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection_refused",
            ErrorKind::Connect => "connect",
            ErrorKind::Io => "io",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Other => "other",
        }
    }

    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ErrorKind::ConnectionRefused,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => ErrorKind::Io,
        }
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single send failed. Recorded on the outcome, never returned to the caller of an attack.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SendError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SendError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        SendError {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        SendError::new(ErrorKind::Timeout, format!("no reply within {:?}", limit))
    }

    /// Classify by the first `io::Error` found in the source chain
    pub fn from_chain(kind: ErrorKind, err: &(dyn StdError + 'static)) -> Self {
        let mut source = Some(err);
        while let Some(e) = source {
            if let Some(io_err) = e.downcast_ref::<io::Error>() {
                let io_kind = ErrorKind::from_io(io_err);
                if io_kind != ErrorKind::Io {
                    return SendError::new(io_kind, err.to_string());
                }
            }
            source = e.source();
        }
        SendError::new(kind, err.to_string())
    }
}

impl From<io::Error> for SendError {
    fn from(err: io::Error) -> Self {
        SendError::new(ErrorKind::from_io(&err), err.to_string())
    }
}

/// The measured effect of one send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// position in the work plan
    pub seq: u64,
    pub action: String,
    pub url: String,
    /// wall clock at send start
    pub timestamp: DateTime<Utc>,
    #[serde(with = "nanos")]
    pub latency: Duration,
    pub bytes_out: u64,
    pub bytes_in: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<SendError>,
}

impl Outcome {
    pub fn new(
        seq: u64,
        target: &Target,
        timestamp: DateTime<Utc>,
        latency: Duration,
        exchange: Result<crate::Exchange, SendError>,
    ) -> Self {
        let (bytes_out, bytes_in, error) = match exchange {
            Ok(exchange) => (exchange.bytes_out, exchange.bytes_in, None),
            Err(e) => (0, 0, Some(e)),
        };
        Outcome {
            seq,
            action: target.action().to_string(),
            url: target.url().to_string(),
            timestamp,
            latency,
            bytes_out,
            bytes_in,
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Label used in metrics, `ok` or the error kind
    pub fn status(&self) -> &'static str {
        self.error
            .as_ref()
            .map(|e| e.kind.as_str())
            .unwrap_or(barrage_metrics::STATUS_OK)
    }
}

/// All outcomes of one attack, ordered by timestamp
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    planned: u64,
    outcomes: Vec<Outcome>,
}

impl ResultSet {
    pub fn new(planned: u64, mut outcomes: Vec<Outcome>) -> Self {
        // stable, outcomes with the same timestamp keep their arrival order
        outcomes.sort_by_key(|o| o.timestamp);
        ResultSet { planned, outcomes }
    }

    /// Number of requests the attack was configured to send
    pub fn planned(&self) -> u64 {
        self.planned
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// False when the attack got truncated by a deadline or canceled
    pub fn is_complete(&self) -> bool {
        self.outcomes.len() as u64 == self.planned
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn iter(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter()
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }
}

impl IntoIterator for ResultSet {
    type Item = Outcome;
    type IntoIter = std::vec::IntoIter<Outcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}
