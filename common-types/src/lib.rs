//! Define common types uses by various components of barrage

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("`{value}` is invalid")]
pub struct UnknownVariant {
    pub value: String,
}

impl UnknownVariant {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

/// Order in which targets are attacked.
///
/// The order is decided once before the attack starts and never changes during the run.
/// ### Sequential
/// Targets are used in the order they were loaded.
/// ### Random
/// Targets are shuffled with a seeded random number generator. Running again with the same
/// seed yields the same order.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Ordering {
    Sequential,
    #[default]
    Random,
}

impl FromStr for Ordering {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(Ordering::Sequential),
            "random" => Ok(Ordering::Random),
            _ => Err(UnknownVariant::new(s)),
        }
    }
}

impl Display for Ordering {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Ordering::Sequential => write!(f, "sequential"),
            Ordering::Random => write!(f, "random"),
        }
    }
}

/// Wire protocol used to hit the targets
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    /// Request/response, one HTTP request per target
    #[default]
    Http,
    /// Fire and forget, one message published per target
    Publish,
}

impl FromStr for Protocol {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" | "request-response" => Ok(Protocol::Http),
            "publish" | "kafka" => Ok(Protocol::Publish),
            _ => Err(UnknownVariant::new(s)),
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Http => write!(f, "http"),
            Protocol::Publish => write!(f, "publish"),
        }
    }
}

/// What the attack duration means.
///
/// ### Completion
/// The duration only decides the number of requests, `rate * duration`. The attack runs until
/// every one of them has completed, even if that takes longer than the duration.
///
/// ### Deadline
/// Same number of planned requests, but the attack is cut when the duration has elapsed.
/// Sends still in flight are canceled and only the outcomes collected until then are reported.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RunMode {
    #[default]
    Completion,
    Deadline,
}

impl FromStr for RunMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completion" => Ok(RunMode::Completion),
            "deadline" => Ok(RunMode::Deadline),
            _ => Err(UnknownVariant::new(s)),
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Completion => write!(f, "completion"),
            RunMode::Deadline => write!(f, "deadline"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_aliases() {
        assert_eq!("request-response".parse(), Ok(Protocol::Http));
        assert_eq!("kafka".parse(), Ok(Protocol::Publish));
        assert_eq!("sequential".parse(), Ok(Ordering::Sequential));
        assert_eq!("deadline".parse(), Ok(RunMode::Deadline));
    }

    #[test]
    fn reject_unknown() {
        let err = "shuffled".parse::<Ordering>().unwrap_err();
        assert_eq!(err.to_string(), "`shuffled` is invalid");
        assert!("grpc".parse::<Protocol>().is_err());
        assert!("".parse::<RunMode>().is_err());
    }

    #[test]
    fn serde_camel_case() {
        let json = serde_json::to_string(&RunMode::Deadline).unwrap();
        assert_eq!(json, "\"deadline\"");
        let ordering: Ordering = serde_json::from_str("\"sequential\"").unwrap();
        assert_eq!(ordering, Ordering::Sequential);
    }
}
