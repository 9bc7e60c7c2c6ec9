use crate::HeaderError;
use common_types::{Ordering, Protocol, RunMode, UnknownVariant};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error;

/// Rates above this would need a throttle interval shorter than a nanosecond
pub const MAX_RATE: u64 = 1_000_000_000;
/// Every planned request keeps its outcome in memory until the attack ends
pub const MAX_PLANNED_REQUESTS: u64 = u32::MAX as u64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Rate: can't be zero")]
    ZeroRate,
    #[error("Rate: {0} is above the maximum of {max} per second", max = MAX_RATE)]
    RateTooHigh(u64),
    #[error("Duration: can't be zero")]
    ZeroDuration,
    #[error("Duration: `{0}` is invalid")]
    InvalidDuration(String),
    #[error("Duration: {duration:?} at {rate}/s doesn't plan any request")]
    NoRequest { rate: u64, duration: Duration },
    #[error(
        "Duration: {duration:?} at {rate}/s plans more than {max} requests",
        max = MAX_PLANNED_REQUESTS
    )]
    TooManyRequests { rate: u64, duration: Duration },
    #[error("Ordering: {0}")]
    Ordering(UnknownVariant),
    #[error("Protocol: {0}")]
    Protocol(UnknownVariant),
    #[error("Mode: {0}")]
    Mode(UnknownVariant),
    #[error("Header: {}", .0.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "))]
    Headers(Vec<HeaderError>),
}

/// Describe the attack
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttackConfig {
    /// requests per second
    pub rate: u64,
    /// together with rate, decides the number of requests
    #[serde(with = "duration_str")]
    pub duration: Duration,
    #[serde(default)]
    pub ordering: Ordering,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub mode: RunMode,
    /// seed for random ordering, picked from the clock if missing
    pub seed: Option<u64>,
    /// size of the worker pool, falls back to `BARRAGE_MAX_IN_FLIGHT`
    pub max_in_flight: Option<NonZeroUsize>,
    #[serde(default, with = "opt_duration_str")]
    pub send_timeout: Option<Duration>,
}

impl AttackConfig {
    pub fn new(rate: u64, duration: Duration) -> Self {
        AttackConfig {
            rate,
            duration,
            ordering: Ordering::default(),
            protocol: Protocol::default(),
            mode: RunMode::default(),
            seed: None,
            max_in_flight: None,
            send_timeout: None,
        }
    }

    /// Reject configurations that can't produce an attack, before anything gets loaded
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate == 0 {
            return Err(ConfigError::ZeroRate);
        }
        if self.rate > MAX_RATE {
            return Err(ConfigError::RateTooHigh(self.rate));
        }
        if self.duration.is_zero() {
            return Err(ConfigError::ZeroDuration);
        }
        let planned = self.planned_requests();
        if planned == 0 {
            return Err(ConfigError::NoRequest {
                rate: self.rate,
                duration: self.duration,
            });
        }
        if planned > MAX_PLANNED_REQUESTS {
            return Err(ConfigError::TooManyRequests {
                rate: self.rate,
                duration: self.duration,
            });
        }
        Ok(())
    }

    /// `floor(rate * duration)`, with the duration counted in nanoseconds so fractional
    /// seconds are not lost: 10/s for 1.5s plans 15 requests.
    pub fn planned_requests(&self) -> u64 {
        let planned = self.rate as u128 * self.duration.as_nanos() / 1_000_000_000;
        u64::try_from(planned).unwrap_or(u64::MAX)
    }

    /// Time between two throttle permits, `1e9 / rate` nanoseconds
    pub fn interval(&self) -> Duration {
        Duration::from_nanos(MAX_RATE / self.rate.max(1))
    }
}

/// Parse durations like `10s`, `500ms`, `1m30s` or `1.5s`.
///
/// Units: `ns`, `us`, `ms`, `s`, `m`, `h`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(value.to_string());
    let mut rest = value.trim();
    if rest.is_empty() {
        return Err(invalid());
    }
    let mut nanos: u128 = 0;
    while !rest.is_empty() {
        let number_end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);
        let unit_nanos: u128 = match unit {
            "ns" => 1,
            "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            _ => return Err(invalid()),
        };
        let (int, frac) = number.split_once('.').unwrap_or((number, ""));
        if (int.is_empty() && frac.is_empty()) || frac.len() > 18 {
            return Err(invalid());
        }
        let int = if int.is_empty() {
            0
        } else {
            int.parse::<u128>().map_err(|_| invalid())?
        };
        let frac_value = if frac.is_empty() {
            0
        } else {
            frac.parse::<u128>().map_err(|_| invalid())?
        };
        let scale = 10u128.pow(frac.len() as u32);
        nanos = int
            .checked_mul(unit_nanos)
            .and_then(|n| n.checked_add(frac_value * unit_nanos / scale))
            .and_then(|n| n.checked_add(nanos))
            .ok_or_else(invalid)?;
        rest = tail;
    }
    u64::try_from(nanos)
        .map(Duration::from_nanos)
        .map_err(|_| invalid())
}

fn format_duration(duration: &Duration) -> String {
    if duration.subsec_nanos() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ns", duration.as_nanos())
    }
}

mod duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let value = String::deserialize(deserializer)?;
        parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

mod opt_duration_str {
    use super::*;

    pub fn serialize<S: Serializer>(
        duration: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match duration {
            Some(d) => serializer.serialize_some(&format_duration(d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        value
            .map(|v| parse_duration(&v).map_err(serde::de::Error::custom))
            .transpose()
    }
}
