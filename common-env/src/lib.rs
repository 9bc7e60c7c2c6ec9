//! Common environment variables uses by various components

use once_cell::sync::OnceCell;
use std::env;
use std::str::FromStr;
use std::time::Duration;

static MAX_IN_FLIGHT: OnceCell<usize> = OnceCell::new();
pub const ENV_NAME_MAX_IN_FLIGHT: &str = "BARRAGE_MAX_IN_FLIGHT";
pub const DEFAULT_MAX_IN_FLIGHT: usize = 10_000;

/// Upper bound of sends running at the same time, unless the attack overrides it.
pub fn max_in_flight() -> usize {
    *MAX_IN_FLIGHT.get_or_init(|| {
        env::var(ENV_NAME_MAX_IN_FLIGHT)
            .map_err(|_| ())
            .and_then(|val| usize::from_str(&val).map_err(|_| ()))
            .ok()
            .filter(|val| *val > 0)
            .unwrap_or(DEFAULT_MAX_IN_FLIGHT)
    })
}

static SEND_TIMEOUT: OnceCell<u64> = OnceCell::new();
pub const ENV_NAME_SEND_TIMEOUT: &str = "BARRAGE_SEND_TIMEOUT_MS";
pub const DEFAULT_SEND_TIMEOUT: u64 = 30_000;

pub fn send_timeout() -> Duration {
    Duration::from_millis(*SEND_TIMEOUT.get_or_init(|| {
        env::var(ENV_NAME_SEND_TIMEOUT)
            .map_err(|_| ())
            .and_then(|val| u64::from_str(&val).map_err(|_| ()))
            .unwrap_or(DEFAULT_SEND_TIMEOUT)
    }))
}

const ENV_NAME_CONNECT_TIMEOUT: &str = "BARRAGE_CONNECT_TIMEOUT_MS";
const DEFAULT_CONNECT_TIMEOUT: u64 = 1_000;

/// Time allowed to open a publish connection to a broker
pub fn connect_timeout() -> Duration {
    let millis = env::var(ENV_NAME_CONNECT_TIMEOUT)
        .map_err(|_| ())
        .and_then(|val| u64::from_str(&val).map_err(|_| ()))
        .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_env() {
        // none of the variables are set by the test harness
        assert_eq!(max_in_flight(), DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(send_timeout(), Duration::from_millis(DEFAULT_SEND_TIMEOUT));
        assert_eq!(
            connect_timeout(),
            Duration::from_millis(DEFAULT_CONNECT_TIMEOUT)
        );
    }
}
