//! Text summary of an attack's outcomes

use crate::{ErrorKind, Outcome};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Latencies {
    pub mean: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub p99: Duration,
    pub max: Duration,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub requests: u64,
    pub success: u64,
    pub latencies: Latencies,
    pub bytes_in: u64,
    pub bytes_out: u64,
    /// first send to last completion
    pub span: Duration,
    pub errors: BTreeMap<ErrorKind, u64>,
}

impl Summary {
    pub fn new(outcomes: &[Outcome]) -> Self {
        if outcomes.is_empty() {
            return Summary::default();
        }
        let mut latencies = outcomes.iter().map(|o| o.latency).collect::<Vec<_>>();
        latencies.sort_unstable();
        let total = latencies.iter().sum::<Duration>();
        let mean = total / latencies.len() as u32;

        let mut errors = BTreeMap::new();
        for error in outcomes.iter().filter_map(|o| o.error.as_ref()) {
            *errors.entry(error.kind).or_insert(0) += 1;
        }
        let first = outcomes.iter().map(|o| o.timestamp).min();
        let last = outcomes
            .iter()
            .filter_map(|o| chrono::Duration::from_std(o.latency).ok().map(|l| o.timestamp + l))
            .max();
        let span = match (first, last) {
            (Some(first), Some(last)) => (last - first).to_std().unwrap_or_default(),
            _ => Duration::ZERO,
        };

        Summary {
            requests: outcomes.len() as u64,
            success: outcomes.iter().filter(|o| o.is_success()).count() as u64,
            latencies: Latencies {
                mean,
                p50: percentile(&latencies, 50),
                p95: percentile(&latencies, 95),
                p99: percentile(&latencies, 99),
                max: latencies.last().copied().unwrap_or_default(),
            },
            bytes_in: outcomes.iter().map(|o| o.bytes_in).sum(),
            bytes_out: outcomes.iter().map(|o| o.bytes_out).sum(),
            span,
            errors,
        }
    }

    /// Share of outcomes without error, 0 when there's none
    pub fn success_ratio(&self) -> f64 {
        if self.requests == 0 {
            0f64
        } else {
            self.success as f64 / self.requests as f64
        }
    }
}

/// Nearest rank percentile of sorted samples
fn percentile(sorted: &[Duration], percentile: usize) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = (sorted.len() * percentile + 99) / 100;
    sorted[rank.max(1) - 1]
}

impl Display for Summary {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let l = &self.latencies;
        writeln!(f, "Requests      [total]                    {}", self.requests)?;
        writeln!(f, "Duration      [span]                     {:?}", self.span)?;
        writeln!(
            f,
            "Latencies     [mean, 50, 95, 99, max]    {:?}, {:?}, {:?}, {:?}, {:?}",
            l.mean, l.p50, l.p95, l.p99, l.max
        )?;
        writeln!(f, "Bytes In      [total]                    {}", self.bytes_in)?;
        writeln!(f, "Bytes Out     [total]                    {}", self.bytes_out)?;
        writeln!(
            f,
            "Success       [ratio]                    {:.2}%",
            self.success_ratio() * 100f64
        )?;
        writeln!(f, "Error Set:")?;
        for (kind, count) in self.errors.iter() {
            writeln!(f, "{}: {}", kind, count)?;
        }
        Ok(())
    }
}
