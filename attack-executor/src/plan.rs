use barrage_target::{Target, TargetList};
use futures_core::Stream;
use log::trace;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Yields exactly `total` items, the `nth` one being `targets[n % len]`
#[must_use = "streams do nothing unless polled"]
pub struct WorkPlan {
    targets: TargetList,
    // number of items to be generated
    total: u64,
    // items generated so far, initially 0
    current_count: u64,
}

impl WorkPlan {
    pub fn new(targets: TargetList, total: u64) -> Self {
        WorkPlan {
            targets,
            total,
            current_count: 0,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Stream for WorkPlan {
    type Item = (u64, Arc<Target>);

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.current_count >= self.total {
            trace!("[WorkPlan] - finished generating {} items", self.total);
            Poll::Ready(None)
        } else {
            let seq = self.current_count;
            let target = self.targets.round_robin(seq);
            self.current_count += 1;
            Poll::Ready(Some((seq, target)))
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.total - self.current_count).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use barrage_target::parse_lines;
    use common_types::Protocol;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn round_robin_over_targets() {
        let targets = parse_lines(
            [
                "GET http://localhost/0",
                "GET http://localhost/1",
                "GET http://localhost/2",
            ],
            Protocol::Http,
            &Default::default(),
        )
        .unwrap();
        let plan = WorkPlan::new(targets, 7);
        assert_eq!(plan.size_hint(), (7, Some(7)));
        let items = plan.collect::<Vec<_>>().await;
        let seqs = items.iter().map(|(seq, _)| *seq).collect::<Vec<_>>();
        assert_eq!(seqs, (0..7).collect::<Vec<_>>());
        let paths = items
            .iter()
            .map(|(_, t)| t.url().path().to_string())
            .collect::<Vec<_>>();
        assert_eq!(paths, vec!["/0", "/1", "/2", "/0", "/1", "/2", "/0"]);
    }
}
