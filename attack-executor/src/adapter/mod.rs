use crate::{Outcome, SendError};
use async_trait::async_trait;
use barrage_target::Target;
use chrono::Utc;
use common_types::Protocol;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub mod http;
pub mod publish;

/// Byte counts of a completed transport exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exchange {
    pub bytes_out: u64,
    pub bytes_in: u64,
}

/// Performs one send for a wire protocol.
///
/// Implementations provide the transport, [`send`](ProtocolAdapter::send) turns it into
/// exactly one [`Outcome`] per call.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    async fn transport(&self, target: &Target) -> Result<Exchange, SendError>;

    async fn send(&self, seq: u64, target: &Target) -> Outcome {
        let timestamp = Utc::now();
        let start = Instant::now();
        let result = self.transport(target).await;
        Outcome::new(seq, target, timestamp, start.elapsed(), result)
    }
}

pub fn adapter_for(
    protocol: Protocol,
    send_timeout: Duration,
    connect_timeout: Duration,
) -> Arc<dyn ProtocolAdapter> {
    match protocol {
        Protocol::Http => Arc::new(http::HttpAdapter::new(send_timeout)),
        Protocol::Publish => Arc::new(publish::PublishAdapter::new(connect_timeout, send_timeout)),
    }
}
