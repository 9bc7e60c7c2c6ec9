//! Turns a target list, a rate and a duration into a bounded concurrent workload and gathers
//! the outcome of every send.

pub use adapter::http::HttpAdapter;
pub use adapter::publish::{decode_frame, encode_frame, PublishAdapter};
pub use adapter::{adapter_for, Exchange, ProtocolAdapter};
pub use dispatcher::Attack;
pub use outcome::{ErrorKind, Outcome, ResultSet, SendError};
pub use plan::WorkPlan;
pub use registry::Registry;
pub use throttle::Throttle;
pub use tokio_util::sync::CancellationToken;

mod adapter;
mod dispatcher;
mod outcome;
mod plan;
mod registry;
mod throttle;

#[macro_export]
macro_rules! log_error {
    ($result:expr) => {
        if let Err(e) = $result {
            use log::error;
            error!("{}", e.to_string());
        }
    };
}
