//! # Contracts
//!
//! Frozen interface contracts shared by the notifier crates.
//! Business crates depend on this crate only, never the other way around.
//!
//! ## Capabilities
//! - [`Message`]: opaque, immutable notification payload
//! - [`RequestSender`]: outbound transport injected into the dispatcher
//! - [`RateLimit`]: admission gate polled by dispatcher workers
//! - [`MetricsSink`]: observability hooks, [`NoopMetrics`] by default

mod error;
mod message;
mod metrics;
mod rate_limit;
mod sender;
mod settings;

pub use error::*;
pub use message::Message;
pub use metrics::{MetricsSink, NoopMetrics};
pub use rate_limit::RateLimit;
pub use sender::*;
pub use settings::*;
