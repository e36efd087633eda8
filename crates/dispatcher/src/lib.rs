//! # Dispatcher
//!
//! 通知分发模块。
//!
//! 负责：
//! - 有界队列接收消息，队列满时立即返回临时错误
//! - 固定数量的 worker 并发投递，每条消息一个 HTTP 请求
//! - 令牌桶限流，超时丢弃并上报
//! - 优雅停机，等待 worker 不超过宽限期

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod sender;
mod worker;

pub use config::DispatcherConfig;
pub use contracts::{Message, MetricsSink, RateLimit, RequestSender, TransportError};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{
    classify_status, DeliveryError, DispatchError, EnqueueError, RateLimitCause, ShutdownError,
};
pub use metrics::{DeliveryStats, StatsSnapshot};
pub use sender::HttpSender;
