//! # Rate Limiter
//!
//! Token-bucket admission gate.
//!
//! Capacity equals the configured requests per second; one refill tick fires
//! every `1s / rps` and adds `refill` tokens, capped at capacity. Callers poll
//! [`TokenBucket::add`], which never blocks.

mod bucket;

pub use bucket::TokenBucket;
pub use contracts::RateLimit;
