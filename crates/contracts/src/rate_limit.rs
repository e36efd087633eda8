//! RateLimit trait - admission gate consulted before every outbound request

/// Non-blocking admission gate
///
/// Implementations run their own replenishment once started and must never
/// block in [`RateLimit::add`].
pub trait RateLimit: Send + Sync {
    /// Begin periodic replenishment
    fn start(&self);

    /// Try to consume one unit of capacity
    ///
    /// Returns `false` immediately when no capacity is left.
    fn add(&self) -> bool;

    /// Stop periodic replenishment
    fn stop(&self);
}
