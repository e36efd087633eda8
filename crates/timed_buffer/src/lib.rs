//! # Timed Buffer
//!
//! Time-windowed batching buffer.
//!
//! Accumulates items under a capacity bound and releases them as one batch per
//! tick on a flush channel. Sends on the flush channel never block: a batch
//! nobody is ready to receive is dropped.
//!
//! ## Usage
//!
//! ```ignore
//! use timed_buffer::TimedBuffer;
//!
//! let buffer = TimedBuffer::new(Duration::from_secs(5), 1000);
//! buffer.append(vec!["hello".to_string()])?;
//!
//! let batch = buffer.flush_channel().recv_async().await?;
//! buffer.close();
//! ```

mod buffer;
mod error;

pub use buffer::{Batch, TimedBuffer};
pub use error::BufferError;
