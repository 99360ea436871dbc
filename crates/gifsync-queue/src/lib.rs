//! GifSync task queue.
//!
//! This crate provides:
//! - Job payloads and broker-side job records
//! - A `Broker` seam with Redis and in-memory implementations
//! - The `JobQueue` adapter: enqueue, lookup, listing and cancellation
//! - Deferred (worker) and inline (run-on-enqueue) dispatch
//! - Recovery of jobs abandoned by their worker

pub mod broker;
pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod record;
pub mod redis_broker;

pub use broker::{Broker, ABANDONED_ERROR};
pub use error::{QueueError, QueueResult};
pub use job::{QueueJob, RetimeGifJob};
pub use memory::MemoryBroker;
pub use queue::{DispatchKind, DispatchMode, HandlerResult, JobHandler, JobQueue, QueueConfig};
pub use record::{JobOutcome, JobRecord};
pub use redis_broker::RedisBroker;
