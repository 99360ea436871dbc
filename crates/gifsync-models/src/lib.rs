//! Shared data models for the GifSync backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and broker lifecycle states
//! - Retiming requests
//! - The simplified task status exposed to API callers

pub mod job;
pub mod task;

pub use job::{JobId, JobState, ParseJobStateError, RetimeRequest, QUEUE_NAME};
pub use task::{TaskFilter, TaskOutcome, TaskStatus};
