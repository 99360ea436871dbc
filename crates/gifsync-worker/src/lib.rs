//! GifSync job worker.
//!
//! This crate provides:
//! - The gif retiming job
//! - Job executor with bounded concurrency and cooperative cancellation
//! - Structured job logging
//! - Graceful shutdown

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod retime;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use retime::{retime_gif, RetimeHandler};
