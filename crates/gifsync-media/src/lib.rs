//! gifsicle CLI wrapper for gif retiming.
//!
//! This crate provides:
//! - Type-safe gifsicle command building
//! - Subprocess execution with stdin/stdout piping and optional timeout
//! - Frame count introspection (`gifsicle -I`)
//! - Per-frame delay rewriting
//! - The tempo-to-frame-duration planner

pub mod command;
pub mod encoder;
pub mod error;
pub mod info;
pub mod timing;

pub use command::{check_gifsicle, GifsicleCommand, GifsicleConfig, GifsicleRunner};
pub use encoder::{FrameEncoder, Gifsicle};
pub use error::{MediaError, MediaResult};
pub use info::parse_frame_count;
pub use timing::plan_frame_durations;
