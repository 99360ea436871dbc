//! Request handlers.

pub mod gifs;
pub mod health;
pub mod tasks;

pub use gifs::*;
pub use health::*;
pub use tasks::*;
