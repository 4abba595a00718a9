//! Generic timer infrastructure.

pub mod multiplexer;

pub use multiplexer::TimerMultiplexer;
