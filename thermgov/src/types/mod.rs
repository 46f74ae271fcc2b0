//! Small reusable types.

mod latch;

pub use latch::{LatchState, OneShotLatch};
