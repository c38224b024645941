//! Live-update pump and the signalling primitives it runs on.

pub mod pump;
pub mod signal;

pub use pump::{LivePump, PumpWorker};
pub use signal::{Latch, UpdateSignal};
