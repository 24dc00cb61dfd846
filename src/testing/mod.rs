//! Testing utilities and mock implementations
//!
//! Mock transport and clock for exercising the session controller without a
//! broker or wall-clock waits, plus an in-memory log sink.

pub mod log_capture;
pub mod mocks;

pub use log_capture::LogCapture;
pub use mocks::*;
