#![forbid(unsafe_code)]

//! Concrete [`flowtap_session::Sink`] implementations (`§4.5`).
//!
//! None of these are load-bearing for the core pipeline; they exist as
//! ready-made collaborators `flowtap-daemon` wires up, and as worked
//! examples of the sink contract.

pub mod histogram;
pub mod key_frequency;
pub mod logging;

pub use histogram::SizeHistogramSink;
pub use key_frequency::KeyFrequencySink;
pub use logging::LoggingSink;
