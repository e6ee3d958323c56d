#![forbid(unsafe_code)]

//! Shared types, configuration and error domain used across the flowtap
//! workspace: the observer's endpoint/flow-key vocabulary, its config
//! surface (`§6` of the design), and a small error enum that the rest of
//! the crates convert their own errors into at the boundary.

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::{Direction, Endpoint, FlowKey};
