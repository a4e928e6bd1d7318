//! regfind
//!
//! Streaming, keyword-filterable enumeration of hierarchical key/value
//! stores such as registry hives.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod activate;
pub mod config;
pub mod console;
pub mod error;
pub mod metrics;
pub mod observability;
pub mod pipeline;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
