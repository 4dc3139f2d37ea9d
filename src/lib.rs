pub mod checkpoint;
pub mod config;
pub mod datasets;
pub mod error;
pub mod metrics;
pub mod nn;
pub mod train;

pub use error::{Error, Result};
