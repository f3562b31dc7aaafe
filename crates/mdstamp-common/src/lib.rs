//! mdstamp Common - Shared types and utilities
//!
//! This crate provides the timestamp record, the stat view it is reflected
//! into, error definitions and configuration used across mdstamp components.

pub mod config;
pub mod error;
pub mod types;

pub use config::MdataConfig;
pub use error::{MdataError, Result};
pub use types::*;
