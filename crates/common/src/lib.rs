//! Shared types for every soulxbot crate: the error taxonomy and time helpers.

pub mod error;
pub mod time;

pub use error::{Error, Result};
