//! Core types and trait definitions for the waiver store.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod error;
pub mod query;
pub mod store;
pub mod subject;
pub mod waiver;

pub use error::{Error, Result};
