//! Spool common types, IDs, and errors.
//!
//! This crate provides foundational types shared by the storage engine and
//! the operator CLI:
//! - Instrumentation keys with a validated fixed-width wire form
//! - Batch file names and the state encoded in their extension
//! - Common error types
//! - Configuration loading and validation

pub mod config;
pub mod error;
pub mod id;

pub use config::{ConfigResolver, ConfigSource, RequeuePolicy, SpoolConfig};
pub use error::{Error, ErrorCategory, Result};
pub use id::{BatchName, FileState, InstrumentationKey, INSTRUMENTATION_KEY_LEN};
