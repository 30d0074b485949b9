//! # Core Runtime Module
//!
//! Runtime infrastructure shared by the offline-content crates:
//! - Logging and tracing setup
//! - Configuration builder with fail-fast bridge validation
//! - Typed event bus for download and completeness events
//!
//! ## Overview
//!
//! Nothing in here knows how resources are resolved or downloaded. It provides
//! the conventions (errors, log filters, event schema) the orchestration crate
//! builds on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
