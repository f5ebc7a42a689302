//! razorx - natural-language questions to SQL results.
//!
//! This library exposes the core modules for the binary and for integration
//! tests.

pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod safety;
pub mod server;
pub mod transcribe;
