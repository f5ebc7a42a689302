//! Integration test modules.

mod common;
mod pipeline_test;
mod server_test;
mod sqlite_test;
