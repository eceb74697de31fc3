//! Integration tests for bq-report.

pub mod config_test;
pub mod emulator_test;
pub mod insert_test;
pub mod pipeline_test;
