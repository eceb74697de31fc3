//! bq-report - a batch client for a cloud data warehouse.
//!
//! Builds SQL from declarative specs, submits it as a remote job, waits for
//! completion, reads typed rows and prints a report. The binary is a thin
//! layer over these modules; they are also exposed for integration tests.

pub mod config;
pub mod error;
pub mod insert;
pub mod job;
pub mod query;
pub mod report;
pub mod results;
pub mod statement;
pub mod warehouse;
