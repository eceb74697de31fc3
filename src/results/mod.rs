//! Reading finished jobs into typed rows.

pub mod reader;
pub mod value;

pub use reader::{ResultReader, ResultRow, ResultSet, RowSchema};
pub use value::{decode_cell, Scalar, ScalarType, WireType};
