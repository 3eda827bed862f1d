//! Helpers shared by the container and BIFF layers.

/// Little-endian binary readers
pub mod binary;

pub use binary::{BinaryError, BinaryResult};
