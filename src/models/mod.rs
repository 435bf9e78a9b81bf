pub mod enums;

pub use enums::*;

use thiserror::Error;

/// Raised when a string does not name a variant of one of the `str_enum!` types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}
