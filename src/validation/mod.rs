pub mod identifier;
pub mod sql_validator;

pub use identifier::*;
pub use sql_validator::*;
