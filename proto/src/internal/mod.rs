mod error;
mod result;

pub use self::error::{OperationError, SchemaError};
pub use self::result::ResultCode;
