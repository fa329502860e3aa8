//! Shared types between the directory server core and anything that speaks to it: the
//! error taxonomy, the outward result codes those errors map to, and the well known
//! attribute and object class names.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unreachable)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

pub mod constants;
pub mod internal;

pub mod prelude {
    pub use crate::constants::*;
    pub use crate::internal::{OperationError, ResultCode, SchemaError};
}
