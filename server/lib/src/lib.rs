//! The directory server authorization core. Every directory operation passes through a
//! chain of interceptors before it reaches storage. The access control interceptor
//! evaluates X.501 style access control items, kept ready for evaluation in the group and
//! tuple caches, and the default interceptor applies a fixed policy when access control
//! items are switched off.

#![deny(warnings)]
#![recursion_limit = "512"]
#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::disallowed_types)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

#[macro_use]
extern crate tracing;
#[macro_use]
extern crate lazy_static;

// This has to be before the other modules so the macros are in scope for them.
#[macro_use]
pub mod macros;

pub mod aci;
pub mod be;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dn;
pub mod entry;
pub mod filter;
pub mod identity;
pub mod interceptor;
pub mod modify;
pub mod server;
pub mod testkit;

/// A prelude of imports that should be imported by all other modules to help make
/// imports cleaner.
pub mod prelude {
    pub use dirsrv_proto::internal::{OperationError, ResultCode, SchemaError};
    pub use sketching::{
        admin_debug, admin_error, admin_info, admin_warn, filter_error, filter_info, filter_trace,
        filter_warn, perf_trace, request_error, request_info, request_trace, request_warn,
        security_access, security_critical, security_debug, security_error, security_info,
        tagged_event, EventTag,
    };

    pub use crate::aci::{
        AciItem, AciItemParser, AciParser, AciTuple, MicroOperation, ProtectedItem, UserClass,
    };
    pub use crate::be::{Backend, EntryCursor, MemoryBackend};
    pub use crate::cache::{CacheUpdate, GroupCache, TupleCache};
    pub use crate::config::Configuration;
    pub use crate::constants::*;
    pub use crate::dn::{Dn, Rdn};
    pub use crate::entry::{Entry, EntryView};
    pub use crate::filter::{f_and, f_andnot, f_eq, f_or, f_pres, Filter, SearchScope};
    pub use crate::identity::{AuthenticationLevel, Principal, Session};
    pub use crate::interceptor::{
        AciAuthorizationInterceptor, DefaultAuthorizationInterceptor, Interceptor,
        InterceptorChain, Next, Operation, OperationContext, OperationOutcome,
    };
    pub use crate::modify::{m_add, m_purge, m_remove, m_replace, Modify, ModifyList};
    pub use crate::server::DirectoryServer;
}
