//! In memory caches the access control stage keeps in step with the directory.

pub mod group;
pub mod tuple;

pub use self::group::GroupCache;
pub use self::tuple::{CacheUpdate, TupleCache};
