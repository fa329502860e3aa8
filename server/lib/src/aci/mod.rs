//! Access control items: their parsed form, the tuples they expand to, and the decision
//! function that evaluates those tuples.

pub mod acdf;
pub mod item;
pub mod parser;
pub mod subtree;
pub mod tuple;

pub use self::acdf::{check_permission, has_permission, AciContext, Requester};
pub use self::item::{
    AciItem, AciItemKind, GrantAndDenial, ItemPermission, MicroOperation, ProtectedItem,
    UserClass, UserPermission,
};
pub use self::parser::{AciItemParser, AciParser};
pub use self::subtree::{Refinement, SubtreeSpecification};
pub use self::tuple::{parse_aci_values, AciTuple};
