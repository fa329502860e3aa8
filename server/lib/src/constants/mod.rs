// Re-export as needed

pub use dirsrv_proto::constants::*;

use crate::aci::MicroOperation;
use hashbrown::HashSet;

/// Checked on the entry being added.
pub const ADD_ENTRY_PERMS: [MicroOperation; 1] = [MicroOperation::Add];
/// Checked on every attribute type and value of an entry being added.
pub const ADD_ATTRIBUTE_PERMS: [MicroOperation; 1] = [MicroOperation::Add];
pub const REMOVE_PERMS: [MicroOperation; 1] = [MicroOperation::Remove];
pub const RENAME_PERMS: [MicroOperation; 1] = [MicroOperation::Rename];
pub const EXPORT_PERMS: [MicroOperation; 1] = [MicroOperation::Export];
pub const IMPORT_PERMS: [MicroOperation; 1] = [MicroOperation::Import];
pub const MOVE_AND_RENAME_PERMS: [MicroOperation; 2] =
    [MicroOperation::Export, MicroOperation::Rename];
pub const COMPARE_ENTRY_PERMS: [MicroOperation; 1] = [MicroOperation::Read];
pub const COMPARE_PERMS: [MicroOperation; 1] = [MicroOperation::Compare];
pub const LOOKUP_PERMS: [MicroOperation; 2] = [MicroOperation::Read, MicroOperation::Browse];
pub const HAS_ENTRY_PERMS: [MicroOperation; 1] = [MicroOperation::Browse];
pub const SEARCH_ENTRY_PERMS: [MicroOperation; 2] =
    [MicroOperation::Browse, MicroOperation::ReturnDn];
pub const READ_PERMS: [MicroOperation; 1] = [MicroOperation::Read];

lazy_static! {
    pub static ref OPERATIONAL: HashSet<&'static str> =
        OPERATIONAL_ATTRIBUTES.iter().copied().collect();

    /// Attributes a non administrator may never change on their own entry, since doing
    /// so would change who they are or what they may do.
    pub static ref IDENTITY_SHIFTING: HashSet<&'static str> = [
        ATTR_UID,
        ATTR_OBJECTCLASS,
        ATTR_MEMBER_OF,
        ATTR_MEMBER,
        ATTR_UNIQUE_MEMBER,
        ATTR_ENTRY_ACI,
        ATTR_SUBENTRY_ACI,
        ATTR_PRESCRIPTIVE_ACI,
        ATTR_ADMINISTRATIVE_ROLE,
    ]
    .into_iter()
    .collect();
}

/// True unless the attribute is maintained by the server.
pub fn is_user_attribute(attr: &str) -> bool {
    if attr.bytes().any(|b| b.is_ascii_uppercase()) {
        !OPERATIONAL.contains(attr.to_lowercase().as_str())
    } else {
        !OPERATIONAL.contains(attr)
    }
}

pub fn is_identity_shifting(attr: &str) -> bool {
    IDENTITY_SHIFTING.contains(attr.to_lowercase().as_str())
}
