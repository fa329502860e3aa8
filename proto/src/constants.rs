//! Because consistency is great!
//!
//! Attribute type and object class names are stored lower case, which is how the server
//! compares them.

/// Default distinguished name of the root administrator.
pub const DEFAULT_ADMIN_DN: &str = "uid=admin,ou=system";
/// Default distinguished name of the administrators group.
pub const DEFAULT_ADMIN_GROUP_DN: &str = "cn=Administrators,ou=groups,ou=system";
/// Default base of user entries.
pub const DEFAULT_USERS_BASE_DN: &str = "ou=users,ou=system";
/// Default base of group entries.
pub const DEFAULT_GROUPS_BASE_DN: &str = "ou=groups,ou=system";

pub const ATTR_OBJECTCLASS: &str = "objectclass";
pub const ATTR_CN: &str = "cn";
pub const ATTR_UID: &str = "uid";
pub const ATTR_OU: &str = "ou";
pub const ATTR_DESCRIPTION: &str = "description";
pub const ATTR_USER_PASSWORD: &str = "userpassword";
pub const ATTR_MEMBER: &str = "member";
pub const ATTR_UNIQUE_MEMBER: &str = "uniquemember";
pub const ATTR_MEMBER_OF: &str = "memberof";

pub const ATTR_ENTRY_ACI: &str = "entryaci";
pub const ATTR_SUBENTRY_ACI: &str = "subentryaci";
pub const ATTR_PRESCRIPTIVE_ACI: &str = "prescriptiveaci";
pub const ATTR_SUBTREE_SPECIFICATION: &str = "subtreespecification";
pub const ATTR_ADMINISTRATIVE_ROLE: &str = "administrativerole";
pub const ATTR_ACCESS_CONTROL_SUBENTRIES: &str = "accesscontrolsubentries";

pub const ATTR_CREATE_TIMESTAMP: &str = "createtimestamp";
pub const ATTR_MODIFY_TIMESTAMP: &str = "modifytimestamp";
pub const ATTR_CREATORS_NAME: &str = "creatorsname";
pub const ATTR_MODIFIERS_NAME: &str = "modifiersname";
pub const ATTR_ENTRY_UUID: &str = "entryuuid";
pub const ATTR_ENTRY_DN: &str = "entrydn";

pub const CLASS_TOP: &str = "top";
pub const CLASS_PERSON: &str = "person";
pub const CLASS_ORGANIZATIONAL_UNIT: &str = "organizationalunit";
pub const CLASS_DOMAIN: &str = "domain";
pub const CLASS_GROUP_OF_NAMES: &str = "groupofnames";
pub const CLASS_GROUP_OF_UNIQUE_NAMES: &str = "groupofuniquenames";
pub const CLASS_SUBENTRY: &str = "subentry";
pub const CLASS_ACCESS_CONTROL_SUBENTRY: &str = "accesscontrolsubentry";

/// Attributes maintained by the server. Everything else is a user attribute.
pub const OPERATIONAL_ATTRIBUTES: [&str; 12] = [
    ATTR_ENTRY_ACI,
    ATTR_SUBENTRY_ACI,
    ATTR_PRESCRIPTIVE_ACI,
    ATTR_SUBTREE_SPECIFICATION,
    ATTR_ADMINISTRATIVE_ROLE,
    ATTR_ACCESS_CONTROL_SUBENTRIES,
    ATTR_CREATE_TIMESTAMP,
    ATTR_MODIFY_TIMESTAMP,
    ATTR_CREATORS_NAME,
    ATTR_MODIFIERS_NAME,
    ATTR_ENTRY_UUID,
    ATTR_ENTRY_DN,
];
