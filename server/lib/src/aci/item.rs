//! The parsed form of an ACIItem. An item is either *item first* (a set of protected
//! items, then who may do what to them) or *user first* (a set of user classes, then
//! what they may do to which items). Both shapes expand to the same tuples.

use std::collections::BTreeSet;
use std::fmt;

use crate::aci::subtree::{Refinement, SubtreeSpecification};
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MicroOperation {
    Add,
    DiscloseOnError,
    Read,
    Remove,
    Browse,
    Export,
    Import,
    Modify,
    Rename,
    ReturnDn,
    Compare,
    FilterMatch,
    Invoke,
}

impl MicroOperation {
    pub const ALL: [MicroOperation; 13] = [
        MicroOperation::Add,
        MicroOperation::DiscloseOnError,
        MicroOperation::Read,
        MicroOperation::Remove,
        MicroOperation::Browse,
        MicroOperation::Export,
        MicroOperation::Import,
        MicroOperation::Modify,
        MicroOperation::Rename,
        MicroOperation::ReturnDn,
        MicroOperation::Compare,
        MicroOperation::FilterMatch,
        MicroOperation::Invoke,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MicroOperation::Add => "Add",
            MicroOperation::DiscloseOnError => "DiscloseOnError",
            MicroOperation::Read => "Read",
            MicroOperation::Remove => "Remove",
            MicroOperation::Browse => "Browse",
            MicroOperation::Export => "Export",
            MicroOperation::Import => "Import",
            MicroOperation::Modify => "Modify",
            MicroOperation::Rename => "Rename",
            MicroOperation::ReturnDn => "ReturnDN",
            MicroOperation::Compare => "Compare",
            MicroOperation::FilterMatch => "FilterMatch",
            MicroOperation::Invoke => "Invoke",
        }
    }
}

impl fmt::Display for MicroOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GrantAndDenial {
    pub op: MicroOperation,
    pub grant: bool,
}

impl fmt::Display for GrantAndDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let polarity = if self.grant { "grant" } else { "deny" };
        write!(f, "{}{}", polarity, self.op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserClass {
    AllUsers,
    ThisEntry,
    ParentOfEntry,
    Name(BTreeSet<Dn>),
    UserGroup(BTreeSet<Dn>),
    Subtree(Vec<SubtreeSpecification>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxValueCountItem {
    pub attr: String,
    pub max: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestrictedByItem {
    pub attr: String,
    pub values_in: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtectedItem {
    Entry,
    AllUserAttributeTypes,
    AllUserAttributeTypesAndValues,
    AttributeType(BTreeSet<String>),
    AllAttributeValues(BTreeSet<String>),
    AttributeValue(BTreeSet<(String, String)>),
    SelfValue(BTreeSet<String>),
    MaxValueCount(Vec<MaxValueCountItem>),
    MaxImmSub(usize),
    RestrictedBy(Vec<RestrictedByItem>),
    Classes(Refinement),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermission {
    pub precedence: Option<u8>,
    pub protected_items: Vec<ProtectedItem>,
    pub grants_and_denials: BTreeSet<GrantAndDenial>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPermission {
    pub precedence: Option<u8>,
    pub user_classes: Vec<UserClass>,
    pub grants_and_denials: BTreeSet<GrantAndDenial>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AciItemKind {
    ItemFirst {
        protected_items: Vec<ProtectedItem>,
        item_permissions: Vec<ItemPermission>,
    },
    UserFirst {
        user_classes: Vec<UserClass>,
        user_permissions: Vec<UserPermission>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AciItem {
    pub identification_tag: String,
    pub precedence: u8,
    pub authentication_level: AuthenticationLevel,
    pub kind: AciItemKind,
}
