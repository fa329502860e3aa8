//! ACI tuples are the flattened, evaluable form of an [`AciItem`]. Each tuple says that the
//! named user classes, at or above an authentication level, are granted (or denied) a set
//! of micro operations on a set of protected items, at a precedence.

use std::collections::BTreeSet;

use crate::aci::item::*;
use crate::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AciTuple {
    pub(crate) user_classes: Vec<UserClass>,
    pub(crate) authentication_level: AuthenticationLevel,
    pub(crate) protected_items: Vec<ProtectedItem>,
    pub(crate) micro_operations: BTreeSet<MicroOperation>,
    pub(crate) grant: bool,
    pub(crate) precedence: u8,
}

impl AciTuple {
    #[cfg(test)]
    pub(crate) fn new(
        user_classes: Vec<UserClass>,
        authentication_level: AuthenticationLevel,
        protected_items: Vec<ProtectedItem>,
        micro_operations: &[MicroOperation],
        grant: bool,
        precedence: u8,
    ) -> Self {
        AciTuple {
            user_classes,
            authentication_level,
            protected_items,
            micro_operations: micro_operations.iter().copied().collect(),
            grant,
            precedence,
        }
    }

    pub fn user_classes(&self) -> &[UserClass] {
        &self.user_classes
    }

    pub fn authentication_level(&self) -> AuthenticationLevel {
        self.authentication_level
    }

    pub fn protected_items(&self) -> &[ProtectedItem] {
        &self.protected_items
    }

    pub fn micro_operations(&self) -> &BTreeSet<MicroOperation> {
        &self.micro_operations
    }

    pub fn is_grant(&self) -> bool {
        self.grant
    }

    pub fn precedence(&self) -> u8 {
        self.precedence
    }
}

/// Split a set of grants and denials into the granted and the denied micro operations.
fn split_grants(gds: &BTreeSet<GrantAndDenial>) -> (BTreeSet<MicroOperation>, BTreeSet<MicroOperation>) {
    gds.iter()
        .fold((BTreeSet::new(), BTreeSet::new()), |(mut g, mut d), gd| {
            if gd.grant {
                g.insert(gd.op);
            } else {
                d.insert(gd.op);
            }
            (g, d)
        })
}

impl AciItem {
    /// Expand this item into tuples. Every permission yields up to two tuples, one for its
    /// grants and one for its denials; an empty side yields nothing. A permission without
    /// its own precedence inherits the item's.
    pub fn to_tuples(&self) -> Vec<AciTuple> {
        let mut tuples = Vec::new();
        let mut emit = |user_classes: &[UserClass],
                        protected_items: &[ProtectedItem],
                        gds: &BTreeSet<GrantAndDenial>,
                        precedence: Option<u8>| {
            let precedence = precedence.unwrap_or(self.precedence);
            let (grants, denials) = split_grants(gds);
            for (grant, micro_operations) in [(true, grants), (false, denials)] {
                if micro_operations.is_empty() {
                    continue;
                }
                tuples.push(AciTuple {
                    user_classes: user_classes.to_vec(),
                    authentication_level: self.authentication_level,
                    protected_items: protected_items.to_vec(),
                    micro_operations,
                    grant,
                    precedence,
                });
            }
        };

        match &self.kind {
            AciItemKind::ItemFirst {
                protected_items,
                item_permissions,
            } => {
                for perm in item_permissions {
                    emit(
                        &perm.user_classes,
                        protected_items,
                        &perm.grants_and_denials,
                        perm.precedence,
                    );
                }
            }
            AciItemKind::UserFirst {
                user_classes,
                user_permissions,
            } => {
                for perm in user_permissions {
                    emit(
                        user_classes,
                        &perm.protected_items,
                        &perm.grants_and_denials,
                        perm.precedence,
                    );
                }
            }
        }
        tuples
    }
}

/// Parse and expand a set of ACI attribute values. A value that fails to parse is logged
/// and skipped, the rest still apply.
pub fn parse_aci_values<'a, I>(parser: &dyn AciParser, values: I) -> Vec<AciTuple>
where
    I: IntoIterator<Item = &'a String>,
{
    values
        .into_iter()
        .filter_map(|v| match parser.parse(v) {
            Ok(item) => Some(item.to_tuples()),
            Err(e) => {
                admin_warn!(?e, aci = %v, "ignoring aci value that failed to parse");
                None
            }
        })
        .flatten()
        .collect()
}
