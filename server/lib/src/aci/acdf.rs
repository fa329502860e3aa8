//! The access control decision function. Given the tuples in force for an entry and a
//! description of what a requester wants to do, decide whether it may.
//!
//! Every requested micro operation is decided on its own, and all of them must be granted
//! for the request to be granted. For one micro operation:
//!
//! * tuples that do not carry the operation are discarded,
//! * tuples whose user classes do not relate to the requester are discarded. A denial also
//!   applies to a requester whose authentication level is below the tuple's, while a grant
//!   only applies to a requester at or above it,
//! * tuples whose protected items do not cover the target (entry, attribute type or value)
//!   are discarded,
//! * grants constrained by `maxValueCount`, `maxImmSub` or `restrictedBy` are discarded if
//!   the constraint does not hold,
//! * if nothing remains, deny,
//! * if any remaining tuple denies, deny, whatever its precedence. Otherwise grant.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::aci::item::{MicroOperation, ProtectedItem, UserClass};
use crate::aci::tuple::AciTuple;
use crate::prelude::*;

/// Everything known about the requester that the evaluator needs.
#[derive(Debug, Clone)]
pub struct Requester {
    pub dn: Dn,
    pub groups: Arc<BTreeSet<Dn>>,
    pub auth_level: AuthenticationLevel,
}

/// One permission check. Built fresh for every check and dropped after it.
#[derive(Debug, Clone, Copy)]
pub struct AciContext<'a> {
    pub requester: &'a Requester,
    pub entry: &'a Entry,
    pub entry_view: Option<&'a EntryView>,
    pub attr: Option<&'a str>,
    pub value: Option<&'a str>,
    pub micro_operations: &'a [MicroOperation],
    pub tuples: &'a [AciTuple],
    pub imm_subordinates: Option<usize>,
}

impl<'a> AciContext<'a> {
    pub fn new(
        requester: &'a Requester,
        entry: &'a Entry,
        micro_operations: &'a [MicroOperation],
        tuples: &'a [AciTuple],
    ) -> Self {
        AciContext {
            requester,
            entry,
            entry_view: None,
            attr: None,
            value: None,
            micro_operations,
            tuples,
            imm_subordinates: None,
        }
    }

    pub fn with_attr(mut self, attr: &'a str) -> Self {
        self.attr = Some(attr);
        self
    }

    pub fn with_value(mut self, attr: &'a str, value: &'a str) -> Self {
        self.attr = Some(attr);
        self.value = Some(value);
        self
    }

    pub fn with_view(mut self, view: &'a EntryView) -> Self {
        self.entry_view = Some(view);
        self
    }

    pub fn with_imm_subordinates(mut self, count: usize) -> Self {
        self.imm_subordinates = Some(count);
        self
    }

    fn is_entry_scope(&self) -> bool {
        self.attr.is_none()
    }
}

/// Decide the request, returning false on denial. Used where a denial only hides
/// something, such as search result filtering.
pub fn has_permission(ctx: &AciContext<'_>) -> bool {
    let granted = ctx.micro_operations.iter().all(|op| decide(ctx, *op));
    if granted {
        security_access!(
            requester = %ctx.requester.dn,
            target = %ctx.entry.get_dn(),
            attr = ?ctx.attr,
            ops = ?ctx.micro_operations,
            "allowed ✅"
        );
    } else {
        security_info!(
            requester = %ctx.requester.dn,
            target = %ctx.entry.get_dn(),
            attr = ?ctx.attr,
            ops = ?ctx.micro_operations,
            "denied ❌"
        );
    }
    granted
}

/// Decide the request, failing with [`OperationError::AccessDenied`] on denial.
pub fn check_permission(ctx: &AciContext<'_>) -> Result<(), OperationError> {
    if has_permission(ctx) {
        Ok(())
    } else {
        Err(OperationError::AccessDenied)
    }
}

fn decide(ctx: &AciContext<'_>, op: MicroOperation) -> bool {
    let applicable: Vec<&AciTuple> = ctx
        .tuples
        .iter()
        .filter(|t| t.micro_operations.contains(&op))
        .filter(|t| related_user(ctx, t))
        .filter(|t| t.protected_items.iter().any(|pi| item_matches(ctx, pi)))
        .filter(|t| max_value_count_holds(ctx, t, op))
        .filter(|t| max_imm_sub_holds(ctx, t, op))
        .filter(|t| restricted_by_holds(ctx, t))
        .collect();

    if applicable.is_empty() {
        security_info!(%op, "no tuple applies, denying");
        return false;
    }

    // A denial wins over any grant, including grants of higher precedence.
    if let Some(deny) = applicable.iter().find(|t| !t.grant) {
        security_info!(%op, precedence = deny.precedence, "denied by tuple");
        return false;
    }
    true
}

fn related_user(ctx: &AciContext<'_>, t: &AciTuple) -> bool {
    let r = ctx.requester;
    let related = t.user_classes.iter().any(|uc| match uc {
        UserClass::AllUsers => true,
        UserClass::ThisEntry => &r.dn == ctx.entry.get_dn(),
        UserClass::ParentOfEntry => ctx.entry.get_dn().parent().as_ref() == Some(&r.dn),
        UserClass::Name(names) => names.contains(&r.dn),
        UserClass::UserGroup(groups) => groups.iter().any(|g| r.groups.contains(g)),
        UserClass::Subtree(specs) => specs
            .iter()
            .any(|ss| ss.contains(&Dn::root(), &r.dn, None)),
    });

    if t.grant {
        related && r.auth_level >= t.authentication_level
    } else {
        related || r.auth_level < t.authentication_level
    }
}

fn contains_attr(set: &BTreeSet<String>, attr: &str) -> bool {
    set.iter().any(|a| a.eq_ignore_ascii_case(attr))
}

fn item_matches(ctx: &AciContext<'_>, pi: &ProtectedItem) -> bool {
    match (pi, ctx.attr, ctx.value) {
        (ProtectedItem::Entry, None, _) => true,
        (ProtectedItem::AllUserAttributeTypes, Some(attr), None) => {
            crate::constants::is_user_attribute(attr)
        }
        (ProtectedItem::AllUserAttributeTypesAndValues, Some(attr), _) => {
            crate::constants::is_user_attribute(attr)
        }
        (ProtectedItem::AttributeType(attrs), Some(attr), _) => contains_attr(attrs, attr),
        (ProtectedItem::AllAttributeValues(attrs), Some(attr), Some(_)) => {
            contains_attr(attrs, attr)
        }
        (ProtectedItem::AttributeValue(avas), Some(attr), Some(value)) => avas
            .iter()
            .any(|(a, v)| a.eq_ignore_ascii_case(attr) && v.eq_ignore_ascii_case(value)),
        (ProtectedItem::SelfValue(attrs), Some(attr), Some(value)) => {
            contains_attr(attrs, attr)
                && Dn::parse(value)
                    .map(|dn| dn == ctx.requester.dn)
                    .unwrap_or(false)
        }
        (ProtectedItem::MaxValueCount(items), Some(attr), Some(_)) => {
            items.iter().any(|i| i.attr.eq_ignore_ascii_case(attr))
        }
        (ProtectedItem::RestrictedBy(items), Some(attr), Some(_)) => {
            items.iter().any(|i| i.attr.eq_ignore_ascii_case(attr))
        }
        (ProtectedItem::MaxImmSub(_), None, _) => true,
        (ProtectedItem::Classes(refinement), None, _) => refinement.matches(ctx.entry),
        _ => false,
    }
}

/// A grant of `Add` on a counted attribute holds only while the projected entry stays
/// within the count.
fn max_value_count_holds(ctx: &AciContext<'_>, t: &AciTuple, op: MicroOperation) -> bool {
    if !t.grant || op != MicroOperation::Add || ctx.value.is_none() {
        return true;
    }
    let Some(attr) = ctx.attr else {
        return true;
    };
    let count = match ctx.entry_view {
        Some(view) => view.value_count(attr),
        None => ctx
            .entry
            .get_ava_set(attr)
            .map(|vs| vs.len())
            .unwrap_or(0),
    };
    t.protected_items.iter().all(|pi| match pi {
        ProtectedItem::MaxValueCount(items) => items
            .iter()
            .filter(|i| i.attr.eq_ignore_ascii_case(attr))
            .all(|i| count <= i.max),
        _ => true,
    })
}

/// A grant of `Add` on an entry limited by `maxImmSub` holds only while the parent has
/// fewer immediate subordinates than the limit.
fn max_imm_sub_holds(ctx: &AciContext<'_>, t: &AciTuple, op: MicroOperation) -> bool {
    if !t.grant || op != MicroOperation::Add || !ctx.is_entry_scope() {
        return true;
    }
    t.protected_items.iter().all(|pi| match pi {
        ProtectedItem::MaxImmSub(max) => match ctx.imm_subordinates {
            Some(count) => count < *max,
            // Unknown count, the limit can not be shown to hold.
            None => false,
        },
        _ => true,
    })
}

/// A grant over a restricted attribute holds only for values also present in the
/// attribute the restriction names.
fn restricted_by_holds(ctx: &AciContext<'_>, t: &AciTuple) -> bool {
    if !t.grant {
        return true;
    }
    let (Some(attr), Some(value)) = (ctx.attr, ctx.value) else {
        return true;
    };
    t.protected_items.iter().all(|pi| match pi {
        ProtectedItem::RestrictedBy(items) => items
            .iter()
            .filter(|i| i.attr.eq_ignore_ascii_case(attr))
            .all(|i| ctx.entry.attribute_equality(&i.values_in, value)),
        _ => true,
    })
}
