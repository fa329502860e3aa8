//! The ACI authorization stage. For every operation it works out which access control
//! tuples are in force for the target, asks the decision function whether the requester
//! may perform the micro operations the operation needs, and only then forwards it.
//! Mutating operations that succeed are reflected into the group and tuple caches before
//! the stage returns.
//!
//! Two requesters skip evaluation entirely. When access control is disabled everybody
//! does, and administrators always do. Both still keep the caches up to date, since the
//! caches mirror the directory and not the policy in force.

use std::sync::Arc;

use crate::aci::{
    check_permission, has_permission, parse_aci_values, AciContext, AciItemParser, AciParser,
    AciTuple, MicroOperation, Requester,
};
use crate::be::Backend;
use crate::cache::{GroupCache, TupleCache};
use crate::config::Configuration;
use crate::interceptor::{Interceptor, Next, Operation, OperationContext, OperationOutcome};
use crate::prelude::*;

mod add;
mod delete;
mod modify;
mod read;
mod rename;
mod search;

/// The caches the stage owns. Built and loaded by `init`.
#[derive(Clone)]
pub(crate) struct AciCaches {
    pub(crate) groups: Arc<GroupCache>,
    pub(crate) tuples: Arc<TupleCache>,
}

pub struct AciAuthorizationInterceptor {
    enabled: bool,
    admin_dn: Dn,
    groups: Arc<GroupCache>,
    parser: Arc<dyn AciParser>,
    caches: Option<AciCaches>,
}

impl AciAuthorizationInterceptor {
    pub fn new(config: &Configuration) -> Self {
        Self::with_parser(config, Arc::new(AciItemParser))
    }

    pub fn with_parser(config: &Configuration, parser: Arc<dyn AciParser>) -> Self {
        AciAuthorizationInterceptor {
            enabled: config.access_control_enabled,
            admin_dn: config.admin_dn.clone(),
            groups: Arc::new(GroupCache::new(
                config.admin_dn.clone(),
                config.admin_group_dn.clone(),
            )),
            parser,
            caches: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The group cache this stage loads and maintains. Other stages may share it, it is
    /// only filled in by `init`.
    pub fn group_cache(&self) -> &Arc<GroupCache> {
        &self.groups
    }

    pub fn tuple_cache(&self) -> Option<&Arc<TupleCache>> {
        self.caches.as_ref().map(|c| &c.tuples)
    }

    fn caches(&self) -> Result<&AciCaches, OperationError> {
        self.caches.as_ref().ok_or_else(|| {
            admin_error!("aci interceptor used before it was initialised");
            OperationError::InvalidState
        })
    }

    /// True if the operation skips evaluation.
    fn bypass(&self, caches: &AciCaches, ctx: &OperationContext) -> bool {
        if !self.enabled {
            trace!("access control disabled, bypassing access check");
            return true;
        }
        let dn = ctx.principal().get_dn();
        if caches.groups.is_administrator(dn) {
            trace!(%dn, "administrator, bypassing access check");
            return true;
        }
        false
    }

    fn requester(&self, caches: &AciCaches, ctx: &OperationContext) -> Requester {
        let principal = ctx.principal();
        Requester {
            dn: principal.get_dn().clone(),
            groups: caches.groups.groups_of(principal.get_dn()),
            auth_level: principal.auth_level(),
        }
    }

    /// The root and the administrator can never be removed or renamed by anyone but an
    /// administrator, whatever the tuples say.
    fn protect_critical(&self, dn: &Dn) -> Result<(), OperationError> {
        if dn.is_root() || *dn == self.admin_dn {
            security_error!(%dn, "denied ❌ - critical entry is protected");
            return Err(OperationError::CriticalEntryProtected);
        }
        Ok(())
    }

    fn tuples_for(
        &self,
        caches: &AciCaches,
        be: &dyn Backend,
        entry: &Entry,
        include_entry_aci: bool,
    ) -> Result<Vec<AciTuple>, OperationError> {
        collect_tuples(caches, self.parser.as_ref(), be, entry, include_entry_aci)
    }
}

/// Gather the tuples in force for `entry`:
///
/// * prescriptive tuples of every area selecting it. A subentry takes those of its
///   administrative point instead,
/// * the tuples of the entry's own `entryACI`, unless it is being added,
/// * for a subentry, the tuples of its administrative point's `subentryACI`.
pub(crate) fn collect_tuples(
    caches: &AciCaches,
    parser: &dyn AciParser,
    be: &dyn Backend,
    entry: &Entry,
    include_entry_aci: bool,
) -> Result<Vec<AciTuple>, OperationError> {
    let dn = entry.get_dn();
    let mut tuples = Vec::new();

    if entry.is_subentry() {
        if let Some(parent_dn) = dn.parent() {
            let parent = be.lookup(&parent_dn).map_err(|e| {
                admin_error!(?e, %parent_dn, "unable to read administrative point of subentry");
                e
            })?;
            tuples.extend(caches.tuples.prescriptive_tuples(&parent_dn, parent.as_deref()));
            if let Some(values) = parent.as_ref().and_then(|p| p.get_ava_set(ATTR_SUBENTRY_ACI)) {
                tuples.extend(parse_aci_values(parser, values));
            }
        }
    } else {
        tuples.extend(caches.tuples.prescriptive_tuples(dn, Some(entry)));
    }

    if include_entry_aci {
        if let Some(values) = entry.get_ava_set(ATTR_ENTRY_ACI) {
            tuples.extend(parse_aci_values(parser, values));
        }
    }

    trace!(%dn, tuples = tuples.len(), "collected tuples");
    Ok(tuples)
}

/// Check `ops` on the entry, then on every attribute type and value it holds.
fn check_entry_and_attributes(
    requester: &Requester,
    entry: &Entry,
    entry_ops: &[MicroOperation],
    attr_ops: &[MicroOperation],
    tuples: &[AciTuple],
    imm_subordinates: Option<usize>,
) -> Result<(), OperationError> {
    let mut acx = AciContext::new(requester, entry, entry_ops, tuples);
    if let Some(count) = imm_subordinates {
        acx = acx.with_imm_subordinates(count);
    }
    check_permission(&acx)?;

    for (attr, values) in entry.get_ava_iter() {
        check_permission(&AciContext::new(requester, entry, attr_ops, tuples).with_attr(attr))?;
        for value in values {
            check_permission(
                &AciContext::new(requester, entry, attr_ops, tuples).with_value(attr, value),
            )?;
        }
    }
    Ok(())
}

/// A copy of the entry holding only what the requester may read.
fn readable(requester: &Requester, entry: &Entry, tuples: &[AciTuple]) -> Entry {
    entry.reduce_attributes(|attr, value| {
        let acx = AciContext::new(requester, entry, &READ_PERMS, tuples);
        match value {
            None => has_permission(&acx.with_attr(attr)),
            Some(v) => has_permission(&acx.with_value(attr, v)),
        }
    })
}

fn lookup_required(be: &dyn Backend, dn: &Dn) -> Result<Arc<Entry>, OperationError> {
    be.lookup(dn)?.ok_or(OperationError::NoMatchingEntries)
}

impl Interceptor for AciAuthorizationInterceptor {
    fn id(&self) -> &'static str {
        "aci_authorization"
    }

    #[instrument(level = "debug", name = "aci::init", skip_all)]
    fn init(&mut self, be: &Arc<dyn Backend>) -> Result<(), OperationError> {
        self.groups.load(be.as_ref())?;
        let tuples = TupleCache::new(self.parser.clone());
        tuples.load(be.as_ref())?;
        self.caches = Some(AciCaches {
            groups: self.groups.clone(),
            tuples: Arc::new(tuples),
        });
        admin_info!(enabled = self.enabled, "aci authorization initialised");
        Ok(())
    }

    fn handle(
        &self,
        ctx: &OperationContext,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let caches = self.caches()?;
        match &ctx.op {
            Operation::Add(op) => self.add(caches, ctx, op, next),
            Operation::Delete(op) => self.delete(caches, ctx, op, next),
            Operation::Modify(op) => self.modify(caches, ctx, op, next),
            Operation::Rename(op) => self.rename(caches, ctx, op, next),
            Operation::Move(op) => self.move_entry(caches, ctx, op, next),
            Operation::MoveAndRename(op) => self.move_and_rename(caches, ctx, op, next),
            Operation::Compare(op) => self.compare(caches, ctx, op, next),
            Operation::Lookup(op) => self.lookup(caches, ctx, op, next),
            Operation::HasEntry(op) => self.has_entry(caches, ctx, op, next),
            Operation::Search(op) => self.search(caches, ctx, op, next),
        }
    }
}
