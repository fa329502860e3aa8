use std::sync::Arc;

use super::{lookup_required, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{check_permission, AciContext, MicroOperation, Requester};
use crate::be::Backend;
use crate::interceptor::{
    MoveAndRenameOperation, MoveOperation, Next, OperationContext, OperationOutcome,
    RenameOperation,
};
use crate::prelude::*;

impl AciAuthorizationInterceptor {
    /// Read the entry being relocated and check `ops` on it where it is now.
    fn check_source(
        &self,
        caches: &AciCaches,
        be: &dyn Backend,
        requester: &Requester,
        dn: &Dn,
        ops: &[MicroOperation],
    ) -> Result<Arc<Entry>, OperationError> {
        let entry = lookup_required(be, dn)?;
        let tuples = self.tuples_for(caches, be, &entry, true)?;
        check_permission(&AciContext::new(requester, &entry, ops, &tuples))?;
        Ok(entry)
    }

    /// Check `Import` on the entry as it will be once relocated, against the tuples in
    /// force at the destination.
    fn check_destination(
        &self,
        caches: &AciCaches,
        be: &dyn Backend,
        requester: &Requester,
        provisional: &Entry,
    ) -> Result<(), OperationError> {
        let tuples = self.tuples_for(caches, be, provisional, true)?;
        check_permission(&AciContext::new(requester, provisional, &IMPORT_PERMS, &tuples))
    }

    /// Keep the caches in step with an entry, and everything below it, changing name.
    fn renamed(&self, caches: &AciCaches, old: &Dn, new: &Dn) -> Result<(), OperationError> {
        if caches.tuples.contains(old) {
            caches.tuples.subentry_renamed(old, new)?;
            admin_info!(%old, %new, "access control subentry renamed");
        }
        caches.tuples.rebase_subtree(old, new);
        caches.groups.group_renamed(old, new);
        Ok(())
    }

    #[instrument(level = "debug", name = "aci::rename", skip_all, fields(dn = %op.dn, new_rdn = %op.new_rdn))]
    pub(super) fn rename(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &RenameOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let new_dn = op.new_dn().ok_or_else(|| {
            OperationError::InvalidDn(format!("{} has no parent to be renamed under", op.dn))
        })?;

        if !self.bypass(caches, ctx) {
            self.protect_critical(&op.dn)?;
            let requester = self.requester(caches, ctx);
            debug!(requester = %requester.dn, "Access check for rename event");
            self.check_source(caches, next.backend().as_ref(), &requester, &op.dn, &RENAME_PERMS)
                .map_err(|e| {
                    security_access!(dn = %op.dn, "denied ❌ - rename");
                    e
                })?;
        }

        let outcome = next.proceed(ctx)?;
        self.renamed(caches, &op.dn, &new_dn)?;
        Ok(outcome)
    }

    #[instrument(level = "debug", name = "aci::move", skip_all, fields(dn = %op.dn, new_superior = %op.new_superior))]
    pub(super) fn move_entry(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &MoveOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let new_dn = op.new_dn().ok_or_else(|| {
            OperationError::InvalidDn(format!("{} has no rdn to be moved by", op.dn))
        })?;

        if !self.bypass(caches, ctx) {
            self.protect_critical(&op.dn)?;
            let requester = self.requester(caches, ctx);
            let be = next.backend().as_ref();
            debug!(requester = %requester.dn, "Access check for move event");

            let entry = self
                .check_source(caches, be, &requester, &op.dn, &EXPORT_PERMS)
                .map_err(|e| {
                    security_access!(dn = %op.dn, "denied ❌ - move, export at source");
                    e
                })?;
            self.check_destination(caches, be, &requester, &entry.with_dn(new_dn.clone()))
                .map_err(|e| {
                    security_access!(dn = %new_dn, "denied ❌ - move, import at destination");
                    e
                })?;
        }

        let outcome = next.proceed(ctx)?;
        self.renamed(caches, &op.dn, &new_dn)?;
        Ok(outcome)
    }

    #[instrument(level = "debug", name = "aci::move_and_rename", skip_all, fields(dn = %op.dn, new_superior = %op.new_superior, new_rdn = %op.new_rdn))]
    pub(super) fn move_and_rename(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &MoveAndRenameOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let new_dn = op.new_dn();

        if !self.bypass(caches, ctx) {
            self.protect_critical(&op.dn)?;
            let requester = self.requester(caches, ctx);
            let be = next.backend().as_ref();
            debug!(requester = %requester.dn, "Access check for move and rename event");

            let entry = self
                .check_source(caches, be, &requester, &op.dn, &MOVE_AND_RENAME_PERMS)
                .map_err(|e| {
                    security_access!(dn = %op.dn, "denied ❌ - move and rename at source");
                    e
                })?;

            let mut provisional = entry.with_dn(new_dn.clone());
            if op.delete_old_rdn {
                if let Some(old_rdn) = op.dn.rdn() {
                    provisional.remove_ava(old_rdn.attr(), old_rdn.value());
                }
            }
            provisional.add_ava(op.new_rdn.attr(), op.new_rdn.value());

            self.check_destination(caches, be, &requester, &provisional)
                .map_err(|e| {
                    security_access!(dn = %new_dn, "denied ❌ - move and rename, import at destination");
                    e
                })?;
        }

        let outcome = next.proceed(ctx)?;
        self.renamed(caches, &op.dn, &new_dn)?;
        Ok(outcome)
    }
}
