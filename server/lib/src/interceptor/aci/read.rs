use std::sync::Arc;

use super::{lookup_required, readable, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{check_permission, has_permission, AciContext};
use crate::interceptor::{
    CompareOperation, HasEntryOperation, LookupOperation, Next, OperationContext,
    OperationOutcome,
};
use crate::prelude::*;

impl AciAuthorizationInterceptor {
    #[instrument(level = "debug", name = "aci::compare", skip_all, fields(dn = %op.dn, attr = %op.attr))]
    pub(super) fn compare(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &CompareOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        if self.bypass(caches, ctx) {
            return next.proceed(ctx);
        }

        let requester = self.requester(caches, ctx);
        let be = next.backend().as_ref();
        debug!(requester = %requester.dn, "Access check for compare event");

        let entry = lookup_required(be, &op.dn)?;
        let tuples = self.tuples_for(caches, be, &entry, true)?;
        let acx = AciContext::new(&requester, &entry, &COMPARE_ENTRY_PERMS, &tuples);
        check_permission(&acx)
            .and_then(|_| {
                let acx = AciContext::new(&requester, &entry, &COMPARE_PERMS, &tuples);
                check_permission(&acx.with_attr(&op.attr))?;
                check_permission(&acx.with_value(&op.attr, &op.value))
            })
            .map_err(|e| {
                security_access!(dn = %op.dn, attr = %op.attr, "denied ❌ - compare");
                e
            })?;

        next.proceed(ctx)
    }

    #[instrument(level = "debug", name = "aci::lookup", skip_all, fields(dn = %op.dn))]
    pub(super) fn lookup(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &LookupOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        if self.bypass(caches, ctx) {
            return next.proceed(ctx);
        }

        let requester = self.requester(caches, ctx);
        let be = next.backend().as_ref();
        debug!(requester = %requester.dn, "Access check for lookup event");

        let entry = lookup_required(be, &op.dn)?;
        let tuples = self.tuples_for(caches, be, &entry, true)?;
        check_permission(&AciContext::new(&requester, &entry, &LOOKUP_PERMS, &tuples)).map_err(
            |e| {
                security_access!(dn = %op.dn, "denied ❌ - lookup");
                e
            },
        )?;

        let found = next.proceed(ctx)?.into_entry()?;
        let reduced = readable(&requester, &found, &tuples);
        trace!(
            before = found.get_ava_names().count(),
            after = reduced.get_ava_names().count(),
            "reduced lookup result"
        );
        Ok(OperationOutcome::Entry(Arc::new(reduced)))
    }

    /// Existence is only disclosed to those who may browse the entry. Everyone else is
    /// told it does not exist.
    #[instrument(level = "debug", name = "aci::has_entry", skip_all, fields(dn = %op.dn))]
    pub(super) fn has_entry(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &HasEntryOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let exists = next.proceed(ctx)?.into_bool()?;
        if !exists || op.dn.is_root() || self.bypass(caches, ctx) {
            return Ok(OperationOutcome::HasEntry(exists));
        }

        let requester = self.requester(caches, ctx);
        let be = next.backend().as_ref();
        let Some(entry) = be.lookup(&op.dn)? else {
            return Ok(OperationOutcome::HasEntry(false));
        };
        let tuples = self.tuples_for(caches, be, &entry, true)?;
        let visible = has_permission(&AciContext::new(
            &requester,
            &entry,
            &HAS_ENTRY_PERMS,
            &tuples,
        ));
        Ok(OperationOutcome::HasEntry(visible))
    }
}
