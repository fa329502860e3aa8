use super::{lookup_required, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{check_permission, AciContext};
use crate::cache::CacheUpdate;
use crate::interceptor::{DeleteOperation, Next, OperationContext, OperationOutcome};
use crate::prelude::*;

impl AciAuthorizationInterceptor {
    #[instrument(level = "debug", name = "aci::delete", skip_all, fields(dn = %op.dn))]
    pub(super) fn delete(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &DeleteOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let bypass = self.bypass(caches, ctx);
        if !bypass {
            self.protect_critical(&op.dn)?;
        }

        let be = next.backend().as_ref();
        // Needed after the entry is gone to tell the caches what it was.
        let entry = lookup_required(be, &op.dn)?;

        if !bypass {
            let requester = self.requester(caches, ctx);
            debug!(requester = %requester.dn, "Access check for delete event");

            let tuples = self.tuples_for(caches, be, &entry, true)?;
            check_permission(&AciContext::new(&requester, &entry, &REMOVE_PERMS, &tuples))
                .map_err(|e| {
                    security_access!(dn = %op.dn, "denied ❌ - delete");
                    e
                })?;
        }

        let outcome = next.proceed(ctx)?;

        if let CacheUpdate::Updated = caches.tuples.subentry_deleted(&op.dn, &entry) {
            admin_info!(dn = %op.dn, "access control subentry removed");
        }
        caches.groups.group_deleted(&op.dn);
        Ok(outcome)
    }
}
