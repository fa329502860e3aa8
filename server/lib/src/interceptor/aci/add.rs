use super::{check_entry_and_attributes, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{AciTuple, ProtectedItem};
use crate::cache::{CacheUpdate, TupleCache};
use crate::interceptor::{AddOperation, Next, OperationContext, OperationOutcome};
use crate::prelude::*;

fn limits_imm_subordinates(tuples: &[AciTuple]) -> bool {
    tuples.iter().any(|t| {
        t.is_grant()
            && t.protected_items()
                .iter()
                .any(|pi| matches!(pi, ProtectedItem::MaxImmSub(_)))
    })
}

impl AciAuthorizationInterceptor {
    #[instrument(level = "debug", name = "aci::add", skip_all, fields(dn = %op.entry.get_dn()))]
    pub(super) fn add(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &AddOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        let entry = &op.entry;
        let dn = entry.get_dn();

        // Access control subentries must carry their prescriptive aci whoever adds them.
        TupleCache::validate_subentry(entry)?;

        if !self.bypass(caches, ctx) {
            let requester = self.requester(caches, ctx);
            let be = next.backend().as_ref();
            debug!(requester = %requester.dn, "Access check for add event");

            // The entry does not exist yet, so its own entryACI can not grant anything.
            let tuples = self.tuples_for(caches, be, entry, false)?;

            let imm_subordinates = match dn.parent() {
                Some(parent) if limits_imm_subordinates(&tuples) => {
                    Some(be.count_children(&parent)?)
                }
                _ => None,
            };

            check_entry_and_attributes(
                &requester,
                entry,
                &ADD_ENTRY_PERMS,
                &ADD_ATTRIBUTE_PERMS,
                &tuples,
                imm_subordinates,
            )
            .map_err(|e| {
                security_access!(%dn, "denied ❌ - add");
                e
            })?;
        }

        let outcome = next.proceed(ctx)?;

        if let CacheUpdate::Updated = caches.tuples.subentry_added(dn, entry)? {
            admin_info!(%dn, "access control subentry added");
        }
        caches.groups.group_added(entry);
        Ok(outcome)
    }
}
