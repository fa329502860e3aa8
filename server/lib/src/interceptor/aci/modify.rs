use std::collections::BTreeSet;

use super::{lookup_required, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{check_permission, AciContext, AciTuple, MicroOperation, Requester};
use crate::cache::{CacheUpdate, TupleCache};
use crate::interceptor::{ModifyOperation, Next, OperationContext, OperationOutcome};
use crate::prelude::*;

lazy_static! {
    static ref NO_VALUES: BTreeSet<String> = BTreeSet::new();
}

/// Check one modification against the view left by the ones before it, returning the
/// view after it.
///
/// Values that appear need `Add`, values that disappear need `Remove`. An attribute that
/// comes into existence needs `Add` on its type, one that is emptied needs `Remove` on
/// it. Added values are checked against the view after the change so value count limits
/// see the count the entry would end up with.
fn check_modification(
    requester: &Requester,
    entry: &Entry,
    tuples: &[AciTuple],
    view: EntryView,
    modify: &Modify,
) -> Result<EntryView, OperationError> {
    let attr = modify.attr();
    let post = view.apply(modify);

    let before = view.get_ava_set(attr).unwrap_or(&NO_VALUES);
    let after = post.get_ava_set(attr).unwrap_or(&NO_VALUES);

    let check = |ops: &[MicroOperation], at: &EntryView, value: Option<&str>| {
        let acx = AciContext::new(requester, entry, ops, tuples).with_view(at);
        match value {
            Some(v) => check_permission(&acx.with_value(attr, v)),
            None => check_permission(&acx.with_attr(attr)),
        }
    };

    if before.is_empty() && !after.is_empty() {
        check(&[MicroOperation::Add], &post, None)?;
    }
    for removed in before.difference(after) {
        check(&[MicroOperation::Remove], &view, Some(removed.as_str()))?;
    }
    for added in after.difference(before) {
        check(&[MicroOperation::Add], &post, Some(added.as_str()))?;
    }
    if !before.is_empty() && after.is_empty() {
        check(&[MicroOperation::Remove], &view, None)?;
    }

    Ok(post)
}

impl AciAuthorizationInterceptor {
    #[instrument(level = "debug", name = "aci::modify", skip_all, fields(dn = %op.dn))]
    pub(super) fn modify(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &ModifyOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        if op.mods.is_empty() {
            return Err(OperationError::EmptyRequest);
        }

        let be = next.backend().as_ref();
        let pre = lookup_required(be, &op.dn)?;

        // The entry as it will be stored must still be a valid access control subentry.
        let projected = op
            .mods
            .iter()
            .fold(EntryView::from(pre.as_ref()), |view, m| view.apply(m));
        TupleCache::validate_subentry(&Entry::from(projected))?;

        if !self.bypass(caches, ctx) {
            let requester = self.requester(caches, ctx);
            debug!(requester = %requester.dn, mods = op.mods.len(), "Access check for modify event");

            let tuples = self.tuples_for(caches, be, &pre, true)?;
            op.mods
                .iter()
                .try_fold(EntryView::from(pre.as_ref()), |view, m| {
                    check_modification(&requester, &pre, &tuples, view, m)
                })
                .map_err(|e| {
                    security_access!(dn = %op.dn, "denied ❌ - modify");
                    e
                })?;
        }

        let outcome = next.proceed(ctx)?;

        caches.groups.group_modified(&op.dn, &op.mods, &pre);
        match be.lookup(&op.dn)? {
            Some(post) => {
                if let CacheUpdate::Updated = caches.tuples.subentry_modified(&op.dn, &op.mods, &post)? {
                    admin_info!(dn = %op.dn, "access control subentry updated");
                }
            }
            None => {
                admin_warn!(dn = %op.dn, "modified entry vanished before the caches were updated");
            }
        }
        Ok(outcome)
    }
}
