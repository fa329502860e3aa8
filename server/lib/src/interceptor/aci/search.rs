use std::sync::Arc;

use super::{collect_tuples, readable, AciAuthorizationInterceptor, AciCaches};
use crate::aci::{has_permission, AciContext, AciParser, Requester};
use crate::be::{Backend, EntryFilter};
use crate::interceptor::{Next, OperationContext, OperationOutcome, SearchOperation};
use crate::prelude::*;

/// Decides, candidate by candidate, what a search returns. Entries the requester may not
/// browse are dropped. Of the rest only what the requester may read is returned.
struct SearchAccessFilter {
    requester: Requester,
    caches: AciCaches,
    parser: Arc<dyn AciParser>,
    be: Arc<dyn Backend>,
}

impl EntryFilter for SearchAccessFilter {
    fn accept(&self, entry: Arc<Entry>) -> Result<Option<Arc<Entry>>, OperationError> {
        let tuples = collect_tuples(
            &self.caches,
            self.parser.as_ref(),
            self.be.as_ref(),
            &entry,
            true,
        )?;

        let acx = AciContext::new(&self.requester, &entry, &SEARCH_ENTRY_PERMS, &tuples);
        if !has_permission(&acx) {
            trace!(dn = %entry.get_dn(), "search candidate hidden");
            return Ok(None);
        }

        Ok(Some(Arc::new(readable(&self.requester, &entry, &tuples))))
    }
}

impl AciAuthorizationInterceptor {
    #[instrument(level = "debug", name = "aci::search", skip_all, fields(base = %op.base, filter = %op.filter))]
    pub(super) fn search(
        &self,
        caches: &AciCaches,
        ctx: &OperationContext,
        op: &SearchOperation,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        if self.bypass(caches, ctx) {
            return next.proceed(ctx);
        }

        let requester = self.requester(caches, ctx);
        debug!(requester = %requester.dn, "Access check for search event");

        let mut cursor = next.proceed(ctx)?.into_cursor()?;
        cursor.add_filter(Arc::new(SearchAccessFilter {
            requester,
            caches: caches.clone(),
            parser: self.parser.clone(),
            be: next.backend().clone(),
        }));
        Ok(OperationOutcome::Search(cursor))
    }
}
