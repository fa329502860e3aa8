//! The fixed authorization policy used when access control items are switched off.
//!
//! Everything under the users and groups bases, plus the administrator and the
//! administrators group themselves, is protected. Only administrators may change
//! protected entries, with one exception: anyone may modify their own entry as long as
//! the change leaves who they are and what they may do alone. Outside of the protected
//! areas this stage lets everything through.

use std::sync::Arc;

use crate::be::{Backend, EntryFilter};
use crate::config::Configuration;
use crate::interceptor::{Interceptor, Next, Operation, OperationContext, OperationOutcome};
use crate::prelude::*;

#[derive(Clone)]
struct ProtectedAreas {
    admin_dn: Dn,
    admin_group_dn: Dn,
    users_base_dn: Dn,
    groups_base_dn: Dn,
}

impl ProtectedAreas {
    fn is_critical(&self, dn: &Dn) -> bool {
        *dn == self.admin_dn || *dn == self.admin_group_dn
    }

    fn is_protected(&self, dn: &Dn) -> bool {
        self.is_critical(dn)
            || dn.is_descendant_of(&self.users_base_dn)
            || dn.is_descendant_of(&self.groups_base_dn)
    }
}

pub struct DefaultAuthorizationInterceptor {
    enabled: bool,
    areas: ProtectedAreas,
    groups: Arc<GroupCache>,
    // False when another stage loads and maintains the group cache.
    owns_groups: bool,
}

impl DefaultAuthorizationInterceptor {
    /// A stage with a group cache of its own, reloaded whenever the administrators group
    /// changes.
    pub fn new(config: &Configuration) -> Self {
        let groups = Arc::new(GroupCache::new(
            config.admin_dn.clone(),
            config.admin_group_dn.clone(),
        ));
        let mut stage = Self::with_group_cache(config, groups);
        stage.owns_groups = true;
        stage
    }

    /// A stage asking `groups` who the administrators are. Whoever owns the cache keeps it
    /// loaded and up to date.
    pub fn with_group_cache(config: &Configuration, groups: Arc<GroupCache>) -> Self {
        DefaultAuthorizationInterceptor {
            // The two policies are alternatives. This one only runs without aci.
            enabled: !config.access_control_enabled,
            areas: ProtectedAreas {
                admin_dn: config.admin_dn.clone(),
                admin_group_dn: config.admin_group_dn.clone(),
                users_base_dn: config.users_base_dn.clone(),
                groups_base_dn: config.groups_base_dn.clone(),
            },
            groups,
            owns_groups: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn is_administrator(&self, dn: &Dn) -> bool {
        self.groups.is_administrator(dn)
    }

    fn deny(&self, principal: &Dn, target: &Dn, op: &str) -> OperationError {
        security_access!(%principal, %target, "denied ❌ - {} of protected entry", op);
        OperationError::AccessDenied
    }

    /// Removing or renaming the administrator or its group is refused to everybody.
    fn protect_critical(&self, dn: &Dn) -> Result<(), OperationError> {
        if self.areas.is_critical(dn) {
            security_error!(%dn, "denied ❌ - critical entry is protected");
            return Err(OperationError::CriticalEntryProtected);
        }
        Ok(())
    }

    fn check_relocation(
        &self,
        principal: &Dn,
        dn: &Dn,
        new_dn: Option<&Dn>,
        op: &str,
    ) -> Result<(), OperationError> {
        self.protect_critical(dn)?;
        if self.is_administrator(principal) {
            return Ok(());
        }
        let into_protected = new_dn.map(|d| self.areas.is_protected(d)).unwrap_or(false);
        if self.areas.is_protected(dn) || into_protected {
            return Err(self.deny(principal, dn, op));
        }
        Ok(())
    }
}

/// Hides protected entries other than the requester's own.
struct ProtectedEntryFilter {
    areas: ProtectedAreas,
    principal: Dn,
}

impl EntryFilter for ProtectedEntryFilter {
    fn accept(&self, entry: Arc<Entry>) -> Result<Option<Arc<Entry>>, OperationError> {
        let dn = entry.get_dn();
        if self.areas.is_protected(dn) && *dn != self.principal {
            trace!(%dn, "protected entry hidden from search");
            return Ok(None);
        }
        Ok(Some(entry))
    }
}

impl Interceptor for DefaultAuthorizationInterceptor {
    fn id(&self) -> &'static str {
        "default_authorization"
    }

    #[instrument(level = "debug", name = "default::init", skip_all)]
    fn init(&mut self, be: &Arc<dyn Backend>) -> Result<(), OperationError> {
        if self.enabled && self.owns_groups {
            self.groups.load(be.as_ref())?;
        }
        admin_info!(
            enabled = self.enabled,
            owns_groups = self.owns_groups,
            "default authorization initialised"
        );
        Ok(())
    }

    #[instrument(level = "debug", name = "default::handle", skip_all, fields(op = ctx.op.name()))]
    fn handle(
        &self,
        ctx: &OperationContext,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError> {
        if !self.enabled {
            return next.proceed(ctx);
        }

        let principal = ctx.principal().get_dn();
        let admin = self.is_administrator(principal);

        match &ctx.op {
            Operation::Delete(op) => {
                self.protect_critical(&op.dn)?;
                if !admin && self.areas.is_protected(&op.dn) {
                    return Err(self.deny(principal, &op.dn, "delete"));
                }
            }
            Operation::Modify(op) => {
                if !admin && self.areas.is_protected(&op.dn) {
                    let own_entry = op.dn == *principal;
                    let shifting = op.mods.iter().find(|m| is_identity_shifting(m.attr()));
                    match (own_entry, shifting) {
                        (true, None) => {
                            trace!(dn = %op.dn, "self modification allowed");
                        }
                        (true, Some(m)) => {
                            security_access!(dn = %op.dn, attr = m.attr(), "denied ❌ - self modification of identity attribute");
                            return Err(OperationError::AccessDenied);
                        }
                        (false, _) => return Err(self.deny(principal, &op.dn, "modify")),
                    }
                }
            }
            Operation::Rename(op) => {
                self.check_relocation(principal, &op.dn, op.new_dn().as_ref(), "rename")?;
            }
            Operation::Move(op) => {
                self.check_relocation(principal, &op.dn, op.new_dn().as_ref(), "move")?;
            }
            Operation::MoveAndRename(op) => {
                self.check_relocation(principal, &op.dn, Some(&op.new_dn()), "move and rename")?;
            }
            Operation::Lookup(op) => {
                if !admin && self.areas.is_protected(&op.dn) && op.dn != *principal {
                    return Err(self.deny(principal, &op.dn, "lookup"));
                }
            }
            Operation::Search(_) => {
                let mut cursor = next.proceed(ctx)?.into_cursor()?;
                if !admin {
                    cursor.add_filter(Arc::new(ProtectedEntryFilter {
                        areas: self.areas.clone(),
                        principal: principal.clone(),
                    }));
                }
                return Ok(OperationOutcome::Search(cursor));
            }
            Operation::Add(_) | Operation::Compare(_) | Operation::HasEntry(_) => {}
        }

        let outcome = next.proceed(ctx)?;

        if self.owns_groups {
            let admin_group_changed = match &ctx.op {
                Operation::Add(op) => *op.entry.get_dn() == self.areas.admin_group_dn,
                Operation::Modify(op) => op.dn == self.areas.admin_group_dn,
                _ => false,
            };
            if admin_group_changed {
                debug!("administrators group changed, reloading group cache");
                self.groups.load(next.backend().as_ref())?;
            }
        }
        Ok(outcome)
    }
}
