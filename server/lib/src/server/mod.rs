//! `server` contains the directory server, the high level entry point that turns requests
//! made under a session into operations and runs them through the interceptor chain.

use std::sync::Arc;

use crate::be::Backend;
use crate::interceptor::{
    AddOperation, CompareOperation, DeleteOperation, HasEntryOperation, LookupOperation,
    ModifyOperation, MoveAndRenameOperation, MoveOperation, RenameOperation, SearchOperation,
};
use crate::prelude::*;

#[cfg(test)]
mod tests;

pub struct DirectoryServer {
    config: Configuration,
    chain: InterceptorChain,
}

impl DirectoryServer {
    /// Build a server with the standard stages: access control items first, then the
    /// default policy. Only one of them enforces anything, depending on the
    /// configuration, and both share the group cache. Both are initialised, caches
    /// loaded, before this returns.
    pub fn new(config: &Configuration, be: Arc<dyn Backend>) -> Result<Self, OperationError> {
        let aci = AciAuthorizationInterceptor::new(config);
        // One answer to "is this an administrator", kept up to date by the aci stage.
        let default =
            DefaultAuthorizationInterceptor::with_group_cache(config, aci.group_cache().clone());
        let stages: Vec<Box<dyn Interceptor>> = vec![Box::new(aci), Box::new(default)];
        Self::with_interceptors(config, be, stages)
    }

    pub fn with_interceptors(
        config: &Configuration,
        be: Arc<dyn Backend>,
        stages: Vec<Box<dyn Interceptor>>,
    ) -> Result<Self, OperationError> {
        let chain = InterceptorChain::new(stages, be)?;
        admin_info!(
            stages = ?chain.stage_ids(),
            access_control_enabled = config.access_control_enabled,
            "directory server ready"
        );
        Ok(DirectoryServer {
            config: config.clone(),
            chain,
        })
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn stage_ids(&self) -> Vec<&'static str> {
        self.chain.stage_ids()
    }

    fn execute(&self, session: &Session, op: Operation) -> Result<OperationOutcome, OperationError> {
        let ctx = OperationContext::new(Arc::new(session.clone()), op);
        self.chain.execute(&ctx).map_err(|e| {
            request_error!(
                principal = %ctx.principal(),
                op = ctx.op.name(),
                target = %ctx.op.target(),
                err = ?e,
                "operation failed"
            );
            e
        })
    }

    pub fn add(&self, session: &Session, entry: Entry) -> Result<(), OperationError> {
        self.execute(session, Operation::Add(AddOperation { entry }))?
            .into_done()
    }

    pub fn delete(&self, session: &Session, dn: &Dn) -> Result<(), OperationError> {
        self.execute(session, Operation::Delete(DeleteOperation { dn: dn.clone() }))?
            .into_done()
    }

    pub fn modify(
        &self,
        session: &Session,
        dn: &Dn,
        mods: ModifyList,
    ) -> Result<(), OperationError> {
        self.execute(
            session,
            Operation::Modify(ModifyOperation {
                dn: dn.clone(),
                mods,
            }),
        )?
        .into_done()
    }

    pub fn rename(
        &self,
        session: &Session,
        dn: &Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
    ) -> Result<(), OperationError> {
        self.execute(
            session,
            Operation::Rename(RenameOperation {
                dn: dn.clone(),
                new_rdn,
                delete_old_rdn,
            }),
        )?
        .into_done()
    }

    pub fn move_entry(
        &self,
        session: &Session,
        dn: &Dn,
        new_superior: &Dn,
    ) -> Result<(), OperationError> {
        self.execute(
            session,
            Operation::Move(MoveOperation {
                dn: dn.clone(),
                new_superior: new_superior.clone(),
            }),
        )?
        .into_done()
    }

    pub fn move_and_rename(
        &self,
        session: &Session,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: Rdn,
        delete_old_rdn: bool,
    ) -> Result<(), OperationError> {
        self.execute(
            session,
            Operation::MoveAndRename(MoveAndRenameOperation {
                dn: dn.clone(),
                new_superior: new_superior.clone(),
                new_rdn,
                delete_old_rdn,
            }),
        )?
        .into_done()
    }

    pub fn compare(
        &self,
        session: &Session,
        dn: &Dn,
        attr: &str,
        value: &str,
    ) -> Result<bool, OperationError> {
        self.execute(
            session,
            Operation::Compare(CompareOperation {
                dn: dn.clone(),
                attr: attr.to_lowercase(),
                value: value.to_string(),
            }),
        )?
        .into_bool()
    }

    /// Read one entry. `attrs` limits what is returned; `None` returns every attribute
    /// the session may read.
    pub fn lookup(
        &self,
        session: &Session,
        dn: &Dn,
        attrs: Option<Vec<String>>,
    ) -> Result<Arc<Entry>, OperationError> {
        self.execute(
            session,
            Operation::Lookup(LookupOperation {
                dn: dn.clone(),
                attrs,
            }),
        )?
        .into_entry()
    }

    pub fn has_entry(&self, session: &Session, dn: &Dn) -> Result<bool, OperationError> {
        self.execute(session, Operation::HasEntry(HasEntryOperation { dn: dn.clone() }))?
            .into_bool()
    }

    /// Run a search and collect what it returns. Candidates the session may not see are
    /// left out; the search itself does not fail because of them.
    pub fn search(
        &self,
        session: &Session,
        base: &Dn,
        scope: SearchScope,
        filter: Filter,
        attrs: Option<Vec<String>>,
    ) -> Result<Vec<Arc<Entry>>, OperationError> {
        self.execute(
            session,
            Operation::Search(SearchOperation {
                base: base.clone(),
                scope,
                filter,
                attrs,
            }),
        )?
        .into_cursor()?
        .collect()
    }
}
