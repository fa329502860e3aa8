//! Interceptors are the stages every directory operation passes through before it reaches
//! the backend. A chain is an ordered list of stages. Each stage receives the operation
//! and a [`Next`] cursor over the stages after it, and decides whether to forward, to
//! forward and then act on the result, or to fail the operation without forwarding.
//!
//! ```text
//!  request -> [ aci ] -> [ default ] -> backend
//!                  \           \
//!                   Next        Next
//! ```
//!
//! When the cursor is exhausted, [`Next::proceed`] dispatches to the backend.

use std::fmt;
use std::sync::Arc;

use crate::be::{Backend, EntryCursor, EntryFilter};
use crate::prelude::*;

pub mod aci;
pub mod default;

pub use self::aci::AciAuthorizationInterceptor;
pub use self::default::DefaultAuthorizationInterceptor;

#[derive(Debug, Clone)]
pub struct AddOperation {
    pub entry: Entry,
}

#[derive(Debug, Clone)]
pub struct DeleteOperation {
    pub dn: Dn,
}

#[derive(Debug, Clone)]
pub struct ModifyOperation {
    pub dn: Dn,
    pub mods: ModifyList,
}

#[derive(Debug, Clone)]
pub struct RenameOperation {
    pub dn: Dn,
    pub new_rdn: Rdn,
    pub delete_old_rdn: bool,
}

impl RenameOperation {
    pub fn new_dn(&self) -> Option<Dn> {
        self.dn.parent().map(|p| p.child(self.new_rdn.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct MoveOperation {
    pub dn: Dn,
    pub new_superior: Dn,
}

impl MoveOperation {
    pub fn new_dn(&self) -> Option<Dn> {
        self.dn
            .rdn()
            .map(|rdn| self.new_superior.child(rdn.clone()))
    }
}

#[derive(Debug, Clone)]
pub struct MoveAndRenameOperation {
    pub dn: Dn,
    pub new_superior: Dn,
    pub new_rdn: Rdn,
    pub delete_old_rdn: bool,
}

impl MoveAndRenameOperation {
    pub fn new_dn(&self) -> Dn {
        self.new_superior.child(self.new_rdn.clone())
    }
}

#[derive(Debug, Clone)]
pub struct CompareOperation {
    pub dn: Dn,
    pub attr: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct LookupOperation {
    pub dn: Dn,
    /// Attributes to return. `None` returns all of them.
    pub attrs: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct HasEntryOperation {
    pub dn: Dn,
}

#[derive(Debug, Clone)]
pub struct SearchOperation {
    pub base: Dn,
    pub scope: SearchScope,
    pub filter: Filter,
    pub attrs: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub enum Operation {
    Add(AddOperation),
    Delete(DeleteOperation),
    Modify(ModifyOperation),
    Rename(RenameOperation),
    Move(MoveOperation),
    MoveAndRename(MoveAndRenameOperation),
    Compare(CompareOperation),
    Lookup(LookupOperation),
    HasEntry(HasEntryOperation),
    Search(SearchOperation),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Add(_) => "add",
            Operation::Delete(_) => "delete",
            Operation::Modify(_) => "modify",
            Operation::Rename(_) => "rename",
            Operation::Move(_) => "move",
            Operation::MoveAndRename(_) => "move_and_rename",
            Operation::Compare(_) => "compare",
            Operation::Lookup(_) => "lookup",
            Operation::HasEntry(_) => "has_entry",
            Operation::Search(_) => "search",
        }
    }

    /// The name the operation acts on.
    pub fn target(&self) -> &Dn {
        match self {
            Operation::Add(op) => op.entry.get_dn(),
            Operation::Delete(DeleteOperation { dn })
            | Operation::Modify(ModifyOperation { dn, .. })
            | Operation::Rename(RenameOperation { dn, .. })
            | Operation::Move(MoveOperation { dn, .. })
            | Operation::MoveAndRename(MoveAndRenameOperation { dn, .. })
            | Operation::Compare(CompareOperation { dn, .. })
            | Operation::Lookup(LookupOperation { dn, .. })
            | Operation::HasEntry(HasEntryOperation { dn }) => dn,
            Operation::Search(op) => &op.base,
        }
    }
}

/// An operation and the session that requested it.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub session: Arc<Session>,
    pub op: Operation,
}

impl OperationContext {
    pub fn new(session: Arc<Session>, op: Operation) -> Self {
        OperationContext { session, op }
    }

    /// The principal access controls apply to.
    pub fn principal(&self) -> &Principal {
        self.session.effective_principal()
    }
}

pub enum OperationOutcome {
    Done,
    Compare(bool),
    HasEntry(bool),
    Entry(Arc<Entry>),
    Search(EntryCursor),
}

impl fmt::Debug for OperationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationOutcome::Done => write!(f, "Done"),
            OperationOutcome::Compare(b) => write!(f, "Compare({})", b),
            OperationOutcome::HasEntry(b) => write!(f, "HasEntry({})", b),
            OperationOutcome::Entry(e) => write!(f, "Entry({})", e.get_dn()),
            OperationOutcome::Search(c) => write!(f, "Search({:?})", c),
        }
    }
}

impl OperationOutcome {
    pub fn into_done(self) -> Result<(), OperationError> {
        match self {
            OperationOutcome::Done => Ok(()),
            other => unexpected_outcome("done", &other),
        }
    }

    pub fn into_bool(self) -> Result<bool, OperationError> {
        match self {
            OperationOutcome::Compare(b) | OperationOutcome::HasEntry(b) => Ok(b),
            other => unexpected_outcome("bool", &other),
        }
    }

    pub fn into_entry(self) -> Result<Arc<Entry>, OperationError> {
        match self {
            OperationOutcome::Entry(e) => Ok(e),
            other => unexpected_outcome("entry", &other),
        }
    }

    pub fn into_cursor(self) -> Result<EntryCursor, OperationError> {
        match self {
            OperationOutcome::Search(c) => Ok(c),
            other => unexpected_outcome("search", &other),
        }
    }
}

fn unexpected_outcome<T>(expected: &str, got: &OperationOutcome) -> Result<T, OperationError> {
    admin_error!(?got, "expected a {} outcome", expected);
    debug_assert!(false);
    Err(OperationError::InvalidState)
}

/// A stage of an interceptor chain.
pub trait Interceptor: Send + Sync {
    fn id(&self) -> &'static str;

    /// Called once with the backend before the stage handles any operation.
    fn init(&mut self, _be: &Arc<dyn Backend>) -> Result<(), OperationError> {
        Ok(())
    }

    fn handle(
        &self,
        ctx: &OperationContext,
        next: Next<'_>,
    ) -> Result<OperationOutcome, OperationError>;
}

/// The stages remaining after the current one, and the backend behind them.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    stages: &'a [Box<dyn Interceptor>],
    be: &'a Arc<dyn Backend>,
}

impl<'a> Next<'a> {
    pub fn new(stages: &'a [Box<dyn Interceptor>], be: &'a Arc<dyn Backend>) -> Self {
        Next { stages, be }
    }

    /// Forward the operation to the next stage, or to the backend if there is none.
    pub fn proceed(self, ctx: &OperationContext) -> Result<OperationOutcome, OperationError> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                trace!(stage = stage.id(), "forwarding");
                stage.handle(ctx, Next::new(rest, self.be))
            }
            None => dispatch(self.be.as_ref(), &ctx.op),
        }
    }

    pub fn backend(&self) -> &'a Arc<dyn Backend> {
        self.be
    }
}

fn dispatch(be: &dyn Backend, op: &Operation) -> Result<OperationOutcome, OperationError> {
    match op {
        Operation::Add(op) => be.add(op.entry.clone()).map(|_| OperationOutcome::Done),
        Operation::Delete(op) => be.delete(&op.dn).map(|_| OperationOutcome::Done),
        Operation::Modify(op) => be.modify(&op.dn, &op.mods).map(|_| OperationOutcome::Done),
        Operation::Rename(op) => be
            .rename(&op.dn, &op.new_rdn, op.delete_old_rdn)
            .map(|_| OperationOutcome::Done),
        Operation::Move(op) => be
            .move_entry(&op.dn, &op.new_superior)
            .map(|_| OperationOutcome::Done),
        Operation::MoveAndRename(op) => be
            .move_and_rename(&op.dn, &op.new_superior, &op.new_rdn, op.delete_old_rdn)
            .map(|_| OperationOutcome::Done),
        Operation::Compare(op) => be
            .compare(&op.dn, &op.attr, &op.value)
            .map(OperationOutcome::Compare),
        Operation::Lookup(op) => match be.lookup(&op.dn)? {
            Some(e) => Ok(OperationOutcome::Entry(e)),
            None => Err(OperationError::NoMatchingEntries),
        },
        Operation::HasEntry(op) => {
            if op.dn.is_root() {
                return Ok(OperationOutcome::HasEntry(true));
            }
            be.lookup(&op.dn)
                .map(|e| OperationOutcome::HasEntry(e.is_some()))
        }
        Operation::Search(op) => be
            .search(&op.base, op.scope, &op.filter)
            .map(OperationOutcome::Search),
    }
}

/// Projects search results onto the requested attributes.
struct SelectAttributes(Vec<String>);

impl EntryFilter for SelectAttributes {
    fn accept(&self, entry: Arc<Entry>) -> Result<Option<Arc<Entry>>, OperationError> {
        Ok(Some(Arc::new(entry.select_attributes(Some(self.0.as_slice())))))
    }
}

/// The ordered stages in front of a backend. Every stage is initialised before the chain
/// exists, so no operation can reach a stage that has not loaded its state.
pub struct InterceptorChain {
    stages: Vec<Box<dyn Interceptor>>,
    be: Arc<dyn Backend>,
}

impl InterceptorChain {
    pub fn new(
        mut stages: Vec<Box<dyn Interceptor>>,
        be: Arc<dyn Backend>,
    ) -> Result<Self, OperationError> {
        for stage in stages.iter_mut() {
            stage.init(&be).map_err(|e| {
                admin_error!(?e, stage = stage.id(), "failed to initialise interceptor");
                e
            })?;
            debug!(stage = stage.id(), "interceptor initialised");
        }
        Ok(InterceptorChain { stages, be })
    }

    pub fn stage_ids(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.id()).collect()
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.be
    }

    /// Run the operation through every stage. Requested attributes are projected once the
    /// stages are done, so that stages see whole entries.
    #[instrument(level = "debug", name = "interceptor::execute", skip_all, fields(op = ctx.op.name(), target = %ctx.op.target()))]
    pub fn execute(&self, ctx: &OperationContext) -> Result<OperationOutcome, OperationError> {
        let outcome = Next::new(&self.stages, &self.be).proceed(ctx)?;
        match (&ctx.op, outcome) {
            (Operation::Lookup(LookupOperation { attrs: Some(attrs), .. }), OperationOutcome::Entry(e)) => {
                Ok(OperationOutcome::Entry(Arc::new(e.select_attributes(Some(attrs.as_slice())))))
            }
            (Operation::Search(SearchOperation { attrs: Some(attrs), .. }), OperationOutcome::Search(mut c)) => {
                c.add_filter(Arc::new(SelectAttributes(attrs.clone())));
                Ok(OperationOutcome::Search(c))
            }
            (_, outcome) => Ok(outcome),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::be::MemoryBackend;

    struct Recorder {
        id: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
        deny: bool,
    }

    impl Interceptor for Recorder {
        fn id(&self) -> &'static str {
            self.id
        }

        fn handle(
            &self,
            ctx: &OperationContext,
            next: Next<'_>,
        ) -> Result<OperationOutcome, OperationError> {
            self.seen.lock().expect("poisoned").push(self.id);
            if self.deny {
                return Err(OperationError::AccessDenied);
            }
            next.proceed(ctx)
        }
    }

    fn backend() -> Arc<dyn Backend> {
        let be = MemoryBackend::new(vec![Dn::parse("dc=example").expect("invalid dn")]);
        be.add(entry_init!("dc=example", (ATTR_OBJECTCLASS, CLASS_DOMAIN), (ATTR_DESCRIPTION, "root")))
            .expect("add failed");
        Arc::new(be)
    }

    fn lookup(attrs: Option<Vec<String>>) -> OperationContext {
        OperationContext::new(
            Arc::new(Session::anonymous()),
            Operation::Lookup(LookupOperation {
                dn: Dn::parse("dc=example").expect("invalid dn"),
                attrs,
            }),
        )
    }

    #[test]
    fn test_chain_runs_stages_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(
            vec![
                Box::new(Recorder { id: "first", seen: seen.clone(), deny: false }),
                Box::new(Recorder { id: "second", seen: seen.clone(), deny: false }),
            ],
            backend(),
        )
        .expect("chain init failed");

        let e = chain
            .execute(&lookup(Some(vec![ATTR_DESCRIPTION.to_string()])))
            .and_then(OperationOutcome::into_entry)
            .expect("lookup failed");
        assert_eq!(*seen.lock().expect("poisoned"), vec!["first", "second"]);
        assert!(e.attribute_pres(ATTR_DESCRIPTION));
        assert!(!e.attribute_pres(ATTR_OBJECTCLASS));
        assert_eq!(chain.stage_ids(), vec!["first", "second"]);
    }

    #[test]
    fn test_chain_short_circuits() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(
            vec![
                Box::new(Recorder { id: "deny", seen: seen.clone(), deny: true }),
                Box::new(Recorder { id: "never", seen: seen.clone(), deny: false }),
            ],
            backend(),
        )
        .expect("chain init failed");

        assert_eq!(
            chain.execute(&lookup(None)).map(|_| ()),
            Err(OperationError::AccessDenied)
        );
        assert_eq!(*seen.lock().expect("poisoned"), vec!["deny"]);
    }

    #[test]
    fn test_dispatch_missing_entry() {
        let chain = InterceptorChain::new(Vec::new(), backend()).expect("chain init failed");
        let ctx = OperationContext::new(
            Arc::new(Session::anonymous()),
            Operation::Lookup(LookupOperation {
                dn: Dn::parse("cn=nobody,dc=example").expect("invalid dn"),
                attrs: None,
            }),
        );
        assert_eq!(
            chain.execute(&ctx).map(|_| ()),
            Err(OperationError::NoMatchingEntries)
        );
        let ctx = OperationContext::new(
            Arc::new(Session::anonymous()),
            Operation::HasEntry(HasEntryOperation {
                dn: Dn::parse("cn=nobody,dc=example").expect("invalid dn"),
            }),
        );
        assert_eq!(
            chain.execute(&ctx).and_then(OperationOutcome::into_bool),
            Ok(false)
        );
    }
}
