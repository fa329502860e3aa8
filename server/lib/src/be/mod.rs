//! The backend is the storage collaborator at the end of every interceptor chain. This
//! module defines what the rest of the server needs from storage: DN exact lookups,
//! scoped searches that return a cursor, and the mutating operations.
//!
//! [`memory::MemoryBackend`] is a complete in memory implementation, used by the test
//! suites and by small deployments.

use std::fmt;
use std::sync::Arc;

use crate::prelude::*;

pub mod memory;

pub use self::memory::MemoryBackend;

pub trait Backend: Send + Sync {
    fn add(&self, entry: Entry) -> Result<(), OperationError>;

    fn delete(&self, dn: &Dn) -> Result<(), OperationError>;

    fn modify(&self, dn: &Dn, mods: &ModifyList) -> Result<(), OperationError>;

    fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool)
        -> Result<(), OperationError>;

    fn move_entry(&self, dn: &Dn, new_superior: &Dn) -> Result<(), OperationError>;

    fn move_and_rename(
        &self,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: &Rdn,
        delete_old_rdn: bool,
    ) -> Result<(), OperationError>;

    /// The entry with all user and operational attributes, or `None` if it does not
    /// exist.
    fn lookup(&self, dn: &Dn) -> Result<Option<Arc<Entry>>, OperationError>;

    fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
    ) -> Result<EntryCursor, OperationError>;

    fn compare(&self, dn: &Dn, attr: &str, value: &str) -> Result<bool, OperationError>;

    /// The naming contexts this backend holds.
    fn suffixes(&self) -> Vec<Dn>;

    /// Number of immediate subordinates of `dn`.
    fn count_children(&self, dn: &Dn) -> Result<usize, OperationError> {
        self.search(dn, SearchScope::OneLevel, &Filter::all())?
            .try_fold(0, |acc, r| r.map(|_| acc + 1))
    }
}

/// A predicate applied to every candidate leaving a cursor. It may drop the candidate by
/// returning `None`, or return a reduced copy of it.
pub trait EntryFilter: Send + Sync {
    fn accept(&self, entry: Arc<Entry>) -> Result<Option<Arc<Entry>>, OperationError>;
}

/// A lazy sequence of search results, with the filters that were attached to it along
/// the way. Filters are applied in the order they were added.
pub struct EntryCursor {
    inner: Box<dyn Iterator<Item = Result<Arc<Entry>, OperationError>> + Send>,
    filters: Vec<Arc<dyn EntryFilter>>,
}

impl EntryCursor {
    pub fn new<I>(inner: I) -> Self
    where
        I: Iterator<Item = Result<Arc<Entry>, OperationError>> + Send + 'static,
    {
        EntryCursor {
            inner: Box::new(inner),
            filters: Vec::with_capacity(0),
        }
    }

    pub fn from_entries(entries: Vec<Arc<Entry>>) -> Self {
        EntryCursor::new(entries.into_iter().map(Ok))
    }

    pub fn add_filter(&mut self, filter: Arc<dyn EntryFilter>) {
        self.filters.push(filter);
    }

    fn apply_filters(&self, entry: Arc<Entry>) -> Result<Option<Arc<Entry>>, OperationError> {
        self.filters
            .iter()
            .try_fold(Some(entry), |acc, f| match acc {
                Some(e) => f.accept(e),
                None => Ok(None),
            })
    }
}

impl Iterator for EntryCursor {
    type Item = Result<Arc<Entry>, OperationError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(e) => e,
                Err(e) => return Some(Err(e)),
            };
            match self.apply_filters(entry) {
                Ok(Some(e)) => return Some(Ok(e)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl fmt::Debug for EntryCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryCursor")
            .field("filters", &self.filters.len())
            .finish()
    }
}
