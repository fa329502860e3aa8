//! Prescriptive ACI tuple cache. Holds, per access control subentry, the tuples parsed
//! from its `prescriptiveACI` values and the subtree specification saying which entries
//! of the administrative area they apply to.
//!
//! The keys are exactly the subentries carrying a `prescriptiveACI` attribute. A value
//! that fails to parse is skipped, and the subentry stays cached with the tuples that did
//! parse.

use std::sync::Arc;

use concread::bptree::BptreeMap;

use crate::aci::{parse_aci_values, AciParser, AciTuple, SubtreeSpecification};
use crate::be::Backend;
use crate::prelude::*;

lazy_static! {
    static ref EMPTY_TUPLES: Arc<Vec<AciTuple>> = Arc::new(Vec::new());
}

/// What a cache maintenance call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// The entry carries no prescriptive ACI, nothing was cached.
    Ignored,
    Updated,
}

#[derive(Debug)]
struct CachedSubentry {
    subtree: Option<SubtreeSpecification>,
    tuples: Arc<Vec<AciTuple>>,
}

pub struct TupleCache {
    subentries: BptreeMap<Dn, Arc<CachedSubentry>>,
    parser: Arc<dyn AciParser>,
}

impl TupleCache {
    pub fn new(parser: Arc<dyn AciParser>) -> Self {
        TupleCache {
            subentries: BptreeMap::new(),
            parser,
        }
    }

    /// Replace the content of the cache with every access control subentry below each
    /// suffix. Subentries that violate the schema are logged and skipped.
    #[instrument(level = "debug", name = "tuple_cache::load", skip_all)]
    pub fn load(&self, be: &dyn Backend) -> Result<(), OperationError> {
        let filter = f_eq(ATTR_OBJECTCLASS, CLASS_ACCESS_CONTROL_SUBENTRY);
        let mut txn = self.subentries.write();
        txn.clear();

        let mut loaded = 0usize;
        for suffix in be.suffixes() {
            let cursor = match be.search(&suffix, SearchScope::Subtree, &filter) {
                Ok(c) => c,
                Err(OperationError::NoMatchingEntries) => {
                    admin_warn!(%suffix, "suffix is not present, no subentries loaded from it");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for entry in cursor {
                let entry = entry?;
                match self.build(&entry) {
                    Ok(Some(cached)) => {
                        txn.insert(entry.get_dn().clone(), Arc::new(cached));
                        loaded += 1;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        admin_warn!(?e, subentry = %entry.get_dn(), "skipping invalid access control subentry");
                    }
                }
            }
        }

        admin_info!(subentries = loaded, "tuple cache loaded");
        txn.commit();
        Ok(())
    }

    /// Fails if `entry` is an access control subentry without `prescriptiveACI`.
    pub fn validate_subentry(entry: &Entry) -> Result<(), OperationError> {
        if entry.is_access_control_subentry() && !entry.attribute_pres(ATTR_PRESCRIPTIVE_ACI) {
            Err(OperationError::SchemaViolation(
                SchemaError::MissingMustAttribute(vec![ATTR_PRESCRIPTIVE_ACI.to_string()]),
            ))
        } else {
            Ok(())
        }
    }

    fn build(&self, entry: &Entry) -> Result<Option<CachedSubentry>, OperationError> {
        Self::validate_subentry(entry)?;
        let Some(values) = entry.get_ava_set(ATTR_PRESCRIPTIVE_ACI) else {
            return Ok(None);
        };

        let subtree = match entry.get_ava_single(ATTR_SUBTREE_SPECIFICATION) {
            None => Some(SubtreeSpecification::default()),
            Some(raw) => match raw.parse::<SubtreeSpecification>() {
                Ok(ss) => Some(ss),
                Err(e) => {
                    // The area can not be known, so the subentry selects nothing.
                    admin_warn!(?e, subentry = %entry.get_dn(), "invalid subtree specification");
                    None
                }
            },
        };

        let tuples = parse_aci_values(self.parser.as_ref(), values);
        debug!(subentry = %entry.get_dn(), tuples = tuples.len(), "parsed prescriptive aci");
        Ok(Some(CachedSubentry {
            subtree,
            tuples: Arc::new(tuples),
        }))
    }

    pub fn subentry_added(&self, dn: &Dn, entry: &Entry) -> Result<CacheUpdate, OperationError> {
        match self.build(entry)? {
            Some(cached) => {
                let mut txn = self.subentries.write();
                txn.insert(dn.clone(), Arc::new(cached));
                txn.commit();
                Ok(CacheUpdate::Updated)
            }
            None => Ok(CacheUpdate::Ignored),
        }
    }

    pub fn subentry_deleted(&self, dn: &Dn, entry: &Entry) -> CacheUpdate {
        if !entry.attribute_pres(ATTR_PRESCRIPTIVE_ACI) {
            return CacheUpdate::Ignored;
        }
        let mut txn = self.subentries.write();
        txn.remove(dn);
        txn.commit();
        CacheUpdate::Updated
    }

    /// Recompute the cached tuples of `dn` from `entry`, its state after `mods`, if the
    /// modify touched anything the cache is built from.
    pub fn subentry_modified(
        &self,
        dn: &Dn,
        mods: &ModifyList,
        entry: &Entry,
    ) -> Result<CacheUpdate, OperationError> {
        if !(mods.touches(ATTR_PRESCRIPTIVE_ACI)
            || mods.touches(ATTR_SUBTREE_SPECIFICATION)
            || mods.touches(ATTR_OBJECTCLASS))
        {
            return Ok(CacheUpdate::Ignored);
        }

        let rebuilt = self.build(entry);
        let mut txn = self.subentries.write();
        txn.remove(dn);
        let result = match rebuilt {
            Ok(Some(cached)) => {
                txn.insert(dn.clone(), Arc::new(cached));
                Ok(CacheUpdate::Updated)
            }
            Ok(None) => Ok(CacheUpdate::Updated),
            Err(e) => {
                // The stored entry no longer yields tuples, so none stay in force.
                admin_error!(?e, subentry = %dn, "modified subentry is invalid, dropping its tuples");
                Err(e)
            }
        };
        txn.commit();
        result
    }

    /// Move the tuples of a tracked subentry to its new name. Renaming a subentry the
    /// cache does not track is an internal error.
    pub fn subentry_renamed(&self, old: &Dn, new: &Dn) -> Result<(), OperationError> {
        let mut txn = self.subentries.write();
        let Some(cached) = txn.remove(old) else {
            admin_error!(%old, %new, "renamed subentry is not in the tuple cache");
            debug_assert!(false);
            return Err(OperationError::InvalidCacheState);
        };
        txn.insert(new.clone(), cached);
        txn.commit();
        Ok(())
    }

    /// Move every cached subentry strictly below `old_base` to the same place below
    /// `new_base`.
    pub fn rebase_subtree(&self, old_base: &Dn, new_base: &Dn) {
        let mut txn = self.subentries.write();
        let moved: Vec<(Dn, Arc<CachedSubentry>)> = txn
            .iter()
            .filter(|(k, _)| k.is_descendant_of(old_base))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if moved.is_empty() {
            return;
        }
        for (k, cached) in moved {
            txn.remove(&k);
            if let Some(rebased) = k.rebase(old_base, new_base) {
                txn.insert(rebased, cached);
            }
        }
        txn.commit();
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        self.subentries.read().get(dn).is_some()
    }

    /// The tuples of one subentry. Unknown subentries share a single empty list.
    pub fn get_tuples(&self, dn: &Dn) -> Arc<Vec<AciTuple>> {
        match self.subentries.read().get(dn) {
            Some(cached) => cached.tuples.clone(),
            None => EMPTY_TUPLES.clone(),
        }
    }

    /// The prescriptive tuples of every subentry whose area selects `dn`. The entry is
    /// needed to satisfy specification filters; without it those areas never select.
    pub fn prescriptive_tuples(&self, dn: &Dn, entry: Option<&Entry>) -> Vec<AciTuple> {
        let txn = self.subentries.read();
        let mut tuples = Vec::new();
        for (subentry_dn, cached) in txn.iter() {
            let (Some(admin_point), Some(subtree)) = (subentry_dn.parent(), &cached.subtree) else {
                continue;
            };
            if subtree.contains(&admin_point, dn, entry) {
                trace!(%subentry_dn, %dn, "prescriptive aci applies");
                tuples.extend(cached.tuples.iter().cloned());
            }
        }
        tuples
    }
}
