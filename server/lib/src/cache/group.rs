//! Group membership cache. Holds, per group entry, the set of member names, so that user
//! class checks and the administrator check never go to storage.
//!
//! Each member set is an immutable `Arc` that is swapped whole on change. A reader holding
//! a set keeps seeing the set as it was, never a half applied update.

use std::collections::BTreeSet;
use std::sync::Arc;

use concread::bptree::BptreeMap;

use crate::be::Backend;
use crate::prelude::*;

lazy_static! {
    static ref EMPTY_GROUPS: Arc<BTreeSet<Dn>> = Arc::new(BTreeSet::new());
}

/// The filter selecting every group entry.
pub fn group_filter() -> Filter {
    f_or(vec![
        f_eq(ATTR_OBJECTCLASS, CLASS_GROUP_OF_NAMES),
        f_eq(ATTR_OBJECTCLASS, CLASS_GROUP_OF_UNIQUE_NAMES),
    ])
}

pub struct GroupCache {
    groups: BptreeMap<Dn, Arc<BTreeSet<Dn>>>,
    admin_dn: Dn,
    admin_group_dn: Dn,
}

impl GroupCache {
    pub fn new(admin_dn: Dn, admin_group_dn: Dn) -> Self {
        GroupCache {
            groups: BptreeMap::new(),
            admin_dn,
            admin_group_dn,
        }
    }

    /// Replace the content of the cache with every group found below each suffix.
    #[instrument(level = "debug", name = "group_cache::load", skip_all)]
    pub fn load(&self, be: &dyn Backend) -> Result<(), OperationError> {
        let filter = group_filter();
        let mut txn = self.groups.write();
        txn.clear();

        let mut loaded = 0usize;
        for suffix in be.suffixes() {
            let cursor = match be.search(&suffix, SearchScope::Subtree, &filter) {
                Ok(c) => c,
                Err(OperationError::NoMatchingEntries) => {
                    admin_warn!(%suffix, "suffix is not present, no groups loaded from it");
                    continue;
                }
                Err(e) => return Err(e),
            };
            for entry in cursor {
                let entry = entry?;
                match member_set(&entry) {
                    Some(members) => {
                        txn.insert(entry.get_dn().clone(), Arc::new(members));
                        loaded += 1;
                    }
                    None => {
                        admin_warn!(group = %entry.get_dn(), "group has no member attribute, it will not be cached");
                    }
                }
            }
        }

        admin_info!(groups = loaded, "group cache loaded");
        txn.commit();
        Ok(())
    }

    pub fn admin_dn(&self) -> &Dn {
        &self.admin_dn
    }

    pub fn admin_group_dn(&self) -> &Dn {
        &self.admin_group_dn
    }

    pub fn is_administrator(&self, dn: &Dn) -> bool {
        if *dn == self.admin_dn {
            return true;
        }
        match self.groups.read().get(&self.admin_group_dn) {
            Some(members) => members.contains(dn),
            None => {
                admin_warn!(admin_group = %self.admin_group_dn, "administrators group is not cached, only the administrator is treated as one");
                false
            }
        }
    }

    /// The groups `member` belongs to. Shares a single empty set when there are none.
    pub fn groups_of(&self, member: &Dn) -> Arc<BTreeSet<Dn>> {
        let txn = self.groups.read();
        let groups: BTreeSet<Dn> = txn
            .iter()
            .filter(|(_, members)| members.contains(member))
            .map(|(g, _)| g.clone())
            .collect();
        if groups.is_empty() {
            EMPTY_GROUPS.clone()
        } else {
            Arc::new(groups)
        }
    }

    /// The member set of a group, if it is cached.
    pub fn members(&self, group: &Dn) -> Option<Arc<BTreeSet<Dn>>> {
        self.groups.read().get(group).cloned()
    }

    pub fn group_added(&self, entry: &Entry) {
        if entry.group_member_attr().is_none() {
            return;
        }
        match member_set(entry) {
            Some(members) => {
                let mut txn = self.groups.write();
                txn.insert(entry.get_dn().clone(), Arc::new(members));
                txn.commit();
            }
            None => {
                admin_warn!(group = %entry.get_dn(), "group has no member attribute, it will not be cached");
            }
        }
    }

    pub fn group_deleted(&self, dn: &Dn) {
        let mut txn = self.groups.write();
        if txn.remove(dn).is_some() {
            txn.commit();
        }
    }

    /// Apply a modify to the cached member set of `dn`. `entry` is the group as it was
    /// before the modify, and decides which attribute holds the members.
    pub fn group_modified(&self, dn: &Dn, mods: &ModifyList, entry: &Entry) {
        for m in mods {
            self.group_modified_delta(dn, m, entry);
        }
    }

    /// Apply one modification to the cached member set of `dn`.
    pub fn group_modified_delta(&self, dn: &Dn, modify: &Modify, entry: &Entry) {
        let Some(member_attr) = entry.group_member_attr() else {
            return;
        };
        if !modify.is_attr(member_attr) {
            return;
        }

        let mut txn = self.groups.write();
        let current = txn.get(dn).cloned().unwrap_or_else(|| EMPTY_GROUPS.clone());
        let mut next = BTreeSet::clone(&current);
        match modify {
            Modify::Add(_, values) => {
                next.extend(parse_members(dn, values));
            }
            Modify::Remove(_, values) if values.is_empty() => next.clear(),
            Modify::Remove(_, values) => {
                for member in parse_members(dn, values) {
                    next.remove(&member);
                }
            }
            Modify::Replace(_, values) => {
                next = parse_members(dn, values).collect();
            }
        }

        if next.is_empty() {
            txn.remove(dn);
        } else {
            txn.insert(dn.clone(), Arc::new(next));
        }
        txn.commit();
    }

    /// Move the groups at or below `old` to the same place below `new`.
    pub fn group_renamed(&self, old: &Dn, new: &Dn) {
        let mut txn = self.groups.write();
        let moved: Vec<(Dn, Arc<BTreeSet<Dn>>)> = txn
            .iter()
            .filter(|(k, _)| k.is_within(old))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if moved.is_empty() {
            return;
        }
        for (k, members) in moved {
            txn.remove(&k);
            if let Some(rebased) = k.rebase(old, new) {
                txn.insert(rebased, members);
            }
        }
        txn.commit();
    }
}

fn parse_members<'a>(group: &'a Dn, values: &'a [String]) -> impl Iterator<Item = Dn> + 'a {
    values.iter().filter_map(move |v| match Dn::parse(v) {
        Ok(dn) => Some(dn),
        Err(_) => {
            admin_warn!(%group, member = %v, "ignoring group member that is not a valid name");
            None
        }
    })
}

fn member_set(entry: &Entry) -> Option<BTreeSet<Dn>> {
    let attr = entry.group_member_attr()?;
    let values: Vec<String> = entry.get_ava_set(attr)?.iter().cloned().collect();
    Some(parse_members(entry.get_dn(), &values).collect())
}
