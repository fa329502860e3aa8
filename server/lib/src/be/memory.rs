use std::sync::Arc;

use concread::bptree::{BptreeMap, BptreeMapWriteTxn};

use crate::be::{Backend, EntryCursor};
use crate::prelude::*;

/// An in memory backend. Every mutation is one concread write transaction, so readers see
/// either all of a subtree rename or none of it.
pub struct MemoryBackend {
    suffixes: Vec<Dn>,
    entries: BptreeMap<Dn, Arc<Entry>>,
}

impl MemoryBackend {
    pub fn new(suffixes: Vec<Dn>) -> Self {
        MemoryBackend {
            suffixes,
            entries: BptreeMap::new(),
        }
    }

    fn is_suffix(&self, dn: &Dn) -> bool {
        self.suffixes.iter().any(|s| s == dn)
    }

    /// Move `dn` and its subtree to `new_dn`, with `rewrite` applied to the top entry.
    fn relocate<F>(&self, dn: &Dn, new_dn: Dn, rewrite: F) -> Result<(), OperationError>
    where
        F: FnOnce(&mut Entry),
    {
        if new_dn.is_within(dn) && new_dn != *dn {
            request_error!(%dn, %new_dn, "can not move an entry below itself");
            return Err(OperationError::InvalidDn(new_dn.to_string()));
        }

        let mut txn = self.entries.write();
        let top = match txn.get(dn) {
            Some(e) => e.clone(),
            None => return Err(OperationError::NoMatchingEntries),
        };
        if new_dn != *dn && txn.contains_key(&new_dn) {
            return Err(OperationError::EntryAlreadyExists);
        }
        if let Some(parent) = new_dn.parent() {
            if !parent.is_root() && !txn.contains_key(&parent) && !self.is_suffix(&new_dn) {
                return Err(OperationError::NoMatchingEntries);
            }
        }

        let subtree: Vec<(Dn, Arc<Entry>)> = txn
            .iter()
            .filter(|(k, _)| k.is_descendant_of(dn))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        txn.remove(dn);
        let mut moved = top.with_dn(new_dn.clone());
        rewrite(&mut moved);
        txn.insert(new_dn.clone(), Arc::new(moved));

        for (old, e) in subtree {
            txn.remove(&old);
            let Some(rebased) = old.rebase(dn, &new_dn) else {
                admin_error!(%old, "descendant is not within the moved entry");
                debug_assert!(false);
                return Err(OperationError::InvalidState);
            };
            txn.insert(rebased.clone(), Arc::new(e.with_dn(rebased)));
        }

        txn.commit();
        Ok(())
    }
}

fn rewrite_rdn(e: &mut Entry, old: Option<&Rdn>, new_rdn: &Rdn, delete_old_rdn: bool) {
    if delete_old_rdn {
        if let Some(old) = old {
            e.remove_ava(old.attr(), old.value());
        }
    }
    e.add_ava(new_rdn.attr(), new_rdn.value());
}

/// Run `f` in the write transaction, committing only if it succeeds.
fn commit_if<'a, F>(mut txn: BptreeMapWriteTxn<'a, Dn, Arc<Entry>>, f: F) -> Result<(), OperationError>
where
    F: FnOnce(&mut BptreeMapWriteTxn<'a, Dn, Arc<Entry>>) -> Result<(), OperationError>,
{
    f(&mut txn)?;
    txn.commit();
    Ok(())
}

impl Backend for MemoryBackend {
    #[instrument(level = "debug", name = "be::add", skip_all, fields(dn = %entry.get_dn()))]
    fn add(&self, entry: Entry) -> Result<(), OperationError> {
        let dn = entry.get_dn().clone();
        commit_if(self.entries.write(), |txn| {
            if txn.contains_key(&dn) {
                return Err(OperationError::EntryAlreadyExists);
            }
            if !self.is_suffix(&dn) {
                match dn.parent() {
                    Some(parent) if txn.contains_key(&parent) => {}
                    _ => {
                        request_error!(%dn, "parent of entry does not exist");
                        return Err(OperationError::NoMatchingEntries);
                    }
                }
            }
            txn.insert(dn.clone(), Arc::new(entry));
            Ok(())
        })
    }

    #[instrument(level = "debug", name = "be::delete", skip_all, fields(%dn))]
    fn delete(&self, dn: &Dn) -> Result<(), OperationError> {
        commit_if(self.entries.write(), |txn| {
            if !txn.contains_key(dn) {
                return Err(OperationError::NoMatchingEntries);
            }
            if txn.iter().any(|(k, _)| k.parent().as_ref() == Some(dn)) {
                return Err(OperationError::NotAllowedOnNonLeaf);
            }
            txn.remove(dn);
            Ok(())
        })
    }

    #[instrument(level = "debug", name = "be::modify", skip_all, fields(%dn))]
    fn modify(&self, dn: &Dn, mods: &ModifyList) -> Result<(), OperationError> {
        commit_if(self.entries.write(), |txn| {
            let mut e = match txn.get(dn) {
                Some(e) => Entry::clone(e),
                None => return Err(OperationError::NoMatchingEntries),
            };
            for m in mods {
                e.apply_modify(m)?;
            }
            txn.insert(dn.clone(), Arc::new(e));
            Ok(())
        })
    }

    #[instrument(level = "debug", name = "be::rename", skip_all, fields(%dn, %new_rdn))]
    fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool) -> Result<(), OperationError> {
        let Some(parent) = dn.parent() else {
            return Err(OperationError::InvalidDn(dn.to_string()));
        };
        let new_dn = parent.child(new_rdn.clone());
        self.relocate(dn, new_dn, |e| {
            rewrite_rdn(e, dn.rdn(), new_rdn, delete_old_rdn)
        })
    }

    #[instrument(level = "debug", name = "be::move_entry", skip_all, fields(%dn, %new_superior))]
    fn move_entry(&self, dn: &Dn, new_superior: &Dn) -> Result<(), OperationError> {
        let Some(rdn) = dn.rdn() else {
            return Err(OperationError::InvalidDn(dn.to_string()));
        };
        self.relocate(dn, new_superior.child(rdn.clone()), |_| {})
    }

    #[instrument(level = "debug", name = "be::move_and_rename", skip_all, fields(%dn, %new_superior, %new_rdn))]
    fn move_and_rename(
        &self,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: &Rdn,
        delete_old_rdn: bool,
    ) -> Result<(), OperationError> {
        if dn.is_root() {
            return Err(OperationError::InvalidDn(dn.to_string()));
        }
        self.relocate(dn, new_superior.child(new_rdn.clone()), |e| {
            rewrite_rdn(e, dn.rdn(), new_rdn, delete_old_rdn)
        })
    }

    fn lookup(&self, dn: &Dn) -> Result<Option<Arc<Entry>>, OperationError> {
        Ok(self.entries.read().get(dn).cloned())
    }

    #[instrument(level = "debug", name = "be::search", skip_all, fields(%base, %filter))]
    fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
    ) -> Result<EntryCursor, OperationError> {
        let txn = self.entries.read();
        if !base.is_root() && txn.get(base).is_none() {
            return Err(OperationError::NoMatchingEntries);
        }
        let entries: Vec<Arc<Entry>> = txn
            .iter()
            .filter(|(k, _)| scope.contains(base, k))
            .filter(|(_, e)| filter.matches(e))
            .map(|(_, e)| e.clone())
            .collect();
        trace!(count = entries.len(), "search candidates");
        Ok(EntryCursor::from_entries(entries))
    }

    fn compare(&self, dn: &Dn, attr: &str, value: &str) -> Result<bool, OperationError> {
        match self.entries.read().get(dn) {
            Some(e) => Ok(e.attribute_equality(attr, value)),
            None => Err(OperationError::NoMatchingEntries),
        }
    }

    fn suffixes(&self) -> Vec<Dn> {
        self.suffixes.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).expect("invalid dn")
    }

    fn setup() -> MemoryBackend {
        let be = MemoryBackend::new(vec![dn("dc=example")]);
        for e in [
            entry_init!("dc=example", (ATTR_OBJECTCLASS, CLASS_DOMAIN)),
            entry_init!("ou=users,dc=example", (ATTR_OU, "users")),
            entry_init!("ou=staff,dc=example", (ATTR_OU, "staff")),
            entry_init!("cn=alice,ou=users,dc=example", (ATTR_CN, "alice")),
            entry_init!("cn=pet,cn=alice,ou=users,dc=example", (ATTR_CN, "pet")),
        ] {
            be.add(e).expect("add failed");
        }
        be
    }

    #[test]
    fn test_add_requires_parent_and_unique_name() {
        let be = setup();
        assert_eq!(
            be.add(entry_init!("cn=x,ou=missing,dc=example")),
            Err(OperationError::NoMatchingEntries)
        );
        assert_eq!(
            be.add(entry_init!("cn=alice,ou=users,dc=example")),
            Err(OperationError::EntryAlreadyExists)
        );
    }

    #[test]
    fn test_delete_leaf_only() {
        let be = setup();
        assert_eq!(
            be.delete(&dn("cn=alice,ou=users,dc=example")),
            Err(OperationError::NotAllowedOnNonLeaf)
        );
        assert!(be.delete(&dn("cn=pet,cn=alice,ou=users,dc=example")).is_ok());
        assert!(be.delete(&dn("cn=alice,ou=users,dc=example")).is_ok());
        assert_eq!(
            be.lookup(&dn("cn=alice,ou=users,dc=example")),
            Ok(None)
        );
    }

    #[test]
    fn test_modify_is_all_or_nothing() {
        let be = setup();
        let alice = dn("cn=alice,ou=users,dc=example");
        let mods = ModifyList::new_list(vec![
            m_add(ATTR_DESCRIPTION, &["first"]),
            m_remove(ATTR_MEMBER, &["cn=nobody"]),
        ]);
        assert!(be.modify(&alice, &mods).is_err());
        let e = be.lookup(&alice).expect("lookup failed").expect("missing");
        assert!(!e.attribute_pres(ATTR_DESCRIPTION));
    }

    #[test]
    fn test_rename_and_move_subtree() {
        let be = setup();
        let alice = dn("cn=alice,ou=users,dc=example");
        let new_rdn: Rdn = "cn=alicia".parse().expect("invalid rdn");
        be.rename(&alice, &new_rdn, true).expect("rename failed");

        let renamed = be
            .lookup(&dn("cn=alicia,ou=users,dc=example"))
            .expect("lookup failed")
            .expect("missing");
        assert!(renamed.attribute_equality(ATTR_CN, "alicia"));
        assert!(!renamed.attribute_equality(ATTR_CN, "alice"));
        assert!(be
            .lookup(&dn("cn=pet,cn=alicia,ou=users,dc=example"))
            .expect("lookup failed")
            .is_some());

        be.move_entry(&dn("cn=alicia,ou=users,dc=example"), &dn("ou=staff,dc=example"))
            .expect("move failed");
        let pet = be
            .lookup(&dn("cn=pet,cn=alicia,ou=staff,dc=example"))
            .expect("lookup failed")
            .expect("missing");
        assert_eq!(pet.get_dn().as_str(), "cn=pet,cn=alicia,ou=staff,dc=example");

        assert!(be
            .move_entry(&dn("ou=staff,dc=example"), &dn("cn=alicia,ou=staff,dc=example"))
            .is_err());
    }

    #[test]
    fn test_search_scopes() {
        let be = setup();
        let base = dn("ou=users,dc=example");
        let count = |scope| {
            be.search(&base, scope, &Filter::all())
                .expect("search failed")
                .count()
        };
        assert_eq!(count(SearchScope::Base), 1);
        assert_eq!(count(SearchScope::OneLevel), 1);
        assert_eq!(count(SearchScope::Subtree), 3);
        assert_eq!(be.count_children(&dn("dc=example")), Ok(2));
        assert!(be.compare(&dn("cn=alice,ou=users,dc=example"), "CN", "ALICE") == Ok(true));
    }
}
