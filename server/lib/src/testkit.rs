//! Helpers for tests of the server and of code built on it: a storage spy that records
//! what reached the backend, a small seeded directory, and ready to use servers.

use std::sync::{Arc, Mutex};

use crate::be::{Backend, EntryCursor, MemoryBackend};
use crate::prelude::*;

pub const TEST_SUFFIX: &str = "dc=example";
pub const TEST_USERS_BASE: &str = "ou=users,dc=example";
pub const TEST_GROUPS_BASE: &str = "ou=groups,dc=example";
pub const TEST_ADMIN_DN: &str = "cn=admin,dc=example";
pub const TEST_ADMIN_GROUP_DN: &str = "cn=administrators,ou=groups,dc=example";
pub const ALICE_DN: &str = "cn=alice,ou=users,dc=example";
pub const BOB_DN: &str = "cn=bob,ou=users,dc=example";
/// A member of the administrators group.
pub const CAROL_DN: &str = "cn=carol,ou=users,dc=example";

/// A storage call as seen by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Add(Dn),
    Delete(Dn),
    Modify(Dn, ModifyList),
    Rename(Dn, Rdn),
    Move(Dn, Dn),
    MoveAndRename(Dn, Dn, Rdn),
    Lookup(Dn),
    Search(Dn),
    Compare(Dn, String),
}

impl BackendCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            BackendCall::Lookup(_) | BackendCall::Search(_) | BackendCall::Compare(..)
        )
    }
}

/// A backend that records every call before handing it to an in memory backend.
pub struct RecordingBackend {
    inner: MemoryBackend,
    calls: Mutex<Vec<BackendCall>>,
}

impl RecordingBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        RecordingBackend {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn record(&self, call: BackendCall) {
        match self.calls.lock() {
            Ok(mut calls) => calls.push(call),
            Err(poisoned) => poisoned.into_inner().push(call),
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        match self.calls.lock() {
            Ok(calls) => calls.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// The calls that change stored data.
    pub fn mutations(&self) -> Vec<BackendCall> {
        self.calls().into_iter().filter(|c| c.is_mutation()).collect()
    }

    pub fn clear(&self) {
        match self.calls.lock() {
            Ok(mut calls) => calls.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }
}

impl Backend for RecordingBackend {
    fn add(&self, entry: Entry) -> Result<(), OperationError> {
        self.record(BackendCall::Add(entry.get_dn().clone()));
        self.inner.add(entry)
    }

    fn delete(&self, dn: &Dn) -> Result<(), OperationError> {
        self.record(BackendCall::Delete(dn.clone()));
        self.inner.delete(dn)
    }

    fn modify(&self, dn: &Dn, mods: &ModifyList) -> Result<(), OperationError> {
        self.record(BackendCall::Modify(dn.clone(), mods.clone()));
        self.inner.modify(dn, mods)
    }

    fn rename(&self, dn: &Dn, new_rdn: &Rdn, delete_old_rdn: bool) -> Result<(), OperationError> {
        self.record(BackendCall::Rename(dn.clone(), new_rdn.clone()));
        self.inner.rename(dn, new_rdn, delete_old_rdn)
    }

    fn move_entry(&self, dn: &Dn, new_superior: &Dn) -> Result<(), OperationError> {
        self.record(BackendCall::Move(dn.clone(), new_superior.clone()));
        self.inner.move_entry(dn, new_superior)
    }

    fn move_and_rename(
        &self,
        dn: &Dn,
        new_superior: &Dn,
        new_rdn: &Rdn,
        delete_old_rdn: bool,
    ) -> Result<(), OperationError> {
        self.record(BackendCall::MoveAndRename(
            dn.clone(),
            new_superior.clone(),
            new_rdn.clone(),
        ));
        self.inner
            .move_and_rename(dn, new_superior, new_rdn, delete_old_rdn)
    }

    fn lookup(&self, dn: &Dn) -> Result<Option<Arc<Entry>>, OperationError> {
        self.record(BackendCall::Lookup(dn.clone()));
        self.inner.lookup(dn)
    }

    fn search(
        &self,
        base: &Dn,
        scope: SearchScope,
        filter: &Filter,
    ) -> Result<EntryCursor, OperationError> {
        self.record(BackendCall::Search(base.clone()));
        self.inner.search(base, scope, filter)
    }

    fn compare(&self, dn: &Dn, attr: &str, value: &str) -> Result<bool, OperationError> {
        self.record(BackendCall::Compare(dn.clone(), attr.to_string()));
        self.inner.compare(dn, attr, value)
    }

    fn suffixes(&self) -> Vec<Dn> {
        self.inner.suffixes()
    }
}

/// The configuration matching [`seed_entries`].
#[allow(clippy::expect_used)]
pub fn test_configuration(access_control_enabled: bool) -> Configuration {
    let parse = |s: &str| Dn::parse(s).expect("invalid dn");
    Configuration {
        access_control_enabled,
        admin_dn: parse(TEST_ADMIN_DN),
        admin_group_dn: parse(TEST_ADMIN_GROUP_DN),
        users_base_dn: parse(TEST_USERS_BASE),
        groups_base_dn: parse(TEST_GROUPS_BASE),
        ..Configuration::default()
    }
}

/// A small directory: the suffix, users and groups containers, the administrator, an
/// administrators group holding carol, and the users alice, bob and carol.
pub fn seed_entries() -> Vec<Entry> {
    vec![
        entry_init!(TEST_SUFFIX, (ATTR_OBJECTCLASS, CLASS_DOMAIN)),
        entry_init!(
            TEST_USERS_BASE,
            (ATTR_OBJECTCLASS, CLASS_ORGANIZATIONAL_UNIT),
            (ATTR_OU, "users")
        ),
        entry_init!(
            TEST_GROUPS_BASE,
            (ATTR_OBJECTCLASS, CLASS_ORGANIZATIONAL_UNIT),
            (ATTR_OU, "groups")
        ),
        entry_init!(
            TEST_ADMIN_DN,
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "admin"),
            (ATTR_USER_PASSWORD, "secret")
        ),
        entry_init!(
            TEST_ADMIN_GROUP_DN,
            (ATTR_OBJECTCLASS, CLASS_GROUP_OF_NAMES),
            (ATTR_CN, "administrators"),
            (ATTR_MEMBER, CAROL_DN)
        ),
        entry_init!(
            ALICE_DN,
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "alice"),
            (ATTR_USER_PASSWORD, "alice-secret")
        ),
        entry_init!(
            BOB_DN,
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "bob"),
            (ATTR_DESCRIPTION, "builder")
        ),
        entry_init!(
            CAROL_DN,
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "carol")
        ),
    ]
}

/// A recording backend holding [`seed_entries`] and `extra`, with the seeding calls
/// already cleared from the record.
#[allow(clippy::expect_used)]
pub fn seeded_backend(extra: Vec<Entry>) -> Arc<RecordingBackend> {
    let suffix = Dn::parse(TEST_SUFFIX).expect("invalid dn");
    let be = RecordingBackend::new(MemoryBackend::new(vec![suffix]));
    for e in seed_entries().into_iter().chain(extra) {
        be.add(e).expect("failed to seed backend");
    }
    be.clear();
    Arc::new(be)
}

/// A session for the principal named `dn`.
#[allow(clippy::expect_used)]
pub fn session_for(dn: &str) -> Session {
    let dn = Dn::parse(dn).expect("invalid dn");
    Session::new(Principal::new(dn, AuthenticationLevel::Simple))
}

/// A server over [`seeded_backend`], and the backend so tests can inspect what reached it.
#[allow(clippy::expect_used)]
pub fn setup_test(
    access_control_enabled: bool,
    extra: Vec<Entry>,
) -> (DirectoryServer, Arc<RecordingBackend>) {
    sketching::test_init();

    let be = seeded_backend(extra);
    let server = DirectoryServer::new(&test_configuration(access_control_enabled), be.clone())
        .expect("failed to set up directory server");
    // Loading the caches is not what tests want to see.
    be.clear();
    (server, be)
}
