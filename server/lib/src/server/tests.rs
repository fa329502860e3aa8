use crate::prelude::*;
use crate::testkit::*;

const EDIT_DESCRIPTION_ACI: &str = r#"{ identificationTag "usersEditDescription", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions {
        { protectedItems { attributeType { description }, allAttributeValues { description } },
          grantsAndDenials { grantAdd, grantRemove } } } } }"#;

const ALICE_MAY_NOT_ADD_ACI: &str = r#"{ identificationTag "aliceMayNotAdd", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { name { "cn=alice,ou=users,dc=example" } },
      userPermissions {
        { protectedItems { attributeType { description }, allAttributeValues { description } },
          grantsAndDenials { denyAdd } } } } }"#;

const BROWSE_AND_READ_CN_ACI: &str = r#"{ identificationTag "browseAndReadCn", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions {
        { protectedItems { entry }, grantsAndDenials { grantBrowse, grantReturnDN } },
        { protectedItems { attributeType { cn }, allAttributeValues { cn } },
          grantsAndDenials { grantRead } } } } }"#;

const EXPORT_ACI: &str = r#"{ identificationTag "exportAll", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions { { protectedItems { entry }, grantsAndDenials { grantExport } } } } }"#;

const IMPORT_ACI: &str = r#"{ identificationTag "importAll", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions { { protectedItems { entry }, grantsAndDenials { grantImport } } } } }"#;

const EDIT_DESCRIPTION_HIGH_PRECEDENCE_ACI: &str = r#"{ identificationTag "usersEditDescriptionFirst",
    precedence 20, authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions {
        { protectedItems { attributeType { description }, allAttributeValues { description } },
          grantsAndDenials { grantAdd, grantRemove } } } } }"#;

const ADD_ANYTHING_ACI: &str = r#"{ identificationTag "addAnything", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions {
        { protectedItems { entry, allUserAttributeTypesAndValues,
            attributeType { entryACI }, allAttributeValues { entryACI } },
          grantsAndDenials { grantAdd } } } } }"#;

const READ_ENTRY_AND_CN_ACI: &str = r#"{ identificationTag "readEntryAndCn", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions {
        { protectedItems { entry }, grantsAndDenials { grantRead, grantBrowse } },
        { protectedItems { attributeType { cn }, allAttributeValues { cn } },
          grantsAndDenials { grantRead } } } } }"#;

const RENAME_ACI: &str = r#"{ identificationTag "renameAll", precedence 10,
    authenticationLevel none, itemOrUserFirst userFirst: {
      userClasses { allUsers },
      userPermissions { { protectedItems { entry }, grantsAndDenials { grantRename } } } } }"#;

fn dn(s: &str) -> Dn {
    Dn::parse(s).expect("invalid dn")
}

/// An access control subentry directly below `admin_point`, covering all of it.
fn aci_subentry(cn: &str, admin_point: &str, aci: &[&str]) -> Entry {
    let mut e = entry_init!(
        format!("cn={},{}", cn, admin_point).as_str(),
        (ATTR_OBJECTCLASS, CLASS_SUBENTRY),
        (ATTR_OBJECTCLASS, CLASS_ACCESS_CONTROL_SUBENTRY),
        (ATTR_CN, cn)
    );
    for a in aci {
        e.add_ava(ATTR_PRESCRIPTIVE_ACI, a);
    }
    e
}

macro_rules! assert_denied {
    ($result:expr) => {
        assert_eq!($result, Err(OperationError::AccessDenied))
    };
}

#[test]
fn test_stage_order() {
    let (server, _be) = setup_test(true, vec![]);
    assert_eq!(
        server.stage_ids(),
        vec!["aci_authorization", "default_authorization"]
    );
}

#[test]
fn test_add_value_without_tuples_never_reaches_storage() {
    let (server, be) = setup_test(true, vec![]);
    let alice = session_for(ALICE_DN);

    assert_denied!(server.modify(
        &alice,
        &dn(BOB_DN),
        modlist!(m_add(ATTR_DESCRIPTION, &["tinkerer"]))
    ));
    assert_denied!(server.add(
        &alice,
        entry_init!(
            "cn=dave,ou=users,dc=example",
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "dave")
        )
    ));
    assert!(be.mutations().is_empty());
}

#[test]
fn test_self_modify_allowed_by_default_policy() {
    let (server, be) = setup_test(false, vec![]);
    let alice = session_for(ALICE_DN);
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    server
        .modify(&alice, &dn(ALICE_DN), mods.clone())
        .expect("self modification denied");
    assert_eq!(
        be.mutations(),
        vec![BackendCall::Modify(dn(ALICE_DN), mods)]
    );

    // Not for identity attributes, and not for other users.
    assert_denied!(server.modify(
        &alice,
        &dn(ALICE_DN),
        modlist!(m_add(ATTR_OBJECTCLASS, &["groupOfNames"]))
    ));
    assert_denied!(server.modify(
        &alice,
        &dn(BOB_DN),
        modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]))
    ));
    assert_eq!(be.mutations().len(), 1);
}

#[test]
fn test_prescriptive_grant_forwards_mods_unchanged() {
    let (server, be) = setup_test(
        true,
        vec![aci_subentry("usersACI", TEST_USERS_BASE, &[EDIT_DESCRIPTION_ACI])],
    );
    let alice = session_for(ALICE_DN);
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    server
        .modify(&alice, &dn(ALICE_DN), mods.clone())
        .expect("modify denied");
    assert_eq!(
        be.mutations(),
        vec![BackendCall::Modify(dn(ALICE_DN), mods)]
    );

    // The grant covers description only.
    assert_denied!(server.modify(
        &alice,
        &dn(ALICE_DN),
        modlist!(m_replace(ATTR_USER_PASSWORD, &["hunter2"]))
    ));
    assert_eq!(be.mutations().len(), 1);
}

#[test]
fn test_deny_overrides_grant() {
    let (server, _be) = setup_test(
        true,
        vec![aci_subentry(
            "usersACI",
            TEST_USERS_BASE,
            &[EDIT_DESCRIPTION_ACI, ALICE_MAY_NOT_ADD_ACI],
        )],
    );
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    assert_denied!(server.modify(&session_for(ALICE_DN), &dn(ALICE_DN), mods.clone()));
    server
        .modify(&session_for(BOB_DN), &dn(BOB_DN), mods)
        .expect("modify denied");
}

#[test]
fn test_administrator_bypass_still_maintains_caches() {
    let (server, be) = setup_test(true, vec![]);
    let carol = session_for(CAROL_DN);
    let alice = session_for(ALICE_DN);
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    assert_denied!(server.modify(&alice, &dn(ALICE_DN), mods.clone()));

    // carol is an administrator through the administrators group.
    let subentry = aci_subentry("usersACI", TEST_USERS_BASE, &[EDIT_DESCRIPTION_ACI]);
    let subentry_dn = subentry.get_dn().clone();
    server.add(&carol, subentry).expect("admin add denied");
    assert!(be
        .mutations()
        .contains(&BackendCall::Add(subentry_dn.clone())));

    // The new subentry is in force straight away.
    server
        .modify(&alice, &dn(ALICE_DN), mods)
        .expect("modify denied after subentry added");

    // And follows the subentry when it is renamed and removed.
    let new_rdn: Rdn = "cn=editACI".parse().expect("invalid rdn");
    server
        .rename(&carol, &subentry_dn, new_rdn, true)
        .expect("admin rename denied");
    server
        .modify(
            &alice,
            &dn(ALICE_DN),
            modlist!(m_add(ATTR_DESCRIPTION, &["painter"])),
        )
        .expect("modify denied after subentry renamed");

    server
        .delete(&carol, &dn("cn=editACI,ou=users,dc=example"))
        .expect("admin delete denied");
    assert_denied!(server.modify(
        &alice,
        &dn(ALICE_DN),
        modlist!(m_add(ATTR_DESCRIPTION, &["sculptor"]))
    ));
}

#[test]
fn test_group_changes_reach_the_group_cache() {
    let (server, _be) = setup_test(true, vec![]);
    let admin = session_for(TEST_ADMIN_DN);
    let alice = session_for(ALICE_DN);
    let group = dn(TEST_ADMIN_GROUP_DN);

    assert_denied!(server.delete(&alice, &dn(BOB_DN)));

    // Making alice an administrator lets her past every check.
    server
        .modify(&admin, &group, modlist!(m_add(ATTR_MEMBER, &[ALICE_DN])))
        .expect("admin modify denied");
    server.delete(&alice, &dn(BOB_DN)).expect("delete denied");

    server
        .modify(&admin, &group, modlist!(m_remove(ATTR_MEMBER, &[ALICE_DN])))
        .expect("admin modify denied");
    assert_denied!(server.delete(&alice, &dn(CAROL_DN)));
}

#[test]
fn test_critical_entries_protected() {
    let (server, be) = setup_test(true, vec![]);
    let alice = session_for(ALICE_DN);

    assert_eq!(
        server.delete(&alice, &dn(TEST_ADMIN_DN)),
        Err(OperationError::CriticalEntryProtected)
    );
    assert_eq!(
        server.delete(&alice, &Dn::root()),
        Err(OperationError::CriticalEntryProtected)
    );
    assert_eq!(
        server.move_entry(&alice, &dn(TEST_ADMIN_DN), &dn(TEST_USERS_BASE)),
        Err(OperationError::CriticalEntryProtected)
    );
    assert!(be.mutations().is_empty());
}

#[test]
fn test_default_policy_self_read() {
    let (server, _be) = setup_test(false, vec![]);
    let alice = session_for(ALICE_DN);

    let own = server
        .lookup(&alice, &dn(ALICE_DN), None)
        .expect("self lookup denied");
    assert!(own.attribute_equality(ATTR_CN, "alice"));
    assert_denied!(server.lookup(&alice, &dn(BOB_DN), None).map(|_| ()));

    // Administrators may read anything.
    let bob = server
        .lookup(&session_for(CAROL_DN), &dn(BOB_DN), Some(vec![ATTR_CN.to_string()]))
        .expect("admin lookup denied");
    assert!(bob.attribute_pres(ATTR_CN));
    assert!(!bob.attribute_pres(ATTR_DESCRIPTION));
}

#[test]
fn test_default_policy_search_filters_protected_entries() {
    let (server, _be) = setup_test(false, vec![]);
    let base = dn(TEST_SUFFIX);

    let seen: Vec<Dn> = server
        .search(
            &session_for(ALICE_DN),
            &base,
            SearchScope::Subtree,
            Filter::all(),
            None,
        )
        .expect("search failed")
        .iter()
        .map(|e| e.get_dn().clone())
        .collect();
    assert!(seen.contains(&dn(ALICE_DN)));
    assert!(seen.contains(&dn(TEST_USERS_BASE)));
    assert!(!seen.contains(&dn(BOB_DN)));
    assert!(!seen.contains(&dn(TEST_ADMIN_DN)));
    assert!(!seen.contains(&dn(TEST_ADMIN_GROUP_DN)));

    let all = server
        .search(
            &session_for(CAROL_DN),
            &base,
            SearchScope::Subtree,
            Filter::all(),
            None,
        )
        .expect("search failed");
    assert_eq!(all.len(), seed_entries().len());
}

#[test]
fn test_aci_search_hides_and_strips() {
    let bob_filter = f_eq(ATTR_CN, "bob");
    let alice = session_for(ALICE_DN);

    // Nothing grants browse, so nothing is returned.
    let (server, _be) = setup_test(true, vec![]);
    let found = server
        .search(&alice, &dn(TEST_SUFFIX), SearchScope::Subtree, bob_filter.clone(), None)
        .expect("search failed");
    assert!(found.is_empty());

    let (server, _be) = setup_test(
        true,
        vec![aci_subentry("rootACI", TEST_SUFFIX, &[BROWSE_AND_READ_CN_ACI])],
    );
    let found = server
        .search(&alice, &dn(TEST_SUFFIX), SearchScope::Subtree, bob_filter, None)
        .expect("search failed");
    assert_eq!(found.len(), 1);
    let bob = &found[0];
    assert!(bob.attribute_equality(ATTR_CN, "bob"));
    assert!(!bob.attribute_pres(ATTR_DESCRIPTION));
    assert!(!bob.attribute_pres(ATTR_OBJECTCLASS));
}

#[test]
fn test_aci_has_entry_and_compare() {
    let (server, _be) = setup_test(true, vec![]);
    let alice = session_for(ALICE_DN);
    let carol = session_for(CAROL_DN);
    let bob = dn(BOB_DN);

    assert_eq!(server.has_entry(&alice, &bob), Ok(false));
    assert_eq!(server.has_entry(&carol, &bob), Ok(true));
    assert_eq!(
        server.has_entry(&carol, &dn("cn=nobody,ou=users,dc=example")),
        Ok(false)
    );

    assert_denied!(server.compare(&alice, &bob, ATTR_DESCRIPTION, "builder"));
    assert_eq!(
        server.compare(&carol, &bob, ATTR_DESCRIPTION, "builder"),
        Ok(true)
    );
}

#[test]
fn test_move_needs_export_and_import() {
    let alice = session_for(ALICE_DN);
    let bob = dn(BOB_DN);
    let groups = dn(TEST_GROUPS_BASE);

    let (server, be) = setup_test(
        true,
        vec![aci_subentry("rootACI", TEST_SUFFIX, &[EXPORT_ACI])],
    );
    assert_denied!(server.move_entry(&alice, &bob, &groups));
    assert!(be.mutations().is_empty());

    let (server, be) = setup_test(
        true,
        vec![aci_subentry("rootACI", TEST_SUFFIX, &[EXPORT_ACI, IMPORT_ACI])],
    );
    server
        .move_entry(&alice, &bob, &groups)
        .expect("move denied");
    assert_eq!(be.mutations(), vec![BackendCall::Move(bob, groups)]);
    assert_eq!(
        server.has_entry(&session_for(CAROL_DN), &dn("cn=bob,ou=groups,dc=example")),
        Ok(true)
    );
}

#[test]
fn test_subentry_without_prescriptive_aci_rejected() {
    let (server, be) = setup_test(true, vec![]);
    let subentry = aci_subentry("emptyACI", TEST_USERS_BASE, &[]);
    assert!(matches!(
        server.add(&session_for(CAROL_DN), subentry),
        Err(OperationError::SchemaViolation(_))
    ));
    assert!(be.mutations().is_empty());
}

#[test]
fn test_deny_overrides_higher_precedence_grant() {
    let (server, be) = setup_test(
        true,
        vec![aci_subentry(
            "usersACI",
            TEST_USERS_BASE,
            &[EDIT_DESCRIPTION_HIGH_PRECEDENCE_ACI, ALICE_MAY_NOT_ADD_ACI],
        )],
    );
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    assert_denied!(server.modify(&session_for(ALICE_DN), &dn(ALICE_DN), mods.clone()));
    assert!(be.mutations().is_empty());

    server
        .modify(&session_for(BOB_DN), &dn(BOB_DN), mods.clone())
        .expect("modify denied");
    assert_eq!(be.mutations(), vec![BackendCall::Modify(dn(BOB_DN), mods)]);
}

#[test]
fn test_subentry_modify_keeps_caches_consistent() {
    let subentry = aci_subentry("usersACI", TEST_USERS_BASE, &[EDIT_DESCRIPTION_ACI]);
    let subentry_dn = subentry.get_dn().clone();
    let (server, be) = setup_test(true, vec![subentry]);
    let carol = session_for(CAROL_DN);
    let alice = session_for(ALICE_DN);

    // Stripping the aci from a subentry that stays an access control subentry is refused
    // before anything is stored, even for an administrator.
    assert!(matches!(
        server.modify(&carol, &subentry_dn, modlist!(m_purge(ATTR_PRESCRIPTIVE_ACI))),
        Err(OperationError::SchemaViolation(_))
    ));
    assert!(be.mutations().is_empty());
    server
        .modify(&alice, &dn(ALICE_DN), modlist!(m_add(ATTR_DESCRIPTION, &["gardener"])))
        .expect("modify denied while subentry unchanged");

    // Removing the aci together with the class is stored, and its grants go with it.
    server
        .modify(
            &carol,
            &subentry_dn,
            modlist!(
                m_purge(ATTR_PRESCRIPTIVE_ACI),
                m_remove(ATTR_OBJECTCLASS, &[CLASS_ACCESS_CONTROL_SUBENTRY])
            ),
        )
        .expect("admin modify denied");
    assert_denied!(server.modify(
        &alice,
        &dn(ALICE_DN),
        modlist!(m_add(ATTR_DESCRIPTION, &["painter"]))
    ));
}

#[test]
fn test_entry_aci_in_force_except_on_add() {
    let dave_dn = "cn=dave,ou=users,dc=example";
    let dave = entry_init!(
        dave_dn,
        (ATTR_OBJECTCLASS, CLASS_PERSON),
        (ATTR_CN, "dave"),
        (ATTR_ENTRY_ACI, EDIT_DESCRIPTION_ACI)
    );
    let erin = || {
        entry_init!(
            "cn=erin,ou=users,dc=example",
            (ATTR_OBJECTCLASS, CLASS_PERSON),
            (ATTR_CN, "erin"),
            (ATTR_ENTRY_ACI, ADD_ANYTHING_ACI)
        )
    };
    let alice = session_for(ALICE_DN);
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    let (server, be) = setup_test(true, vec![dave]);
    // dave's own aci lets anyone edit his description, bob has none.
    server
        .modify(&alice, &dn(dave_dn), mods.clone())
        .expect("modify granted by entry aci denied");
    assert_denied!(server.modify(&alice, &dn(BOB_DN), mods.clone()));

    // The aci an entry carries when it is added grants nothing for the add itself.
    assert_denied!(server.add(&alice, erin()));
    assert_eq!(be.mutations(), vec![BackendCall::Modify(dn(dave_dn), mods)]);

    // Granted from the area instead, the same entry can be added.
    let (server, be) = setup_test(
        true,
        vec![aci_subentry("usersACI", TEST_USERS_BASE, &[ADD_ANYTHING_ACI])],
    );
    server.add(&alice, erin()).expect("add denied");
    assert_eq!(
        be.mutations(),
        vec![BackendCall::Add(dn("cn=erin,ou=users,dc=example"))]
    );
}

#[test]
fn test_subentry_aci_of_administrative_point() {
    let mut subentry = aci_subentry("usersACI", TEST_USERS_BASE, &[EDIT_DESCRIPTION_ACI]);
    // The area starts below the administrative point, so the subentry is not in it.
    subentry.add_ava(ATTR_SUBTREE_SPECIFICATION, "{ minimum 1 }");
    let subentry_dn = subentry.get_dn().clone();
    let (server, _be) = setup_test(true, vec![subentry]);
    let alice = session_for(ALICE_DN);

    assert_denied!(server.modify(
        &alice,
        &subentry_dn,
        modlist!(m_add(ATTR_DESCRIPTION, &["users area"]))
    ));

    server
        .modify(
            &session_for(CAROL_DN),
            &dn(TEST_USERS_BASE),
            modlist!(m_add(ATTR_SUBENTRY_ACI, &[EDIT_DESCRIPTION_ACI])),
        )
        .expect("admin modify denied");
    server
        .modify(
            &alice,
            &subentry_dn,
            modlist!(m_add(ATTR_DESCRIPTION, &["users area"])),
        )
        .expect("modify granted by subentry aci denied");
}

#[test]
fn test_aci_rename_needs_rename() {
    let alice = session_for(ALICE_DN);
    let bob = dn(BOB_DN);
    let robert: Rdn = "cn=robert".parse().expect("invalid rdn");

    let (server, be) = setup_test(true, vec![]);
    assert_denied!(server.rename(&alice, &bob, robert.clone(), true));
    assert!(be.mutations().is_empty());

    let (server, be) = setup_test(
        true,
        vec![aci_subentry("rootACI", TEST_SUFFIX, &[RENAME_ACI])],
    );
    server
        .rename(&alice, &bob, robert.clone(), true)
        .expect("rename denied");
    assert_eq!(be.mutations(), vec![BackendCall::Rename(bob, robert)]);
}

#[test]
fn test_move_and_rename_needs_export_rename_and_import() {
    let alice = session_for(ALICE_DN);
    let bob = dn(BOB_DN);
    let groups = dn(TEST_GROUPS_BASE);
    let robert: Rdn = "cn=robert".parse().expect("invalid rdn");

    for acis in [
        &[EXPORT_ACI, IMPORT_ACI][..],
        &[RENAME_ACI, IMPORT_ACI][..],
        &[EXPORT_ACI, RENAME_ACI][..],
    ] {
        let (server, be) = setup_test(true, vec![aci_subentry("rootACI", TEST_SUFFIX, acis)]);
        assert_denied!(server.move_and_rename(&alice, &bob, &groups, robert.clone(), true));
        assert!(be.mutations().is_empty());
    }

    let (server, be) = setup_test(
        true,
        vec![aci_subentry(
            "rootACI",
            TEST_SUFFIX,
            &[EXPORT_ACI, RENAME_ACI, IMPORT_ACI],
        )],
    );
    server
        .move_and_rename(&alice, &bob, &groups, robert.clone(), true)
        .expect("move and rename denied");
    assert_eq!(
        be.mutations(),
        vec![BackendCall::MoveAndRename(bob, groups, robert)]
    );
    assert_eq!(
        server.has_entry(&session_for(CAROL_DN), &dn("cn=robert,ou=groups,dc=example")),
        Ok(true)
    );
}

#[test]
fn test_aci_lookup_strips_unreadable() {
    let alice = session_for(ALICE_DN);
    let bob = dn(BOB_DN);

    let (server, _be) = setup_test(true, vec![]);
    assert_denied!(server.lookup(&alice, &bob, None).map(|_| ()));

    let (server, _be) = setup_test(
        true,
        vec![aci_subentry("rootACI", TEST_SUFFIX, &[READ_ENTRY_AND_CN_ACI])],
    );
    let found = server.lookup(&alice, &bob, None).expect("lookup denied");
    assert!(found.attribute_equality(ATTR_CN, "bob"));
    assert!(!found.attribute_pres(ATTR_DESCRIPTION));
    assert!(!found.attribute_pres(ATTR_OBJECTCLASS));

    let found = server
        .lookup(
            &alice,
            &bob,
            Some(vec![ATTR_CN.to_string(), ATTR_DESCRIPTION.to_string()]),
        )
        .expect("lookup denied");
    assert!(found.attribute_pres(ATTR_CN));
    assert!(!found.attribute_pres(ATTR_DESCRIPTION));
}

#[test]
fn test_default_policy_follows_administrators_group() {
    let (server, _be) = setup_test(false, vec![]);
    let admin = session_for(TEST_ADMIN_DN);
    let alice = session_for(ALICE_DN);
    let group = dn(TEST_ADMIN_GROUP_DN);
    let mods = modlist!(m_add(ATTR_DESCRIPTION, &["gardener"]));

    assert_denied!(server.modify(&alice, &dn(BOB_DN), mods.clone()));

    server
        .modify(&admin, &group, modlist!(m_add(ATTR_MEMBER, &[ALICE_DN])))
        .expect("admin modify denied");
    server
        .modify(&alice, &dn(BOB_DN), mods.clone())
        .expect("modify by administrator denied");

    server
        .modify(&admin, &group, modlist!(m_remove(ATTR_MEMBER, &[ALICE_DN])))
        .expect("admin modify denied");
    assert_denied!(server.modify(&alice, &dn(BOB_DN), mods));
}

