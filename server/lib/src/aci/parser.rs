//! Parser for the generic string encoding of ACIItem and SubtreeSpecification
//! (RFC 3672 style). For example:
//!
//! ```text
//! { identificationTag "usersCanEditDescription", precedence 10,
//!   authenticationLevel simple,
//!   itemOrUserFirst userFirst: {
//!     userClasses { allUsers },
//!     userPermissions {
//!       { protectedItems { attributeType { description } },
//!         grantsAndDenials { grantAdd, grantRemove } } } } }
//! ```

use std::collections::BTreeSet;
use std::str::FromStr;

use crate::aci::item::*;
use crate::aci::subtree::{Refinement, SubtreeSpecification};
use crate::prelude::*;

/// Turns the text of one ACI attribute value into an [`AciItem`]. Malformed input is an
/// [`OperationError::AciParseError`], never a fault, so callers can skip single values.
pub trait AciParser: Send + Sync {
    fn parse(&self, aci: &str) -> Result<AciItem, OperationError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AciItemParser;

impl AciParser for AciItemParser {
    fn parse(&self, aci: &str) -> Result<AciItem, OperationError> {
        acigrammar::aci_item(aci.trim()).map_err(|e| {
            trace!(?e, "aci item failed to parse");
            OperationError::AciParseError(e.to_string())
        })
    }
}

impl FromStr for AciItem {
    type Err = OperationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        AciItemParser.parse(input)
    }
}

pub(crate) fn parse_subtree_specification(
    input: &str,
) -> Result<SubtreeSpecification, OperationError> {
    acigrammar::subtree_specification(input.trim())
        .map_err(|e| OperationError::AciParseError(e.to_string()))
}

enum SubtreeComponent {
    Base(Dn),
    Exclusions(Vec<Exclusion>),
    Minimum(usize),
    Maximum(usize),
    Filter(Refinement),
}

enum Exclusion {
    ChopBefore(Dn),
    ChopAfter(Dn),
}

fn build_subtree(
    components: Vec<SubtreeComponent>,
) -> Result<SubtreeSpecification, &'static str> {
    let mut ss = SubtreeSpecification::default();
    let mut seen = BTreeSet::new();
    for c in components {
        let key = match c {
            SubtreeComponent::Base(dn) => {
                ss.base = dn;
                "base"
            }
            SubtreeComponent::Exclusions(ex) => {
                for e in ex {
                    match e {
                        Exclusion::ChopBefore(dn) => ss.chop_before.push(dn),
                        Exclusion::ChopAfter(dn) => ss.chop_after.push(dn),
                    }
                }
                "specificExclusions"
            }
            SubtreeComponent::Minimum(n) => {
                ss.minimum = n;
                "minimum"
            }
            SubtreeComponent::Maximum(n) => {
                ss.maximum = Some(n);
                "maximum"
            }
            SubtreeComponent::Filter(r) => {
                ss.refinement = Some(r);
                "specificationFilter"
            }
        };
        if !seen.insert(key) {
            return Err("subtree specification component given twice");
        }
    }
    if ss.maximum.map(|max| max < ss.minimum).unwrap_or(false) {
        return Err("subtree maximum is below minimum");
    }
    Ok(ss)
}

peg::parser! {
    grammar acigrammar() for str {
        pub rule aci_item() -> AciItem =
            "{" _ "identificationTag" _ tag:string() sep()
            "precedence" _ precedence:precedence() sep()
            "authenticationLevel" _ authentication_level:auth_level() sep()
            "itemOrUserFirst" _ kind:item_or_user_first() _ "}"
            {
                AciItem {
                    identification_tag: tag,
                    precedence,
                    authentication_level,
                    kind,
                }
            }

        pub rule subtree_specification() -> SubtreeSpecification =
            "{" _ c:(subtree_component() ** sep()) _ "}" {? build_subtree(c) }

        rule item_or_user_first() -> AciItemKind =
            "itemFirst" _ ":" _ "{" _
                "protectedItems" _ protected_items:protected_items() sep()
                "itemPermissions" _ item_permissions:item_permissions() _
            "}" { AciItemKind::ItemFirst { protected_items, item_permissions } }
            / "userFirst" _ ":" _ "{" _
                "userClasses" _ user_classes:user_classes() sep()
                "userPermissions" _ user_permissions:user_permissions() _
            "}" { AciItemKind::UserFirst { user_classes, user_permissions } }

        rule auth_level() -> AuthenticationLevel =
            "none" { AuthenticationLevel::None }
            / "simple" { AuthenticationLevel::Simple }
            / "strong" { AuthenticationLevel::Strong }

        rule user_classes() -> Vec<UserClass> =
            "{" _ v:(user_class() ** sep()) _ "}" { v }

        rule user_class() -> UserClass =
            "allUsers" { UserClass::AllUsers }
            / "thisEntry" { UserClass::ThisEntry }
            / "parentOfEntry" { UserClass::ParentOfEntry }
            / "name" _ "{" _ v:(dn() ** sep()) _ "}" { UserClass::Name(v.into_iter().collect()) }
            / "userGroup" _ "{" _ v:(dn() ** sep()) _ "}" { UserClass::UserGroup(v.into_iter().collect()) }
            / "subtree" _ "{" _ v:(subtree_specification() ** sep()) _ "}" { UserClass::Subtree(v) }

        rule user_permissions() -> Vec<UserPermission> =
            "{" _ v:(user_permission() ** sep()) _ "}" { v }

        rule user_permission() -> UserPermission =
            "{" _ precedence:permission_precedence()?
            "protectedItems" _ protected_items:protected_items() sep()
            "grantsAndDenials" _ grants_and_denials:grants_and_denials() _ "}"
            { UserPermission { precedence, protected_items, grants_and_denials } }

        rule item_permissions() -> Vec<ItemPermission> =
            "{" _ v:(item_permission() ** sep()) _ "}" { v }

        rule item_permission() -> ItemPermission =
            "{" _ precedence:permission_precedence()?
            "userClasses" _ user_classes:user_classes() sep()
            "grantsAndDenials" _ grants_and_denials:grants_and_denials() _ "}"
            { ItemPermission { precedence, user_classes, grants_and_denials } }

        rule permission_precedence() -> u8 =
            "precedence" _ n:precedence() sep() { n }

        rule grants_and_denials() -> BTreeSet<GrantAndDenial> =
            "{" _ v:(grant_and_denial() ** sep()) _ "}" { v.into_iter().collect() }

        rule grant_and_denial() -> GrantAndDenial =
            "grant" op:micro_operation() { GrantAndDenial { op, grant: true } }
            / "deny" op:micro_operation() { GrantAndDenial { op, grant: false } }

        rule micro_operation() -> MicroOperation =
            "Add" { MicroOperation::Add }
            / "DiscloseOnError" { MicroOperation::DiscloseOnError }
            / "Read" { MicroOperation::Read }
            / "Remove" { MicroOperation::Remove }
            / "Browse" { MicroOperation::Browse }
            / "Export" { MicroOperation::Export }
            / "Import" { MicroOperation::Import }
            / "Modify" { MicroOperation::Modify }
            / "Rename" { MicroOperation::Rename }
            / "ReturnDN" { MicroOperation::ReturnDn }
            / "Compare" { MicroOperation::Compare }
            / "FilterMatch" { MicroOperation::FilterMatch }
            / "Invoke" { MicroOperation::Invoke }

        rule protected_items() -> Vec<ProtectedItem> =
            "{" _ v:(protected_item() ** sep()) _ "}" { v }

        rule protected_item() -> ProtectedItem =
            "entry" { ProtectedItem::Entry }
            / "allUserAttributeTypesAndValues" { ProtectedItem::AllUserAttributeTypesAndValues }
            / "allUserAttributeTypes" { ProtectedItem::AllUserAttributeTypes }
            / "attributeType" _ v:attr_set() { ProtectedItem::AttributeType(v) }
            / "allAttributeValues" _ v:attr_set() { ProtectedItem::AllAttributeValues(v) }
            / "attributeValue" _ "{" _ v:(ava() ** sep()) _ "}" { ProtectedItem::AttributeValue(v.into_iter().collect()) }
            / "selfValue" _ v:attr_set() { ProtectedItem::SelfValue(v) }
            / "maxValueCount" _ "{" _ v:(max_value_count() ** sep()) _ "}" { ProtectedItem::MaxValueCount(v) }
            / "maxImmSub" _ n:number() { ProtectedItem::MaxImmSub(n) }
            / "restrictedBy" _ "{" _ v:(restricted_by() ** sep()) _ "}" { ProtectedItem::RestrictedBy(v) }
            / "classes" _ r:refinement() { ProtectedItem::Classes(r) }

        rule attr_set() -> BTreeSet<String> =
            "{" _ v:(attr() ** sep()) _ "}" { v.into_iter().collect() }

        rule ava() -> (String, String) =
            a:attr() _ "=" _ v:ava_value() { (a, v) }

        rule ava_value() -> String =
            string()
            / s:$((!['"' | ',' | '{' | '}' | ' ' | '\t' | '\r' | '\n'] [_])+) { s.to_string() }

        rule max_value_count() -> MaxValueCountItem =
            "{" _ "type" _ attr:attr() sep() "maxCount" _ max:number() _ "}"
            { MaxValueCountItem { attr, max } }

        rule restricted_by() -> RestrictedByItem =
            "{" _ "type" _ attr:attr() sep() "valuesIn" _ values_in:attr() _ "}"
            { RestrictedByItem { attr, values_in } }

        rule subtree_component() -> SubtreeComponent =
            "base" _ d:dn() { SubtreeComponent::Base(d) }
            / "specificExclusions" _ "{" _ v:(exclusion() ** sep()) _ "}" { SubtreeComponent::Exclusions(v) }
            / "minimum" _ n:number() { SubtreeComponent::Minimum(n) }
            / "maximum" _ n:number() { SubtreeComponent::Maximum(n) }
            / "specificationFilter" _ r:refinement() { SubtreeComponent::Filter(r) }

        rule exclusion() -> Exclusion =
            "chopBefore" _ ":" _ d:dn() { Exclusion::ChopBefore(d) }
            / "chopAfter" _ ":" _ d:dn() { Exclusion::ChopAfter(d) }

        rule refinement() -> Refinement =
            "item" _ ":" _ c:oid() { Refinement::Item(c) }
            / "and" _ ":" _ "{" _ v:(refinement() ** sep()) _ "}" { Refinement::And(v) }
            / "or" _ ":" _ "{" _ v:(refinement() ** sep()) _ "}" { Refinement::Or(v) }
            / "not" _ ":" _ r:refinement() { Refinement::Not(Box::new(r)) }

        rule dn() -> Dn =
            s:string() {? Dn::parse(&s).or(Err("distinguished name")) }

        rule string() -> String =
            "\"" s:$((!"\"" [_])*) "\"" { s.to_string() }

        rule number() -> usize =
            n:$(['0'..='9']+) {? n.parse().or(Err("number")) }

        rule precedence() -> u8 =
            n:$(['0'..='9']+) {? n.parse().or(Err("precedence between 0 and 255")) }

        rule attr() -> String =
            s:$(['a'..='z' | 'A'..='Z'] ['a'..='z' | 'A'..='Z' | '0'..='9' | '-' | ';']*) { s.to_lowercase() }

        rule oid() -> String =
            s:$(['a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '.']+) { s.to_lowercase() }

        rule sep() = _ "," _

        rule _() = quiet!{[' ' | '\t' | '\r' | '\n']*}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_first() {
        let aci: AciItem = r#"
            { identificationTag "usersCanEditDescription",
              precedence 10,
              authenticationLevel simple,
              itemOrUserFirst userFirst: {
                userClasses { allUsers, name { "cn=Bob,ou=users,dc=example" } },
                userPermissions {
                  { protectedItems { entry }, grantsAndDenials { grantBrowse, grantReturnDN } },
                  { precedence 20,
                    protectedItems { attributeType { description, CN } },
                    grantsAndDenials { grantAdd, grantRemove, denyRename } } } } }
        "#
        .parse()
        .expect("failed to parse aci");

        assert_eq!(aci.identification_tag, "usersCanEditDescription");
        assert_eq!(aci.precedence, 10);
        assert_eq!(aci.authentication_level, AuthenticationLevel::Simple);
        let AciItemKind::UserFirst {
            user_classes,
            user_permissions,
        } = aci.kind
        else {
            panic!("expected user first");
        };
        assert_eq!(user_classes.len(), 2);
        assert_eq!(user_classes[0], UserClass::AllUsers);
        match &user_classes[1] {
            UserClass::Name(names) => assert!(names
                .contains(&Dn::parse("cn=bob,ou=users,dc=example").expect("invalid dn"))),
            other => panic!("unexpected user class {:?}", other),
        }

        assert_eq!(user_permissions.len(), 2);
        assert_eq!(user_permissions[0].precedence, None);
        assert_eq!(user_permissions[1].precedence, Some(20));
        assert_eq!(
            user_permissions[1].protected_items,
            vec![ProtectedItem::AttributeType(
                ["description".to_string(), "cn".to_string()]
                    .into_iter()
                    .collect()
            )]
        );
        assert!(user_permissions[1].grants_and_denials.contains(&GrantAndDenial {
            op: MicroOperation::Rename,
            grant: false
        }));
    }

    #[test]
    fn test_parse_item_first() {
        let aci = AciItemParser
            .parse(
                r#"{ identificationTag "groupReads", precedence 0, authenticationLevel none,
                itemOrUserFirst itemFirst: {
                  protectedItems { allUserAttributeTypesAndValues, maxValueCount { { type member, maxCount 2 } },
                    attributeValue { ou=people, cn="a b" }, restrictedBy { { type manager, valuesIn seeAlso } },
                    classes or: { item: person, item: 2.5.6.9 }, maxImmSub 3, selfValue { member } },
                  itemPermissions {
                    { userClasses { userGroup { "cn=staff,ou=groups,dc=example" }, subtree { { base "ou=users,dc=example", maximum 1 } } },
                      grantsAndDenials { grantRead, grantCompare, grantFilterMatch } } } } }"#,
            )
            .expect("failed to parse aci");

        let AciItemKind::ItemFirst {
            protected_items,
            item_permissions,
        } = aci.kind
        else {
            panic!("expected item first");
        };
        assert_eq!(protected_items.len(), 7);
        assert_eq!(protected_items[0], ProtectedItem::AllUserAttributeTypesAndValues);
        assert_eq!(
            protected_items[1],
            ProtectedItem::MaxValueCount(vec![MaxValueCountItem {
                attr: "member".to_string(),
                max: 2
            }])
        );
        assert_eq!(
            protected_items[2],
            ProtectedItem::AttributeValue(
                [
                    ("ou".to_string(), "people".to_string()),
                    ("cn".to_string(), "a b".to_string())
                ]
                .into_iter()
                .collect()
            )
        );
        assert_eq!(protected_items[5], ProtectedItem::MaxImmSub(3));
        assert_eq!(item_permissions.len(), 1);
        match &item_permissions[0].user_classes[1] {
            UserClass::Subtree(specs) => {
                assert_eq!(specs[0].maximum, Some(1));
                assert_eq!(specs[0].base.as_str(), "ou=users,dc=example");
            }
            other => panic!("unexpected user class {:?}", other),
        }
        assert_eq!(item_permissions[0].grants_and_denials.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        let bad = [
            "",
            "{ }",
            // precedence out of range
            r#"{ identificationTag "a", precedence 300, authenticationLevel none, itemOrUserFirst userFirst: { userClasses { allUsers }, userPermissions { } } }"#,
            // unknown micro operation
            r#"{ identificationTag "a", precedence 1, authenticationLevel none, itemOrUserFirst userFirst: { userClasses { allUsers }, userPermissions { { protectedItems { entry }, grantsAndDenials { grantEverything } } } } }"#,
            // bad dn in a user class
            r#"{ identificationTag "a", precedence 1, authenticationLevel none, itemOrUserFirst userFirst: { userClasses { name { "alice" } }, userPermissions { } } }"#,
        ];
        for b in bad {
            assert!(matches!(
                AciItemParser.parse(b),
                Err(OperationError::AciParseError(_))
            ));
        }

        assert!(parse_subtree_specification("{ minimum 3, maximum 1 }").is_err());
        assert!(parse_subtree_specification("{ minimum 1, minimum 2 }").is_err());
        assert!(parse_subtree_specification("{}").is_ok());
    }
}
