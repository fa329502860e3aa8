//! Distinguished names. A [`Dn`] is held leaf first, the same order it is written in,
//! and compares by its normalised form so that `CN=Alice,DC=Example` and
//! `cn=alice,dc=example` are the same name.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::prelude::*;

const ESCAPED_CHARS: [char; 9] = [',', '+', '"', '\\', '<', '>', ';', '=', '#'];

#[derive(Debug, Clone)]
pub struct Rdn {
    attr: String,
    value: String,
    norm_value: String,
}

impl Rdn {
    pub fn new(attr: &str, value: &str) -> Result<Self, OperationError> {
        let attr = attr.trim();
        let value = value.trim();
        if !valid_attr_type(attr) {
            return Err(OperationError::InvalidDn(format!("{}={}", attr, value)));
        }
        if value.is_empty() {
            return Err(OperationError::InvalidDn(format!("{}=", attr)));
        }
        Ok(Rdn {
            attr: attr.to_lowercase(),
            value: value.to_string(),
            norm_value: value.to_lowercase(),
        })
    }

    pub fn attr(&self) -> &str {
        &self.attr
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    fn parse_escaped(raw: &str) -> Result<Self, OperationError> {
        let mut attr = String::new();
        let mut value = String::new();
        let mut in_value = false;
        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars
                        .next()
                        .ok_or_else(|| OperationError::InvalidDn(raw.to_string()))?;
                    if in_value {
                        value.push(escaped)
                    } else {
                        return Err(OperationError::InvalidDn(raw.to_string()));
                    }
                }
                '=' if !in_value => in_value = true,
                c if in_value => value.push(c),
                c => attr.push(c),
            }
        }
        if !in_value {
            return Err(OperationError::InvalidDn(raw.to_string()));
        }
        Rdn::new(&attr, &value)
    }
}

impl FromStr for Rdn {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = split_unescaped(s, ',')?;
        match (parts.pop(), parts.is_empty()) {
            (Some(raw), true) => Rdn::parse_escaped(&raw),
            _ => Err(OperationError::InvalidDn(s.to_string())),
        }
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attr == other.attr && self.norm_value == other.norm_value
    }
}

impl Eq for Rdn {}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

#[derive(Debug, Clone)]
pub struct Dn {
    rdns: Vec<Rdn>,
    norm: String,
}

impl Dn {
    /// The empty name of the root DSE.
    pub fn root() -> Self {
        Dn {
            rdns: Vec::new(),
            norm: String::new(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, OperationError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Dn::root());
        }
        let rdns = split_unescaped(s, ',')?
            .iter()
            .map(|raw| Rdn::parse_escaped(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Dn::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Rdn>) -> Self {
        let norm = rdns
            .iter()
            .map(|r| format!("{}={}", r.attr, escape_value(&r.norm_value)))
            .collect::<Vec<_>>()
            .join(",");
        Dn { rdns, norm }
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// The number of name components.
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn parent(&self) -> Option<Dn> {
        if self.is_root() {
            None
        } else {
            Some(Dn::from_rdns(self.rdns[1..].to_vec()))
        }
    }

    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Dn::from_rdns(rdns)
    }

    /// Append `base` below this name, used to anchor relative names.
    pub fn concat(&self, base: &Dn) -> Dn {
        let mut rdns = self.rdns.clone();
        rdns.extend(base.rdns.iter().cloned());
        Dn::from_rdns(rdns)
    }

    /// True if `self` is strictly beneath `base`.
    pub fn is_descendant_of(&self, base: &Dn) -> bool {
        self.depth() > base.depth() && self.ends_with(base)
    }

    /// True if `self` is `base` or beneath it.
    pub fn is_within(&self, base: &Dn) -> bool {
        self.depth() >= base.depth() && self.ends_with(base)
    }

    fn ends_with(&self, base: &Dn) -> bool {
        let offset = self.rdns.len() - base.rdns.len();
        self.rdns[offset..] == base.rdns[..]
    }

    /// The part of this name below `base`, if it is within `base`.
    pub fn relative_to(&self, base: &Dn) -> Option<Dn> {
        if self.is_within(base) {
            let len = self.rdns.len() - base.rdns.len();
            Some(Dn::from_rdns(self.rdns[..len].to_vec()))
        } else {
            None
        }
    }

    /// Move this name from below `old_base` to below `new_base`.
    pub fn rebase(&self, old_base: &Dn, new_base: &Dn) -> Option<Dn> {
        self.relative_to(old_base).map(|rel| rel.concat(new_base))
    }

    /// The normalised string form, used as the key of every cache.
    pub fn as_str(&self) -> &str {
        &self.norm
    }
}

impl FromStr for Dn {
    type Err = OperationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dn::parse(s)
    }
}

impl PartialEq for Dn {
    fn eq(&self, other: &Self) -> bool {
        self.norm == other.norm
    }
}

impl Eq for Dn {}

impl Hash for Dn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.norm.hash(state)
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.norm.cmp(&other.norm)
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for rdn in self.rdns.iter() {
            if !first {
                f.write_str(",")?;
            }
            first = false;
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

fn valid_attr_type(attr: &str) -> bool {
    let mut chars = attr.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        Some(c) if c.is_ascii_digit() => attr.chars().all(|c| c.is_ascii_digit() || c == '.'),
        _ => false,
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if ESCAPED_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split on `sep` where it is not escaped. Escapes are kept for the next stage.
fn split_unescaped(s: &str, sep: char) -> Result<Vec<String>, OperationError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            let escaped = chars
                .next()
                .ok_or_else(|| OperationError::InvalidDn(s.to_string()))?;
            current.push(c);
            current.push(escaped);
        } else if c == sep {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::{Dn, Rdn};
    use crate::prelude::*;

    #[test]
    fn test_dn_normalisation() {
        let a = Dn::parse("CN=Alice , OU=Users,dc=Example").expect("invalid dn");
        let b = Dn::parse("cn=alice,ou=users,dc=example").expect("invalid dn");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "cn=alice,ou=users,dc=example");
        // Display keeps the value case that was written.
        assert_eq!(a.to_string(), "cn=Alice,ou=Users,dc=Example");
        assert_eq!(a.depth(), 3);
    }

    #[test]
    fn test_dn_escaped_separator() {
        let dn = Dn::parse("cn=Smith\\, John,ou=users,dc=example").expect("invalid dn");
        assert_eq!(dn.depth(), 3);
        assert_eq!(dn.rdn().map(|r| r.value()), Some("Smith, John"));
        let reparsed = Dn::parse(&dn.to_string()).expect("invalid dn");
        assert_eq!(dn, reparsed);
    }

    #[test]
    fn test_dn_invalid() {
        assert!(matches!(
            Dn::parse("alice"),
            Err(OperationError::InvalidDn(_))
        ));
        assert!(Dn::parse("cn=,dc=example").is_err());
        assert!(Dn::parse("=alice").is_err());
        assert!(Dn::parse("cn=alice\\").is_err());
        assert!("cn=a,dc=b".parse::<Rdn>().is_err());
    }

    #[test]
    fn test_dn_hierarchy() {
        let root = Dn::root();
        let suffix = Dn::parse("dc=example").expect("invalid dn");
        let users = Dn::parse("ou=users,dc=example").expect("invalid dn");
        let alice = Dn::parse("cn=alice,ou=users,dc=example").expect("invalid dn");

        assert!(root.is_root());
        assert_eq!(suffix.parent(), Some(Dn::root()));
        assert_eq!(root.parent(), None);
        assert_eq!(alice.parent().as_ref(), Some(&users));

        assert!(alice.is_descendant_of(&users));
        assert!(alice.is_descendant_of(&root));
        assert!(!users.is_descendant_of(&users));
        assert!(users.is_within(&users));
        assert!(!users.is_within(&alice));
        assert!(!Dn::parse("cn=alice,ou=groups,dc=example")
            .expect("invalid dn")
            .is_within(&users));
    }

    #[test]
    fn test_dn_rebase() {
        let users = Dn::parse("ou=users,dc=example").expect("invalid dn");
        let people = Dn::parse("ou=people,dc=example").expect("invalid dn");
        let alice = Dn::parse("cn=alice,ou=users,dc=example").expect("invalid dn");

        let moved = alice.rebase(&users, &people).expect("not within base");
        assert_eq!(moved.as_str(), "cn=alice,ou=people,dc=example");
        assert_eq!(people.rebase(&users, &people), None);

        let rel = alice.relative_to(&users).expect("not within base");
        assert_eq!(rel.as_str(), "cn=alice");
        assert_eq!(rel.concat(&people), moved);

        let rdn: Rdn = "cn=bob".parse().expect("invalid rdn");
        assert_eq!(users.child(rdn).as_str(), "cn=bob,ou=users,dc=example");
    }
}
