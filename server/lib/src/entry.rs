//! Entries are the base unit of object storage in the directory. An [`Entry`] is a named
//! collection of attribute-value sets, sometimes called attribute value assertions, or AVAs.
//! The attribute is a "key" and it holds one or more values with no ordering.
//!
//! ```text
//! dn: cn=alice,ou=users,dc=example
//! objectclass: person
//! cn: alice
//! description: first user
//! ```
//!
//! There are three rules for entries:
//! * Attribute names are held lower case.
//! * Any AVA with zero values is removed.
//! * `objectclass` values are held lower case so class checks are exact.
//!
//! An [`EntryView`] is a projection of an entry used while a modify request is being
//! authorised. It is never stored: each modification produces a new view that the next
//! permission check reads.

use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::prelude::*;

pub type Eattrs = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    dn: Dn,
    attrs: Eattrs,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Entry {
            dn,
            attrs: BTreeMap::new(),
        }
    }

    /// Build an entry from a single LDIF record. Supports `attr:: base64` values and
    /// folded continuation lines.
    pub fn from_ldif(ldif: &str) -> Result<Self, OperationError> {
        let mut lines: Vec<String> = Vec::new();
        for line in ldif.lines() {
            if line.starts_with('#') {
                continue;
            }
            if let Some(cont) = line.strip_prefix(' ') {
                match lines.last_mut() {
                    Some(prev) => prev.push_str(cont),
                    None => return Err(OperationError::InvalidAttribute(line.to_string())),
                }
            } else if !line.trim().is_empty() {
                lines.push(line.to_string());
            }
        }

        let mut iter = lines.into_iter().map(|line| parse_ldif_line(&line));
        let dn = match iter.next() {
            Some(Ok((attr, value))) if attr == "dn" => Dn::parse(&value)?,
            Some(Err(e)) => return Err(e),
            _ => {
                request_error!("ldif record must start with a dn line");
                return Err(OperationError::InvalidDn(String::new()));
            }
        };

        let mut entry = Entry::new(dn);
        for r in iter {
            let (attr, value) = r?;
            entry.add_ava(&attr, &value);
        }
        Ok(entry)
    }

    pub fn get_dn(&self) -> &Dn {
        &self.dn
    }

    /// The same entry stored under another name.
    pub fn with_dn(&self, dn: Dn) -> Self {
        Entry {
            dn,
            attrs: self.attrs.clone(),
        }
    }

    pub fn add_ava(&mut self, attr: &str, value: &str) -> bool {
        let attr = attr.to_lowercase();
        let value = norm_value(&attr, value);
        self.attrs.entry(attr).or_default().insert(value)
    }

    /// Remove a value, matched case insensitively. Returns false if it was not present.
    pub fn remove_ava(&mut self, attr: &str, value: &str) -> bool {
        remove_value(&mut self.attrs, &attr.to_lowercase(), value)
    }

    pub fn purge_ava(&mut self, attr: &str) -> bool {
        self.attrs.remove(&attr.to_lowercase()).is_some()
    }

    pub fn set_ava<T>(&mut self, attr: &str, iter: T)
    where
        T: IntoIterator<Item = String>,
    {
        let attr = attr.to_lowercase();
        let values: BTreeSet<String> = iter.into_iter().map(|v| norm_value(&attr, &v)).collect();
        if values.is_empty() {
            self.attrs.remove(&attr);
        } else {
            self.attrs.insert(attr, values);
        }
    }

    pub fn get_ava_set(&self, attr: &str) -> Option<&BTreeSet<String>> {
        get_set(&self.attrs, attr)
    }

    pub fn get_ava_single(&self, attr: &str) -> Option<&str> {
        self.get_ava_set(attr)
            .and_then(|vs| vs.iter().next())
            .map(|s| s.as_str())
    }

    pub fn get_ava_names(&self) -> impl Iterator<Item = &str> {
        self.attrs.keys().map(|k| k.as_str())
    }

    pub fn get_ava_iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.attrs.iter()
    }

    pub fn attribute_pres(&self, attr: &str) -> bool {
        self.get_ava_set(attr).is_some()
    }

    pub fn attribute_equality(&self, attr: &str, value: &str) -> bool {
        contains_value(&self.attrs, attr, value)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attribute_equality(ATTR_OBJECTCLASS, class)
    }

    pub fn is_subentry(&self) -> bool {
        self.has_class(CLASS_SUBENTRY) || self.has_class(CLASS_ACCESS_CONTROL_SUBENTRY)
    }

    pub fn is_access_control_subentry(&self) -> bool {
        self.has_class(CLASS_ACCESS_CONTROL_SUBENTRY)
    }

    /// The attribute that carries the members of this group, if it is a group.
    pub fn group_member_attr(&self) -> Option<&'static str> {
        if self.has_class(CLASS_GROUP_OF_NAMES) {
            Some(ATTR_MEMBER)
        } else if self.has_class(CLASS_GROUP_OF_UNIQUE_NAMES) {
            Some(ATTR_UNIQUE_MEMBER)
        } else {
            None
        }
    }

    /// Apply one modification in place. Removing values from an attribute that is not
    /// present is a schema violation, as is removing a value the attribute does not hold.
    pub fn apply_modify(&mut self, modify: &Modify) -> Result<(), OperationError> {
        apply_to_attrs(&mut self.attrs, modify, true)
    }

    /// A copy holding only the attributes and values `allow` accepts.
    pub fn reduce_attributes<F>(&self, allow: F) -> Entry
    where
        F: Fn(&str, Option<&str>) -> bool,
    {
        let attrs = self
            .attrs
            .iter()
            .filter(|(attr, _)| allow(attr.as_str(), None))
            .filter_map(|(attr, values)| {
                let kept: BTreeSet<String> = values
                    .iter()
                    .filter(|v| allow(attr.as_str(), Some(v.as_str())))
                    .cloned()
                    .collect();
                if kept.is_empty() {
                    None
                } else {
                    Some((attr.clone(), kept))
                }
            })
            .collect();
        Entry {
            dn: self.dn.clone(),
            attrs,
        }
    }

    /// A copy holding only the named attributes. `None` keeps everything.
    pub fn select_attributes(&self, attrs: Option<&[String]>) -> Entry {
        match attrs {
            None => self.clone(),
            Some(names) => {
                self.reduce_attributes(|attr, _| names.iter().any(|n| n.eq_ignore_ascii_case(attr)))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    dn: Dn,
    attrs: Eattrs,
}

impl From<&Entry> for EntryView {
    fn from(e: &Entry) -> Self {
        EntryView {
            dn: e.dn.clone(),
            attrs: e.attrs.clone(),
        }
    }
}

impl From<EntryView> for Entry {
    fn from(v: EntryView) -> Self {
        Entry {
            dn: v.dn,
            attrs: v.attrs,
        }
    }
}

impl EntryView {
    pub fn get_dn(&self) -> &Dn {
        &self.dn
    }

    pub fn get_ava_set(&self, attr: &str) -> Option<&BTreeSet<String>> {
        get_set(&self.attrs, attr)
    }

    pub fn attribute_equality(&self, attr: &str, value: &str) -> bool {
        contains_value(&self.attrs, attr, value)
    }

    pub fn value_count(&self, attr: &str) -> usize {
        self.get_ava_set(attr).map(|vs| vs.len()).unwrap_or(0)
    }

    /// The view as it is after `modify`. The projection is lenient: a change that would be
    /// rejected by storage still yields a view so later checks can run.
    pub fn apply(&self, modify: &Modify) -> EntryView {
        let mut attrs = self.attrs.clone();
        // Lenient application never fails.
        let _ = apply_to_attrs(&mut attrs, modify, false);
        EntryView {
            dn: self.dn.clone(),
            attrs,
        }
    }
}

fn norm_value(attr: &str, value: &str) -> String {
    if attr == ATTR_OBJECTCLASS {
        value.trim().to_lowercase()
    } else {
        value.to_string()
    }
}

fn get_set<'a>(attrs: &'a Eattrs, attr: &str) -> Option<&'a BTreeSet<String>> {
    if attr.bytes().any(|b| b.is_ascii_uppercase()) {
        attrs.get(&attr.to_lowercase())
    } else {
        attrs.get(attr)
    }
}

fn contains_value(attrs: &Eattrs, attr: &str, value: &str) -> bool {
    get_set(attrs, attr)
        .map(|vs| vs.iter().any(|v| v.eq_ignore_ascii_case(value)))
        .unwrap_or(false)
}

fn remove_value(attrs: &mut Eattrs, attr: &str, value: &str) -> bool {
    let Some(vs) = attrs.get_mut(attr) else {
        return false;
    };
    let before = vs.len();
    vs.retain(|v| !v.eq_ignore_ascii_case(value));
    let removed = vs.len() != before;
    if vs.is_empty() {
        attrs.remove(attr);
    }
    removed
}

fn apply_to_attrs(attrs: &mut Eattrs, modify: &Modify, strict: bool) -> Result<(), OperationError> {
    let attr = modify.attr().to_lowercase();
    match modify {
        Modify::Add(_, values) => {
            if values.is_empty() && strict {
                return Err(OperationError::SchemaViolation(
                    SchemaError::InvalidAttributeSyntax(attr),
                ));
            }
            let set = attrs.entry(attr.clone()).or_default();
            for v in values {
                set.insert(norm_value(&attr, v));
            }
            if set.is_empty() {
                attrs.remove(&attr);
            }
        }
        Modify::Remove(_, values) if values.is_empty() => {
            if attrs.remove(&attr).is_none() && strict {
                return Err(OperationError::SchemaViolation(
                    SchemaError::NoSuchAttribute(attr),
                ));
            }
        }
        Modify::Remove(_, values) => {
            for v in values {
                if !remove_value(attrs, &attr, v) && strict {
                    return Err(OperationError::SchemaViolation(
                        SchemaError::NoSuchAttribute(attr),
                    ));
                }
            }
        }
        Modify::Replace(_, values) => {
            let set: BTreeSet<String> = values.iter().map(|v| norm_value(&attr, v)).collect();
            if set.is_empty() {
                attrs.remove(&attr);
            } else {
                attrs.insert(attr, set);
            }
        }
    }
    Ok(())
}

fn parse_ldif_line(line: &str) -> Result<(String, String), OperationError> {
    let (attr, rest) = line
        .split_once(':')
        .ok_or_else(|| OperationError::InvalidAttribute(line.to_string()))?;
    let attr = attr.trim().to_lowercase();
    if attr.is_empty() {
        return Err(OperationError::InvalidAttribute(line.to_string()));
    }
    let value = match rest.strip_prefix(':') {
        Some(b64) => {
            let raw = STANDARD.decode(b64.trim()).map_err(|e| {
                request_error!(?e, %attr, "invalid base64 value in ldif");
                OperationError::InvalidAttribute(attr.clone())
            })?;
            String::from_utf8(raw).map_err(|_| OperationError::InvalidAttribute(attr.clone()))?
        }
        None => rest.trim_start().to_string(),
    };
    Ok((attr, value))
}
