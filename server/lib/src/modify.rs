//! Modification expressions. A modify request carries an ordered list of these, each
//! naming one attribute and the values it adds, removes or replaces. Order matters: each
//! change is applied to the result of the previous one.

use std::slice;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum Modify {
    /// These values *should* exist after the change.
    Add(String, Vec<String>),
    /// These values *should not* exist after the change. No values removes the attribute.
    Remove(String, Vec<String>),
    /// The attribute holds exactly these values after the change. No values removes it.
    Replace(String, Vec<String>),
}

pub fn m_add(attr: &str, values: &[&str]) -> Modify {
    Modify::Add(attr.to_lowercase(), values.iter().map(|v| v.to_string()).collect())
}

pub fn m_remove(attr: &str, values: &[&str]) -> Modify {
    Modify::Remove(attr.to_lowercase(), values.iter().map(|v| v.to_string()).collect())
}

pub fn m_purge(attr: &str) -> Modify {
    Modify::Remove(attr.to_lowercase(), Vec::with_capacity(0))
}

pub fn m_replace(attr: &str, values: &[&str]) -> Modify {
    Modify::Replace(attr.to_lowercase(), values.iter().map(|v| v.to_string()).collect())
}

impl Modify {
    pub fn attr(&self) -> &str {
        match self {
            Modify::Add(a, _) | Modify::Remove(a, _) | Modify::Replace(a, _) => a.as_str(),
        }
    }

    pub fn values(&self) -> &[String] {
        match self {
            Modify::Add(_, v) | Modify::Remove(_, v) | Modify::Replace(_, v) => v.as_slice(),
        }
    }

    /// True if this change is about `attr`, compared case insensitively.
    pub fn is_attr(&self, attr: &str) -> bool {
        self.attr().eq_ignore_ascii_case(attr)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModifyList {
    // The order of this list matters. Each change must be done in order.
    mods: Vec<Modify>,
}

impl<'a> IntoIterator for &'a ModifyList {
    type IntoIter = slice::Iter<'a, Modify>;
    type Item = &'a Modify;

    fn into_iter(self) -> Self::IntoIter {
        self.mods.iter()
    }
}

impl ModifyList {
    pub fn new() -> Self {
        ModifyList {
            mods: Vec::with_capacity(0),
        }
    }

    pub fn new_list(mods: Vec<Modify>) -> Self {
        ModifyList { mods }
    }

    pub fn push_mod(&mut self, modify: Modify) {
        self.mods.push(modify)
    }

    pub fn iter(&self) -> slice::Iter<'_, Modify> {
        self.mods.iter()
    }

    pub fn len(&self) -> usize {
        self.mods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    /// True if any change in the list is about `attr`.
    pub fn touches(&self, attr: &str) -> bool {
        self.mods.iter().any(|m| m.is_attr(attr))
    }
}
