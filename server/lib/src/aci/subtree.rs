//! Subtree specifications select the entries an administrative area's subentry applies
//! to. The `base` and every exclusion are relative names, anchored at the
//! administrative point; `minimum` and `maximum` bound the depth below the base.

use std::str::FromStr;

use crate::prelude::*;

/// A refinement over the object classes of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refinement {
    Item(String),
    And(Vec<Refinement>),
    Or(Vec<Refinement>),
    Not(Box<Refinement>),
}

impl Refinement {
    pub fn matches(&self, e: &Entry) -> bool {
        match self {
            Refinement::Item(class) => e.has_class(class),
            Refinement::And(rs) => rs.iter().all(|r| r.matches(e)),
            Refinement::Or(rs) => rs.iter().any(|r| r.matches(e)),
            Refinement::Not(r) => !r.matches(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtreeSpecification {
    pub base: Dn,
    pub chop_before: Vec<Dn>,
    pub chop_after: Vec<Dn>,
    pub minimum: usize,
    pub maximum: Option<usize>,
    pub refinement: Option<Refinement>,
}

impl Default for SubtreeSpecification {
    fn default() -> Self {
        SubtreeSpecification {
            base: Dn::root(),
            chop_before: Vec::with_capacity(0),
            chop_after: Vec::with_capacity(0),
            minimum: 0,
            maximum: None,
            refinement: None,
        }
    }
}

impl SubtreeSpecification {
    /// True if `dn` is in the subtree this specification selects below `admin_point`.
    /// A refinement can only be satisfied when the entry is supplied.
    pub fn contains(&self, admin_point: &Dn, dn: &Dn, entry: Option<&Entry>) -> bool {
        let subtree_base = self.base.concat(admin_point);
        let Some(rel) = dn.relative_to(&subtree_base) else {
            return false;
        };

        let depth = rel.depth();
        if depth < self.minimum {
            return false;
        }
        if self.maximum.map(|max| depth > max).unwrap_or(false) {
            return false;
        }

        // chopBefore removes the named entry and everything below it.
        if self
            .chop_before
            .iter()
            .any(|chop| dn.is_within(&chop.concat(&subtree_base)))
        {
            return false;
        }
        // chopAfter keeps the named entry, but not what is below it.
        if self
            .chop_after
            .iter()
            .any(|chop| dn.is_descendant_of(&chop.concat(&subtree_base)))
        {
            return false;
        }

        match (&self.refinement, entry) {
            (None, _) => true,
            (Some(r), Some(e)) => r.matches(e),
            (Some(_), None) => false,
        }
    }
}

impl FromStr for SubtreeSpecification {
    type Err = OperationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        crate::aci::parser::parse_subtree_specification(input)
    }
}
