//! Search filters and scopes. These are the already decoded form of a search request;
//! matching is case insensitive on values, which is the equality rule every attribute
//! here uses.

use std::fmt;

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

impl SearchScope {
    /// True if `dn` is selected by this scope from `base`.
    pub fn contains(self, base: &Dn, dn: &Dn) -> bool {
        match self {
            SearchScope::Base => dn == base,
            SearchScope::OneLevel => dn.parent().as_ref() == Some(base),
            SearchScope::Subtree => dn.is_within(base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(String, String),
    Pres(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

pub fn f_eq(attr: &str, value: &str) -> Filter {
    Filter::Eq(attr.to_lowercase(), value.to_string())
}

pub fn f_pres(attr: &str) -> Filter {
    Filter::Pres(attr.to_lowercase())
}

pub fn f_and(vs: Vec<Filter>) -> Filter {
    Filter::And(vs)
}

pub fn f_or(vs: Vec<Filter>) -> Filter {
    Filter::Or(vs)
}

pub fn f_andnot(f: Filter) -> Filter {
    Filter::Not(Box::new(f))
}

impl Filter {
    /// The absolute true filter, `(&)`. Every entry matches it.
    pub fn all() -> Self {
        Filter::And(Vec::with_capacity(0))
    }

    pub fn matches(&self, e: &Entry) -> bool {
        match self {
            Filter::Eq(attr, value) => e.attribute_equality(attr, value),
            Filter::Pres(attr) => e.attribute_pres(attr),
            Filter::And(vs) => vs.iter().all(|f| f.matches(e)),
            Filter::Or(vs) => vs.iter().any(|f| f.matches(e)),
            Filter::Not(f) => !f.matches(e),
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(a, v) => write!(f, "({}={})", a, v),
            Filter::Pres(a) => write!(f, "({}=*)", a),
            Filter::And(vs) => {
                f.write_str("(&")?;
                for v in vs {
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
            Filter::Or(vs) => {
                f.write_str("(|")?;
                for v in vs {
                    write!(f, "{}", v)?;
                }
                f.write_str(")")
            }
            Filter::Not(v) => write!(f, "(!{})", v),
        }
    }
}
