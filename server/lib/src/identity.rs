//! Contains structures related to the identity that initiated an operation. The
//! effective principal of a [`Session`] is what access controls are applied to.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// How strongly the principal proved who they are. Ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthenticationLevel {
    None,
    Simple,
    Strong,
}

impl fmt::Display for AuthenticationLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AuthenticationLevel::None => write!(f, "none"),
            AuthenticationLevel::Simple => write!(f, "simple"),
            AuthenticationLevel::Strong => write!(f, "strong"),
        }
    }
}

/// A bound identity. Immutable once the bind completes, apart from dropping the
/// credential material it was established with.
#[derive(Clone)]
pub struct Principal {
    dn: Dn,
    auth_level: AuthenticationLevel,
    credentials: Option<Vec<u8>>,
}

impl Principal {
    pub fn new(dn: Dn, auth_level: AuthenticationLevel) -> Self {
        Principal {
            dn,
            auth_level,
            credentials: None,
        }
    }

    pub fn anonymous() -> Self {
        Principal::new(Dn::root(), AuthenticationLevel::None)
    }

    pub fn with_credentials(mut self, credentials: Vec<u8>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn get_dn(&self) -> &Dn {
        &self.dn
    }

    pub fn auth_level(&self) -> AuthenticationLevel {
        self.auth_level
    }

    pub fn is_anonymous(&self) -> bool {
        self.dn.is_root()
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn clear_credentials(&mut self) {
        self.credentials = None;
    }
}

// Never print credential material.
impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("dn", &self.dn.as_str())
            .field("auth_level", &self.auth_level)
            .field("credentials", &self.credentials.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_anonymous() {
            write!(f, "anonymous")
        } else {
            write!(f, "{} ({})", self.dn, self.auth_level)
        }
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    authenticated: Arc<Principal>,
    effective: Option<Arc<Principal>>,
}

impl Session {
    pub fn new(principal: Principal) -> Self {
        Session {
            authenticated: Arc::new(principal),
            effective: None,
        }
    }

    pub fn anonymous() -> Self {
        Session::new(Principal::anonymous())
    }

    /// Act as `effective` while still being authenticated as the original principal.
    pub fn with_proxy(&self, effective: Principal) -> Self {
        Session {
            authenticated: self.authenticated.clone(),
            effective: Some(Arc::new(effective)),
        }
    }

    pub fn authenticated_principal(&self) -> &Principal {
        &self.authenticated
    }

    pub fn effective_principal(&self) -> &Principal {
        self.effective.as_deref().unwrap_or(&self.authenticated)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.effective {
            Some(eff) => write!(f, "{} as {}", self.authenticated, eff),
            None => write!(f, "{}", self.authenticated),
        }
    }
}
