//! IKE identities parsed from user-supplied strings.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

/// Kind of identity a string denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityKind {
    /// Matches any peer identity (`%any`)
    Any,
    /// IPv4 or IPv6 address
    Address,
    /// Fully qualified domain name
    Fqdn,
    /// RFC 822 email address
    Email,
    /// ASN.1 distinguished name
    Dn,
}

/// An identity as handed to the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    kind: IdentityKind,
    value: String,
}

impl Identity {
    /// Classify `s`. Never fails; unrecognised strings become FQDNs.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let (kind, value) = if s.is_empty() || s == "%any" {
            (IdentityKind::Any, "%any")
        } else if s.parse::<IpAddr>().is_ok() {
            (IdentityKind::Address, s)
        } else if s.contains('=') {
            (IdentityKind::Dn, s)
        } else if let Some(fqdn) = s.strip_prefix('@') {
            (IdentityKind::Fqdn, fqdn)
        } else if s.contains('@') {
            (IdentityKind::Email, s)
        } else {
            (IdentityKind::Fqdn, s)
        };

        Identity {
            kind,
            value: value.to_string(),
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Address for `Address` identities.
    pub fn address(&self) -> Option<IpAddr> {
        match self.kind {
            IdentityKind::Address => self.value.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
