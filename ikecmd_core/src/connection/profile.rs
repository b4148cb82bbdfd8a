//! Connection profiles and their expansion into authentication rounds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::error::{ConnectionError, ConnectionResult};
use crate::connection::selector::Side;

/// Supported combinations of IKE version and credential classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Profile {
    /// Nothing requested; picked from the available credentials
    #[default]
    Undefined,
    V2PublicKey,
    V2Eap,
    V2PublicKeyAndEap,
    V1PublicKey,
    V1Xauth,
    V1XauthPsk,
    V1Hybrid,
}

impl Profile {
    /// Profiles that can be requested by name, in table order.
    pub const NAMED: [Profile; 7] = [
        Profile::V2PublicKey,
        Profile::V2Eap,
        Profile::V2PublicKeyAndEap,
        Profile::V1PublicKey,
        Profile::V1Xauth,
        Profile::V1XauthPsk,
        Profile::V1Hybrid,
    ];

    /// Name accepted on the command line. `undefined` is display-only.
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Undefined => "undefined",
            Profile::V2PublicKey => "v2-public-key",
            Profile::V2Eap => "v2-eap",
            Profile::V2PublicKeyAndEap => "v2-public-key-and-eap",
            Profile::V1PublicKey => "v1-public-key",
            Profile::V1Xauth => "v1-xauth",
            Profile::V1XauthPsk => "v1-xauth-psk",
            Profile::V1Hybrid => "v1-hybrid",
        }
    }

    /// IKE version negotiated for this profile.
    pub fn version(&self) -> IkeVersion {
        match self {
            Profile::Undefined
            | Profile::V2PublicKey
            | Profile::V2Eap
            | Profile::V2PublicKeyAndEap => IkeVersion::V2,
            Profile::V1PublicKey | Profile::V1Xauth | Profile::V1XauthPsk | Profile::V1Hybrid => {
                IkeVersion::V1
            }
        }
    }

    /// Whether the profile authenticates us with a private key.
    pub fn requires_private_key(&self) -> bool {
        matches!(
            self,
            Profile::V2PublicKey
                | Profile::V2PublicKeyAndEap
                | Profile::V1PublicKey
                | Profile::V1Xauth
        )
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = ConnectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::NAMED
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| ConnectionError::UnknownProfile(s.to_string()))
    }
}

/// IKE protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IkeVersion {
    V1,
    V2,
}

impl fmt::Display for IkeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IkeVersion::V1 => write!(f, "IKEv1"),
            IkeVersion::V2 => write!(f, "IKEv2"),
        }
    }
}

/// Class of authentication material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialClass {
    PublicKey,
    PreSharedKey,
    Eap,
    Xauth,
    /// Accept whatever the peer offers
    Any,
}

impl fmt::Display for CredentialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CredentialClass::PublicKey => "public-key",
            CredentialClass::PreSharedKey => "pre-shared-key",
            CredentialClass::Eap => "eap",
            CredentialClass::Xauth => "xauth",
            CredentialClass::Any => "any",
        };
        f.write_str(name)
    }
}

/// One authentication round before identities are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRule {
    pub side: Side,
    pub class: CredentialClass,
}

impl AuthRule {
    pub fn local(class: CredentialClass) -> Self {
        AuthRule {
            side: Side::Local,
            class,
        }
    }

    pub fn remote(class: CredentialClass) -> Self {
        AuthRule {
            side: Side::Remote,
            class,
        }
    }
}

impl fmt::Display for AuthRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.side, self.class)
    }
}

/// Pick a concrete profile, check it against the available credentials and
/// expand it into ordered authentication rounds.
///
/// With no profile requested, a private key selects `v2-public-key` and its
/// absence selects `v2-eap`.
pub fn resolve(
    requested: Profile,
    has_private_key: bool,
) -> ConnectionResult<(Profile, Vec<AuthRule>)> {
    let profile = match requested {
        Profile::Undefined if has_private_key => Profile::V2PublicKey,
        Profile::Undefined => Profile::V2Eap,
        other => other,
    };

    if profile.requires_private_key() && !has_private_key {
        return Err(ConnectionError::MissingCredential(profile));
    }

    let rules = expand(profile)?;
    debug!(
        requested = %requested,
        profile = %profile,
        rounds = rules.len(),
        "resolved connection profile"
    );
    Ok((profile, rules))
}

fn expand(profile: Profile) -> ConnectionResult<Vec<AuthRule>> {
    use CredentialClass::*;

    let rules = match profile {
        Profile::V2PublicKey => vec![AuthRule::local(PublicKey), AuthRule::remote(Any)],
        Profile::V2Eap => vec![AuthRule::local(Eap), AuthRule::remote(Any)],
        Profile::V2PublicKeyAndEap => vec![
            AuthRule::local(PublicKey),
            AuthRule::local(Eap),
            AuthRule::remote(Any),
        ],
        Profile::V1PublicKey => vec![AuthRule::local(PublicKey), AuthRule::remote(PublicKey)],
        Profile::V1Xauth => vec![
            AuthRule::local(PublicKey),
            AuthRule::local(Xauth),
            AuthRule::remote(PublicKey),
        ],
        Profile::V1XauthPsk => vec![
            AuthRule::local(PreSharedKey),
            AuthRule::local(Xauth),
            AuthRule::remote(PreSharedKey),
        ],
        Profile::V1Hybrid => vec![AuthRule::local(Xauth), AuthRule::remote(PublicKey)],
        Profile::Undefined => {
            return Err(ConnectionError::UnknownProfile(profile.to_string()));
        }
    };
    Ok(rules)
}
