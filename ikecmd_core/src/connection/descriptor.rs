//! The connection descriptor handed to the daemon, and the builder that
//! assembles it.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::connection::identity::Identity;
use crate::connection::profile::{AuthRule, CredentialClass, IkeVersion};
use crate::connection::selector::{Side, TrafficSelector};

/// Standard IKE port.
pub const IKE_PORT: u16 = 500;

/// IKE port used once NAT traversal is in play.
pub const IKE_NATT_PORT: u16 = 4500;

/// Name of the connection and its child policy.
pub const CONNECTION_NAME: &str = "cmd";

/// Pick the peer port the same way the daemon does: stay on 500 while we
/// are bound there, otherwise talk to the NAT-T port.
pub fn remote_port_for(local_port: u16) -> u16 {
    if local_port == IKE_PORT {
        IKE_PORT
    } else {
        IKE_NATT_PORT
    }
}

/// Protocol a proposal applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// Key exchange
    Ike,
    /// Data protection
    Esp,
}

/// Cipher proposal. Its contents are interpreted by the daemon only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub protocol: ProtocolKind,
    pub spec: String,
}

/// Source of protocol-default proposals.
pub trait ProposalFactory: Send + Sync {
    fn create_default(&self, protocol: ProtocolKind) -> Proposal;
}

/// Asks the daemon for its built-in default proposal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProposals;

impl ProposalFactory for DefaultProposals {
    fn create_default(&self, protocol: ProtocolKind) -> Proposal {
        Proposal {
            protocol,
            spec: "default".to_string(),
        }
    }
}

/// When to send our certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertPolicy {
    Always,
    IfAsked,
    Never,
}

/// What to do with an existing connection under the same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UniquePolicy {
    Never,
    Keep,
    Replace,
}

/// Child SA encapsulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpsecMode {
    Tunnel,
    Transport,
}

/// Key exchange endpoints and parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IkeParams {
    pub version: IkeVersion,
    pub local_addr: IpAddr,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub fragmentation: bool,
    pub proposal: Proposal,
}

/// Peer-level negotiation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerPolicy {
    pub cert_policy: CertPolicy,
    pub unique: UniquePolicy,
    pub keying_tries: u32,
    pub rekey_time: Duration,
    /// `None` disables reauthentication
    pub reauth_time: Option<Duration>,
    pub jitter_time: Duration,
    pub over_time: Duration,
    pub mobike: bool,
    pub aggressive: bool,
    pub dpd_delay: Duration,
    /// `None` disables the DPD timeout
    pub dpd_timeout: Option<Duration>,
    /// Virtual addresses requested from the peer
    pub virtual_ips: Vec<IpAddr>,
}

impl Default for PeerPolicy {
    fn default() -> Self {
        PeerPolicy {
            cert_policy: CertPolicy::IfAsked,
            unique: UniquePolicy::Replace,
            keying_tries: 1,
            rekey_time: Duration::from_secs(10 * 3600),
            reauth_time: None,
            jitter_time: Duration::from_secs(600),
            over_time: Duration::from_secs(600),
            mobike: true,
            aggressive: false,
            dpd_delay: Duration::from_secs(30),
            dpd_timeout: None,
            virtual_ips: vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)],
        }
    }
}

/// Child SA lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifetime {
    pub life: Duration,
    pub rekey: Duration,
    pub jitter: Duration,
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime {
            life: Duration::from_secs(3 * 3600),
            rekey: Duration::from_secs(2 * 3600 + 50 * 60),
            jitter: Duration::from_secs(5 * 60),
        }
    }
}

/// The single data-protection policy of the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildPolicy {
    pub name: String,
    pub lifetime: Lifetime,
    pub mode: IpsecMode,
    pub proposal: Proposal,
    pub local_ts: Vec<TrafficSelector>,
    pub remote_ts: Vec<TrafficSelector>,
}

/// One authentication round with its identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequirement {
    pub side: Side,
    pub class: CredentialClass,
    pub identity: Identity,
}

/// Fully assembled tunnel description. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    name: String,
    ike: IkeParams,
    peer: PeerPolicy,
    auth: Vec<AuthRequirement>,
    child: ChildPolicy,
}

impl ConnectionDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> IkeVersion {
        self.ike.version
    }

    pub fn ike(&self) -> &IkeParams {
        &self.ike
    }

    pub fn peer(&self) -> &PeerPolicy {
        &self.peer
    }

    /// Authentication rounds in negotiation order.
    pub fn auth(&self) -> &[AuthRequirement] {
        &self.auth
    }

    /// Rounds for one side, in order.
    pub fn auth_for(&self, side: Side) -> impl Iterator<Item = &AuthRequirement> {
        self.auth.iter().filter(move |a| a.side == side)
    }

    pub fn child(&self) -> &ChildPolicy {
        &self.child
    }

    pub fn local_selectors(&self) -> &[TrafficSelector] {
        &self.child.local_ts
    }

    pub fn remote_selectors(&self) -> &[TrafficSelector] {
        &self.child.remote_ts
    }
}

/// Assembles a [`ConnectionDescriptor`] from resolved inputs.
#[derive(Debug, Clone)]
pub struct ConnectionConfigBuilder {
    host: String,
    identity: String,
    remote_identity: Option<String>,
    version: IkeVersion,
    local_port: u16,
    rules: Vec<AuthRule>,
    local_ts: Vec<TrafficSelector>,
    remote_ts: Vec<TrafficSelector>,
}

impl ConnectionConfigBuilder {
    /// Start a builder for `host`, authenticating locally as `identity`.
    pub fn new(host: impl Into<String>, identity: impl Into<String>) -> Self {
        ConnectionConfigBuilder {
            host: host.into(),
            identity: identity.into(),
            remote_identity: None,
            version: IkeVersion::V2,
            local_port: IKE_PORT,
            rules: Vec::new(),
            local_ts: Vec::new(),
            remote_ts: Vec::new(),
        }
    }

    /// Identity expected from the peer; the host is used when unset.
    pub fn with_remote_identity(mut self, remote_identity: Option<String>) -> Self {
        self.remote_identity = remote_identity;
        self
    }

    pub fn with_version(mut self, version: IkeVersion) -> Self {
        self.version = version;
        self
    }

    /// Port the daemon's IKE socket is bound to.
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    pub fn with_auth(mut self, rules: Vec<AuthRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_local_selectors(mut self, selectors: Vec<TrafficSelector>) -> Self {
        self.local_ts = selectors;
        self
    }

    pub fn with_remote_selectors(mut self, selectors: Vec<TrafficSelector>) -> Self {
        self.remote_ts = selectors;
        self
    }

    pub fn build(self, proposals: &dyn ProposalFactory) -> ConnectionDescriptor {
        let remote_port = remote_port_for(self.local_port);
        let ike = IkeParams {
            version: self.version,
            local_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            local_port: self.local_port,
            remote_host: self.host.clone(),
            remote_port,
            fragmentation: false,
            proposal: proposals.create_default(ProtocolKind::Ike),
        };

        let local_id = Identity::parse(&self.identity);
        let remote_id = Identity::parse(self.remote_identity.as_deref().unwrap_or(&self.host));
        let auth = self
            .rules
            .iter()
            .map(|rule| AuthRequirement {
                side: rule.side,
                class: rule.class,
                identity: match rule.side {
                    Side::Local => local_id.clone(),
                    Side::Remote => remote_id.clone(),
                },
            })
            .collect();

        let child = ChildPolicy {
            name: CONNECTION_NAME.to_string(),
            lifetime: Lifetime::default(),
            mode: IpsecMode::Tunnel,
            proposal: proposals.create_default(ProtocolKind::Esp),
            local_ts: self.local_ts,
            remote_ts: self.remote_ts,
        };

        debug!(
            host = %self.host,
            version = %self.version,
            local_port = self.local_port,
            remote_port,
            "assembled connection descriptor"
        );

        ConnectionDescriptor {
            name: CONNECTION_NAME.to_string(),
            ike,
            peer: PeerPolicy::default(),
            auth,
            child,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::identity::IdentityKind;
    use crate::connection::profile::{resolve, Profile};
    use crate::connection::selector::TrafficSelectorSet;

    fn builder() -> ConnectionConfigBuilder {
        ConnectionConfigBuilder::new("vpn.example.com", "alice@example.com")
    }

    #[test]
    fn test_remote_port_selection() {
        assert_eq!(remote_port_for(IKE_PORT), IKE_PORT);
        assert_eq!(remote_port_for(IKE_NATT_PORT), IKE_NATT_PORT);
        assert_eq!(remote_port_for(12345), IKE_NATT_PORT);

        let desc = builder().with_local_port(12345).build(&DefaultProposals);
        assert_eq!(desc.ike().local_port, 12345);
        assert_eq!(desc.ike().remote_port, IKE_NATT_PORT);

        let desc = builder().build(&DefaultProposals);
        assert_eq!(desc.ike().remote_port, IKE_PORT);
    }

    #[test]
    fn test_fixed_negotiation_defaults() {
        let desc = builder().build(&DefaultProposals);
        let peer = desc.peer();
        assert_eq!(peer.keying_tries, 1);
        assert_eq!(peer.rekey_time, Duration::from_secs(36000));
        assert_eq!(peer.reauth_time, None);
        assert_eq!(peer.jitter_time, Duration::from_secs(600));
        assert_eq!(peer.over_time, Duration::from_secs(600));
        assert!(peer.mobike);
        assert!(!peer.aggressive);
        assert_eq!(peer.unique, UniquePolicy::Replace);
        assert_eq!(peer.cert_policy, CertPolicy::IfAsked);
        assert_eq!(peer.dpd_delay, Duration::from_secs(30));
        assert_eq!(peer.virtual_ips, vec![IpAddr::V4(Ipv4Addr::UNSPECIFIED)]);

        let child = desc.child();
        assert_eq!(child.name, CONNECTION_NAME);
        assert_eq!(child.mode, IpsecMode::Tunnel);
        assert_eq!(child.lifetime.life, Duration::from_secs(10800));
        assert_eq!(child.lifetime.rekey, Duration::from_secs(10200));
        assert_eq!(child.lifetime.jitter, Duration::from_secs(300));
        assert_eq!(child.proposal.protocol, ProtocolKind::Esp);
        assert_eq!(desc.ike().proposal.protocol, ProtocolKind::Ike);
        assert!(!desc.ike().fragmentation);
    }

    #[test]
    fn test_identities_follow_side() {
        let (_, rules) = resolve(Profile::V2PublicKeyAndEap, true).unwrap();
        let desc = builder().with_auth(rules).build(&DefaultProposals);

        let classes: Vec<_> = desc.auth().iter().map(|a| (a.side, a.class)).collect();
        assert_eq!(
            classes,
            vec![
                (Side::Local, CredentialClass::PublicKey),
                (Side::Local, CredentialClass::Eap),
                (Side::Remote, CredentialClass::Any),
            ]
        );
        for local in desc.auth_for(Side::Local) {
            assert_eq!(local.identity.value(), "alice@example.com");
            assert_eq!(local.identity.kind(), IdentityKind::Email);
        }
        let remote: Vec<_> = desc.auth_for(Side::Remote).collect();
        assert_eq!(remote.len(), 1);
        assert_eq!(remote[0].identity.value(), "vpn.example.com");
    }

    #[test]
    fn test_remote_identity_override() {
        let (_, rules) = resolve(Profile::V1PublicKey, true).unwrap();
        let desc = builder()
            .with_remote_identity(Some("C=CH, CN=gateway".to_string()))
            .with_version(IkeVersion::V1)
            .with_auth(rules)
            .build(&DefaultProposals);

        assert_eq!(desc.version(), IkeVersion::V1);
        let remote: Vec<_> = desc.auth_for(Side::Remote).collect();
        assert_eq!(remote[0].identity.kind(), IdentityKind::Dn);
        assert_eq!(desc.ike().remote_host, "vpn.example.com");
    }

    #[test]
    fn test_selectors_are_moved_in_order() {
        let mut local = TrafficSelectorSet::local();
        local.add("10.0.0.0/24").unwrap();
        let mut remote = TrafficSelectorSet::remote();
        remote.add("192.168.0.0/16").unwrap();
        remote.add("172.16.0.0/12").unwrap();

        let desc = builder()
            .with_local_selectors(local.drain())
            .with_remote_selectors(remote.drain())
            .build(&DefaultProposals);

        assert_eq!(desc.local_selectors().len(), 2);
        assert!(desc.local_selectors()[0].is_dynamic());
        assert_eq!(desc.remote_selectors().len(), 2);
        assert!(desc.remote_selectors()[1].contains("172.20.0.1".parse().unwrap()));
        assert!(local.is_empty());
        assert!(remote.is_empty());
    }

    struct FixedProposals;

    impl ProposalFactory for FixedProposals {
        fn create_default(&self, protocol: ProtocolKind) -> Proposal {
            let spec = match protocol {
                ProtocolKind::Ike => "aes256-sha256-modp3072",
                ProtocolKind::Esp => "aes256gcm16",
            };
            Proposal {
                protocol,
                spec: spec.to_string(),
            }
        }
    }

    #[test]
    fn test_proposals_come_from_factory() {
        let desc = builder().build(&FixedProposals);
        assert_eq!(desc.ike().proposal.spec, "aes256-sha256-modp3072");
        assert_eq!(desc.child().proposal.spec, "aes256gcm16");
    }
}
