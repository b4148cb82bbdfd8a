//! Connection assembly for ikecmd.
//!
//! Options are collected into [`ConnectionOptions`], the requested profile is
//! resolved into authentication rounds, and an [`InitiationJob`] builds the
//! [`ConnectionDescriptor`] and submits it to the daemon once it is ready.

mod daemon;
mod descriptor;
mod error;
mod identity;
mod job;
mod options;
mod profile;
mod selector;

pub use daemon::{Controller, PortQuery};
pub use descriptor::{
    remote_port_for, AuthRequirement, CertPolicy, ChildPolicy, ConnectionConfigBuilder,
    ConnectionDescriptor, DefaultProposals, IkeParams, IpsecMode, Lifetime, PeerPolicy, Proposal,
    ProposalFactory, ProtocolKind, UniquePolicy, CONNECTION_NAME, IKE_NATT_PORT, IKE_PORT,
};
pub use error::{ConnectionError, ConnectionResult, ControllerError};
pub use identity::{Identity, IdentityKind};
pub use job::{termination_channel, InitiationJob, JobState, Terminator};
pub use options::{CmdOption, ConnectionOptions};
pub use profile::{resolve, AuthRule, CredentialClass, IkeVersion, Profile};
pub use selector::{
    SelectorAddress, Side, TrafficSelector, TrafficSelectorSet, PORT_MAX, PORT_MIN, PROTOCOL_ANY,
};
