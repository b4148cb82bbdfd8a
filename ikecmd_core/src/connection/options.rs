//! Connection state populated from command-line style options.

use tracing::debug;

use crate::connection::error::ConnectionResult;
use crate::connection::profile::Profile;
use crate::connection::selector::TrafficSelectorSet;

/// Options that shape the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdOption {
    /// Host to connect to
    Host,
    /// Identity expected from the server
    RemoteIdentity,
    /// Our identity
    Identity,
    /// A private key was supplied
    PrivateKey,
    /// Additional local traffic selector
    LocalTs,
    /// Additional remote traffic selector
    RemoteTs,
    /// Connection profile name
    Profile,
}

/// Everything gathered from the options before the connection is assembled.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    host: Option<String>,
    server: Option<String>,
    identity: Option<String>,
    key_seen: bool,
    profile: Profile,
    pub(crate) local_ts: TrafficSelectorSet,
    pub(crate) remote_ts: TrafficSelectorSet,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptions {
            host: None,
            server: None,
            identity: None,
            key_seen: false,
            profile: Profile::Undefined,
            local_ts: TrafficSelectorSet::local(),
            remote_ts: TrafficSelectorSet::remote(),
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        ConnectionOptions::default()
    }

    /// Apply one option. Scalar options overwrite, selectors append.
    ///
    /// Bad selectors and unknown profile names are fatal for the caller.
    pub fn handle(&mut self, opt: CmdOption, arg: &str) -> ConnectionResult<()> {
        debug!(option = ?opt, value = arg, "handling connection option");
        match opt {
            CmdOption::Host => self.host = Some(arg.to_string()),
            CmdOption::RemoteIdentity => self.server = Some(arg.to_string()),
            CmdOption::Identity => self.identity = Some(arg.to_string()),
            CmdOption::PrivateKey => self.key_seen = true,
            CmdOption::LocalTs => self.local_ts.add(arg)?,
            CmdOption::RemoteTs => self.remote_ts.add(arg)?,
            CmdOption::Profile => {
                self.profile = arg.parse()?;
            }
        }
        Ok(())
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn remote_identity(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn has_private_key(&self) -> bool {
        self.key_seen
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn local_selectors(&self) -> &TrafficSelectorSet {
        &self.local_ts
    }

    pub fn remote_selectors(&self) -> &TrafficSelectorSet {
        &self.remote_ts
    }
}
