//! ikecmd
//!
//! Assembles a single IKE connection from the command line and hands it to
//! the tunnel daemon, which does the actual negotiation.

mod daemon;

use clap::Parser;
use ikecmd_core::config::Config;
use ikecmd_core::connection::{
    termination_channel, CmdOption, ConnectionOptions, InitiationJob, JobState,
};
use ikecmd_core::logging::init_logging_from_config;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::daemon::DaemonClient;

/// Command-line arguments for ikecmd
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Configuration file (default: <config dir>/ikecmd/config.toml)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Log level
    #[clap(short, long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[clap(long)]
    json_logs: bool,

    /// Path to the daemon's control socket
    #[clap(short = 's', long)]
    socket: Option<String>,

    /// DNS name or address to connect to
    #[clap(long)]
    host: Option<String>,

    /// Our identity
    #[clap(long)]
    identity: Option<String>,

    /// Identity expected from the server (default: the host)
    #[clap(long)]
    remote_identity: Option<String>,

    /// RSA private key to authenticate with
    #[clap(long, value_name = "FILE")]
    rsa: Option<PathBuf>,

    /// Additional local traffic selector (repeatable)
    #[clap(long = "local-ts", value_name = "CIDR")]
    local_ts: Vec<String>,

    /// Additional remote traffic selector (repeatable)
    #[clap(long = "remote-ts", value_name = "CIDR")]
    remote_ts: Vec<String>,

    /// Connection profile, e.g. v2-eap or v1-xauth-psk
    #[clap(long)]
    profile: Option<String>,
}

impl Args {
    /// Fold command-line values over the configuration.
    fn apply_to(self, config: &mut Config) {
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.json_logs {
            config.logging.json = true;
        }
        if let Some(socket) = self.socket {
            config.daemon.socket = socket;
        }

        let conn = &mut config.connection;
        if self.host.is_some() {
            conn.host = self.host;
        }
        if self.identity.is_some() {
            conn.identity = self.identity;
        }
        if self.remote_identity.is_some() {
            conn.remote_identity = self.remote_identity;
        }
        if let Some(rsa) = self.rsa {
            conn.private_key = Some(rsa.display().to_string());
        }
        if !self.local_ts.is_empty() {
            conn.local_ts = self.local_ts;
        }
        if !self.remote_ts.is_empty() {
            conn.remote_ts = self.remote_ts;
        }
        if self.profile.is_some() {
            conn.profile = self.profile;
        }
    }
}

/// Feed the connection settings through the option handler.
fn collect_options(config: &Config) -> anyhow::Result<ConnectionOptions> {
    let conn = &config.connection;
    let mut options = ConnectionOptions::new();

    if let Some(host) = &conn.host {
        options.handle(CmdOption::Host, host)?;
    }
    if let Some(server) = &conn.remote_identity {
        options.handle(CmdOption::RemoteIdentity, server)?;
    }
    if let Some(identity) = &conn.identity {
        options.handle(CmdOption::Identity, identity)?;
    }
    if let Some(key) = &conn.private_key {
        if !std::path::Path::new(key).is_file() {
            anyhow::bail!("private key {} not found", key);
        }
        options.handle(CmdOption::PrivateKey, key)?;
    }
    for cidr in &conn.local_ts {
        options.handle(CmdOption::LocalTs, cidr)?;
    }
    for cidr in &conn.remote_ts {
        options.handle(CmdOption::RemoteTs, cidr)?;
    }
    if let Some(profile) = &conn.profile {
        options.handle(CmdOption::Profile, profile)?;
    }

    Ok(options)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.apply_to(&mut config);

    let log_guard = init_logging_from_config(&config);

    info!("ikecmd starting up");
    debug!("Daemon socket path: {}", config.daemon.socket);

    let options = match collect_options(&config) {
        Ok(options) => options,
        Err(e) => {
            error!("{}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    let client = match DaemonClient::connect(&config.daemon.socket, config.daemon.timeout()).await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("{}", e);
            drop(log_guard);
            std::process::exit(1);
        }
    };

    let (terminator, terminated) = termination_channel();
    let (ready_tx, ready_rx) = oneshot::channel();
    let job = InitiationJob::new(options, client.clone(), client.clone(), terminator);
    let handle = job.spawn(ready_rx);

    // The daemon is ready once it answers a ping
    if let Err(e) = client.ping().await {
        error!("{}", e);
        drop(log_guard);
        std::process::exit(1);
    }
    let _ = ready_tx.send(());

    let state = handle.await?;
    if let Ok(reason) = terminated.await {
        debug!(state = ?state, "terminating: {}", reason);
        drop(log_guard);
        std::process::exit(1);
    }

    if state == JobState::Success {
        info!("Connection handed to the daemon, press Ctrl-C to exit");
        tokio::signal::ctrl_c().await?;
        info!("Shutting down");
    }

    if let Err(e) = client.close().await {
        debug!("{}", e);
    }

    Ok(())
}
