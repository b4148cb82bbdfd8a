//! One-shot job that assembles the connection and hands it to the daemon.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::connection::daemon::{Controller, PortQuery};
use crate::connection::descriptor::{
    ConnectionConfigBuilder, ConnectionDescriptor, DefaultProposals, ProposalFactory,
};
use crate::connection::error::{ConnectionError, ConnectionResult};
use crate::connection::options::ConnectionOptions;
use crate::connection::profile::resolve;

/// Progress of the initiation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Waiting for the daemon to come up
    Pending,
    /// Resolving the profile and building the descriptor
    Assembling,
    /// Descriptor handed to the daemon
    Submitted,
    /// The daemon accepted the connection
    Success,
    /// Aborted; termination was requested
    Failed,
}

/// Sending half of the termination channel. Delivers at most one request.
#[derive(Debug)]
pub struct Terminator {
    tx: Option<oneshot::Sender<ConnectionError>>,
}

/// Create a terminator and the receiver the process owner waits on.
pub fn termination_channel() -> (Terminator, oneshot::Receiver<ConnectionError>) {
    let (tx, rx) = oneshot::channel();
    (Terminator { tx: Some(tx) }, rx)
}

impl Terminator {
    /// Ask the owning process to shut down. Returns `false` if a request
    /// was already made or nobody is listening.
    pub fn request(&mut self, reason: ConnectionError) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(reason).is_ok(),
            None => false,
        }
    }
}

/// Initiates the configured connection once the daemon is ready.
///
/// Runs once and is never requeued; any failure requests termination.
pub struct InitiationJob {
    options: ConnectionOptions,
    ports: Arc<dyn PortQuery>,
    controller: Arc<dyn Controller>,
    proposals: Arc<dyn ProposalFactory>,
    terminator: Terminator,
    state: JobState,
}

impl InitiationJob {
    pub fn new(
        options: ConnectionOptions,
        ports: Arc<dyn PortQuery>,
        controller: Arc<dyn Controller>,
        terminator: Terminator,
    ) -> Self {
        InitiationJob {
            options,
            ports,
            controller,
            proposals: Arc::new(DefaultProposals),
            terminator,
            state: JobState::Pending,
        }
    }

    /// Use a different source of default proposals.
    pub fn with_proposals(mut self, proposals: Arc<dyn ProposalFactory>) -> Self {
        self.proposals = proposals;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    /// Run the job on the tokio runtime once `ready` fires.
    pub fn spawn(self, ready: oneshot::Receiver<()>) -> JoinHandle<JobState> {
        tokio::spawn(self.run(ready))
    }

    /// Wait for readiness, assemble, submit. Returns the final state.
    ///
    /// If the readiness sender goes away without firing, the job is dropped
    /// in `Pending` and nothing is terminated.
    pub async fn run(mut self, ready: oneshot::Receiver<()>) -> JobState {
        if ready.await.is_err() {
            debug!("daemon never became ready, initiation cancelled");
            return self.state;
        }

        self.state = JobState::Assembling;
        let descriptor = match self.assemble().await {
            Ok(descriptor) => descriptor,
            Err(err) => return self.fail(err),
        };

        self.state = JobState::Submitted;
        info!(
            host = %descriptor.ike().remote_host,
            version = %descriptor.version(),
            remote_port = descriptor.ike().remote_port,
            "initiating connection"
        );
        if let Err(err) = self.controller.initiate(descriptor).await {
            return self.fail(err.into());
        }

        self.state = JobState::Success;
        info!("connection initiated");
        self.state
    }

    async fn assemble(&mut self) -> ConnectionResult<ConnectionDescriptor> {
        let host = self
            .options
            .host()
            .ok_or(ConnectionError::MissingRequiredField("host"))?
            .to_string();
        let identity = self
            .options
            .identity()
            .ok_or(ConnectionError::MissingRequiredField("identity"))?
            .to_string();
        let remote_identity = self.options.remote_identity().map(str::to_string);

        let (profile, rules) = resolve(self.options.profile(), self.options.has_private_key())?;
        let local_port = self.ports.local_port().await?;

        self.options.remote_ts.default_if_empty();
        let local_ts = self.options.local_ts.drain();
        let remote_ts = self.options.remote_ts.drain();

        debug!(
            profile = %profile,
            local_ts = local_ts.len(),
            remote_ts = remote_ts.len(),
            "building connection descriptor"
        );

        Ok(ConnectionConfigBuilder::new(host, identity)
            .with_remote_identity(remote_identity)
            .with_version(profile.version())
            .with_local_port(local_port)
            .with_auth(rules)
            .with_local_selectors(local_ts)
            .with_remote_selectors(remote_ts)
            .build(self.proposals.as_ref()))
    }

    fn fail(&mut self, err: ConnectionError) -> JobState {
        error!("{}", err);
        self.state = JobState::Failed;
        self.terminator.request(err);
        self.state
    }
}
