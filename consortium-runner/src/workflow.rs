//! Multi-party workflow orchestration.
//!
//! [`Workflow`] drives two organizations through channel setup, chaincode
//! deployment, transactions, upgrade and endorsement-policy checks. Every
//! step that depends on eventually-consistent state waits through the
//! convergence waiters before the next stage starts.
//!
//! # Stage Order
//!
//! 1. Init (identities and admin connections)
//! 2. Channel setup (create, anchor peers, join; runs once)
//! 3. Peer discovery
//! 4. Chaincode deploy (install, instantiate)
//! 5. Transact and verify
//! 6. Upgrade (optional)
//! 7. Policy enforcement check
//! 8. Dynamic endorser check

use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::{debug, error, info};

use consortium_convergence::{
    ConfigBaseline, PollOutcome, Poller, RetryPolicy, parse_value, verify_value_with,
    wait_for_config_advance, wait_for_installed_outcome, wait_for_instantiated_outcome,
    wait_for_local_peers,
};
use consortium_core::clock::Clock;
use consortium_core::config::{ConsortiumConfig, RetryConfig};
use consortium_core::connection::{
    ChannelTransactions, ConnectionProvider, IdentityProvider, LedgerQuery, ResourceManagement,
};
use consortium_core::error::{ConnectionError, EndorsementFailure, StatusGroup};
use consortium_core::metrics as m;
use consortium_core::types::{
    ChaincodeDescriptor, ChannelId, ChannelUpdateKind, Invocation, OrgRole,
    OrganizationContext, Peer, PeerSet, SigningIdentity, TransactionResponse,
};

use crate::error::WorkflowError;
use crate::report::{RunReport, StageReport, millis};
use crate::stage::{Stage, WorkflowState};

/// Chaincode status of a successful invocation.
const STATUS_SUCCESS: i32 = 200;

/// Retry budgets for every convergence wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicies {
    pub discovery: RetryPolicy,
    pub config: RetryPolicy,
    pub lifecycle: RetryPolicy,
    pub value: RetryPolicy,
}

impl RetryPolicies {
    pub fn from_config(retry: &RetryConfig) -> Self {
        Self {
            discovery: RetryPolicy::from_fixed(&retry.discovery),
            config: RetryPolicy::from_fixed(&retry.config),
            lifecycle: RetryPolicy::from_fixed(&retry.lifecycle),
            value: RetryPolicy::from_backoff(&retry.value),
        }
    }
}

/// Per-organization session opened during init.
pub struct OrgSession<P: ConnectionProvider> {
    pub context: OrganizationContext,
    pub signer: SigningIdentity,
    pub admin: P::Admin,
}

/// Identities and admin connections shared by every later stage.
pub struct Sessions<P: ConnectionProvider> {
    pub orderer: P::Admin,
    pub orderer_signer: SigningIdentity,
    pub primary: OrgSession<P>,
    pub secondary: OrgSession<P>,
}

impl<P: ConnectionProvider> Sessions<P> {
    pub fn org(&self, role: OrgRole) -> &OrgSession<P> {
        match role {
            OrgRole::Primary => &self.primary,
            OrgRole::Secondary => &self.secondary,
        }
    }
}

/// The workflow orchestrator.
pub struct Workflow<P, C> {
    provider: P,
    config: ConsortiumConfig,
    poller: Poller<C>,
    retry: RetryPolicies,
}

impl<P, C> Workflow<P, C>
where
    P: ConnectionProvider + IdentityProvider,
    C: Clock,
{
    /// Build a workflow with retry budgets taken from `config.retry`.
    pub fn new(provider: P, config: ConsortiumConfig, poller: Poller<C>) -> Self {
        let retry = RetryPolicies::from_config(&config.retry);
        Self {
            provider,
            config,
            poller,
            retry,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicies) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &ConsortiumConfig {
        &self.config
    }

    /// Fresh state for the configured channel.
    pub fn new_state(&self) -> WorkflowState {
        WorkflowState::new(self.config.channel_id())
    }

    /// Run every stage in order.
    ///
    /// # Errors
    ///
    /// The first failing stage aborts the run.
    pub async fn run(&self, state: &mut WorkflowState) -> Result<RunReport, WorkflowError> {
        let mut reports = Vec::with_capacity(Stage::ALL.len());
        if let Err(e) = self.run_stages(state, &mut reports).await {
            let result = if e.is_exhaustion() { "exhausted" } else { "failure" };
            counter!(
                m::WORKFLOW_STAGES_TOTAL,
                m::LABEL_STAGE => e.stage().as_str(),
                m::LABEL_RESULT => result
            )
            .increment(1);
            error!(stage = %e.stage(), error = %e, exhausted = e.is_exhaustion(), "workflow failed");
            return Err(e);
        }

        let cc = &self.config.chaincode;
        let version = if state.completed().contains(&Stage::Upgrade) {
            &cc.upgrade.version
        } else {
            &cc.version
        };
        info!(
            channel = %state.channel.id,
            value = state.expected_value,
            "workflow completed"
        );
        Ok(RunReport::new(
            state,
            format!("{}:{}", cc.name, version),
            reports,
        ))
    }

    async fn run_stages(
        &self,
        state: &mut WorkflowState,
        reports: &mut Vec<StageReport>,
    ) -> Result<(), WorkflowError> {
        let mut since = self.poller.clock().elapsed();

        let sessions = self.init(state)?;
        self.lap(reports, Stage::Init, true, &mut since);

        let ran = self.channel_setup(state, &sessions).await?;
        self.lap(reports, Stage::ChannelSetup, ran, &mut since);

        self.peer_discovery(state, &sessions).await?;
        self.lap(reports, Stage::PeerDiscovery, true, &mut since);

        self.chaincode_deploy(state, &sessions).await?;
        self.lap(reports, Stage::ChaincodeDeploy, true, &mut since);

        self.transact_and_verify(state, &sessions).await?;
        self.lap(reports, Stage::TransactAndVerify, true, &mut since);

        let ran = self.upgrade(state, &sessions).await?;
        self.lap(reports, Stage::Upgrade, ran, &mut since);

        self.policy_enforcement_check(state, &sessions).await?;
        self.lap(reports, Stage::PolicyEnforcementCheck, true, &mut since);

        self.dynamic_endorser_check(state, &sessions).await?;
        self.lap(reports, Stage::DynamicEndorserCheck, true, &mut since);

        Ok(())
    }

    fn lap(
        &self,
        reports: &mut Vec<StageReport>,
        stage: Stage,
        executed: bool,
        since: &mut Duration,
    ) {
        let now = self.poller.clock().elapsed();
        reports.push(StageReport {
            stage,
            executed,
            elapsed_ms: millis(now.saturating_sub(*since)),
        });
        *since = now;
    }

    fn finish(&self, stage: Stage, state: &mut WorkflowState) {
        state.complete(stage);
        counter!(
            m::WORKFLOW_STAGES_TOTAL,
            m::LABEL_STAGE => stage.as_str(),
            m::LABEL_RESULT => "success"
        )
        .increment(1);
        info!(stage = %stage, "stage completed");
    }

    // ─── Stage 1: init ──────────────────────────────────────────────

    /// Resolve identities and open admin connections for both organizations
    /// and the orderer.
    pub fn init(&self, state: &mut WorkflowState) -> Result<Sessions<P>, WorkflowError> {
        const STAGE: Stage = Stage::Init;
        state.enter(STAGE)?;

        let primary = self.open_org(OrgRole::Primary)?;
        let secondary = self.open_org(OrgRole::Secondary)?;

        let orderer_admin = self.config.orderer_admin();
        let orderer_signer = self
            .provider
            .signing_identity(&orderer_admin)
            .map_err(WorkflowError::connection(STAGE, "signing_identity"))?;
        let orderer = self
            .provider
            .admin(&orderer_admin)
            .map_err(WorkflowError::connection(STAGE, "admin_connection"))?;

        self.finish(STAGE, state);
        Ok(Sessions {
            orderer,
            orderer_signer,
            primary,
            secondary,
        })
    }

    fn open_org(&self, role: OrgRole) -> Result<OrgSession<P>, WorkflowError> {
        const STAGE: Stage = Stage::Init;
        let context = self.config.organization(role);
        let signer = self
            .provider
            .signing_identity(&context.admin)
            .map_err(WorkflowError::connection(STAGE, "signing_identity"))?;
        // user identities back every later channel connection
        self.provider
            .signing_identity(&context.user)
            .map_err(WorkflowError::connection(STAGE, "signing_identity"))?;
        let admin = self
            .provider
            .admin(&context.admin)
            .map_err(WorkflowError::connection(STAGE, "admin_connection"))?;
        debug!(role = %role, org = context.name(), msp_id = context.msp_id(), "organization session opened");
        Ok(OrgSession {
            context,
            signer,
            admin,
        })
    }

    // ─── Stage 2: channel setup ─────────────────────────────────────

    /// Create the channel, publish anchor peers and join both organizations.
    ///
    /// Returns `false` without touching the network once the channel has
    /// been joined in this run.
    pub async fn channel_setup(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<bool, WorkflowError> {
        const STAGE: Stage = Stage::ChannelSetup;
        if state.channel_joined {
            info!(channel = %state.channel.id, "channel already joined, skipping setup");
            return Ok(false);
        }
        state.enter(STAGE)?;
        let channel = state.channel.id.clone();

        let signers: Vec<SigningIdentity> = OrgRole::ALL
            .iter()
            .map(|role| sessions.org(*role).signer.clone())
            .collect();
        let request = self.config.channel_request(ChannelUpdateKind::Create);
        let tx = sessions
            .orderer
            .save_channel(&request, &signers)
            .await
            .map_err(WorkflowError::connection(STAGE, "create_channel"))?;
        state.record_transaction(STAGE, "create_channel", &tx);
        info!(channel = %channel, config = %request.config_path, "channel creation submitted");

        let block = self
            .wait_for_config(STAGE, sessions, &channel, ConfigBaseline::Genesis)
            .await?;
        observe_config(STAGE, state, block)?;

        for role in OrgRole::ALL {
            let org = sessions.org(role);
            let request = self.config.channel_request(ChannelUpdateKind::AnchorPeers {
                msp_id: org.context.msp_id().to_owned(),
            });
            let tx = org
                .admin
                .save_channel(&request, std::slice::from_ref(&org.signer))
                .await
                .map_err(WorkflowError::connection(STAGE, "update_anchor_peers"))?;
            state.record_transaction(STAGE, "update_anchor_peers", &tx);

            let baseline = state
                .channel
                .last_config_block
                .map_or(ConfigBaseline::Genesis, ConfigBaseline::After);
            let block = self
                .wait_for_config(STAGE, sessions, &channel, baseline)
                .await?;
            observe_config(STAGE, state, block)?;
            info!(msp_id = org.context.msp_id(), block, "anchor peers updated");
        }

        for role in OrgRole::ALL {
            let org = sessions.org(role);
            org.admin
                .join_channel(&channel)
                .await
                .map_err(WorkflowError::connection(STAGE, "join_channel"))?;
            info!(channel = %channel, msp_id = org.context.msp_id(), "organization joined channel");
        }
        state.channel_joined = true;

        self.finish(STAGE, state);
        Ok(true)
    }

    async fn wait_for_config(
        &self,
        stage: Stage,
        sessions: &Sessions<P>,
        channel: &ChannelId,
        baseline: ConfigBaseline,
    ) -> Result<u64, WorkflowError> {
        wait_for_config_advance(
            &self.poller,
            &sessions.orderer,
            channel,
            baseline,
            &self.retry.config,
        )
        .await
        .map_err(WorkflowError::convergence(stage))
    }

    // ─── Stage 3: peer discovery ────────────────────────────────────

    /// Wait until local discovery reports every configured peer of each organization.
    pub async fn peer_discovery(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        const STAGE: Stage = Stage::PeerDiscovery;
        state.enter(STAGE)?;
        for role in OrgRole::ALL {
            let org = sessions.org(role);
            let peers = self.discover(STAGE, org).await?;
            info!(msp_id = org.context.msp_id(), peers = peers.len(), "peers discovered");
        }
        self.finish(STAGE, state);
        Ok(())
    }

    async fn discover(&self, stage: Stage, org: &OrgSession<P>) -> Result<PeerSet, WorkflowError> {
        let discovery = self
            .provider
            .discovery(&org.context.user)
            .map_err(WorkflowError::connection(stage, "discovery_connection"))?;
        wait_for_local_peers(
            &self.poller,
            &discovery,
            org.context.msp_id(),
            org.context.expected_peers(),
            &self.retry.discovery,
        )
        .await
        .map_err(WorkflowError::convergence(stage))
    }

    // ─── Stage 4: chaincode deploy ──────────────────────────────────

    /// Install the chaincode on every discovered peer and instantiate it once.
    pub async fn chaincode_deploy(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        const STAGE: Stage = Stage::ChaincodeDeploy;
        state.enter(STAGE)?;
        let channel = state.channel.id.clone();
        let descriptor = self
            .config
            .chaincode_descriptor()
            .map_err(WorkflowError::config(STAGE))?;

        let peer_sets = self.install_everywhere(STAGE, sessions, &descriptor).await?;

        let init_args = to_bytes(&self.config.chaincode.init_args);
        let tx = sessions
            .primary
            .admin
            .instantiate_chaincode(&channel, &descriptor, &init_args)
            .await
            .map_err(WorkflowError::connection(STAGE, "instantiate_chaincode"))?;
        state.record_transaction(STAGE, "instantiate_chaincode", &tx);
        info!(chaincode = %descriptor, policy = %descriptor.policy, "instantiation submitted");

        self.wait_instantiated(STAGE, sessions, &channel, &descriptor, &peer_sets)
            .await?;
        self.finish(STAGE, state);
        Ok(())
    }

    /// Re-discover peers, install on all of them and wait until each reports the install.
    async fn install_everywhere(
        &self,
        stage: Stage,
        sessions: &Sessions<P>,
        descriptor: &ChaincodeDescriptor,
    ) -> Result<Vec<(OrgRole, PeerSet)>, WorkflowError> {
        let mut peer_sets = Vec::with_capacity(OrgRole::ALL.len());
        for role in OrgRole::ALL {
            let org = sessions.org(role);
            let peers = self.discover(stage, org).await?;
            let responses = org
                .admin
                .install_chaincode(descriptor, peers.as_slice())
                .await
                .map_err(WorkflowError::connection(stage, "install_chaincode"))?;
            if let Some(bad) = responses.iter().find(|r| r.status != STATUS_SUCCESS) {
                return Err(WorkflowError::assertion(
                    stage,
                    format!("install status on {}", bad.peer),
                    STATUS_SUCCESS,
                    bad.status,
                ));
            }
            info!(chaincode = %descriptor, msp_id = org.context.msp_id(), peers = peers.len(), "install submitted");
            peer_sets.push((role, peers));
        }

        for (role, peers) in &peer_sets {
            let org = sessions.org(*role);
            let outcome = wait_for_installed_outcome(
                &self.poller,
                &org.admin,
                peers.as_slice(),
                &descriptor.name,
                &descriptor.version,
                &self.retry.lifecycle,
            )
            .await
            .map_err(WorkflowError::convergence(stage))?;
            require_converged(stage, outcome, || {
                format!("install of {descriptor} on {}", org.context.msp_id())
            })?;
        }
        Ok(peer_sets)
    }

    async fn wait_instantiated(
        &self,
        stage: Stage,
        sessions: &Sessions<P>,
        channel: &ChannelId,
        descriptor: &ChaincodeDescriptor,
        peer_sets: &[(OrgRole, PeerSet)],
    ) -> Result<(), WorkflowError> {
        for (role, peers) in peer_sets {
            let org = sessions.org(*role);
            let outcome = wait_for_instantiated_outcome(
                &self.poller,
                &org.admin,
                channel,
                peers.as_slice(),
                &descriptor.name,
                &descriptor.version,
                &self.retry.lifecycle,
            )
            .await
            .map_err(WorkflowError::convergence(stage))?;
            require_converged(stage, outcome, || {
                format!("instantiation of {descriptor} on {}", org.context.msp_id())
            })?;
        }
        info!(chaincode = %descriptor, channel = %channel, "chaincode active on every peer");
        Ok(())
    }

    // ─── Stage 5: transact and verify ───────────────────────────────

    /// Exercise the chaincode and the ledger, then move one unit and verify it.
    pub async fn transact_and_verify(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        const STAGE: Stage = Stage::TransactAndVerify;
        state.enter(STAGE)?;
        let channel_id = state.channel.id.clone();
        let primary = &sessions.primary;
        let secondary = &sessions.secondary;
        let cc = &self.config.chaincode;

        let reader = self
            .provider
            .channel(&channel_id, &primary.context.user)
            .map_err(WorkflowError::connection(STAGE, "channel_connection"))?;

        // unknown function must fail on every endorser
        let unknown = Invocation::new(&cc.name, &cc.error_function, &cc.query_args);
        match reader.query(&unknown, None).await {
            Ok(response) => {
                return Err(WorkflowError::assertion(
                    STAGE,
                    format!("query of {}", cc.error_function),
                    "chaincode error",
                    format!("status {}", response.chaincode_status),
                ));
            }
            Err(ConnectionError::MultipleErrors(failures)) => {
                check_chaincode_failures(STAGE, &failures)?;
                debug!(failures = failures.len(), "unknown function rejected by every endorser");
            }
            Err(e) => return Err(WorkflowError::connection(STAGE, "query")(e)),
        }

        let verifier = designated(STAGE, primary)?;
        let response = reader
            .query(&self.query_invocation(), Some(std::slice::from_ref(&verifier)))
            .await
            .map_err(WorkflowError::connection(STAGE, "query"))?;
        check_status(
            STAGE,
            "query",
            response.chaincode_status,
            response.responses.first().map(|r| r.chaincode_status),
        )?;
        state.expected_value =
            parse_value(&response.payload).map_err(WorkflowError::convergence(STAGE))?;
        info!(value = state.expected_value, peer = %verifier, "initial value observed");

        let targets = [verifier, designated(STAGE, secondary)?];
        let ledger = self
            .provider
            .ledger(&channel_id, &primary.context.user)
            .map_err(WorkflowError::connection(STAGE, "ledger_connection"))?;

        let orderers = ledger
            .query_orderers(&targets[..1])
            .await
            .map_err(WorkflowError::connection(STAGE, "query_orderers"))?;
        let endpoint = &self.config.network.orderer_endpoint;
        if !orderers.contains(endpoint) {
            return Err(WorkflowError::assertion(
                STAGE,
                "channel orderers",
                endpoint,
                orderers.join(","),
            ));
        }

        let baseline = ledger
            .query_info(&targets)
            .await
            .map_err(WorkflowError::connection(STAGE, "query_info"))?;
        let current = ledger
            .query_block_by_hash(&baseline.current_block_hash, &targets)
            .await
            .map_err(WorkflowError::connection(STAGE, "query_block_by_hash"))?;
        if current.number + 1 != baseline.height {
            return Err(WorkflowError::assertion(
                STAGE,
                "current block number",
                baseline.height.saturating_sub(1),
                current.number,
            ));
        }
        debug!(height = baseline.height, "ledger baseline recorded");

        let executor = self
            .provider
            .channel(&channel_id, &secondary.context.user)
            .map_err(WorkflowError::connection(STAGE, "channel_connection"))?;
        let response = self.execute_move(STAGE, &executor, None, state).await?;
        state.expected_value += 1;
        self.verify(STAGE, state, sessions).await?;

        let after = ledger
            .query_info(&targets)
            .await
            .map_err(WorkflowError::connection(STAGE, "query_info"))?;
        if after.height <= baseline.height {
            return Err(WorkflowError::assertion(
                STAGE,
                "ledger height",
                format!("> {}", baseline.height),
                after.height,
            ));
        }
        let latest = ledger
            .query_block(after.height - 1, &targets)
            .await
            .map_err(WorkflowError::connection(STAGE, "query_block"))?;
        debug!(block = latest.number, transactions = latest.transactions.len(), "latest block retrieved");

        let processed = ledger
            .query_transaction(&response.transaction_id, &targets)
            .await
            .map_err(WorkflowError::connection(STAGE, "query_transaction"))?;
        if processed.envelope.is_none() {
            return Err(WorkflowError::assertion(
                STAGE,
                format!("envelope of {}", response.transaction_id),
                "present",
                "missing",
            ));
        }

        self.finish(STAGE, state);
        Ok(())
    }

    // ─── Stage 6: upgrade ───────────────────────────────────────────

    /// Install and activate the next chaincode version, then verify the reset value.
    ///
    /// Returns `false` when the upgrade is disabled.
    pub async fn upgrade(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<bool, WorkflowError> {
        const STAGE: Stage = Stage::Upgrade;
        let Some(descriptor) = self
            .config
            .upgrade_descriptor()
            .map_err(WorkflowError::config(STAGE))?
        else {
            info!("chaincode upgrade disabled, skipping");
            state.skip(STAGE);
            return Ok(false);
        };
        state.enter(STAGE)?;
        let channel = state.channel.id.clone();

        let peer_sets = self.install_everywhere(STAGE, sessions, &descriptor).await?;

        let init_args = to_bytes(&self.config.chaincode.upgrade.init_args);
        let tx = sessions
            .primary
            .admin
            .upgrade_chaincode(&channel, &descriptor, &init_args)
            .await
            .map_err(WorkflowError::connection(STAGE, "upgrade_chaincode"))?;
        state.record_transaction(STAGE, "upgrade_chaincode", &tx);
        info!(chaincode = %descriptor, policy = %descriptor.policy, "upgrade submitted");

        self.wait_instantiated(STAGE, sessions, &channel, &descriptor, &peer_sets)
            .await?;

        state.expected_value = self.config.chaincode.upgrade.baseline;
        self.verify(STAGE, state, sessions).await?;
        self.finish(STAGE, state);
        Ok(true)
    }

    // ─── Stage 7: policy enforcement ────────────────────────────────

    /// A single-organization endorsement must be rejected; endorsement by
    /// both designated peers must commit.
    pub async fn policy_enforcement_check(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        const STAGE: Stage = Stage::PolicyEnforcementCheck;
        state.enter(STAGE)?;
        let primary = &sessions.primary;
        let secondary = &sessions.secondary;

        let channel = self
            .provider
            .channel(&state.channel.id, &secondary.context.user)
            .map_err(WorkflowError::connection(STAGE, "channel_connection"))?;

        let single = [designated(STAGE, secondary)?];
        match channel.execute(&self.tx_invocation(), Some(&single)).await {
            Ok(response) => {
                error!(tx_id = %response.transaction_id, peer = %single[0], "single-organization transaction was accepted");
                return Err(WorkflowError::PolicyNotEnforced { stage: STAGE });
            }
            Err(e) if e.is_policy_violation() => {
                info!(error = %e, "single-organization endorsement rejected");
            }
            Err(e) => return Err(WorkflowError::connection(STAGE, "execute")(e)),
        }

        let both = [designated(STAGE, primary)?, designated(STAGE, secondary)?];
        self.execute_move(STAGE, &channel, Some(&both), state).await?;
        state.expected_value += 1;
        self.verify(STAGE, state, sessions).await?;

        self.finish(STAGE, state);
        Ok(())
    }

    // ─── Stage 8: dynamic endorser selection ────────────────────────

    /// Execute without explicit targets on a fresh connection and verify the result.
    pub async fn dynamic_endorser_check(
        &self,
        state: &mut WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        const STAGE: Stage = Stage::DynamicEndorserCheck;
        state.enter(STAGE)?;

        let channel = self
            .provider
            .channel(&state.channel.id, &sessions.secondary.context.user)
            .map_err(WorkflowError::connection(STAGE, "channel_connection"))?;
        let response = self.execute_move(STAGE, &channel, None, state).await?;
        debug!(
            endorsers = ?response.responses.iter().map(|r| r.peer.url.as_str()).collect::<Vec<_>>(),
            "endorsers selected by policy"
        );
        state.expected_value += 1;
        self.verify(STAGE, state, sessions).await?;

        self.finish(STAGE, state);
        Ok(())
    }

    // ─── Helpers ────────────────────────────────────────────────────

    fn tx_invocation(&self) -> Invocation {
        let cc = &self.config.chaincode;
        Invocation::new(&cc.name, &cc.function, &cc.tx_args)
    }

    fn query_invocation(&self) -> Invocation {
        let cc = &self.config.chaincode;
        Invocation::new(&cc.name, &cc.function, &cc.query_args)
    }

    async fn execute_move(
        &self,
        stage: Stage,
        channel: &P::Channel,
        targets: Option<&[Peer]>,
        state: &mut WorkflowState,
    ) -> Result<TransactionResponse, WorkflowError> {
        let result = channel.execute(&self.tx_invocation(), targets).await;
        let outcome = if result.is_ok() { "success" } else { "failure" };
        counter!(m::WORKFLOW_TRANSACTIONS_TOTAL, m::LABEL_RESULT => outcome).increment(1);

        let response = result.map_err(WorkflowError::connection(stage, "execute"))?;
        check_status(
            stage,
            "execute",
            response.chaincode_status,
            response.responses.first().map(|r| r.chaincode_status),
        )?;
        state.record_transaction(stage, "move", &response.transaction_id);
        info!(
            stage = %stage,
            tx_id = %response.transaction_id,
            endorsements = response.responses.len(),
            "transaction committed"
        );
        Ok(response)
    }

    /// Wait until the primary organization's designated peer reports the expected value.
    ///
    /// Opens a fresh primary-user connection each time.
    async fn verify(
        &self,
        stage: Stage,
        state: &WorkflowState,
        sessions: &Sessions<P>,
    ) -> Result<(), WorkflowError> {
        let primary = &sessions.primary;
        let peer = designated(stage, primary)?;
        let channel = self
            .provider
            .channel(&state.channel.id, &primary.context.user)
            .map_err(WorkflowError::connection(stage, "channel_connection"))?;
        let invocation = self.query_invocation();

        let channel = &channel;
        let invocation = &invocation;
        let targets = std::slice::from_ref(&peer);
        let value = verify_value_with(
            &self.poller,
            move || async move {
                channel
                    .query(invocation, Some(targets))
                    .await
                    .map(|response| response.payload)
            },
            state.expected_value,
            &self.retry.value,
        )
        .await
        .map_err(WorkflowError::convergence(stage))?;

        info!(stage = %stage, value, peer = %peer, "value converged");
        Ok(())
    }
}

fn designated<P: ConnectionProvider>(
    stage: Stage,
    org: &OrgSession<P>,
) -> Result<Peer, WorkflowError> {
    org.context.designated_peer().ok_or_else(|| {
        WorkflowError::assertion(
            stage,
            format!("designated peer of {}", org.context.msp_id()),
            "configured",
            "none",
        )
    })
}

/// Response status must be non-zero and match the first endorsement.
fn check_status(
    stage: Stage,
    operation: &str,
    status: i32,
    first_endorsement: Option<i32>,
) -> Result<(), WorkflowError> {
    if status == 0 {
        return Err(WorkflowError::assertion(
            stage,
            format!("{operation} chaincode status"),
            "non-zero",
            status,
        ));
    }
    match first_endorsement {
        Some(first) if first == status => Ok(()),
        Some(first) => Err(WorkflowError::assertion(
            stage,
            format!("{operation} first endorsement status"),
            status,
            first,
        )),
        None => Err(WorkflowError::assertion(
            stage,
            format!("{operation} endorsement responses"),
            "at least one",
            0,
        )),
    }
}

fn check_chaincode_failures(
    stage: Stage,
    failures: &[EndorsementFailure],
) -> Result<(), WorkflowError> {
    if failures.is_empty() {
        return Err(WorkflowError::assertion(
            stage,
            "chaincode error responses",
            "at least one",
            0,
        ));
    }
    match failures
        .iter()
        .find(|f| f.status != 500 || f.group != StatusGroup::Chaincode)
    {
        Some(f) => Err(WorkflowError::assertion(
            stage,
            format!("chaincode error from {}", f.peer),
            "status 500 in chaincode group",
            format!("status {} in {} group", f.status, f.group),
        )),
        None => Ok(()),
    }
}

/// Lifecycle exhaustion becomes fatal, carrying the peers still missing.
fn require_converged(
    stage: Stage,
    outcome: PollOutcome<Vec<String>>,
    what: impl FnOnce() -> String,
) -> Result<(), WorkflowError> {
    match outcome {
        PollOutcome::Satisfied { .. } => Ok(()),
        PollOutcome::Exhausted {
            last,
            last_error,
            attempts,
        } => Err(WorkflowError::NotConverged {
            stage,
            what: what(),
            attempts,
            missing: last.unwrap_or_default(),
            last_error,
        }),
    }
}

/// Config block numbers never move backwards within a run.
fn observe_config(
    stage: Stage,
    state: &mut WorkflowState,
    block: u64,
) -> Result<(), WorkflowError> {
    let last = state.channel.last_config_block;
    if state.channel.observe_config_block(block) {
        Ok(())
    } else {
        Err(WorkflowError::assertion(
            stage,
            format!("config block of {}", state.channel.id),
            format!(">= {}", last.unwrap_or_default()),
            block,
        ))
    }
}

fn to_bytes(args: &[String]) -> Vec<Bytes> {
    args.iter()
        .map(|a| Bytes::copy_from_slice(a.as_bytes()))
        .collect()
}
