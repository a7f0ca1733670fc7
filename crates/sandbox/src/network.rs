//! 인메모리 네트워크 상태와 연산
//!
//! 모든 연산은 주입된 시계의 경과 시간을 "현재"로 보고 동기적으로 상태를 갱신합니다.
//! 잠금은 await 지점을 넘어 유지되지 않습니다.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use consortium_core::clock::Clock;
use consortium_core::config::ConsortiumConfig;
use consortium_core::connection::{ConnectionProvider, IdentityProvider};
use consortium_core::error::{ConnectionError, EndorsementFailure, StatusGroup};
use consortium_core::policy::EndorsementPolicy;
use consortium_core::types::{
    Block, BlockchainInfo, ChaincodeDescriptor, ChaincodeInfo, ChannelId, ChannelRequest,
    ChannelUpdateKind, EndorsementResponse, InstallResponse, Invocation, Peer, PeerSet,
    Principal, ProcessedTransaction, QueryResponse, SigningIdentity, TransactionId,
    TransactionResponse,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chaincode::{self, STATUS_OK, Simulation};
use crate::connections::{SandboxAdmin, SandboxChannel, SandboxDiscovery, SandboxLedger};
use crate::ledger::{BlockKind, BlockRecord, ChannelLedger, TxRecord};
use crate::settings::SandboxSettings;
use crate::stats::{Call, SandboxStats, StatsSnapshot};
use crate::topology::Topology;

// ─── State ───────────────────────────────────────────────────────────

#[derive(Debug)]
struct Installed {
    info: ChaincodeInfo,
    visible_at: Duration,
}

#[derive(Debug)]
struct Joined {
    url: String,
    msp_id: String,
    joined_at: Duration,
}

#[derive(Debug)]
struct Definition {
    info: ChaincodeInfo,
    policy: EndorsementPolicy,
    visible_at: Duration,
}

#[derive(Debug)]
struct ChannelState {
    members: BTreeSet<String>,
    ledger: ChannelLedger,
    joined: Vec<Joined>,
    definitions: Vec<Definition>,
}

impl ChannelState {
    fn is_joined(&self, url: &str) -> bool {
        self.joined.iter().any(|j| j.url == url)
    }

    /// 이름별로 현재 보이는 최신 정의
    fn active_definition(&self, name: &str, now: Duration) -> Option<&Definition> {
        self.definitions
            .iter()
            .filter(|d| d.info.name == name && d.visible_at <= now)
            .last()
    }

    fn latest_definition(&self, name: &str) -> Option<&Definition> {
        self.definitions.iter().filter(|d| d.info.name == name).last()
    }

    fn ensure_joined(&self, peers: &[Peer]) -> Result<(), ConnectionError> {
        if peers.is_empty() {
            return Err(ConnectionError::InvalidRequest(
                "at least one target peer is required".to_owned(),
            ));
        }
        match peers.iter().find(|p| !self.is_joined(&p.url)) {
            Some(peer) => Err(ConnectionError::NotFound(format!(
                "peer {} has not joined the channel",
                peer.url
            ))),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    channels: HashMap<ChannelId, ChannelState>,
    installed: HashMap<String, Vec<Installed>>,
}

impl NetworkState {
    fn channel(&self, id: &ChannelId) -> Result<&ChannelState, ConnectionError> {
        self.channels
            .get(id)
            .ok_or_else(|| ConnectionError::NotFound(format!("channel {id}")))
    }

    fn channel_mut(&mut self, id: &ChannelId) -> Result<&mut ChannelState, ConnectionError> {
        self.channels
            .get_mut(id)
            .ok_or_else(|| ConnectionError::NotFound(format!("channel {id}")))
    }

    fn is_installed(&self, url: &str, name: &str, version: &str, now: Duration) -> bool {
        self.installed.get(url).is_some_and(|list| {
            list.iter().any(|i| {
                i.info.name == name && i.info.version == version && i.visible_at <= now
            })
        })
    }
}

/// 트랜잭션 봉투 (불투명 바이트로 직렬화되어 원장에 기록)
#[derive(Debug, Serialize)]
struct Envelope<'a> {
    tx_id: &'a str,
    channel: &'a str,
    creator: String,
    chaincode: Option<&'a str>,
    function: &'a str,
    args: Vec<String>,
}

// ─── Network ─────────────────────────────────────────────────────────

pub(crate) struct Inner<C> {
    clock: Arc<C>,
    settings: SandboxSettings,
    topology: Topology,
    state: Mutex<NetworkState>,
    stats: SandboxStats,
}

/// 인메모리 네트워크
///
/// 복제해도 같은 상태를 공유합니다.
pub struct SandboxNetwork<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for SandboxNetwork<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> SandboxNetwork<C> {
    pub fn new(clock: Arc<C>, topology: Topology, settings: SandboxSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                settings,
                topology,
                state: Mutex::new(NetworkState::default()),
                stats: SandboxStats::default(),
            }),
        }
    }

    /// 설정의 토폴로지와 `[sandbox]` 지연으로 네트워크를 만듭니다.
    pub fn from_config(config: &ConsortiumConfig, clock: Arc<C>) -> Self {
        Self::new(
            clock,
            Topology::from_config(config),
            SandboxSettings::from_core(&config.sandbox),
        )
    }

    pub fn clock(&self) -> &Arc<C> {
        &self.inner.clock
    }

    pub fn topology(&self) -> &Topology {
        &self.inner.topology
    }

    pub fn settings(&self) -> &SandboxSettings {
        &self.inner.settings
    }

    /// 호출 카운터 스냅샷
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl<C: Clock> IdentityProvider for SandboxNetwork<C> {
    fn signing_identity(&self, principal: &Principal) -> Result<SigningIdentity, ConnectionError> {
        self.inner.topology.ensure_known(principal)?;
        Ok(SigningIdentity {
            principal: principal.clone(),
            certificate: certificate(principal),
        })
    }
}

impl<C: Clock> ConnectionProvider for SandboxNetwork<C> {
    type Admin = SandboxAdmin<C>;
    type Channel = SandboxChannel<C>;
    type Ledger = SandboxLedger<C>;
    type Discovery = SandboxDiscovery<C>;

    fn admin(&self, principal: &Principal) -> Result<Self::Admin, ConnectionError> {
        self.inner.topology.ensure_known(principal)?;
        if !self.inner.topology.is_admin(principal) {
            return Err(ConnectionError::Identity {
                org: principal.org.clone(),
                user: principal.user.clone(),
                reason: "resource management requires an admin identity".to_owned(),
            });
        }
        Ok(SandboxAdmin::new(Arc::clone(&self.inner), principal.clone()))
    }

    fn channel(
        &self,
        channel: &ChannelId,
        principal: &Principal,
    ) -> Result<Self::Channel, ConnectionError> {
        self.inner.topology.ensure_known(principal)?;
        Ok(SandboxChannel::new(
            Arc::clone(&self.inner),
            channel.clone(),
            principal.clone(),
        ))
    }

    fn ledger(
        &self,
        channel: &ChannelId,
        principal: &Principal,
    ) -> Result<Self::Ledger, ConnectionError> {
        self.inner.topology.ensure_known(principal)?;
        Ok(SandboxLedger::new(
            Arc::clone(&self.inner),
            channel.clone(),
            principal.clone(),
        ))
    }

    fn discovery(&self, principal: &Principal) -> Result<Self::Discovery, ConnectionError> {
        self.inner.topology.ensure_known(principal)?;
        Ok(SandboxDiscovery::new(
            Arc::clone(&self.inner),
            principal.clone(),
        ))
    }
}

fn certificate(principal: &Principal) -> Bytes {
    let mut hasher = Sha256::new();
    hasher.update(principal.msp_id.as_bytes());
    hasher.update(b"/");
    hasher.update(principal.user.as_bytes());
    Bytes::from(hasher.finalize().to_vec())
}

fn new_tx_id() -> TransactionId {
    TransactionId(Uuid::new_v4().simple().to_string())
}

fn envelope(
    tx_id: &TransactionId,
    channel: &ChannelId,
    creator: &Principal,
    chaincode: Option<&str>,
    function: &str,
    args: &[Bytes],
) -> Result<Bytes, ConnectionError> {
    let record = Envelope {
        tx_id: tx_id.as_str(),
        channel: channel.as_str(),
        creator: creator.to_string(),
        chaincode,
        function,
        args: args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect(),
    };
    serde_json::to_vec(&record).map(Bytes::from).map_err(|e| {
        ConnectionError::InvalidRequest(format!("cannot encode envelope of {tx_id}: {e}"))
    })
}

// ─── Operations ──────────────────────────────────────────────────────

impl<C: Clock> Inner<C> {
    fn now(&self) -> Duration {
        self.clock.elapsed()
    }

    fn state(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 서명자 검증 후 서명한 조직 관리자들의 MSP ID 집합을 반환합니다.
    fn verify_signers(&self, signers: &[SigningIdentity]) -> Result<BTreeSet<String>, ConnectionError> {
        let mut signed = BTreeSet::new();
        for signer in signers {
            let principal = &signer.principal;
            self.topology.ensure_known(principal)?;
            if signer.certificate != certificate(principal) {
                return Err(ConnectionError::Identity {
                    org: principal.org.clone(),
                    user: principal.user.clone(),
                    reason: "signature does not match enrolled certificate".to_owned(),
                });
            }
            if self
                .topology
                .org(&principal.msp_id)
                .is_some_and(|org| org.admin == principal.user)
            {
                signed.insert(principal.msp_id.clone());
            }
        }
        Ok(signed)
    }

    pub(crate) fn save_channel(
        &self,
        caller: &Principal,
        request: &ChannelRequest,
        signers: &[SigningIdentity],
    ) -> Result<TransactionId, ConnectionError> {
        self.stats.record(Call::SaveChannel);
        let signed = self.verify_signers(signers)?;
        let now = self.now();
        let mut state = self.state();
        let channel_id = &request.channel_id;

        let tx_id = new_tx_id();
        let tx = TxRecord {
            id: tx_id.clone(),
            chaincode: None,
            writes: Vec::new(),
            envelope: envelope(
                &tx_id,
                channel_id,
                caller,
                None,
                "config_update",
                &[Bytes::from(request.config_path.clone())],
            )?,
        };
        let visible_at = now + self.settings.config_lag;

        match &request.kind {
            ChannelUpdateKind::Create => {
                if state.channels.contains_key(channel_id) {
                    return Err(ConnectionError::InvalidRequest(format!(
                        "channel {channel_id} already exists"
                    )));
                }
                let members: BTreeSet<String> =
                    self.topology.member_msp_ids().into_iter().collect();
                let missing: Vec<&String> = members.difference(&signed).collect();
                if !missing.is_empty() {
                    return Err(ConnectionError::PolicyNotSatisfied(format!(
                        "channel creation requires admin signatures from {missing:?}"
                    )));
                }
                let mut ledger = ChannelLedger::default();
                ledger.append(BlockKind::Config, vec![tx], visible_at, BTreeSet::new());
                state.channels.insert(
                    channel_id.clone(),
                    ChannelState {
                        members,
                        ledger,
                        joined: Vec::new(),
                        definitions: Vec::new(),
                    },
                );
                info!(channel = %channel_id, tx_id = %tx_id, "channel created");
            }
            ChannelUpdateKind::AnchorPeers { msp_id } => {
                let channel = state.channel_mut(channel_id)?;
                if !channel.ledger.genesis_visible(now) {
                    return Err(ConnectionError::Unavailable(format!(
                        "channel {channel_id} is not yet available on the orderer"
                    )));
                }
                if !channel.members.contains(msp_id) {
                    return Err(ConnectionError::InvalidRequest(format!(
                        "{msp_id} is not a member of channel {channel_id}"
                    )));
                }
                if !signed.contains(msp_id) {
                    return Err(ConnectionError::PolicyNotSatisfied(format!(
                        "anchor peer update for {msp_id} must be signed by its admin"
                    )));
                }
                let block = channel
                    .ledger
                    .append(BlockKind::Config, vec![tx], visible_at, BTreeSet::new());
                info!(channel = %channel_id, msp_id = %msp_id, block, "anchor peers updated");
            }
        }
        Ok(tx_id)
    }

    pub(crate) fn join_channel(
        &self,
        caller: &Principal,
        channel_id: &ChannelId,
    ) -> Result<(), ConnectionError> {
        self.stats.record(Call::JoinChannel);
        let now = self.now();
        let org = self.topology.org(&caller.msp_id).ok_or_else(|| {
            ConnectionError::InvalidRequest(format!("{} has no peers to join", caller.msp_id))
        })?;
        let mut state = self.state();
        let channel = state.channel_mut(channel_id)?;
        if !channel.members.contains(&org.msp_id) {
            return Err(ConnectionError::InvalidRequest(format!(
                "{} is not a member of channel {channel_id}",
                org.msp_id
            )));
        }
        if !channel.ledger.genesis_visible(now) {
            return Err(ConnectionError::Unavailable(format!(
                "genesis block of {channel_id} not yet available"
            )));
        }
        for url in &org.peers {
            if !channel.is_joined(url) {
                channel.joined.push(Joined {
                    url: url.clone(),
                    msp_id: org.msp_id.clone(),
                    joined_at: now,
                });
            }
        }
        info!(channel = %channel_id, msp_id = %org.msp_id, peers = org.peers.len(), "peers joined channel");
        Ok(())
    }

    fn ensure_own_peer(&self, caller: &Principal, peer: &Peer) -> Result<(), ConnectionError> {
        let org = self
            .topology
            .org_of_peer(&peer.url)
            .ok_or_else(|| ConnectionError::NotFound(format!("peer {}", peer.url)))?;
        if org.msp_id != caller.msp_id {
            return Err(ConnectionError::InvalidRequest(format!(
                "{} is not authorised to administer peer {}",
                caller.msp_id, peer.url
            )));
        }
        Ok(())
    }

    pub(crate) fn install_chaincode(
        &self,
        caller: &Principal,
        chaincode: &ChaincodeDescriptor,
        targets: &[Peer],
    ) -> Result<Vec<InstallResponse>, ConnectionError> {
        self.stats.record(Call::Install);
        if targets.is_empty() {
            return Err(ConnectionError::InvalidRequest(
                "install requires at least one target peer".to_owned(),
            ));
        }
        for peer in targets {
            self.ensure_own_peer(caller, peer)?;
        }

        let now = self.now();
        let mut state = self.state();
        let mut responses = Vec::with_capacity(targets.len());
        for peer in targets {
            let list = state.installed.entry(peer.url.clone()).or_default();
            let exists = list
                .iter()
                .any(|i| i.info.name == chaincode.name && i.info.version == chaincode.version);
            let info = if exists {
                format!("chaincode {chaincode} already installed")
            } else {
                list.push(Installed {
                    info: ChaincodeInfo {
                        name: chaincode.name.clone(),
                        version: chaincode.version.clone(),
                        path: chaincode.path.clone(),
                    },
                    visible_at: now + self.settings.install_lag,
                });
                format!("installed chaincode {chaincode}")
            };
            responses.push(InstallResponse {
                peer: peer.clone(),
                status: STATUS_OK,
                info,
            });
        }
        debug!(chaincode = %chaincode, peers = targets.len(), "install submitted");
        Ok(responses)
    }

    pub(crate) fn deploy_chaincode(
        &self,
        caller: &Principal,
        channel_id: &ChannelId,
        chaincode: &ChaincodeDescriptor,
        init_args: &[Bytes],
        upgrade: bool,
    ) -> Result<TransactionId, ConnectionError> {
        self.stats
            .record(if upgrade { Call::Upgrade } else { Call::Instantiate });
        let now = self.now();
        let mut state = self.state();

        let installed_peer = {
            let channel = state.channel(channel_id)?;
            if !channel.members.contains(&caller.msp_id) {
                return Err(ConnectionError::InvalidRequest(format!(
                    "{} is not a member of channel {channel_id}",
                    caller.msp_id
                )));
            }
            match (channel.latest_definition(&chaincode.name), upgrade) {
                (Some(_), false) => {
                    return Err(ConnectionError::InvalidRequest(format!(
                        "chaincode {} already instantiated on {channel_id}",
                        chaincode.name
                    )));
                }
                (None, true) => {
                    return Err(ConnectionError::NotFound(format!(
                        "chaincode {} is not instantiated on {channel_id}",
                        chaincode.name
                    )));
                }
                (Some(current), true) if current.info.version == chaincode.version => {
                    return Err(ConnectionError::InvalidRequest(format!(
                        "chaincode {chaincode} is already the active version"
                    )));
                }
                _ => {}
            }
            if let Some(unknown) = chaincode
                .policy
                .msp_ids()
                .into_iter()
                .find(|id| !channel.members.contains(id))
            {
                return Err(ConnectionError::InvalidRequest(format!(
                    "endorsement policy references {unknown}, which is not a channel member"
                )));
            }
            channel
                .joined
                .iter()
                .filter(|j| j.msp_id == caller.msp_id)
                .find(|j| state.is_installed(&j.url, &chaincode.name, &chaincode.version, now))
                .map(|j| j.url.clone())
                .ok_or_else(|| {
                    ConnectionError::NotFound(format!(
                        "chaincode {chaincode} is not installed on any joined peer of {}",
                        caller.msp_id
                    ))
                })?
        };

        let sim = chaincode::init(init_args);
        if !sim.is_ok() {
            return Err(ConnectionError::MultipleErrors(vec![failure(
                &installed_peer,
                &sim,
            )]));
        }

        let tx_id = new_tx_id();
        let function = if upgrade { "upgrade" } else { "deploy" };
        let tx = TxRecord {
            id: tx_id.clone(),
            chaincode: Some(chaincode.name.clone()),
            writes: sim.writes,
            envelope: envelope(
                &tx_id,
                channel_id,
                caller,
                Some(&chaincode.name),
                function,
                init_args,
            )?,
        };
        let visible_at = now + self.settings.instantiate_lag;
        let channel = state.channel_mut(channel_id)?;
        let block = channel
            .ledger
            .append(BlockKind::Transaction, vec![tx], visible_at, BTreeSet::new());
        channel.definitions.push(Definition {
            info: ChaincodeInfo {
                name: chaincode.name.clone(),
                version: chaincode.version.clone(),
                path: chaincode.path.clone(),
            },
            policy: chaincode.policy.clone(),
            visible_at,
        });
        info!(
            channel = %channel_id,
            chaincode = %chaincode,
            policy = %chaincode.policy,
            block,
            upgrade,
            "chaincode definition committed"
        );
        Ok(tx_id)
    }

    pub(crate) fn installed_chaincodes(
        &self,
        caller: &Principal,
        peer: &Peer,
    ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
        self.ensure_own_peer(caller, peer)?;
        let now = self.now();
        let state = self.state();
        Ok(state
            .installed
            .get(&peer.url)
            .map(|list| {
                list.iter()
                    .filter(|i| i.visible_at <= now)
                    .map(|i| i.info.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    pub(crate) fn instantiated_chaincodes(
        &self,
        channel_id: &ChannelId,
        peer: &Peer,
    ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        channel.ensure_joined(std::slice::from_ref(peer))?;
        let names: BTreeSet<&str> = channel
            .definitions
            .iter()
            .map(|d| d.info.name.as_str())
            .collect();
        Ok(names
            .into_iter()
            .filter_map(|name| channel.active_definition(name, now))
            .map(|d| d.info.clone())
            .collect())
    }

    pub(crate) fn config_block(&self, channel_id: &ChannelId) -> Result<u64, ConnectionError> {
        self.stats.record(Call::ConfigQuery);
        let now = self.now();
        let state = self.state();
        state
            .channel(channel_id)?
            .ledger
            .latest_config_block(now)
            .ok_or_else(|| {
                ConnectionError::Unavailable(format!(
                    "orderer has not yet committed a config block for {channel_id}"
                ))
            })
    }

    // ─── Transactions ────────────────────────────────────────────────

    /// 정책 기반 보증 피어 선택: 조직별로 원장 높이가 가장 높은 참여 피어
    fn select_endorsers(
        &self,
        channel: &ChannelState,
        policy: &EndorsementPolicy,
        now: Duration,
    ) -> Result<Vec<Peer>, ConnectionError> {
        let available: Vec<&str> = channel
            .members
            .iter()
            .filter(|msp| channel.joined.iter().any(|j| &j.msp_id == *msp))
            .map(String::as_str)
            .collect();
        let orgs = policy.select_endorsers(&available).ok_or_else(|| {
            ConnectionError::PolicyNotSatisfied(format!(
                "no available endorser set satisfies {policy}"
            ))
        })?;

        let mut peers = Vec::with_capacity(orgs.len());
        for msp_id in orgs {
            let mut best: Option<(&Joined, u64)> = None;
            for joined in channel.joined.iter().filter(|j| j.msp_id == msp_id) {
                let height = channel.ledger.height(&joined.url, now);
                if best.is_none_or(|(_, h)| height > h) {
                    best = Some((joined, height));
                }
            }
            if let Some((joined, _)) = best {
                peers.push(Peer::new(joined.url.clone(), joined.msp_id.clone()));
            }
        }
        Ok(peers)
    }

    /// 대상 피어들에서 체인코드를 시뮬레이션합니다.
    fn simulate(
        &self,
        channel: &ChannelState,
        invocation: &Invocation,
        targets: &[Peer],
        now: Duration,
    ) -> Result<Vec<(Peer, Simulation)>, ConnectionError> {
        let mut results = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();
        for peer in targets {
            let world = channel
                .ledger
                .world_state(&invocation.chaincode_id, &peer.url, now);
            let sim = chaincode::invoke(&invocation.function, &invocation.args, &world);
            if !sim.is_ok() {
                failures.push(failure(&peer.url, &sim));
            }
            results.push((peer.clone(), sim));
        }
        if failures.is_empty() {
            Ok(results)
        } else {
            Err(ConnectionError::MultipleErrors(failures))
        }
    }

    fn resolve_targets(
        &self,
        channel: &ChannelState,
        policy: &EndorsementPolicy,
        targets: Option<&[Peer]>,
        now: Duration,
    ) -> Result<Vec<Peer>, ConnectionError> {
        match targets {
            Some(targets) => {
                channel.ensure_joined(targets)?;
                Ok(targets.to_vec())
            }
            None => self.select_endorsers(channel, policy, now),
        }
    }

    pub(crate) fn execute(
        &self,
        caller: &Principal,
        channel_id: &ChannelId,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> Result<TransactionResponse, ConnectionError> {
        self.stats.record(Call::Execute);
        let now = self.now();
        let mut state = self.state();
        let channel = state.channel(channel_id)?;
        let definition = channel
            .active_definition(&invocation.chaincode_id, now)
            .ok_or_else(|| {
                ConnectionError::NotFound(format!(
                    "chaincode {} is not instantiated on {channel_id}",
                    invocation.chaincode_id
                ))
            })?;
        let targets = self.resolve_targets(channel, &definition.policy, targets, now)?;

        let endorsing_orgs: Vec<&str> = targets.iter().map(|p| p.msp_id.as_str()).collect();
        if !definition.policy.is_satisfied_by(&endorsing_orgs) {
            return Err(ConnectionError::PolicyNotSatisfied(format!(
                "endorsements from {endorsing_orgs:?} do not satisfy {}",
                definition.policy
            )));
        }

        let results = self.simulate(channel, invocation, &targets, now)?;
        let Some((_, first)) = results.first() else {
            return Err(ConnectionError::InvalidRequest(
                "no endorsements collected".to_owned(),
            ));
        };
        if results.iter().any(|(_, sim)| sim.writes != first.writes) {
            return Err(ConnectionError::Unavailable(
                "endorsement results from target peers do not match".to_owned(),
            ));
        }

        let chaincode_status = first.status;
        let payload = first.payload.clone();
        let writes = first.writes.clone();
        let responses: Vec<EndorsementResponse> = results
            .into_iter()
            .map(|(peer, sim)| EndorsementResponse {
                peer,
                chaincode_status: sim.status,
                payload: sim.payload,
            })
            .collect();

        let tx_id = new_tx_id();
        let tx = TxRecord {
            id: tx_id.clone(),
            chaincode: Some(invocation.chaincode_id.clone()),
            writes,
            envelope: envelope(
                &tx_id,
                channel_id,
                caller,
                Some(&invocation.chaincode_id),
                &invocation.function,
                &invocation.args,
            )?,
        };
        let endorsers: BTreeSet<String> = targets.iter().map(|p| p.url.clone()).collect();
        let channel = state.channel_mut(channel_id)?;
        let block = channel.ledger.append(
            BlockKind::Transaction,
            vec![tx],
            now + self.settings.commit_lag,
            endorsers,
        );
        debug!(channel = %channel_id, tx_id = %tx_id, block, "transaction committed");

        Ok(TransactionResponse {
            chaincode_status,
            responses,
            transaction_id: tx_id,
            payload,
        })
    }

    pub(crate) fn query(
        &self,
        channel_id: &ChannelId,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> Result<QueryResponse, ConnectionError> {
        self.stats.record(Call::Query);
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        let definition = channel
            .active_definition(&invocation.chaincode_id, now)
            .ok_or_else(|| {
                ConnectionError::NotFound(format!(
                    "chaincode {} is not instantiated on {channel_id}",
                    invocation.chaincode_id
                ))
            })?;
        let targets = self.resolve_targets(channel, &definition.policy, targets, now)?;
        let results = self.simulate(channel, invocation, &targets, now)?;

        let responses: Vec<EndorsementResponse> = results
            .into_iter()
            .map(|(peer, sim)| EndorsementResponse {
                peer,
                chaincode_status: sim.status,
                payload: sim.payload,
            })
            .collect();
        let Some(first) = responses.first() else {
            return Err(ConnectionError::InvalidRequest(
                "no responses collected".to_owned(),
            ));
        };
        Ok(QueryResponse {
            chaincode_status: first.chaincode_status,
            payload: first.payload.clone(),
            responses,
        })
    }

    // ─── Ledger ──────────────────────────────────────────────────────

    pub(crate) fn query_info(
        &self,
        channel_id: &ChannelId,
        targets: &[Peer],
    ) -> Result<BlockchainInfo, ConnectionError> {
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        channel.ensure_joined(targets)?;

        // 대상 중 가장 높은 원장 높이를 보고합니다.
        let height = targets
            .iter()
            .map(|p| channel.ledger.height(&p.url, now))
            .max()
            .unwrap_or(0);
        let current = height
            .checked_sub(1)
            .and_then(|n| targets.iter().find_map(|p| channel.ledger.block(n, &p.url, now)))
            .ok_or_else(|| {
                ConnectionError::Unavailable(format!("no blocks committed on {channel_id} yet"))
            })?;
        Ok(BlockchainInfo {
            height,
            current_block_hash: current.hash.clone(),
            previous_block_hash: current.previous_hash.clone(),
        })
    }

    fn find_block<'a>(
        channel: &'a ChannelState,
        targets: &[Peer],
        lookup: impl Fn(&'a ChannelLedger, &str) -> Option<&'a BlockRecord>,
        what: String,
    ) -> Result<Block, ConnectionError> {
        channel.ensure_joined(targets)?;
        targets
            .iter()
            .find_map(|p| lookup(&channel.ledger, &p.url))
            .map(BlockRecord::to_block)
            .ok_or(ConnectionError::NotFound(what))
    }

    pub(crate) fn query_block(
        &self,
        channel_id: &ChannelId,
        number: u64,
        targets: &[Peer],
    ) -> Result<Block, ConnectionError> {
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        Self::find_block(
            channel,
            targets,
            |ledger, peer| ledger.block(number, peer, now),
            format!("block {number} on {channel_id}"),
        )
    }

    pub(crate) fn query_block_by_hash(
        &self,
        channel_id: &ChannelId,
        hash: &[u8],
        targets: &[Peer],
    ) -> Result<Block, ConnectionError> {
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        Self::find_block(
            channel,
            targets,
            |ledger, peer| ledger.block_by_hash(hash, peer, now),
            format!("block with hash {} on {channel_id}", hex(hash)),
        )
    }

    pub(crate) fn query_transaction(
        &self,
        channel_id: &ChannelId,
        transaction_id: &TransactionId,
        targets: &[Peer],
    ) -> Result<ProcessedTransaction, ConnectionError> {
        let now = self.now();
        let state = self.state();
        let channel = state.channel(channel_id)?;
        channel.ensure_joined(targets)?;
        targets
            .iter()
            .find_map(|p| channel.ledger.transaction(transaction_id, &p.url, now))
            .map(|(block, tx)| ProcessedTransaction {
                transaction_id: tx.id.clone(),
                block_number: block.number,
                envelope: Some(tx.envelope.clone()),
                validation_code: 0,
            })
            .ok_or_else(|| {
                ConnectionError::NotFound(format!("transaction {transaction_id} on {channel_id}"))
            })
    }

    pub(crate) fn query_orderers(
        &self,
        channel_id: &ChannelId,
        targets: &[Peer],
    ) -> Result<Vec<String>, ConnectionError> {
        let state = self.state();
        state.channel(channel_id)?.ensure_joined(targets)?;
        Ok(vec![self.topology.orderer_endpoint.clone()])
    }

    // ─── Discovery ───────────────────────────────────────────────────

    pub(crate) fn local_peers(
        &self,
        caller: &Principal,
        msp_id: &str,
    ) -> Result<PeerSet, ConnectionError> {
        self.stats.record(Call::DiscoveryQuery);
        if caller.msp_id != msp_id {
            return Err(ConnectionError::InvalidRequest(format!(
                "local discovery for {} cannot see peers of {msp_id}",
                caller.msp_id
            )));
        }
        let org = self
            .topology
            .org(msp_id)
            .ok_or_else(|| ConnectionError::NotFound(format!("organization {msp_id}")))?;

        let now = self.now();
        let state = self.state();
        // 가장 이른 채널 참여 시각 기준으로 gossip 전파를 계산합니다.
        let joined_at: BTreeMap<&str, Duration> = state
            .channels
            .values()
            .flat_map(|c| c.joined.iter())
            .fold(BTreeMap::new(), |mut acc, j| {
                acc.entry(j.url.as_str())
                    .and_modify(|t: &mut Duration| *t = (*t).min(j.joined_at))
                    .or_insert(j.joined_at);
                acc
            });

        let peers = org
            .peers
            .iter()
            .zip(1u32..)
            .filter(|(url, rank)| {
                joined_at
                    .get(url.as_str())
                    .is_some_and(|t| *t + self.settings.gossip_lag * *rank <= now)
            })
            .map(|(url, _)| Peer::new(url.clone(), msp_id))
            .collect();
        Ok(PeerSet::new(msp_id, peers))
    }
}

fn failure(peer: &str, sim: &Simulation) -> EndorsementFailure {
    EndorsementFailure {
        peer: peer.to_owned(),
        status: sim.status,
        group: StatusGroup::Chaincode,
        message: sim.message.clone(),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
