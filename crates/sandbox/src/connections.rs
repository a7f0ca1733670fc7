//! 연결 구현 — 공유 네트워크 상태 위의 principal별 핸들

use std::sync::Arc;

use bytes::Bytes;
use consortium_core::clock::Clock;
use consortium_core::connection::{
    ChannelTransactions, Discovery, LedgerQuery, ResourceManagement,
};
use consortium_core::error::ConnectionError;
use consortium_core::types::{
    Block, BlockchainInfo, ChaincodeDescriptor, ChaincodeInfo, ChannelId, ChannelRequest,
    InstallResponse, Invocation, Peer, PeerSet, Principal, ProcessedTransaction, QueryResponse,
    SigningIdentity, TransactionId, TransactionResponse,
};

use crate::network::Inner;

/// 조직 관리자 연결
pub struct SandboxAdmin<C> {
    inner: Arc<Inner<C>>,
    principal: Principal,
}

impl<C> SandboxAdmin<C> {
    pub(crate) fn new(inner: Arc<Inner<C>>, principal: Principal) -> Self {
        Self { inner, principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }
}

impl<C: Clock> ResourceManagement for SandboxAdmin<C> {
    async fn save_channel(
        &self,
        request: &ChannelRequest,
        signers: &[SigningIdentity],
    ) -> Result<TransactionId, ConnectionError> {
        self.inner.save_channel(&self.principal, request, signers)
    }

    async fn join_channel(&self, channel: &ChannelId) -> Result<(), ConnectionError> {
        self.inner.join_channel(&self.principal, channel)
    }

    async fn install_chaincode(
        &self,
        chaincode: &ChaincodeDescriptor,
        targets: &[Peer],
    ) -> Result<Vec<InstallResponse>, ConnectionError> {
        self.inner
            .install_chaincode(&self.principal, chaincode, targets)
    }

    async fn instantiate_chaincode(
        &self,
        channel: &ChannelId,
        chaincode: &ChaincodeDescriptor,
        init_args: &[Bytes],
    ) -> Result<TransactionId, ConnectionError> {
        self.inner
            .deploy_chaincode(&self.principal, channel, chaincode, init_args, false)
    }

    async fn upgrade_chaincode(
        &self,
        channel: &ChannelId,
        chaincode: &ChaincodeDescriptor,
        init_args: &[Bytes],
    ) -> Result<TransactionId, ConnectionError> {
        self.inner
            .deploy_chaincode(&self.principal, channel, chaincode, init_args, true)
    }

    async fn query_installed_chaincodes(
        &self,
        peer: &Peer,
    ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
        self.inner.installed_chaincodes(&self.principal, peer)
    }

    async fn query_instantiated_chaincodes(
        &self,
        channel: &ChannelId,
        peer: &Peer,
    ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
        self.inner.instantiated_chaincodes(channel, peer)
    }

    async fn query_config_block(&self, channel: &ChannelId) -> Result<u64, ConnectionError> {
        self.inner.config_block(channel)
    }
}

/// 채널 트랜잭션 연결
pub struct SandboxChannel<C> {
    inner: Arc<Inner<C>>,
    channel: ChannelId,
    principal: Principal,
}

impl<C> SandboxChannel<C> {
    pub(crate) fn new(inner: Arc<Inner<C>>, channel: ChannelId, principal: Principal) -> Self {
        Self {
            inner,
            channel,
            principal,
        }
    }

    pub fn channel_id(&self) -> &ChannelId {
        &self.channel
    }
}

impl<C: Clock> ChannelTransactions for SandboxChannel<C> {
    async fn execute(
        &self,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> Result<TransactionResponse, ConnectionError> {
        self.inner
            .execute(&self.principal, &self.channel, invocation, targets)
    }

    async fn query(
        &self,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> Result<QueryResponse, ConnectionError> {
        self.inner.query(&self.channel, invocation, targets)
    }
}

/// 원장 조회 연결
pub struct SandboxLedger<C> {
    inner: Arc<Inner<C>>,
    channel: ChannelId,
    // 원장 조회는 신원별 권한 차이가 없으며 연결 생성 시에만 검증합니다.
    _principal: Principal,
}

impl<C> SandboxLedger<C> {
    pub(crate) fn new(inner: Arc<Inner<C>>, channel: ChannelId, principal: Principal) -> Self {
        Self {
            inner,
            channel,
            _principal: principal,
        }
    }
}

impl<C: Clock> LedgerQuery for SandboxLedger<C> {
    async fn query_info(&self, targets: &[Peer]) -> Result<BlockchainInfo, ConnectionError> {
        self.inner.query_info(&self.channel, targets)
    }

    async fn query_block(&self, number: u64, targets: &[Peer]) -> Result<Block, ConnectionError> {
        self.inner.query_block(&self.channel, number, targets)
    }

    async fn query_block_by_hash(
        &self,
        hash: &[u8],
        targets: &[Peer],
    ) -> Result<Block, ConnectionError> {
        self.inner.query_block_by_hash(&self.channel, hash, targets)
    }

    async fn query_transaction(
        &self,
        transaction_id: &TransactionId,
        targets: &[Peer],
    ) -> Result<ProcessedTransaction, ConnectionError> {
        self.inner
            .query_transaction(&self.channel, transaction_id, targets)
    }

    async fn query_orderers(&self, targets: &[Peer]) -> Result<Vec<String>, ConnectionError> {
        self.inner.query_orderers(&self.channel, targets)
    }
}

/// 로컬 디스커버리 연결
pub struct SandboxDiscovery<C> {
    inner: Arc<Inner<C>>,
    principal: Principal,
}

impl<C> SandboxDiscovery<C> {
    pub(crate) fn new(inner: Arc<Inner<C>>, principal: Principal) -> Self {
        Self { inner, principal }
    }
}

impl<C: Clock> Discovery for SandboxDiscovery<C> {
    async fn local_peers(&self, msp_id: &str) -> Result<PeerSet, ConnectionError> {
        self.inner.local_peers(&self.principal, msp_id)
    }
}
