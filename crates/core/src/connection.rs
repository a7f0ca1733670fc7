//! 외부 협력자 인터페이스 — 신원, 자원 관리, 채널 트랜잭션, 원장 조회, 디스커버리
//!
//! 실제 SDK/네트워크 스택은 이 모듈의 trait을 구현하여 주입됩니다.
//! 모든 비동기 메서드는 `impl Future + Send`를 반환하므로 박싱 없이 정적 디스패치됩니다.
//!
//! ```text
//!                 ┌────────────────────┐
//!                 │ ConnectionProvider │
//!                 └─────────┬──────────┘
//!        ┌──────────────┬───┴──────────┬──────────────┐
//!        ▼              ▼              ▼              ▼
//! ResourceManagement ChannelTransactions LedgerQuery Discovery
//! ```

use std::future::Future;

use bytes::Bytes;

use crate::error::ConnectionError;
use crate::types::{
    Block, BlockchainInfo, ChaincodeDescriptor, ChaincodeInfo, ChannelId, ChannelRequest,
    InstallResponse, Invocation, Peer, PeerSet, Principal, ProcessedTransaction, QueryResponse,
    SigningIdentity, TransactionId, TransactionResponse,
};

/// 신원 제공자
pub trait IdentityProvider: Send + Sync + 'static {
    /// 조직 사용자의 서명 신원을 반환합니다.
    ///
    /// # Errors
    ///
    /// 사용자를 찾을 수 없으면 `ConnectionError::Identity`를 반환합니다.
    fn signing_identity(&self, principal: &Principal) -> Result<SigningIdentity, ConnectionError>;
}

/// 자원 관리 연결 (조직 관리자 권한)
pub trait ResourceManagement: Send + Sync {
    /// 채널을 생성하거나 설정을 갱신합니다.
    ///
    /// `signers`는 요청에 서명할 관리자 신원 목록입니다.
    fn save_channel(
        &self,
        request: &ChannelRequest,
        signers: &[SigningIdentity],
    ) -> impl Future<Output = Result<TransactionId, ConnectionError>> + Send;

    /// 이 연결의 조직 피어들을 채널에 참여시킵니다.
    fn join_channel(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<(), ConnectionError>> + Send;

    /// 대상 피어들에 체인코드를 설치합니다.
    fn install_chaincode(
        &self,
        chaincode: &ChaincodeDescriptor,
        targets: &[Peer],
    ) -> impl Future<Output = Result<Vec<InstallResponse>, ConnectionError>> + Send;

    /// 채널에 체인코드를 인스턴스화합니다.
    fn instantiate_chaincode(
        &self,
        channel: &ChannelId,
        chaincode: &ChaincodeDescriptor,
        init_args: &[Bytes],
    ) -> impl Future<Output = Result<TransactionId, ConnectionError>> + Send;

    /// 채널의 체인코드를 새 버전으로 업그레이드합니다.
    fn upgrade_chaincode(
        &self,
        channel: &ChannelId,
        chaincode: &ChaincodeDescriptor,
        init_args: &[Bytes],
    ) -> impl Future<Output = Result<TransactionId, ConnectionError>> + Send;

    /// 피어에 설치된 체인코드 목록을 조회합니다.
    fn query_installed_chaincodes(
        &self,
        peer: &Peer,
    ) -> impl Future<Output = Result<Vec<ChaincodeInfo>, ConnectionError>> + Send;

    /// 피어가 채널에서 인스턴스화된 것으로 보고하는 체인코드 목록을 조회합니다.
    fn query_instantiated_chaincodes(
        &self,
        channel: &ChannelId,
        peer: &Peer,
    ) -> impl Future<Output = Result<Vec<ChaincodeInfo>, ConnectionError>> + Send;

    /// 오더러가 보고하는 채널의 현재 설정 블록 번호를 조회합니다.
    fn query_config_block(
        &self,
        channel: &ChannelId,
    ) -> impl Future<Output = Result<u64, ConnectionError>> + Send;
}

/// 채널 트랜잭션 연결 (사용자 권한, 채널 범위)
pub trait ChannelTransactions: Send + Sync {
    /// 상태를 변경하는 트랜잭션을 실행합니다.
    ///
    /// `targets`가 `None`이면 보증 정책에 따라 보증 피어를 동적으로 선택합니다.
    fn execute(
        &self,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> impl Future<Output = Result<TransactionResponse, ConnectionError>> + Send;

    /// 상태를 변경하지 않는 조회를 수행합니다.
    fn query(
        &self,
        invocation: &Invocation,
        targets: Option<&[Peer]>,
    ) -> impl Future<Output = Result<QueryResponse, ConnectionError>> + Send;
}

/// 원장 조회 연결 (채널 범위)
pub trait LedgerQuery: Send + Sync {
    /// 원장 높이와 현재 블록 해시를 조회합니다.
    ///
    /// 모든 대상 피어가 같은 응답을 돌려줘야 합니다.
    fn query_info(
        &self,
        targets: &[Peer],
    ) -> impl Future<Output = Result<BlockchainInfo, ConnectionError>> + Send;

    /// 번호로 블록을 조회합니다.
    fn query_block(
        &self,
        number: u64,
        targets: &[Peer],
    ) -> impl Future<Output = Result<Block, ConnectionError>> + Send;

    /// 해시로 블록을 조회합니다.
    fn query_block_by_hash(
        &self,
        hash: &[u8],
        targets: &[Peer],
    ) -> impl Future<Output = Result<Block, ConnectionError>> + Send;

    /// 트랜잭션 ID로 처리된 트랜잭션을 조회합니다.
    fn query_transaction(
        &self,
        transaction_id: &TransactionId,
        targets: &[Peer],
    ) -> impl Future<Output = Result<ProcessedTransaction, ConnectionError>> + Send;

    /// 채널 설정에 등록된 오더러 엔드포인트 목록을 조회합니다.
    fn query_orderers(
        &self,
        targets: &[Peer],
    ) -> impl Future<Output = Result<Vec<String>, ConnectionError>> + Send;
}

/// 로컬 디스커버리 연결
pub trait Discovery: Send + Sync {
    /// gossip으로 전파된 로컬 뷰에서 조직의 피어 목록을 조회합니다.
    fn local_peers(
        &self,
        msp_id: &str,
    ) -> impl Future<Output = Result<PeerSet, ConnectionError>> + Send;
}

/// 연결 팩토리
///
/// principal(과 채널)별로 연결을 생성합니다. 연결 생성은 로컬 작업이며,
/// 네트워크 호출은 생성된 연결의 메서드에서 일어납니다.
pub trait ConnectionProvider: Send + Sync + 'static {
    type Admin: ResourceManagement;
    type Channel: ChannelTransactions;
    type Ledger: LedgerQuery;
    type Discovery: Discovery;

    /// 관리자 principal의 자원 관리 연결을 생성합니다.
    fn admin(&self, principal: &Principal) -> Result<Self::Admin, ConnectionError>;

    /// 사용자 principal의 채널 트랜잭션 연결을 생성합니다.
    fn channel(
        &self,
        channel: &ChannelId,
        principal: &Principal,
    ) -> Result<Self::Channel, ConnectionError>;

    /// principal의 원장 조회 연결을 생성합니다.
    fn ledger(
        &self,
        channel: &ChannelId,
        principal: &Principal,
    ) -> Result<Self::Ledger, ConnectionError>;

    /// principal 조직의 로컬 디스커버리 연결을 생성합니다.
    fn discovery(&self, principal: &Principal) -> Result<Self::Discovery, ConnectionError>;
}
