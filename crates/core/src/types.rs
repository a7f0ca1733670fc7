//! 도메인 타입 — 조직, 채널, 체인코드, 피어, 트랜잭션 응답
//!
//! 워크플로우와 수렴 대기 모듈, 외부 협력자 구현이 공유하는 데이터 구조를 정의합니다.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::policy::EndorsementPolicy;

// ─── Organization ────────────────────────────────────────────────────

/// 조직 역할
///
/// 시나리오에 참여하는 두 조직을 같은 로직 경로로 다루기 위한 열거형입니다.
/// `Primary`는 값을 검증하는 조직, `Secondary`는 트랜잭션을 실행하는 조직입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    /// 검증 조직 (기준 시나리오의 Org1)
    Primary,
    /// 실행 조직 (기준 시나리오의 Org2)
    Secondary,
}

impl OrgRole {
    /// 모든 역할 (처리 순서)
    pub const ALL: [OrgRole; 2] = [OrgRole::Primary, OrgRole::Secondary];

    /// 상대 조직 역할
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl fmt::Display for OrgRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
        }
    }
}

/// 조직 내 사용자 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// 조직 이름 (예: `"Org1"`)
    pub org: String,
    /// MSP ID (예: `"Org1MSP"`)
    pub msp_id: String,
    /// 사용자 이름 (예: `"Admin"`, `"User1"`)
    pub user: String,
}

impl Principal {
    pub fn new(org: impl Into<String>, msp_id: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            msp_id: msp_id.into(),
            user: user.into(),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.org)
    }
}

/// 조직 운영 컨텍스트
///
/// 실행당 조직마다 한 번 생성되며 이후 변경되지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationContext {
    /// 시나리오 내 역할
    pub role: OrgRole,
    /// 관리자 principal (채널/체인코드 관리용)
    pub admin: Principal,
    /// 일반 사용자 principal (트랜잭션 실행/조회용)
    pub user: Principal,
    /// 설정에 선언된 피어 엔드포인트 (첫 번째가 지정 테스트 피어)
    pub peers: Vec<String>,
}

impl OrganizationContext {
    /// 조직 이름
    pub fn name(&self) -> &str {
        &self.admin.org
    }

    /// MSP ID
    pub fn msp_id(&self) -> &str {
        &self.admin.msp_id
    }

    /// 디스커버리가 보고해야 하는 피어 수
    pub fn expected_peers(&self) -> usize {
        self.peers.len()
    }

    /// 지정 테스트 피어 (설정의 첫 번째 피어)
    pub fn designated_peer(&self) -> Option<Peer> {
        self.peers
            .first()
            .map(|url| Peer::new(url.clone(), self.msp_id()))
    }
}

/// 서명 신원
///
/// 실제 키 관리는 외부 신원 제공자의 몫이며, 여기서는 불투명한 인증서 바이트만 보관합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningIdentity {
    /// 신원이 속한 principal
    pub principal: Principal,
    /// 인증서 (불투명)
    pub certificate: Bytes,
}

// ─── Peers ───────────────────────────────────────────────────────────

/// 피어 엔드포인트
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Peer {
    /// 피어 URL (예: `"peer0.org1.example.com:7051"`)
    pub url: String,
    /// 소속 MSP ID
    pub msp_id: String,
}

impl Peer {
    pub fn new(url: impl Into<String>, msp_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            msp_id: msp_id.into(),
        }
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

/// 한 조직의 피어 집합
///
/// 디스커버리로 갱신되며 안정적이라고 가정하지 않습니다.
/// 긴 간격을 두고 재사용하지 말고 다시 조회해야 합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerSet {
    /// 조직 MSP ID
    pub msp_id: String,
    /// 피어 목록 (디스커버리 순서)
    pub peers: Vec<Peer>,
}

impl PeerSet {
    pub fn new(msp_id: impl Into<String>, peers: Vec<Peer>) -> Self {
        Self {
            msp_id: msp_id.into(),
            peers,
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peer> {
        self.peers.iter()
    }

    pub fn as_slice(&self) -> &[Peer] {
        &self.peers
    }

    /// 피어 URL 목록 (로그용)
    pub fn urls(&self) -> Vec<&str> {
        self.peers.iter().map(|p| p.url.as_str()).collect()
    }
}

// ─── Channel ─────────────────────────────────────────────────────────

/// 채널 식별자
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 채널 핸들
///
/// 관측된 설정 블록 번호는 단조 비감소입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelHandle {
    /// 채널 ID
    pub id: ChannelId,
    /// 마지막으로 관측된 설정 블록 번호 (아직 관측 전이면 `None`)
    pub last_config_block: Option<u64>,
}

impl ChannelHandle {
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            last_config_block: None,
        }
    }

    /// 새로 관측된 설정 블록 번호를 기록합니다.
    ///
    /// 이전 관측보다 작은 값은 무시하고 `false`를 반환합니다.
    #[must_use]
    pub fn observe_config_block(&mut self, block: u64) -> bool {
        match self.last_config_block {
            Some(last) if block < last => false,
            _ => {
                self.last_config_block = Some(block);
                true
            }
        }
    }
}

/// 채널 생성/갱신 요청
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRequest {
    /// 대상 채널
    pub channel_id: ChannelId,
    /// 채널 설정 트랜잭션 파일 경로 (예: `orgchannel.tx`, `orgchannelOrg1MSPanchors.tx`)
    pub config_path: String,
    /// 요청 종류
    pub kind: ChannelUpdateKind,
}

/// 채널 설정 트랜잭션 종류
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelUpdateKind {
    /// 채널 생성 (모든 조직 관리자 서명 필요)
    Create,
    /// 조직의 앵커 피어 추가
    AnchorPeers { msp_id: String },
}

// ─── Chaincode ───────────────────────────────────────────────────────

/// 체인코드 배포 기술자
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeDescriptor {
    /// 체인코드 이름
    pub name: String,
    /// 버전
    pub version: String,
    /// 배포 경로
    pub path: String,
    /// 보증 정책
    pub policy: EndorsementPolicy,
}

impl ChaincodeDescriptor {
    /// 새 버전과 정책으로 업그레이드용 기술자를 생성합니다.
    pub fn with_version(&self, version: impl Into<String>, policy: EndorsementPolicy) -> Self {
        Self {
            name: self.name.clone(),
            version: version.into(),
            path: self.path.clone(),
            policy,
        }
    }

    /// 레지스트리 조회 결과가 이 기술자와 일치하는지 확인합니다.
    pub fn matches(&self, info: &ChaincodeInfo) -> bool {
        info.name == self.name && info.version == self.version
    }
}

impl fmt::Display for ChaincodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// 피어 레지스트리에 등록된 체인코드 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaincodeInfo {
    pub name: String,
    pub version: String,
    pub path: String,
}

/// 피어별 설치 응답
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallResponse {
    /// 대상 피어
    pub peer: Peer,
    /// 상태 코드 (200 = 성공)
    pub status: i32,
    /// 응답 메시지
    pub info: String,
}

// ─── Transactions ────────────────────────────────────────────────────

/// 트랜잭션 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 체인코드 호출 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// 체인코드 이름
    pub chaincode_id: String,
    /// 함수 이름
    pub function: String,
    /// 인자 (불투명 바이트)
    pub args: Vec<Bytes>,
}

impl Invocation {
    /// 문자열 인자 목록으로 호출 요청을 만듭니다.
    pub fn new<S: AsRef<str>>(
        chaincode_id: impl Into<String>,
        function: impl Into<String>,
        args: &[S],
    ) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
            function: function.into(),
            args: args
                .iter()
                .map(|a| Bytes::copy_from_slice(a.as_ref().as_bytes()))
                .collect(),
        }
    }
}

/// 피어별 보증 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndorsementResponse {
    pub peer: Peer,
    pub chaincode_status: i32,
    pub payload: Bytes,
}

/// 실행(execute) 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResponse {
    /// 클라이언트 관점의 체인코드 상태
    pub chaincode_status: i32,
    /// 보증 피어별 응답
    pub responses: Vec<EndorsementResponse>,
    /// 트랜잭션 ID
    pub transaction_id: TransactionId,
    /// 체인코드 응답 페이로드
    pub payload: Bytes,
}

/// 조회(query) 응답
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResponse {
    pub chaincode_status: i32,
    pub responses: Vec<EndorsementResponse>,
    pub payload: Bytes,
}

// ─── Ledger ──────────────────────────────────────────────────────────

/// 원장 높이와 현재 블록 해시
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockchainInfo {
    pub height: u64,
    pub current_block_hash: Bytes,
    pub previous_block_hash: Bytes,
}

/// 원장 블록
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub number: u64,
    pub hash: Bytes,
    pub previous_hash: Bytes,
    pub transactions: Vec<TransactionId>,
}

/// 처리된 트랜잭션
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedTransaction {
    pub transaction_id: TransactionId,
    pub block_number: u64,
    /// 트랜잭션 봉투 (불투명). 비어 있으면 조회 실패로 간주합니다.
    pub envelope: Option<Bytes>,
    /// 검증 코드 (0 = VALID)
    pub validation_code: i32,
}
