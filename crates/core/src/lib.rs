//! Consortium 공통 크레이트
//!
//! 다중 조직 원장 워크플로우의 모든 계층이 공유하는 타입, 외부 협력자 trait,
//! 에러 분류, 설정, 시계 추상화를 제공합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 에러 분류 (`ConsortiumError`, `ConnectionError`, `ConfigError`)
//! - [`types`]: 조직, 채널, 체인코드, 트랜잭션 도메인 타입
//! - [`policy`]: 보증 정책 표현식 (`EndorsementPolicy`)
//! - [`connection`]: 외부 협력자 trait (`ResourceManagement`, `ChannelTransactions`, ...)
//! - [`clock`]: 주입 가능한 시계 (`TokioClock`, `VirtualClock`)
//! - [`config`]: `consortium.toml` 설정 (`ConsortiumConfig`)
//! - [`metrics`]: 메트릭 이름 상수

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    ConfigError, ConnectionError, ConsortiumError, EndorsementFailure, PolicyError, StatusGroup,
};

// 설정
pub use config::ConsortiumConfig;

// 시계
pub use clock::{Clock, TokioClock, VirtualClock};

// 협력자 trait
pub use connection::{
    ChannelTransactions, ConnectionProvider, Discovery, IdentityProvider, LedgerQuery,
    ResourceManagement,
};

// 보증 정책
pub use policy::{EndorsementPolicy, Role};

// 도메인 타입
pub use types::{
    Block, BlockchainInfo, ChaincodeDescriptor, ChaincodeInfo, ChannelHandle, ChannelId,
    ChannelRequest, ChannelUpdateKind, EndorsementResponse, InstallResponse, Invocation,
    OrgRole, OrganizationContext, Peer, PeerSet, Principal, ProcessedTransaction, QueryResponse,
    SigningIdentity, TransactionId, TransactionResponse,
};
