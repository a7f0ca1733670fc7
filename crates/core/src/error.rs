//! 에러 타입 — 도메인별 에러 정의
//!
//! 외부 협력자(피어, 오더러, 신원 제공자) 호출 에러는 [`ConnectionError`]로 통일됩니다.
//! 재시도 가능 여부는 [`ConnectionError::is_transient`]로, 보증 정책 위반 여부는
//! [`ConnectionError::is_policy_violation`]으로 판단합니다.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Consortium 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum ConsortiumError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 외부 협력자 호출 에러
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// 보증 정책 표현식 에러
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 보증 정책 표현식 파싱 에러
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// 빈 표현식
    #[error("empty policy expression")]
    Empty,

    /// 예상하지 못한 토큰
    #[error("unexpected token at offset {offset}: expected {expected}")]
    UnexpectedToken { offset: usize, expected: String },

    /// 잘못된 principal (`'MSP.role'` 형식이 아님)
    #[error("invalid principal '{0}': expected 'MSPID.role'")]
    InvalidPrincipal(String),

    /// OutOf 임계값이 범위를 벗어남
    #[error("OutOf threshold {threshold} out of range for {count} sub-policies")]
    InvalidThreshold { threshold: usize, count: usize },

    /// 표현식 뒤에 남은 입력
    #[error("trailing input at offset {offset}")]
    TrailingInput { offset: usize },
}

/// 보증 실패의 상태 그룹
///
/// 피어가 돌려준 상태 코드가 어느 계층에서 발생했는지 구분합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusGroup {
    /// 체인코드가 돌려준 상태 (예: 500)
    Chaincode,
    /// 보증 피어 자체의 실패
    Endorser,
    /// 전송 계층 실패
    Transport,
}

impl fmt::Display for StatusGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chaincode => write!(f, "chaincode"),
            Self::Endorser => write!(f, "endorser"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// 단일 피어의 보증 실패
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementFailure {
    /// 실패한 피어 URL
    pub peer: String,
    /// 상태 코드
    pub status: i32,
    /// 상태 그룹
    pub group: StatusGroup,
    /// 실패 메시지
    pub message: String,
}

impl fmt::Display for EndorsementFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {}]: {}",
            self.peer, self.group, self.status, self.message
        )
    }
}

/// 외부 협력자 호출 에러
///
/// 분류:
/// - `Unavailable`: 일시적 장애 — 수렴 대기 예산 안에서 재시도
/// - `InvalidRequest`, `Identity`, `NotFound`: 기다려도 해결되지 않음 — 즉시 전파
/// - `PolicyNotSatisfied`, `MultipleErrors`: 보증 정책 위반 (여러 보증 실패 묶음)
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// 서비스가 아직 준비되지 않음 (오더러 미기동, gossip 전파 전 등)
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// 잘못된 요청
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// 서명 신원 조회 실패
    #[error("identity error for '{user}@{org}': {reason}")]
    Identity {
        org: String,
        user: String,
        reason: String,
    },

    /// 대상이 존재하지 않음
    #[error("not found: {0}")]
    NotFound(String),

    /// 보증 정책을 만족하지 못함
    #[error("endorsement policy not satisfied: {0}")]
    PolicyNotSatisfied(String),

    /// 여러 피어의 보증 실패 묶음
    #[error("{} endorsement failure(s): {}", .0.len(), join_failures(.0))]
    MultipleErrors(Vec<EndorsementFailure>),
}

impl ConnectionError {
    /// 재시도로 해결될 수 있는 일시적 에러인지 반환합니다.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// 보증 정책 위반 계열 에러인지 반환합니다.
    pub fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyNotSatisfied(_) | Self::MultipleErrors(_))
    }
}

fn join_failures(failures: &[EndorsementFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(peer: &str) -> EndorsementFailure {
        EndorsementFailure {
            peer: peer.to_owned(),
            status: 500,
            group: StatusGroup::Chaincode,
            message: "Unknown function".to_owned(),
        }
    }

    #[test]
    fn unavailable_is_transient() {
        let err = ConnectionError::Unavailable("orderer starting".to_owned());
        assert!(err.is_transient());
        assert!(!err.is_policy_violation());
    }

    #[test]
    fn invalid_request_is_not_transient() {
        let err = ConnectionError::InvalidRequest("missing channel id".to_owned());
        assert!(!err.is_transient());
    }

    #[test]
    fn multiple_errors_display_lists_every_peer() {
        let err = ConnectionError::MultipleErrors(vec![
            failure("peer0.org1.example.com:7051"),
            failure("peer0.org2.example.com:8051"),
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 endorsement failure(s)"));
        assert!(msg.contains("peer0.org1.example.com:7051"));
        assert!(msg.contains("peer0.org2.example.com:8051"));
        assert!(msg.contains("chaincode 500"));
        assert!(err.is_policy_violation());
    }

    #[test]
    fn policy_not_satisfied_is_policy_violation() {
        let err = ConnectionError::PolicyNotSatisfied("missing Org1MSP".to_owned());
        assert!(err.is_policy_violation());
        assert!(!err.is_transient());
    }

    #[test]
    fn converts_to_consortium_error() {
        let err: ConsortiumError = ConnectionError::NotFound("orgchannel".to_owned()).into();
        assert!(matches!(err, ConsortiumError::Connection(_)));
        let err: ConsortiumError = PolicyError::Empty.into();
        assert!(matches!(err, ConsortiumError::Policy(PolicyError::Empty)));
    }
}
