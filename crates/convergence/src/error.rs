//! 수렴 대기 에러 타입
//!
//! 예산 소진(수렴 실패)과 잘못된 입력, 전파된 협력자 에러를 구분합니다.
//! 설치/인스턴스화 대기는 예산 소진을 에러가 아닌 `Ok(false)`로 보고하므로
//! 여기에 대응하는 변형이 없습니다.

use std::fmt;

use consortium_core::error::ConnectionError;
use consortium_core::types::PeerSet;

use crate::channel_config::ConfigBaseline;

/// 수렴 대기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ConvergenceError {
    /// 디스커버리가 예산 안에 기대한 피어 수를 보지 못함
    #[error(
        "peer discovery for '{msp_id}' saw {observed} of {expected} peers after {attempts} attempts"
    )]
    PeerCountMismatch {
        msp_id: String,
        expected: usize,
        observed: usize,
        attempts: u32,
        /// 마지막으로 관측된 피어 집합
        last: PeerSet,
    },

    /// 채널 설정 블록이 예산 안에 전진하지 않음
    #[error(
        "config block of channel '{channel}' did not advance past {baseline} after {attempts} attempts (last observed: {}, last error: {})",
        Observed(.last_observed),
        .last_error.as_deref().unwrap_or("none")
    )]
    ConfigNotAdvanced {
        channel: String,
        baseline: ConfigBaseline,
        last_observed: Option<u64>,
        last_error: Option<String>,
        attempts: u32,
    },

    /// 조회 값이 예산 안에 기대값으로 수렴하지 않음
    #[error(
        "value did not converge: expected {expected}, last observed {} after {attempts} attempts",
        Observed(.actual)
    )]
    ValueDiverged {
        expected: i64,
        actual: Option<i64>,
        attempts: u32,
    },

    /// 조회 페이로드를 정수로 해석할 수 없음
    #[error("invalid payload '{payload}': {reason}")]
    InvalidPayload { payload: String, reason: String },

    /// 대기 대상 피어 집합이 비어 있음
    #[error("no peers given for {target}")]
    NoPeers { target: String },

    /// 재시도 대상이 아닌 협력자 에러
    #[error("query failed: {0}")]
    Query(#[from] ConnectionError),
}

impl ConvergenceError {
    /// 재시도 예산 소진으로 발생한 에러인지 반환합니다.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Self::PeerCountMismatch { .. } | Self::ConfigNotAdvanced { .. } | Self::ValueDiverged { .. }
        )
    }
}

struct Observed<'a, T>(&'a Option<T>);

impl<T: fmt::Display> fmt::Display for Observed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => write!(f, "nothing"),
        }
    }
}
