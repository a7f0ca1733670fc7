//! 채널 설정 수렴 대기
//!
//! 채널 생성이나 앵커 피어 갱신 뒤, 오더러가 보고하는 설정 블록 번호가 전진할 때까지 기다립니다.
//! 첫 관측(채널 생성 직후)은 어떤 블록이든 받아들이고, 이후에는 기준보다 엄격히 커야 합니다.

use std::fmt;

use consortium_core::clock::Clock;
use consortium_core::connection::ResourceManagement;
use consortium_core::types::ChannelId;
use tracing::{info, warn};

use crate::error::ConvergenceError;
use crate::poller::{ConvergenceTarget, PollOutcome, Poller, Probe, RetryPolicy};

/// 메트릭/로그 레이블
pub const CHANNEL_CONFIG_TARGET: &str = "channel_config";

/// 설정 블록 비교 기준
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBaseline {
    /// 첫 관측 — 어떤 블록 번호든 수렴으로 간주
    Genesis,
    /// 마지막으로 알려진 블록 번호
    After(u64),
}

impl ConfigBaseline {
    /// `current`가 이 기준 대비 전진했는지 판단합니다.
    pub fn accepts(&self, current: u64) -> bool {
        match *self {
            Self::Genesis => config_advanced(true, 0, current),
            Self::After(last_known) => config_advanced(false, last_known, current),
        }
    }
}

impl fmt::Display for ConfigBaseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Genesis => write!(f, "genesis"),
            Self::After(block) => write!(f, "block {block}"),
        }
    }
}

/// 설정 블록 전진 판정
pub fn config_advanced(is_first: bool, last_known: u64, current: u64) -> bool {
    is_first || current > last_known
}

/// 채널 설정 블록이 `baseline`을 넘어 전진할 때까지 기다리고, 관측된 블록 번호를 반환합니다.
///
/// 오더러 조회 에러는 종류와 관계없이 예산 안에서 재시도합니다.
///
/// # Errors
///
/// 예산 소진 시 [`ConvergenceError::ConfigNotAdvanced`]
pub async fn wait_for_config_advance<C, R>(
    poller: &Poller<C>,
    admin: &R,
    channel: &ChannelId,
    baseline: ConfigBaseline,
    policy: &RetryPolicy,
) -> Result<u64, ConvergenceError>
where
    C: Clock,
    R: ResourceManagement,
{
    let target = ConvergenceTarget::new(CHANNEL_CONFIG_TARGET, *policy);

    let outcome = poller
        .poll(&target, |attempt| async move {
            match admin.query_config_block(channel).await {
                Ok(current) if baseline.accepts(current) => Ok(Probe::Satisfied(current)),
                Ok(current) => Ok(Probe::Pending(current)),
                Err(e) => {
                    warn!(channel = %channel, attempt, error = %e, "config block query failed");
                    Ok::<_, ConvergenceError>(Probe::Unavailable(e.to_string()))
                }
            }
        })
        .await?;

    match outcome {
        PollOutcome::Satisfied { value, attempts } => {
            info!(channel = %channel, %baseline, block = value, attempts, "channel config converged");
            Ok(value)
        }
        PollOutcome::Exhausted {
            last,
            last_error,
            attempts,
        } => Err(ConvergenceError::ConfigNotAdvanced {
            channel: channel.to_string(),
            baseline,
            last_observed: last,
            last_error,
            attempts,
        }),
    }
}
