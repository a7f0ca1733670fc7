//! 샌드박스 전파 지연 설정

use std::time::Duration;

use consortium_core::config::SandboxConfig;

/// 전파 지연
///
/// 모든 지연은 주입된 시계의 경과 시간 기준입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxSettings {
    /// 조직의 i번째 피어는 채널 참여 후 `(i + 1) × gossip_lag`에 로컬 디스커버리에 나타납니다.
    pub gossip_lag: Duration,
    /// 설정 블록이 오더러 조회와 피어에 반영되기까지
    pub config_lag: Duration,
    /// 설치가 피어 레지스트리에 반영되기까지
    pub install_lag: Duration,
    /// 인스턴스화/업그레이드가 피어에 반영되기까지
    pub instantiate_lag: Duration,
    /// 커밋된 블록이 보증하지 않은 피어에 반영되기까지
    pub commit_lag: Duration,
}

impl SandboxSettings {
    /// 코어 설정 섹션에서 변환합니다.
    pub fn from_core(core: &SandboxConfig) -> Self {
        Self {
            gossip_lag: Duration::from_millis(core.gossip_lag_ms),
            config_lag: Duration::from_millis(core.config_lag_ms),
            install_lag: Duration::from_millis(core.install_lag_ms),
            instantiate_lag: Duration::from_millis(core.instantiate_lag_ms),
            commit_lag: Duration::from_millis(core.commit_lag_ms),
        }
    }

    /// 지연이 전혀 없는 네트워크
    pub fn instant() -> Self {
        Self {
            gossip_lag: Duration::ZERO,
            config_lag: Duration::ZERO,
            install_lag: Duration::ZERO,
            instantiate_lag: Duration::ZERO,
            commit_lag: Duration::ZERO,
        }
    }
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self::from_core(&SandboxConfig::default())
    }
}
