//! 샌드박스 호출 카운터
//!
//! 부수 효과가 있는 호출 횟수를 세어, 멱등성 같은 성질을 테스트에서 관측할 수 있게 합니다.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// 호출 카운터
#[derive(Debug, Default)]
pub struct SandboxStats {
    save_channel: AtomicU64,
    join_channel: AtomicU64,
    install: AtomicU64,
    instantiate: AtomicU64,
    upgrade: AtomicU64,
    execute: AtomicU64,
    query: AtomicU64,
    config_queries: AtomicU64,
    discovery_queries: AtomicU64,
}

/// 특정 시점의 카운터 값
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub save_channel: u64,
    pub join_channel: u64,
    pub install: u64,
    pub instantiate: u64,
    pub upgrade: u64,
    pub execute: u64,
    pub query: u64,
    pub config_queries: u64,
    pub discovery_queries: u64,
}

/// 카운터 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Call {
    SaveChannel,
    JoinChannel,
    Install,
    Instantiate,
    Upgrade,
    Execute,
    Query,
    ConfigQuery,
    DiscoveryQuery,
}

impl SandboxStats {
    pub(crate) fn record(&self, call: Call) {
        let counter = match call {
            Call::SaveChannel => &self.save_channel,
            Call::JoinChannel => &self.join_channel,
            Call::Install => &self.install,
            Call::Instantiate => &self.instantiate,
            Call::Upgrade => &self.upgrade,
            Call::Execute => &self.execute,
            Call::Query => &self.query,
            Call::ConfigQuery => &self.config_queries,
            Call::DiscoveryQuery => &self.discovery_queries,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            save_channel: self.save_channel.load(Ordering::Relaxed),
            join_channel: self.join_channel.load(Ordering::Relaxed),
            install: self.install.load(Ordering::Relaxed),
            instantiate: self.instantiate.load(Ordering::Relaxed),
            upgrade: self.upgrade.load(Ordering::Relaxed),
            execute: self.execute.load(Ordering::Relaxed),
            query: self.query.load(Ordering::Relaxed),
            config_queries: self.config_queries.load(Ordering::Relaxed),
            discovery_queries: self.discovery_queries.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_increments_matching_counter() {
        let stats = SandboxStats::default();
        stats.record(Call::SaveChannel);
        stats.record(Call::Execute);
        stats.record(Call::Execute);

        let snap = stats.snapshot();
        assert_eq!(snap.save_channel, 1);
        assert_eq!(snap.execute, 2);
        assert_eq!(snap.join_channel, 0);
    }
}
