//! 피어 디스커버리 대기
//!
//! gossip 전파가 끝나 로컬 디스커버리가 조직의 모든 피어를 보고할 때까지 기다립니다.

use consortium_core::clock::Clock;
use consortium_core::connection::Discovery;
use consortium_core::types::PeerSet;
use tracing::info;

use crate::error::ConvergenceError;
use crate::poller::{ConvergenceTarget, PollOutcome, Poller, Probe, RetryPolicy};

/// 메트릭/로그 레이블
pub const DISCOVERY_TARGET: &str = "discovery";

/// 조직의 로컬 피어가 `expected`개 이상 보일 때까지 기다립니다.
///
/// # Errors
///
/// - 예산 소진: [`ConvergenceError::PeerCountMismatch`]
/// - 일시적이지 않은 디스커버리 에러: [`ConvergenceError::Query`]
pub async fn wait_for_local_peers<C, D>(
    poller: &Poller<C>,
    discovery: &D,
    msp_id: &str,
    expected: usize,
    policy: &RetryPolicy,
) -> Result<PeerSet, ConvergenceError>
where
    C: Clock,
    D: Discovery,
{
    let target = ConvergenceTarget::new(DISCOVERY_TARGET, *policy);

    let outcome = poller
        .poll(&target, |_| async move {
            match discovery.local_peers(msp_id).await {
                Ok(peers) if peers.len() >= expected => Ok(Probe::Satisfied(peers)),
                Ok(peers) => Ok(Probe::Pending(peers)),
                Err(e) if e.is_transient() => Ok(Probe::Unavailable(e.to_string())),
                Err(e) => Err(ConvergenceError::Query(e)),
            }
        })
        .await?;

    match outcome {
        PollOutcome::Satisfied { value, attempts } => {
            info!(msp_id, peers = ?value.urls(), attempts, "local peers discovered");
            Ok(value)
        }
        PollOutcome::Exhausted { last, attempts, .. } => {
            let last = last.unwrap_or_else(|| PeerSet::new(msp_id, Vec::new()));
            Err(ConvergenceError::PeerCountMismatch {
                msp_id: msp_id.to_owned(),
                expected,
                observed: last.len(),
                attempts,
                last,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use consortium_core::clock::VirtualClock;
    use consortium_core::error::ConnectionError;
    use consortium_core::types::Peer;

    use super::*;

    /// 호출마다 준비된 응답을 순서대로 돌려주는 mock. 소진되면 마지막 응답을 반복합니다.
    struct MockDiscovery {
        responses: Mutex<VecDeque<Result<PeerSet, ConnectionError>>>,
        calls: Mutex<u32>,
    }

    impl MockDiscovery {
        fn new(responses: Vec<Result<PeerSet, ConnectionError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl Discovery for MockDiscovery {
        async fn local_peers(&self, _msp_id: &str) -> Result<PeerSet, ConnectionError> {
            *self.calls.lock().unwrap() += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.pop_front().unwrap()
            } else {
                responses.front().cloned().unwrap()
            }
        }
    }

    fn org1_peers(n: usize) -> PeerSet {
        let peers = (0..n)
            .map(|i| Peer::new(format!("peer{i}.org1.example.com:7051"), "Org1MSP"))
            .collect();
        PeerSet::new("Org1MSP", peers)
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(10, Duration::from_secs(3))
    }

    #[tokio::test]
    async fn returns_once_expected_peers_visible() {
        let poller = Poller::new(VirtualClock::new());
        let discovery = MockDiscovery::new(vec![
            Ok(org1_peers(0)),
            Ok(org1_peers(1)),
            Ok(org1_peers(2)),
        ]);

        let peers = wait_for_local_peers(&poller, &discovery, "Org1MSP", 2, &policy())
            .await
            .unwrap();

        assert_eq!(peers.len(), 2);
        assert_eq!(discovery.calls(), 3);
        assert_eq!(poller.clock().sleeps(), vec![Duration::from_secs(3); 2]);
    }

    #[tokio::test]
    async fn more_peers_than_expected_is_success() {
        let poller = Poller::new(VirtualClock::new());
        let discovery = MockDiscovery::new(vec![Ok(org1_peers(3))]);

        let peers = wait_for_local_peers(&poller, &discovery, "Org1MSP", 2, &policy())
            .await
            .unwrap();
        assert_eq!(peers.len(), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_expected_and_observed() {
        let poller = Poller::new(VirtualClock::new());
        let discovery = MockDiscovery::new(vec![Ok(org1_peers(1))]);

        let err = wait_for_local_peers(&poller, &discovery, "Org1MSP", 2, &policy())
            .await
            .unwrap_err();

        match err {
            ConvergenceError::PeerCountMismatch {
                msp_id,
                expected,
                observed,
                attempts,
                last,
            } => {
                assert_eq!(msp_id, "Org1MSP");
                assert_eq!(expected, 2);
                assert_eq!(observed, 1);
                assert_eq!(attempts, 10);
                assert_eq!(last.len(), 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(discovery.calls(), 10);
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let poller = Poller::new(VirtualClock::new());
        let discovery = MockDiscovery::new(vec![
            Err(ConnectionError::Unavailable("gossip not ready".to_owned())),
            Ok(org1_peers(2)),
        ]);

        let peers = wait_for_local_peers(&poller, &discovery, "Org1MSP", 2, &policy())
            .await
            .unwrap();
        assert_eq!(peers.len(), 2);
    }

    #[tokio::test]
    async fn permanent_error_propagates_immediately() {
        let poller = Poller::new(VirtualClock::new());
        let discovery = MockDiscovery::new(vec![Err(ConnectionError::Identity {
            org: "Org1".to_owned(),
            user: "User1".to_owned(),
            reason: "unknown user".to_owned(),
        })]);

        let err = wait_for_local_peers(&poller, &discovery, "Org1MSP", 2, &policy())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvergenceError::Query(_)));
        assert_eq!(discovery.calls(), 1);
    }
}
