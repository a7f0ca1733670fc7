//! 체인코드 설치/인스턴스화 대기
//!
//! 모든 대상 피어가 정확히 같은 (이름, 버전)을 보고할 때까지 기다립니다.
//! 예산 소진은 에러가 아니라 `Ok(false)` (결과 보존 버전은 [`PollOutcome::Exhausted`])이며,
//! 실패로 격상할지는 호출자가 결정합니다.

use consortium_core::clock::Clock;
use consortium_core::connection::ResourceManagement;
use consortium_core::error::ConnectionError;
use consortium_core::types::{ChaincodeInfo, ChannelId, Peer};
use tracing::{info, warn};

use crate::error::ConvergenceError;
use crate::poller::{ConvergenceTarget, PollOutcome, Poller, Probe, RetryPolicy};

/// 메트릭/로그 레이블
pub const INSTALLED_TARGET: &str = "installed";
/// 메트릭/로그 레이블
pub const INSTANTIATED_TARGET: &str = "instantiated";

/// 레지스트리 조회 결과에 (이름, 버전)이 있는지 확인합니다.
pub fn reports_chaincode(infos: &[ChaincodeInfo], name: &str, version: &str) -> bool {
    infos.iter().any(|cc| cc.name == name && cc.version == version)
}

/// 모든 피어 보고가 (이름, 버전)을 포함하는지 확인합니다.
pub fn all_peers_report(reports: &[Vec<ChaincodeInfo>], name: &str, version: &str) -> bool {
    reports
        .iter()
        .all(|infos| reports_chaincode(infos, name, version))
}

/// 모든 피어에 체인코드가 설치될 때까지 기다립니다.
///
/// # Errors
///
/// - 빈 피어 집합: [`ConvergenceError::NoPeers`]
/// - 일시적이지 않은 조회 에러: [`ConvergenceError::Query`]
pub async fn wait_for_installed<C, R>(
    poller: &Poller<C>,
    admin: &R,
    peers: &[Peer],
    name: &str,
    version: &str,
    policy: &RetryPolicy,
) -> Result<bool, ConvergenceError>
where
    C: Clock,
    R: ResourceManagement,
{
    let outcome = wait_for_installed_outcome(poller, admin, peers, name, version, policy).await?;
    Ok(outcome.is_satisfied())
}

/// [`wait_for_installed`]와 같지만 시도 횟수와 마지막으로 누락된 피어 URL을 담은
/// 결과를 그대로 돌려줍니다.
///
/// # Errors
///
/// [`wait_for_installed`]와 같습니다.
pub async fn wait_for_installed_outcome<C, R>(
    poller: &Poller<C>,
    admin: &R,
    peers: &[Peer],
    name: &str,
    version: &str,
    policy: &RetryPolicy,
) -> Result<PollOutcome<Vec<String>>, ConvergenceError>
where
    C: Clock,
    R: ResourceManagement,
{
    if peers.is_empty() {
        return Err(ConvergenceError::NoPeers {
            target: format!("install of {name}:{version}"),
        });
    }

    let target = ConvergenceTarget::new(INSTALLED_TARGET, *policy);
    let outcome = poller
        .poll(&target, |_| async move {
            let mut missing = Vec::new();
            for peer in peers {
                match admin.query_installed_chaincodes(peer).await {
                    Ok(infos) if reports_chaincode(&infos, name, version) => {}
                    Ok(_) => missing.push(peer.url.clone()),
                    Err(e) => return classify(e),
                }
            }
            Ok(settle(missing))
        })
        .await?;

    report(&outcome, INSTALLED_TARGET, name, version);
    Ok(outcome)
}

/// 모든 피어가 채널에서 체인코드를 인스턴스화된 것으로 보고할 때까지 기다립니다.
///
/// # Errors
///
/// - 빈 피어 집합: [`ConvergenceError::NoPeers`]
/// - 일시적이지 않은 조회 에러: [`ConvergenceError::Query`]
pub async fn wait_for_instantiated<C, R>(
    poller: &Poller<C>,
    admin: &R,
    channel: &ChannelId,
    peers: &[Peer],
    name: &str,
    version: &str,
    policy: &RetryPolicy,
) -> Result<bool, ConvergenceError>
where
    C: Clock,
    R: ResourceManagement,
{
    let outcome =
        wait_for_instantiated_outcome(poller, admin, channel, peers, name, version, policy).await?;
    Ok(outcome.is_satisfied())
}

/// [`wait_for_instantiated`]의 결과 보존 버전
///
/// # Errors
///
/// [`wait_for_instantiated`]와 같습니다.
pub async fn wait_for_instantiated_outcome<C, R>(
    poller: &Poller<C>,
    admin: &R,
    channel: &ChannelId,
    peers: &[Peer],
    name: &str,
    version: &str,
    policy: &RetryPolicy,
) -> Result<PollOutcome<Vec<String>>, ConvergenceError>
where
    C: Clock,
    R: ResourceManagement,
{
    if peers.is_empty() {
        return Err(ConvergenceError::NoPeers {
            target: format!("instantiation of {name}:{version} on {channel}"),
        });
    }

    let target = ConvergenceTarget::new(INSTANTIATED_TARGET, *policy);
    let outcome = poller
        .poll(&target, |_| async move {
            let mut missing = Vec::new();
            for peer in peers {
                match admin.query_instantiated_chaincodes(channel, peer).await {
                    Ok(infos) if reports_chaincode(&infos, name, version) => {}
                    Ok(_) => missing.push(peer.url.clone()),
                    Err(e) => return classify(e),
                }
            }
            Ok(settle(missing))
        })
        .await?;

    report(&outcome, INSTANTIATED_TARGET, name, version);
    Ok(outcome)
}

fn classify(e: ConnectionError) -> Result<Probe<Vec<String>>, ConvergenceError> {
    if e.is_transient() {
        Ok(Probe::Unavailable(e.to_string()))
    } else {
        Err(ConvergenceError::Query(e))
    }
}

fn settle(missing: Vec<String>) -> Probe<Vec<String>> {
    if missing.is_empty() {
        Probe::Satisfied(missing)
    } else {
        Probe::Pending(missing)
    }
}

fn report(outcome: &PollOutcome<Vec<String>>, label: &str, name: &str, version: &str) {
    match outcome {
        PollOutcome::Satisfied { attempts, .. } => {
            info!(label, chaincode = name, version, attempts, "chaincode visible on all peers");
        }
        PollOutcome::Exhausted {
            last,
            last_error,
            attempts,
        } => {
            warn!(
                label,
                chaincode = name,
                version,
                attempts,
                missing = ?last.as_deref().unwrap_or_default(),
                last_error = last_error.as_deref().unwrap_or("none"),
                "chaincode not visible on all peers"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    use bytes::Bytes;
    use consortium_core::clock::VirtualClock;
    use consortium_core::types::{
        ChaincodeDescriptor, ChannelRequest, InstallResponse, SigningIdentity, TransactionId,
    };

    use super::*;

    /// 피어별 레지스트리를 가진 mock. `ready_after`번째 조회부터 해당 피어가 체인코드를 보고합니다.
    #[derive(Default)]
    struct MockRegistry {
        ready_after: HashMap<String, u32>,
        failing: HashSet<String>,
        transient: HashSet<String>,
        queries: Mutex<HashMap<String, u32>>,
    }

    impl MockRegistry {
        fn with_peer(mut self, url: &str, ready_after: u32) -> Self {
            self.ready_after.insert(url.to_owned(), ready_after);
            self
        }

        fn with_failing_peer(mut self, url: &str) -> Self {
            self.failing.insert(url.to_owned());
            self
        }

        fn with_transient_peer(mut self, url: &str) -> Self {
            self.transient.insert(url.to_owned());
            self
        }

        fn lookup(&self, peer: &Peer) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
            if self.failing.contains(&peer.url) {
                return Err(ConnectionError::NotFound(format!("peer {}", peer.url)));
            }
            if self.transient.contains(&peer.url) {
                return Err(ConnectionError::Unavailable("peer restarting".to_owned()));
            }
            let mut queries = self.queries.lock().unwrap();
            let seen = queries.entry(peer.url.clone()).or_insert(0);
            *seen += 1;
            let ready = self
                .ready_after
                .get(&peer.url)
                .is_some_and(|after| *seen >= *after);
            Ok(if ready {
                vec![ChaincodeInfo {
                    name: "exampleCC".to_owned(),
                    version: "0".to_owned(),
                    path: "github.com/example_cc".to_owned(),
                }]
            } else {
                Vec::new()
            })
        }
    }

    fn unsupported() -> ConnectionError {
        ConnectionError::InvalidRequest("not supported by mock".to_owned())
    }

    impl ResourceManagement for MockRegistry {
        async fn save_channel(
            &self,
            _request: &ChannelRequest,
            _signers: &[SigningIdentity],
        ) -> Result<TransactionId, ConnectionError> {
            Err(unsupported())
        }

        async fn join_channel(&self, _channel: &ChannelId) -> Result<(), ConnectionError> {
            Err(unsupported())
        }

        async fn install_chaincode(
            &self,
            _chaincode: &ChaincodeDescriptor,
            _targets: &[Peer],
        ) -> Result<Vec<InstallResponse>, ConnectionError> {
            Err(unsupported())
        }

        async fn instantiate_chaincode(
            &self,
            _channel: &ChannelId,
            _chaincode: &ChaincodeDescriptor,
            _init_args: &[Bytes],
        ) -> Result<TransactionId, ConnectionError> {
            Err(unsupported())
        }

        async fn upgrade_chaincode(
            &self,
            _channel: &ChannelId,
            _chaincode: &ChaincodeDescriptor,
            _init_args: &[Bytes],
        ) -> Result<TransactionId, ConnectionError> {
            Err(unsupported())
        }

        async fn query_installed_chaincodes(
            &self,
            peer: &Peer,
        ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
            self.lookup(peer)
        }

        async fn query_instantiated_chaincodes(
            &self,
            _channel: &ChannelId,
            peer: &Peer,
        ) -> Result<Vec<ChaincodeInfo>, ConnectionError> {
            self.lookup(peer)
        }

        async fn query_config_block(&self, _channel: &ChannelId) -> Result<u64, ConnectionError> {
            Err(unsupported())
        }
    }

    fn peers() -> Vec<Peer> {
        vec![
            Peer::new("peer0.org1.example.com:7051", "Org1MSP"),
            Peer::new("peer1.org1.example.com:7151", "Org1MSP"),
            Peer::new("peer0.org2.example.com:8051", "Org2MSP"),
        ]
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::fixed(10, Duration::from_secs(2))
    }

    fn info(name: &str, version: &str) -> ChaincodeInfo {
        ChaincodeInfo {
            name: name.to_owned(),
            version: version.to_owned(),
            path: String::new(),
        }
    }

    #[test]
    fn one_missing_peer_is_not_installed() {
        let reports = vec![
            vec![info("exampleCC", "0")],
            vec![],
            vec![info("exampleCC", "0")],
        ];
        assert!(!all_peers_report(&reports, "exampleCC", "0"));
    }

    #[test]
    fn all_peers_reporting_is_installed() {
        let reports = vec![vec![info("exampleCC", "0")]; 3];
        assert!(all_peers_report(&reports, "exampleCC", "0"));
    }

    #[test]
    fn version_must_match_exactly() {
        let reports = vec![vec![info("exampleCC", "0")], vec![info("exampleCC", "1")]];
        assert!(!all_peers_report(&reports, "exampleCC", "1"));
        assert!(!reports_chaincode(&[info("otherCC", "1")], "exampleCC", "1"));
    }

    #[tokio::test]
    async fn installed_once_every_peer_reports() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 1)
            .with_peer("peer1.org1.example.com:7151", 3)
            .with_peer("peer0.org2.example.com:8051", 2);

        let installed =
            wait_for_installed(&poller, &registry, &peers(), "exampleCC", "0", &policy())
                .await
                .unwrap();

        assert!(installed);
        assert_eq!(poller.clock().sleeps().len(), 2);
    }

    #[tokio::test]
    async fn exhaustion_returns_false() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 1)
            .with_peer("peer1.org1.example.com:7151", 1);

        let installed =
            wait_for_installed(&poller, &registry, &peers(), "exampleCC", "0", &policy())
                .await
                .unwrap();

        assert!(!installed);
        assert_eq!(poller.clock().sleeps().len(), 9);
    }

    #[tokio::test]
    async fn exhausted_outcome_names_missing_peers() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 1)
            .with_peer("peer0.org2.example.com:8051", 1);

        let outcome = wait_for_instantiated_outcome(
            &poller,
            &registry,
            &ChannelId::new("orgchannel"),
            &peers(),
            "exampleCC",
            "0",
            &RetryPolicy::fixed(4, Duration::from_secs(2)),
        )
        .await
        .unwrap();

        match outcome {
            PollOutcome::Exhausted {
                last,
                last_error,
                attempts,
            } => {
                assert_eq!(attempts, 4);
                assert_eq!(last, Some(vec!["peer1.org1.example.com:7151".to_owned()]));
                assert_eq!(last_error, None);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn satisfied_outcome_reports_attempts() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 2)
            .with_peer("peer1.org1.example.com:7151", 1)
            .with_peer("peer0.org2.example.com:8051", 1);

        let outcome =
            wait_for_installed_outcome(&poller, &registry, &peers(), "exampleCC", "0", &policy())
                .await
                .unwrap();

        assert!(outcome.is_satisfied());
        assert_eq!(outcome.attempts(), 2);
    }

    #[tokio::test]
    async fn empty_peer_set_is_malformed() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default();

        let err = wait_for_installed(&poller, &registry, &[], "exampleCC", "0", &policy())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvergenceError::NoPeers { .. }));

        let err = wait_for_instantiated(
            &poller,
            &registry,
            &ChannelId::new("orgchannel"),
            &[],
            "exampleCC",
            "0",
            &policy(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvergenceError::NoPeers { .. }));
    }

    #[tokio::test]
    async fn transient_peer_error_counts_as_not_yet() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 1)
            .with_transient_peer("peer1.org1.example.com:7151");

        let installed = wait_for_installed(
            &poller,
            &registry,
            &peers()[..2],
            "exampleCC",
            "0",
            &RetryPolicy::fixed(3, Duration::from_secs(2)),
        )
        .await
        .unwrap();
        assert!(!installed);
    }

    #[tokio::test]
    async fn permanent_peer_error_propagates() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default()
            .with_peer("peer0.org1.example.com:7051", 1)
            .with_failing_peer("peer1.org1.example.com:7151");

        let err = wait_for_instantiated(
            &poller,
            &registry,
            &ChannelId::new("orgchannel"),
            &peers()[..2],
            "exampleCC",
            "0",
            &policy(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvergenceError::Query(ConnectionError::NotFound(_))));
        assert!(poller.clock().sleeps().is_empty());
    }

    #[tokio::test]
    async fn instantiated_wait_checks_version() {
        let poller = Poller::new(VirtualClock::new());
        let registry = MockRegistry::default().with_peer("peer0.org1.example.com:7051", 1);

        let instantiated = wait_for_instantiated(
            &poller,
            &registry,
            &ChannelId::new("orgchannel"),
            &peers()[..1],
            "exampleCC",
            "1",
            &RetryPolicy::fixed(2, Duration::from_secs(2)),
        )
        .await
        .unwrap();
        assert!(!instantiated);
    }
}
