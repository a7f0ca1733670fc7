//! 값 수렴 검증
//!
//! 지정 피어에 대한 조회가 기대값을 돌려줄 때까지 지수 백오프로 재시도합니다.
//! 조회 에러는 재시도하지 않으며, 정수로 해석할 수 없는 페이로드는 즉시 실패합니다.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use consortium_core::clock::Clock;
use consortium_core::error::ConnectionError;
use tracing::{debug, info};

use crate::error::ConvergenceError;
use crate::poller::{ConvergenceTarget, PollOutcome, Poller, Probe, RetryPolicy};

/// 메트릭/로그 레이블
pub const VALUE_TARGET: &str = "value";

/// 기본 백오프 시작 간격
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(50);

/// 기본 백오프 배수
pub const DEFAULT_FACTOR: u32 = 2;

/// 조회 페이로드를 10진 정수로 해석합니다. 앞뒤 ASCII 공백은 무시합니다.
pub fn parse_value(payload: &[u8]) -> Result<i64, ConvergenceError> {
    let invalid = |reason: String| ConvergenceError::InvalidPayload {
        payload: String::from_utf8_lossy(payload).into_owned(),
        reason,
    };
    let text = std::str::from_utf8(payload).map_err(|e| invalid(e.to_string()))?;
    text.trim_ascii()
        .parse::<i64>()
        .map_err(|e| invalid(e.to_string()))
}

/// `50ms × 2^i` 백오프로 최대 `max_attempts`번 조회하여 `expected` 값을 확인합니다.
///
/// # Errors
///
/// - 조회 에러: [`ConvergenceError::Query`] (재시도 없음)
/// - 해석 불가 페이로드: [`ConvergenceError::InvalidPayload`]
/// - 예산 소진: [`ConvergenceError::ValueDiverged`]
pub async fn verify_value<C, F, Fut>(
    poller: &Poller<C>,
    query: F,
    expected: i64,
    max_attempts: u32,
) -> Result<i64, ConvergenceError>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, ConnectionError>>,
{
    let policy = RetryPolicy::exponential(max_attempts, DEFAULT_BASE_DELAY, DEFAULT_FACTOR);
    verify_value_with(poller, query, expected, &policy).await
}

/// [`verify_value`]와 같지만 재시도 예산을 직접 지정합니다.
pub async fn verify_value_with<C, F, Fut>(
    poller: &Poller<C>,
    mut query: F,
    expected: i64,
    policy: &RetryPolicy,
) -> Result<i64, ConvergenceError>
where
    C: Clock,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Bytes, ConnectionError>>,
{
    let target = ConvergenceTarget::new(VALUE_TARGET, *policy);

    let outcome = poller
        .poll(&target, |attempt| {
            let pending = query();
            async move {
                let payload = pending.await?;
                let actual = parse_value(&payload)?;
                debug!(attempt, expected, actual, "queried value");
                Ok::<_, ConvergenceError>(if actual == expected {
                    Probe::Satisfied(actual)
                } else {
                    Probe::Pending(actual)
                })
            }
        })
        .await?;

    match outcome {
        PollOutcome::Satisfied { value, attempts } => {
            info!(expected, attempts, "value converged");
            Ok(value)
        }
        PollOutcome::Exhausted { last, attempts, .. } => Err(ConvergenceError::ValueDiverged {
            expected,
            actual: last,
            attempts,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use consortium_core::clock::VirtualClock;

    use super::*;

    /// 준비된 값을 순서대로 돌려주는 조회. 소진되면 마지막 값을 반복합니다.
    struct ScriptedQuery {
        payloads: Mutex<VecDeque<Result<Bytes, ConnectionError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedQuery {
        fn values(values: &[&'static str]) -> Self {
            Self::new(
                values
                    .iter()
                    .map(|v| Ok(Bytes::from_static(v.as_bytes())))
                    .collect(),
            )
        }

        fn new(payloads: Vec<Result<Bytes, ConnectionError>>) -> Self {
            Self {
                payloads: Mutex::new(payloads.into()),
                calls: Mutex::new(0),
            }
        }

        fn next(&self) -> impl Future<Output = Result<Bytes, ConnectionError>> + use<> {
            *self.calls.lock().unwrap() += 1;
            let mut payloads = self.payloads.lock().unwrap();
            let result = if payloads.len() > 1 {
                payloads.pop_front().unwrap()
            } else {
                payloads.front().cloned().unwrap()
            };
            async move { result }
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[test]
    fn parse_value_accepts_surrounding_whitespace() {
        assert_eq!(parse_value(b"101").unwrap(), 101);
        assert_eq!(parse_value(b" 42\n").unwrap(), 42);
        assert_eq!(parse_value(b"-3").unwrap(), -3);
    }

    #[test]
    fn parse_value_rejects_garbage() {
        assert!(matches!(
            parse_value(b"ten"),
            Err(ConvergenceError::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse_value(b""),
            Err(ConvergenceError::InvalidPayload { .. })
        ));
        assert!(matches!(
            parse_value(&[0xff, 0xfe]),
            Err(ConvergenceError::InvalidPayload { .. })
        ));
    }

    #[tokio::test]
    async fn converges_on_third_attempt() {
        let poller = Poller::new(VirtualClock::new());
        let query = ScriptedQuery::values(&["9", "9", "10"]);

        let actual = verify_value(&poller, || query.next(), 10, 5).await.unwrap();

        assert_eq!(actual, 10);
        assert_eq!(query.calls(), 3);
        assert_eq!(
            poller.clock().sleeps(),
            vec![Duration::from_millis(50), Duration::from_millis(100)]
        );
    }

    #[tokio::test]
    async fn constant_stale_value_is_fatal() {
        let poller = Poller::new(VirtualClock::new());
        let query = ScriptedQuery::values(&["9"]);

        let err = verify_value(&poller, || query.next(), 10, 5)
            .await
            .unwrap_err();

        match err {
            ConvergenceError::ValueDiverged {
                expected,
                actual,
                attempts,
            } => {
                assert_eq!(expected, 10);
                assert_eq!(actual, Some(9));
                assert_eq!(attempts, 5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(query.calls(), 5);
        assert_eq!(
            poller.clock().sleeps(),
            vec![
                Duration::from_millis(50),
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
            ]
        );
    }

    #[tokio::test]
    async fn query_error_is_not_retried() {
        let poller = Poller::new(VirtualClock::new());
        let query = ScriptedQuery::new(vec![Err(ConnectionError::Unavailable(
            "peer down".to_owned(),
        ))]);

        let err = verify_value(&poller, || query.next(), 10, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergenceError::Query(_)));
        assert_eq!(query.calls(), 1);
    }

    #[tokio::test]
    async fn unparseable_payload_fails_immediately() {
        let poller = Poller::new(VirtualClock::new());
        let query = ScriptedQuery::values(&["not-a-number", "10"]);

        let err = verify_value(&poller, || query.next(), 10, 5)
            .await
            .unwrap_err();

        assert!(matches!(err, ConvergenceError::InvalidPayload { .. }));
        assert_eq!(query.calls(), 1);
    }

    #[tokio::test]
    async fn custom_policy_is_honoured() {
        let poller = Poller::new(VirtualClock::new());
        let query = ScriptedQuery::values(&["1", "2"]);
        let policy = RetryPolicy::fixed(3, Duration::from_millis(10));

        let actual = verify_value_with(&poller, || query.next(), 2, &policy)
            .await
            .unwrap();
        assert_eq!(actual, 2);
        assert_eq!(poller.clock().sleeps(), vec![Duration::from_millis(10)]);
    }
}
