//! 수렴 poller — 재시도 예산 안에서 probe를 반복 호출합니다.
//!
//! # 규칙
//! - probe는 최대 `max_attempts`번 호출됩니다.
//! - 시도 사이에만 잠들며, 마지막 시도 뒤에는 잠들지 않습니다.
//! - `Err`는 구조적으로 영구적인 에러로 보고 즉시 전파합니다.
//! - 예산 소진은 [`PollOutcome::Exhausted`]로 돌려주며, 심각도는 호출자가 결정합니다.
//!
//! ```text
//! attempt 0 ──probe──▶ Pending ──sleep(delay 0)──▶ attempt 1 ──probe──▶ Satisfied
//! ```

use std::future::Future;
use std::time::Duration;

use consortium_core::clock::Clock;
use consortium_core::config::{BackoffRetryConfig, FixedRetryConfig};
use consortium_core::metrics as m;
use tracing::{debug, warn};

/// 시도 간 대기 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    /// 고정 간격
    Fixed(Duration),
    /// `base × factor^i` (포화 연산)
    Exponential { base: Duration, factor: u32 },
}

impl DelayPolicy {
    /// `attempt`번째(0부터) 시도 뒤의 대기 시간
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, factor } => factor
                .checked_pow(attempt)
                .and_then(|multiplier| base.checked_mul(multiplier))
                .unwrap_or(Duration::MAX),
        }
    }
}

/// 재시도 예산
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: DelayPolicy,
}

impl RetryPolicy {
    /// 고정 간격 예산. `max_attempts`는 최소 1로 보정됩니다.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: DelayPolicy::Fixed(delay),
        }
    }

    /// 지수 백오프 예산. `max_attempts`는 최소 1로 보정됩니다.
    pub fn exponential(max_attempts: u32, base: Duration, factor: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: DelayPolicy::Exponential { base, factor },
        }
    }

    /// 설정의 고정 간격 섹션에서 예산을 만듭니다.
    pub fn from_fixed(config: &FixedRetryConfig) -> Self {
        Self::fixed(config.max_attempts, Duration::from_millis(config.delay_ms))
    }

    /// 설정의 백오프 섹션에서 예산을 만듭니다.
    pub fn from_backoff(config: &BackoffRetryConfig) -> Self {
        Self::exponential(
            config.max_attempts,
            Duration::from_millis(config.base_ms),
            config.factor,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> DelayPolicy {
        self.delay
    }

    /// `attempt`번째 시도 뒤의 대기 시간
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay.delay_for(attempt)
    }
}

/// 수렴 대상: 메트릭/로그 레이블과 재시도 예산
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceTarget {
    label: String,
    policy: RetryPolicy,
}

impl ConvergenceTarget {
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

/// 단일 probe 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe<T> {
    /// 조건 충족 — 즉시 반환
    Satisfied(T),
    /// 아직 충족되지 않음 — 관측값을 보관하고 재시도
    Pending(T),
    /// 일시적 에러 — 예산 안에서 재시도
    Unavailable(String),
}

/// poll 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// 조건 충족
    Satisfied { value: T, attempts: u32 },
    /// 예산 소진
    Exhausted {
        /// 마지막 `Pending` 관측값
        last: Option<T>,
        /// 마지막 일시적 에러
        last_error: Option<String>,
        attempts: u32,
    },
}

impl<T> PollOutcome<T> {
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// 수행한 시도 횟수
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Satisfied { attempts, .. } | Self::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// 수렴 poller
///
/// 주입된 시계 외에는 상태가 없으므로 여러 대기에서 공유해도 됩니다.
#[derive(Debug, Clone)]
pub struct Poller<C> {
    clock: C,
}

impl<C: Clock> Poller<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// 조건이 충족되거나 예산이 소진될 때까지 probe를 호출합니다.
    ///
    /// probe는 0부터 시작하는 시도 번호를 받습니다.
    ///
    /// # Errors
    ///
    /// probe가 `Err`를 반환하면 남은 예산과 상관없이 즉시 전파합니다.
    pub async fn poll<T, E, F, Fut>(
        &self,
        target: &ConvergenceTarget,
        mut probe: F,
    ) -> Result<PollOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<Probe<T>, E>>,
    {
        let max_attempts = target.policy.max_attempts();
        let mut last = None;
        let mut last_error = None;

        for attempt in 0..max_attempts {
            metrics::counter!(m::POLL_ATTEMPTS_TOTAL, m::LABEL_TARGET => target.label.clone())
                .increment(1);

            match probe(attempt).await? {
                Probe::Satisfied(value) => {
                    debug!(label = %target.label, attempt, "convergence satisfied");
                    return Ok(PollOutcome::Satisfied {
                        value,
                        attempts: attempt + 1,
                    });
                }
                Probe::Pending(observed) => {
                    debug!(label = %target.label, attempt, "not converged yet");
                    last = Some(observed);
                }
                Probe::Unavailable(reason) => {
                    debug!(label = %target.label, attempt, reason = %reason, "transient probe failure");
                    last_error = Some(reason);
                }
            }

            if attempt + 1 < max_attempts {
                self.clock.sleep(target.policy.delay_for(attempt)).await;
            }
        }

        metrics::counter!(m::POLL_EXHAUSTED_TOTAL, m::LABEL_TARGET => target.label.clone())
            .increment(1);
        warn!(
            label = %target.label,
            attempts = max_attempts,
            last_error = last_error.as_deref().unwrap_or("none"),
            "retry budget exhausted"
        );

        Ok(PollOutcome::Exhausted {
            last,
            last_error,
            attempts: max_attempts,
        })
    }
}
