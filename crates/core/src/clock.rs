//! 시계 추상화 — 수렴 대기의 sleep을 주입 가능하게 만듭니다.
//!
//! 운영 환경은 [`TokioClock`]을, 테스트는 [`VirtualClock`]을 사용합니다.
//! `VirtualClock`은 실제로 잠들지 않고 요청된 지연을 기록하며 가상 시간을 전진시키므로,
//! 재시도 간격을 실제 경과 시간 없이 검증할 수 있습니다.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// 시계 trait
///
/// `elapsed()`는 시계 생성 시점부터의 경과 시간을 반환합니다.
pub trait Clock: Send + Sync + 'static {
    /// 시계 원점부터의 경과 시간
    fn elapsed(&self) -> Duration;

    /// 주어진 시간만큼 대기합니다.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

impl<C: Clock> Clock for Arc<C> {
    fn elapsed(&self) -> Duration {
        (**self).elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        (**self).sleep(duration)
    }
}

/// tokio 타이머 기반 시계
#[derive(Debug, Clone)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// 현재 시각을 원점으로 하는 시계를 생성합니다.
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

#[derive(Debug, Default)]
struct VirtualState {
    now: Duration,
    sleeps: Vec<Duration>,
}

/// 가상 시계
///
/// `sleep()`은 즉시 반환하며, 요청된 지연을 기록하고 가상 시간을 그만큼 전진시킵니다.
#[derive(Debug, Default)]
pub struct VirtualClock {
    state: Mutex<VirtualState>,
}

impl VirtualClock {
    /// 가상 시간 0에서 시작하는 시계를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 지금까지 요청된 sleep 목록을 반환합니다.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// 기록된 sleep 목록을 비웁니다 (가상 시간은 유지).
    pub fn clear_sleeps(&self) {
        self.lock().sleeps.clear();
    }

    /// sleep 없이 가상 시간을 전진시킵니다.
    pub fn advance(&self, duration: Duration) {
        self.lock().now += duration;
    }

    fn lock(&self) -> MutexGuard<'_, VirtualState> {
        // 기록만 하는 상태이므로 poison은 무시
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clock for VirtualClock {
    fn elapsed(&self) -> Duration {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        {
            let mut state = self.lock();
            state.now += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now()
    }
}
