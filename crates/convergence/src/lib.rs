//! 수렴 대기 크레이트
//!
//! 최종 일관성을 가진 피어들의 상태가 수렴했는지 제한된 재시도로 확인합니다.
//! 수렴 실패를 성공으로 오인하지 않으며, 어떤 대기도 무한히 막히지 않습니다.
//!
//! # Module Structure
//!
//! - [`poller`]: 범용 재시도 poller (`Poller`, `RetryPolicy`, `Probe`, `PollOutcome`)
//! - [`discovery`]: 피어 디스커버리 대기 (`wait_for_local_peers`)
//! - [`channel_config`]: 채널 설정 블록 전진 대기 (`wait_for_config_advance`)
//! - [`lifecycle`]: 체인코드 설치/인스턴스화 대기 (`wait_for_installed`, `wait_for_instantiated`)
//! - [`value`]: 값 수렴 검증 (`verify_value`)
//! - [`error`]: 수렴 에러 (`ConvergenceError`)

pub mod channel_config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod poller;
pub mod value;

// --- Public API Re-exports ---

pub use channel_config::{ConfigBaseline, config_advanced, wait_for_config_advance};
pub use discovery::wait_for_local_peers;
pub use error::ConvergenceError;
pub use lifecycle::{
    wait_for_installed, wait_for_installed_outcome, wait_for_instantiated,
    wait_for_instantiated_outcome,
};
pub use poller::{ConvergenceTarget, DelayPolicy, PollOutcome, Poller, Probe, RetryPolicy};
pub use value::{parse_value, verify_value, verify_value_with};
