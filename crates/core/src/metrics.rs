//! 메트릭 상수
//!
//! 모든 메트릭 이름을 중앙에서 정의합니다.
//! 각 모듈은 이 상수로 `metrics::counter!()` 매크로를 호출합니다.
//! 익스포터는 설치하지 않으며, 호스트 프로세스가 recorder를 설치하면 수집됩니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `consortium_`
//! - 접미어: `_total` (counter)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 수렴 대상 레이블 키 (discovery, channel_config, installed, instantiated, value)
pub const LABEL_TARGET: &str = "target";

/// 워크플로우 단계 레이블 키
pub const LABEL_STAGE: &str = "stage";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Poller 메트릭 ─────────────────────────────────────────────────

/// Poller: probe 호출 횟수 (counter, label: target)
pub const POLL_ATTEMPTS_TOTAL: &str = "consortium_poll_attempts_total";

/// Poller: 예산 소진 횟수 (counter, label: target)
pub const POLL_EXHAUSTED_TOTAL: &str = "consortium_poll_exhausted_total";

// ─── Workflow 메트릭 ───────────────────────────────────────────────

/// Workflow: 완료된 단계 수 (counter, label: stage, result)
pub const WORKFLOW_STAGES_TOTAL: &str = "consortium_workflow_stages_total";

/// Workflow: 제출된 트랜잭션 수 (counter, label: result)
pub const WORKFLOW_TRANSACTIONS_TOTAL: &str = "consortium_workflow_transactions_total";

/// 메트릭 설명을 recorder에 등록합니다.
///
/// recorder 설치 직후 한 번 호출합니다.
pub fn describe_metrics() {
    use metrics::describe_counter;

    describe_counter!(
        POLL_ATTEMPTS_TOTAL,
        "Number of convergence probe invocations"
    );
    describe_counter!(
        POLL_EXHAUSTED_TOTAL,
        "Number of convergence waits that exhausted their retry budget"
    );
    describe_counter!(
        WORKFLOW_STAGES_TOTAL,
        "Number of workflow stages finished, by outcome"
    );
    describe_counter!(
        WORKFLOW_TRANSACTIONS_TOTAL,
        "Number of transactions submitted by the workflow, by outcome"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            POLL_ATTEMPTS_TOTAL,
            POLL_EXHAUSTED_TOTAL,
            WORKFLOW_STAGES_TOTAL,
            WORKFLOW_TRANSACTIONS_TOTAL,
        ] {
            assert!(name.starts_with("consortium_"), "{name}");
            assert!(name.ends_with("_total"), "{name}");
        }
    }

    #[test]
    fn describe_without_recorder_is_noop() {
        describe_metrics();
    }
}
