#![no_main]

use consortium_core::EndorsementPolicy;
use libfuzzer_sys::fuzz_target;

const ORGS: [&str; 3] = ["Org1MSP", "Org2MSP", "Org3MSP"];

fuzz_target!(|data: &[u8]| {
    // 정책 파서는 &str을 받으므로 UTF-8 변환 필요
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(policy) = EndorsementPolicy::parse(expr) else {
        return;
    };

    // 선택된 보증 조직 집합은 항상 정책을 충족해야 함
    if let Some(selected) = policy.select_endorsers(&ORGS) {
        let selected: Vec<&str> = selected.iter().map(String::as_str).collect();
        assert!(policy.is_satisfied_by(&selected));
    }
});
