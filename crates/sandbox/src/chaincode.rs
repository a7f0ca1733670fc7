//! 예제 체인코드
//!
//! 두 계정 잔액을 다루는 체인코드입니다.
//!
//! - `init <A> <Aval> <B> <Bval>`: 두 계정 초기화 (첫 인자는 함수 이름으로 무시)
//! - `invoke move <A> <B> <X>`: A에서 B로 X 이동
//! - `invoke query <A>`: A 잔액 조회
//! - `invoke delete <A>`: A 삭제
//!
//! 그 밖의 함수는 상태 500으로 실패합니다.

use std::collections::BTreeMap;

use bytes::Bytes;

/// 성공 상태
pub const STATUS_OK: i32 = 200;
/// 실패 상태
pub const STATUS_ERROR: i32 = 500;

/// 시뮬레이션이 남긴 쓰기
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Write {
    pub key: String,
    /// `None`이면 삭제
    pub value: Option<Bytes>,
}

/// 체인코드 시뮬레이션 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulation {
    pub status: i32,
    pub message: String,
    pub payload: Bytes,
    pub writes: Vec<Write>,
}

impl Simulation {
    fn ok(payload: Bytes, writes: Vec<Write>) -> Self {
        Self {
            status: STATUS_OK,
            message: String::new(),
            payload,
            writes,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_ERROR,
            message: message.into(),
            payload: Bytes::new(),
            writes: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status < 400
    }
}

/// 체인코드 초기화
pub fn init(args: &[Bytes]) -> Simulation {
    // args[0]은 함수 이름
    let params = args.get(1..).unwrap_or_default();
    let [a, a_val, b, b_val] = params else {
        return Simulation::error("Incorrect number of arguments. Expecting 4");
    };
    let (Some(a_val), Some(b_val)) = (parse_amount(a_val), parse_amount(b_val)) else {
        return Simulation::error("Expecting integer value for asset holding");
    };
    Simulation::ok(
        Bytes::new(),
        vec![put(a, a_val), put(b, b_val)],
    )
}

/// 체인코드 호출
pub fn invoke(function: &str, args: &[Bytes], state: &BTreeMap<String, Bytes>) -> Simulation {
    if function != "invoke" {
        return Simulation::error(format!("Unknown function call: {function}"));
    }
    let Some((op, params)) = args.split_first() else {
        return Simulation::error("Incorrect number of arguments. Expecting at least 1");
    };

    match &op[..] {
        b"move" => move_funds(params, state),
        b"query" => query(params, state),
        b"delete" => delete(params),
        other => Simulation::error(format!(
            "Unknown action: {}",
            String::from_utf8_lossy(other)
        )),
    }
}

fn move_funds(params: &[Bytes], state: &BTreeMap<String, Bytes>) -> Simulation {
    let [a, b, x] = params else {
        return Simulation::error("Incorrect number of arguments. Expecting 3");
    };
    let Some(x) = parse_amount(x) else {
        return Simulation::error("Invalid transaction amount, expecting a integer value");
    };
    let (Some(a_val), Some(b_val)) = (balance(state, a), balance(state, b)) else {
        return Simulation::error("Entity not found");
    };
    Simulation::ok(
        Bytes::new(),
        vec![put(a, a_val - x), put(b, b_val + x)],
    )
}

fn query(params: &[Bytes], state: &BTreeMap<String, Bytes>) -> Simulation {
    let [a] = params else {
        return Simulation::error("Incorrect number of arguments. Expecting name of the person to query");
    };
    match state.get(key(a).as_str()) {
        Some(value) => Simulation::ok(value.clone(), Vec::new()),
        None => Simulation::error(format!("Nil amount for {}", key(a))),
    }
}

fn delete(params: &[Bytes]) -> Simulation {
    let [a] = params else {
        return Simulation::error("Incorrect number of arguments. Expecting 1");
    };
    Simulation::ok(
        Bytes::new(),
        vec![Write {
            key: key(a),
            value: None,
        }],
    )
}

fn key(raw: &Bytes) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn parse_amount(raw: &Bytes) -> Option<i64> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

fn balance(state: &BTreeMap<String, Bytes>, account: &Bytes) -> Option<i64> {
    state.get(key(account).as_str()).and_then(parse_amount)
}

fn put(account: &Bytes, amount: i64) -> Write {
    Write {
        key: key(account),
        value: Some(Bytes::from(amount.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<Bytes> {
        items
            .iter()
            .map(|s| Bytes::copy_from_slice(s.as_bytes()))
            .collect()
    }

    fn apply(state: &mut BTreeMap<String, Bytes>, sim: &Simulation) {
        for w in &sim.writes {
            match &w.value {
                Some(v) => {
                    state.insert(w.key.clone(), v.clone());
                }
                None => {
                    state.remove(&w.key);
                }
            }
        }
    }

    fn initialized() -> BTreeMap<String, Bytes> {
        let mut state = BTreeMap::new();
        apply(&mut state, &init(&args(&["init", "a", "1000", "b", "0"])));
        state
    }

    #[test]
    fn init_writes_both_accounts() {
        let state = initialized();
        assert_eq!(state.get("a").unwrap(), &Bytes::from("1000"));
        assert_eq!(state.get("b").unwrap(), &Bytes::from("0"));
    }

    #[test]
    fn init_rejects_wrong_arity() {
        let sim = init(&args(&["init", "a", "1000"]));
        assert_eq!(sim.status, STATUS_ERROR);
        assert!(sim.writes.is_empty());
    }

    #[test]
    fn move_then_query() {
        let mut state = initialized();
        let sim = invoke("invoke", &args(&["move", "a", "b", "1"]), &state);
        assert_eq!(sim.status, STATUS_OK);
        apply(&mut state, &sim);

        let q = invoke("invoke", &args(&["query", "b"]), &state);
        assert_eq!(q.payload, Bytes::from("1"));
        let q = invoke("invoke", &args(&["query", "a"]), &state);
        assert_eq!(q.payload, Bytes::from("999"));
    }

    #[test]
    fn unknown_function_fails_with_500() {
        let state = initialized();
        let sim = invoke("DUMMY_FUNCTION", &args(&["query", "b"]), &state);
        assert_eq!(sim.status, STATUS_ERROR);
        assert!(sim.message.contains("Unknown function"));
        assert!(!sim.is_ok());
    }

    #[test]
    fn move_from_missing_account_fails() {
        let state = initialized();
        let sim = invoke("invoke", &args(&["move", "a", "c", "1"]), &state);
        assert_eq!(sim.status, STATUS_ERROR);
    }

    #[test]
    fn delete_removes_account() {
        let mut state = initialized();
        let sim = invoke("invoke", &args(&["delete", "a"]), &state);
        apply(&mut state, &sim);
        let q = invoke("invoke", &args(&["query", "a"]), &state);
        assert_eq!(q.status, STATUS_ERROR);
    }
}
