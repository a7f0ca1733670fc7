//! 보증 정책 표현식 — `AND('Org1MSP.member','Org2MSP.member')` 형식 파싱과 평가
//!
//! # 문법
//! ```text
//! policy    := principal | gate '(' list ')' | 'OutOf' '(' number ',' list ')'
//! gate      := 'AND' | 'OR'            (대소문자 무시)
//! list      := policy (',' policy)*
//! principal := '\'' MSPID '.' role '\''   role ∈ member | admin | peer | client
//! ```
//!
//! `AND`와 `OR`은 내부적으로 각각 `OutOf(n, ...)`, `OutOf(1, ...)`로 정규화됩니다.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// principal 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// 조직 구성원 (피어 포함)
    Member,
    /// 조직 관리자
    Admin,
    /// 피어
    Peer,
    /// 클라이언트
    Client,
}

impl Role {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            "peer" => Some(Self::Peer),
            "client" => Some(Self::Client),
            _ => None,
        }
    }

    /// 피어의 보증 서명으로 충족 가능한 역할인지 반환합니다.
    fn endorsable_by_peer(self) -> bool {
        matches!(self, Self::Member | Self::Peer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Member => write!(f, "member"),
            Self::Admin => write!(f, "admin"),
            Self::Peer => write!(f, "peer"),
            Self::Client => write!(f, "client"),
        }
    }
}

/// 보증 정책
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndorsementPolicy {
    /// 단일 principal
    SignedBy { msp_id: String, role: Role },
    /// 하위 정책 중 `threshold`개 이상 충족
    OutOf {
        threshold: usize,
        rules: Vec<EndorsementPolicy>,
    },
}

impl EndorsementPolicy {
    /// 표현식 문자열을 파싱합니다.
    pub fn parse(expr: &str) -> Result<Self, PolicyError> {
        let mut parser = Parser::new(expr);
        parser.skip_ws();
        if parser.at_end() {
            return Err(PolicyError::Empty);
        }
        let policy = parser.policy()?;
        parser.skip_ws();
        if !parser.at_end() {
            return Err(PolicyError::TrailingInput { offset: parser.pos });
        }
        Ok(policy)
    }

    /// 주어진 보증 조직(MSP ID) 집합으로 정책이 충족되는지 평가합니다.
    ///
    /// 각 하위 정책은 보증 집합 전체에 대해 독립적으로 평가됩니다.
    pub fn is_satisfied_by<S: AsRef<str>>(&self, endorsers: &[S]) -> bool {
        match self {
            Self::SignedBy { msp_id, role } => {
                role.endorsable_by_peer() && endorsers.iter().any(|e| e.as_ref() == msp_id)
            }
            Self::OutOf { threshold, rules } => {
                rules
                    .iter()
                    .filter(|rule| rule.is_satisfied_by(endorsers))
                    .count()
                    >= *threshold
            }
        }
    }

    /// 정책이 참조하는 모든 MSP ID를 반환합니다.
    pub fn msp_ids(&self) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        self.collect_msp_ids(&mut ids);
        ids
    }

    fn collect_msp_ids(&self, ids: &mut BTreeSet<String>) {
        match self {
            Self::SignedBy { msp_id, .. } => {
                ids.insert(msp_id.clone());
            }
            Self::OutOf { rules, .. } => {
                for rule in rules {
                    rule.collect_msp_ids(ids);
                }
            }
        }
    }

    /// 사용 가능한 조직 중에서 정책을 충족하는 최소 보증 조직 집합을 고릅니다.
    ///
    /// 충족할 수 없으면 `None`을 반환합니다.
    pub fn select_endorsers<S: AsRef<str>>(&self, available: &[S]) -> Option<BTreeSet<String>> {
        match self {
            Self::SignedBy { msp_id, role } => {
                if role.endorsable_by_peer() && available.iter().any(|a| a.as_ref() == msp_id) {
                    Some(BTreeSet::from([msp_id.clone()]))
                } else {
                    None
                }
            }
            Self::OutOf { threshold, rules } => {
                let mut candidates: Vec<BTreeSet<String>> = rules
                    .iter()
                    .filter_map(|rule| rule.select_endorsers(available))
                    .collect();
                if candidates.len() < *threshold {
                    return None;
                }
                candidates.sort_by_key(BTreeSet::len);
                Some(candidates.into_iter().take(*threshold).flatten().collect())
            }
        }
    }
}

impl FromStr for EndorsementPolicy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for EndorsementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SignedBy { msp_id, role } => write!(f, "'{msp_id}.{role}'"),
            Self::OutOf { threshold, rules } => {
                if *threshold == rules.len() {
                    write!(f, "AND(")?;
                } else if *threshold == 1 {
                    write!(f, "OR(")?;
                } else {
                    write!(f, "OutOf({threshold}, ")?;
                }
                for (i, rule) in rules.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{rule}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ─── Parser ──────────────────────────────────────────────────────────

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn unexpected(&self, expected: &str) -> PolicyError {
        PolicyError::UnexpectedToken {
            offset: self.pos,
            expected: expected.to_owned(),
        }
    }

    fn expect_char(&mut self, c: char) -> Result<(), PolicyError> {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{c}'")))
        }
    }

    fn ident(&mut self) -> &'a str {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        self.pos += len;
        &rest[..len]
    }

    fn policy(&mut self) -> Result<EndorsementPolicy, PolicyError> {
        self.skip_ws();
        if self.rest().starts_with('\'') {
            return self.principal();
        }

        let start = self.pos;
        let word = self.ident();
        match word.to_ascii_lowercase().as_str() {
            "and" => {
                let rules = self.list()?;
                Ok(EndorsementPolicy::OutOf {
                    threshold: rules.len(),
                    rules,
                })
            }
            "or" => {
                let rules = self.list()?;
                Ok(EndorsementPolicy::OutOf {
                    threshold: 1,
                    rules,
                })
            }
            "outof" => self.out_of(),
            _ => {
                self.pos = start;
                Err(self.unexpected("AND, OR, OutOf or a quoted principal"))
            }
        }
    }

    fn list(&mut self) -> Result<Vec<EndorsementPolicy>, PolicyError> {
        self.expect_char('(')?;
        let mut rules = vec![self.policy()?];
        loop {
            self.skip_ws();
            if self.rest().starts_with(',') {
                self.pos += 1;
                rules.push(self.policy()?);
            } else {
                self.expect_char(')')?;
                return Ok(rules);
            }
        }
    }

    fn out_of(&mut self) -> Result<EndorsementPolicy, PolicyError> {
        self.expect_char('(')?;
        self.skip_ws();
        let digits = self.ident();
        let threshold: usize = digits
            .parse()
            .map_err(|_| self.unexpected("a threshold number"))?;
        self.expect_char(',')?;
        let mut rules = vec![self.policy()?];
        loop {
            self.skip_ws();
            if self.rest().starts_with(',') {
                self.pos += 1;
                rules.push(self.policy()?);
            } else {
                self.expect_char(')')?;
                break;
            }
        }
        if threshold == 0 || threshold > rules.len() {
            return Err(PolicyError::InvalidThreshold {
                threshold,
                count: rules.len(),
            });
        }
        Ok(EndorsementPolicy::OutOf { threshold, rules })
    }

    fn principal(&mut self) -> Result<EndorsementPolicy, PolicyError> {
        // 여는 따옴표
        self.pos += 1;
        let rest = self.rest();
        let Some(end) = rest.find('\'') else {
            return Err(self.unexpected("closing quote"));
        };
        let body = &rest[..end];
        self.pos += end + 1;

        let (msp_id, role) = body
            .rsplit_once('.')
            .ok_or_else(|| PolicyError::InvalidPrincipal(body.to_owned()))?;
        let role = Role::parse(role).ok_or_else(|| PolicyError::InvalidPrincipal(body.to_owned()))?;
        if msp_id.is_empty() {
            return Err(PolicyError::InvalidPrincipal(body.to_owned()));
        }
        Ok(EndorsementPolicy::SignedBy {
            msp_id: msp_id.to_owned(),
            role,
        })
    }
}
