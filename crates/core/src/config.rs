//! 설정 관리 — consortium.toml 파싱 및 런타임 설정
//!
//! [`ConsortiumConfig`]는 네트워크 토폴로지, 체인코드, 재시도 예산,
//! 샌드박스 지연을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`CONSORTIUM_NETWORK_CHANNEL_ID=orgchannel` 형식)
//! 3. 설정 파일 (`consortium.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), consortium_core::error::ConsortiumError> {
//! use consortium_core::config::ConsortiumConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = ConsortiumConfig::load("consortium.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = ConsortiumConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, ConsortiumError};
use crate::policy::EndorsementPolicy;
use crate::types::{
    ChaincodeDescriptor, ChannelId, ChannelRequest, ChannelUpdateKind, OrgRole,
    OrganizationContext, Principal,
};

/// Consortium 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsortiumConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 채널/오더러 설정
    #[serde(default)]
    pub network: NetworkConfig,
    /// 참여 조직 설정
    #[serde(default)]
    pub orgs: OrgsConfig,
    /// 체인코드 설정
    #[serde(default)]
    pub chaincode: ChaincodeConfig,
    /// 수렴 대기 재시도 예산
    #[serde(default)]
    pub retry: RetryConfig,
    /// 샌드박스 네트워크 전파 지연
    #[serde(default)]
    pub sandbox: SandboxConfig,
}

impl ConsortiumConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConsortiumError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConsortiumError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConsortiumError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                ConsortiumError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, ConsortiumError> {
        toml::from_str(toml_str).map_err(|e| {
            ConsortiumError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `CONSORTIUM_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "CONSORTIUM_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "CONSORTIUM_GENERAL_LOG_FORMAT");

        // Network
        override_string(&mut self.network.channel_id, "CONSORTIUM_NETWORK_CHANNEL_ID");
        override_string(
            &mut self.network.orderer_endpoint,
            "CONSORTIUM_NETWORK_ORDERER_ENDPOINT",
        );
        override_string(
            &mut self.network.channel_config_dir,
            "CONSORTIUM_NETWORK_CHANNEL_CONFIG_DIR",
        );

        // Orgs
        override_csv(&mut self.orgs.primary.peers, "CONSORTIUM_ORGS_PRIMARY_PEERS");
        override_csv(
            &mut self.orgs.secondary.peers,
            "CONSORTIUM_ORGS_SECONDARY_PEERS",
        );

        // Chaincode
        override_string(&mut self.chaincode.name, "CONSORTIUM_CHAINCODE_NAME");
        override_string(&mut self.chaincode.version, "CONSORTIUM_CHAINCODE_VERSION");
        override_string(&mut self.chaincode.policy, "CONSORTIUM_CHAINCODE_POLICY");
        override_bool(
            &mut self.chaincode.upgrade.enabled,
            "CONSORTIUM_CHAINCODE_UPGRADE_ENABLED",
        );
        override_string(
            &mut self.chaincode.upgrade.version,
            "CONSORTIUM_CHAINCODE_UPGRADE_VERSION",
        );

        // Retry
        override_u32(
            &mut self.retry.discovery.max_attempts,
            "CONSORTIUM_RETRY_DISCOVERY_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.discovery.delay_ms,
            "CONSORTIUM_RETRY_DISCOVERY_DELAY_MS",
        );
        override_u32(
            &mut self.retry.config.max_attempts,
            "CONSORTIUM_RETRY_CONFIG_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.config.delay_ms,
            "CONSORTIUM_RETRY_CONFIG_DELAY_MS",
        );
        override_u32(
            &mut self.retry.lifecycle.max_attempts,
            "CONSORTIUM_RETRY_LIFECYCLE_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.lifecycle.delay_ms,
            "CONSORTIUM_RETRY_LIFECYCLE_DELAY_MS",
        );
        override_u32(
            &mut self.retry.value.max_attempts,
            "CONSORTIUM_RETRY_VALUE_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.retry.value.base_ms,
            "CONSORTIUM_RETRY_VALUE_BASE_MS",
        );

        // Sandbox
        override_u64(
            &mut self.sandbox.gossip_lag_ms,
            "CONSORTIUM_SANDBOX_GOSSIP_LAG_MS",
        );
        override_u64(
            &mut self.sandbox.config_lag_ms,
            "CONSORTIUM_SANDBOX_CONFIG_LAG_MS",
        );
        override_u64(
            &mut self.sandbox.install_lag_ms,
            "CONSORTIUM_SANDBOX_INSTALL_LAG_MS",
        );
        override_u64(
            &mut self.sandbox.instantiate_lag_ms,
            "CONSORTIUM_SANDBOX_INSTANTIATE_LAG_MS",
        );
        override_u64(
            &mut self.sandbox.commit_lag_ms,
            "CONSORTIUM_SANDBOX_COMMIT_LAG_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConsortiumError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        // 채널 ID 검증 (소문자로 시작, 소문자/숫자/'.'/'-'만 허용)
        let channel_id = &self.network.channel_id;
        let valid_channel = channel_id
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
            && channel_id
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
        if !valid_channel {
            return Err(invalid(
                "network.channel_id",
                "must start with a lowercase letter and contain only [a-z0-9.-]".to_owned(),
            ));
        }

        require_non_empty("network.orderer_endpoint", &self.network.orderer_endpoint)?;
        require_non_empty("network.orderer_msp_id", &self.network.orderer_msp_id)?;
        require_non_empty("network.orderer_admin", &self.network.orderer_admin)?;

        // 조직 검증
        let mut msp_ids = HashSet::new();
        let mut peers = HashSet::new();
        for role in OrgRole::ALL {
            let org = self.orgs.get(role);
            let section = format!("orgs.{role}");
            require_non_empty(&format!("{section}.name"), &org.name)?;
            require_non_empty(&format!("{section}.msp_id"), &org.msp_id)?;
            require_non_empty(&format!("{section}.admin_user"), &org.admin_user)?;
            require_non_empty(&format!("{section}.user"), &org.user)?;
            if org.peers.is_empty() {
                return Err(invalid(
                    &format!("{section}.peers"),
                    "at least one peer is required".to_owned(),
                ));
            }
            if !msp_ids.insert(org.msp_id.as_str()) {
                return Err(invalid(
                    &format!("{section}.msp_id"),
                    format!("duplicate msp_id '{}'", org.msp_id),
                ));
            }
            for peer in &org.peers {
                if peer.trim().is_empty() || !peers.insert(peer.as_str()) {
                    return Err(invalid(
                        &format!("{section}.peers"),
                        format!("empty or duplicate peer endpoint '{peer}'"),
                    ));
                }
            }
        }

        // 체인코드 검증
        let cc = &self.chaincode;
        require_non_empty("chaincode.name", &cc.name)?;
        require_non_empty("chaincode.path", &cc.path)?;
        require_non_empty("chaincode.version", &cc.version)?;
        require_non_empty("chaincode.function", &cc.function)?;
        for (field, args) in [
            ("chaincode.tx_args", &cc.tx_args),
            ("chaincode.query_args", &cc.query_args),
        ] {
            if args.is_empty() {
                return Err(invalid(field, "must not be empty".to_owned()));
            }
        }
        self.validate_policy("chaincode.policy", &cc.policy, &msp_ids)?;

        if cc.upgrade.enabled {
            require_non_empty("chaincode.upgrade.version", &cc.upgrade.version)?;
            if cc.upgrade.version == cc.version {
                return Err(invalid(
                    "chaincode.upgrade.version",
                    format!("must differ from the deployed version '{}'", cc.version),
                ));
            }
            self.validate_policy("chaincode.upgrade.policy", &cc.upgrade.policy, &msp_ids)?;
        }

        // 재시도 예산 검증
        for (field, budget) in [
            ("retry.discovery.max_attempts", self.retry.discovery.max_attempts),
            ("retry.config.max_attempts", self.retry.config.max_attempts),
            ("retry.lifecycle.max_attempts", self.retry.lifecycle.max_attempts),
            ("retry.value.max_attempts", self.retry.value.max_attempts),
        ] {
            if budget == 0 {
                return Err(invalid(field, "must be at least 1".to_owned()));
            }
        }
        if self.retry.value.factor == 0 {
            return Err(invalid(
                "retry.value.factor",
                "must be at least 1".to_owned(),
            ));
        }

        Ok(())
    }

    fn validate_policy(
        &self,
        field: &str,
        expr: &str,
        known_msps: &HashSet<&str>,
    ) -> Result<(), ConsortiumError> {
        let policy = EndorsementPolicy::parse(expr)
            .map_err(|e| invalid(field, format!("invalid endorsement policy: {e}")))?;
        if let Some(unknown) = policy
            .msp_ids()
            .into_iter()
            .find(|id| !known_msps.contains(id.as_str()))
        {
            return Err(invalid(
                field,
                format!("policy references unknown msp '{unknown}'"),
            ));
        }
        Ok(())
    }

    /// 역할별 조직 컨텍스트를 생성합니다.
    pub fn organization(&self, role: OrgRole) -> OrganizationContext {
        let org = self.orgs.get(role);
        OrganizationContext {
            role,
            admin: Principal::new(&org.name, &org.msp_id, &org.admin_user),
            user: Principal::new(&org.name, &org.msp_id, &org.user),
            peers: org.peers.clone(),
        }
    }

    /// 오더러 조직 관리자 principal
    pub fn orderer_admin(&self) -> Principal {
        Principal::new(
            &self.network.orderer_org,
            &self.network.orderer_msp_id,
            &self.network.orderer_admin,
        )
    }

    /// 채널 ID
    pub fn channel_id(&self) -> ChannelId {
        ChannelId::new(&self.network.channel_id)
    }

    /// 채널 생성/앵커 피어 갱신 요청을 만듭니다.
    ///
    /// 설정 트랜잭션 파일 이름은 `{channel}.tx`, `{channel}{MSP}anchors.tx` 규칙을 따릅니다.
    pub fn channel_request(&self, kind: ChannelUpdateKind) -> ChannelRequest {
        let file = match &kind {
            ChannelUpdateKind::Create => format!("{}.tx", self.network.channel_id),
            ChannelUpdateKind::AnchorPeers { msp_id } => {
                format!("{}{}anchors.tx", self.network.channel_id, msp_id)
            }
        };
        let config_path = Path::new(&self.network.channel_config_dir)
            .join(file)
            .display()
            .to_string();
        ChannelRequest {
            channel_id: self.channel_id(),
            config_path,
            kind,
        }
    }

    /// 최초 배포용 체인코드 기술자
    pub fn chaincode_descriptor(&self) -> Result<ChaincodeDescriptor, ConsortiumError> {
        let policy = EndorsementPolicy::parse(&self.chaincode.policy)?;
        Ok(ChaincodeDescriptor {
            name: self.chaincode.name.clone(),
            version: self.chaincode.version.clone(),
            path: self.chaincode.path.clone(),
            policy,
        })
    }

    /// 업그레이드용 체인코드 기술자 (업그레이드 비활성화 시 `None`)
    pub fn upgrade_descriptor(&self) -> Result<Option<ChaincodeDescriptor>, ConsortiumError> {
        if !self.chaincode.upgrade.enabled {
            return Ok(None);
        }
        let policy = EndorsementPolicy::parse(&self.chaincode.upgrade.policy)?;
        Ok(Some(
            self.chaincode_descriptor()?
                .with_version(&self.chaincode.upgrade.version, policy),
        ))
    }
}

fn invalid(field: &str, reason: String) -> ConsortiumError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConsortiumError> {
    if value.trim().is_empty() {
        return Err(invalid(field, "must not be empty".to_owned()));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 채널/오더러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 공유 채널 ID
    pub channel_id: String,
    /// 오더러 엔드포인트
    pub orderer_endpoint: String,
    /// 오더러 조직 이름
    pub orderer_org: String,
    /// 오더러 조직 MSP ID
    pub orderer_msp_id: String,
    /// 오더러 조직 관리자 사용자
    pub orderer_admin: String,
    /// 채널 설정 트랜잭션 파일 디렉토리
    pub channel_config_dir: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel_id: "orgchannel".to_owned(),
            orderer_endpoint: "orderer.example.com:7050".to_owned(),
            orderer_org: "OrdererOrg".to_owned(),
            orderer_msp_id: "OrdererMSP".to_owned(),
            orderer_admin: "Admin".to_owned(),
            channel_config_dir: "fixtures/channel".to_owned(),
        }
    }
}

/// 참여 조직 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgsConfig {
    /// 검증 조직
    pub primary: OrgConfig,
    /// 실행 조직
    pub secondary: OrgConfig,
}

impl OrgsConfig {
    /// 역할별 조직 설정
    pub fn get(&self, role: OrgRole) -> &OrgConfig {
        match role {
            OrgRole::Primary => &self.primary,
            OrgRole::Secondary => &self.secondary,
        }
    }
}

impl Default for OrgsConfig {
    fn default() -> Self {
        Self {
            primary: OrgConfig {
                name: "Org1".to_owned(),
                msp_id: "Org1MSP".to_owned(),
                admin_user: "Admin".to_owned(),
                user: "User1".to_owned(),
                peers: vec![
                    "peer0.org1.example.com:7051".to_owned(),
                    "peer1.org1.example.com:7151".to_owned(),
                ],
            },
            secondary: OrgConfig {
                name: "Org2".to_owned(),
                msp_id: "Org2MSP".to_owned(),
                admin_user: "Admin".to_owned(),
                user: "User1".to_owned(),
                peers: vec!["peer0.org2.example.com:8051".to_owned()],
            },
        }
    }
}

/// 단일 조직 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrgConfig {
    /// 조직 이름
    pub name: String,
    /// MSP ID
    pub msp_id: String,
    /// 관리자 사용자
    pub admin_user: String,
    /// 일반 사용자
    pub user: String,
    /// 피어 엔드포인트 (첫 번째가 지정 테스트 피어)
    pub peers: Vec<String>,
}

/// 체인코드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaincodeConfig {
    /// 체인코드 이름
    pub name: String,
    /// 배포 경로
    pub path: String,
    /// 최초 배포 버전
    pub version: String,
    /// 보증 정책 표현식
    pub policy: String,
    /// 호출 함수 이름
    pub function: String,
    /// 오류 검증에 사용할 존재하지 않는 함수 이름
    pub error_function: String,
    /// 인스턴스화 인자
    pub init_args: Vec<String>,
    /// 상태 변경 트랜잭션 인자
    pub tx_args: Vec<String>,
    /// 조회 인자
    pub query_args: Vec<String>,
    /// 업그레이드 설정
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

impl Default for ChaincodeConfig {
    fn default() -> Self {
        Self {
            name: "exampleCC".to_owned(),
            path: "github.com/example_cc".to_owned(),
            version: "0".to_owned(),
            policy: "AND ('Org1MSP.member','Org2MSP.member')".to_owned(),
            function: "invoke".to_owned(),
            error_function: "DUMMY_FUNCTION".to_owned(),
            init_args: strings(&["init", "a", "1000", "b", "0"]),
            tx_args: strings(&["move", "a", "b", "1"]),
            query_args: strings(&["query", "b"]),
            upgrade: UpgradeConfig::default(),
        }
    }
}

/// 체인코드 업그레이드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// 업그레이드 단계 실행 여부
    pub enabled: bool,
    /// 새 버전
    pub version: String,
    /// 새 보증 정책
    pub policy: String,
    /// 업그레이드 초기화 인자
    pub init_args: Vec<String>,
    /// 업그레이드 후 조회 값 기준선
    pub baseline: i64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            version: "1".to_owned(),
            policy: "AND ('Org1MSP.member','Org2MSP.member')".to_owned(),
            init_args: strings(&["init", "a", "1000", "b", "100"]),
            baseline: 100,
        }
    }
}

/// 수렴 대기 재시도 예산
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// 피어 디스커버리 대기
    pub discovery: FixedRetryConfig,
    /// 채널 설정 블록 대기
    pub config: FixedRetryConfig,
    /// 체인코드 설치/인스턴스화 대기
    pub lifecycle: FixedRetryConfig,
    /// 값 수렴 검증
    pub value: BackoffRetryConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            discovery: FixedRetryConfig {
                max_attempts: 10,
                delay_ms: 3000,
            },
            config: FixedRetryConfig {
                max_attempts: 10,
                delay_ms: 2000,
            },
            lifecycle: FixedRetryConfig {
                max_attempts: 10,
                delay_ms: 2000,
            },
            value: BackoffRetryConfig::default(),
        }
    }
}

/// 고정 간격 재시도 예산
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedRetryConfig {
    /// 최대 시도 횟수
    pub max_attempts: u32,
    /// 시도 간 대기 (밀리초)
    pub delay_ms: u64,
}

/// 지수 백오프 재시도 예산
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffRetryConfig {
    /// 최대 시도 횟수
    pub max_attempts: u32,
    /// 첫 대기 (밀리초)
    pub base_ms: u64,
    /// 증가 배수
    pub factor: u32,
}

impl Default for BackoffRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_ms: 50,
            factor: 2,
        }
    }
}

/// 샌드박스 네트워크 전파 지연 (밀리초)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// 디스커버리: 조직의 i번째 피어가 `(i + 1) × gossip_lag_ms` 후 보임
    pub gossip_lag_ms: u64,
    /// 채널 설정 트랜잭션이 오더러 조회에 반영되기까지
    pub config_lag_ms: u64,
    /// 설치가 피어 레지스트리에 반영되기까지
    pub install_lag_ms: u64,
    /// 인스턴스화/업그레이드가 피어에 반영되기까지
    pub instantiate_lag_ms: u64,
    /// 커밋된 값이 보증하지 않은 피어에 반영되기까지
    pub commit_lag_ms: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            gossip_lag_ms: 1000,
            config_lag_ms: 500,
            install_lag_ms: 1000,
            instantiate_lag_ms: 1500,
            commit_lag_ms: 200,
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = ConsortiumConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.network.channel_id, "orgchannel");
        assert_eq!(config.orgs.primary.peers.len(), 2);
        assert_eq!(config.orgs.secondary.peers.len(), 1);
        assert_eq!(config.retry.discovery.max_attempts, 10);
        assert_eq!(config.retry.discovery.delay_ms, 3000);
        assert_eq!(config.retry.config.delay_ms, 2000);
        assert_eq!(config.retry.value.base_ms, 50);
        assert_eq!(config.retry.value.factor, 2);
        assert!(config.chaincode.upgrade.enabled);
        assert_eq!(config.chaincode.upgrade.baseline, 100);
    }

    #[test]
    fn default_config_passes_validation() {
        ConsortiumConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = ConsortiumConfig::parse("").unwrap();
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.chaincode.name, "exampleCC");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[network]
channel_id = "testchannel"

[orgs.secondary]
name = "Org2"
msp_id = "Org2MSP"
admin_user = "Admin"
user = "User2"
peers = ["peer0.org2.example.com:8051", "peer1.org2.example.com:8151"]
"#;
        let config = ConsortiumConfig::parse(toml).unwrap();
        assert_eq!(config.network.channel_id, "testchannel");
        // orderer 설정은 기본값 유지
        assert_eq!(config.network.orderer_msp_id, "OrdererMSP");
        assert_eq!(config.orgs.secondary.user, "User2");
        assert_eq!(config.orgs.secondary.peers.len(), 2);
        assert_eq!(config.orgs.primary.name, "Org1");
        config.validate().unwrap();
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = ConsortiumConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            ConsortiumError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = ConsortiumConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_uppercase_channel_id() {
        let mut config = ConsortiumConfig::default();
        config.network.channel_id = "OrgChannel".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("network.channel_id"));
    }

    #[test]
    fn validate_rejects_org_without_peers() {
        let mut config = ConsortiumConfig::default();
        config.orgs.secondary.peers.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("orgs.secondary.peers"));
    }

    #[test]
    fn validate_rejects_duplicate_peers_across_orgs() {
        let mut config = ConsortiumConfig::default();
        config.orgs.secondary.peers = vec!["peer0.org1.example.com:7051".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate peer"));
    }

    #[test]
    fn validate_rejects_duplicate_msp_ids() {
        let mut config = ConsortiumConfig::default();
        config.orgs.secondary.msp_id = "Org1MSP".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate msp_id"));
    }

    #[test]
    fn validate_rejects_unparseable_policy() {
        let mut config = ConsortiumConfig::default();
        config.chaincode.policy = "AND('Org1MSP.member'".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chaincode.policy"));
    }

    #[test]
    fn validate_rejects_policy_with_unknown_msp() {
        let mut config = ConsortiumConfig::default();
        config.chaincode.policy = "AND('Org1MSP.member','Org9MSP.member')".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Org9MSP"));
    }

    #[test]
    fn validate_rejects_upgrade_to_same_version() {
        let mut config = ConsortiumConfig::default();
        config.chaincode.upgrade.version = "0".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chaincode.upgrade.version"));
    }

    #[test]
    fn validate_skips_upgrade_checks_when_disabled() {
        let mut config = ConsortiumConfig::default();
        config.chaincode.upgrade.enabled = false;
        config.chaincode.upgrade.policy = "garbage".to_owned();
        config.validate().unwrap();
        assert!(config.upgrade_descriptor().unwrap().is_none());
    }

    #[test]
    fn validate_rejects_zero_attempts() {
        let mut config = ConsortiumConfig::default();
        config.retry.lifecycle.max_attempts = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.lifecycle.max_attempts"));
    }

    #[test]
    fn validate_rejects_zero_backoff_factor() {
        let mut config = ConsortiumConfig::default();
        config.retry.value.factor = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("retry.value.factor"));
    }

    #[test]
    fn organization_context_from_config() {
        let config = ConsortiumConfig::default();
        let org = config.organization(OrgRole::Secondary);
        assert_eq!(org.role, OrgRole::Secondary);
        assert_eq!(org.msp_id(), "Org2MSP");
        assert_eq!(org.admin.user, "Admin");
        assert_eq!(org.user.user, "User1");
        assert_eq!(org.expected_peers(), 1);
    }

    #[test]
    fn channel_request_paths_follow_naming_rule() {
        let config = ConsortiumConfig::default();
        let create = config.channel_request(ChannelUpdateKind::Create);
        assert!(create.config_path.ends_with("orgchannel.tx"));
        let anchors = config.channel_request(ChannelUpdateKind::AnchorPeers {
            msp_id: "Org1MSP".to_owned(),
        });
        assert!(anchors.config_path.ends_with("orgchannelOrg1MSPanchors.tx"));
        assert_eq!(anchors.channel_id.as_str(), "orgchannel");
    }

    #[test]
    fn descriptors_follow_chaincode_section() {
        let config = ConsortiumConfig::default();
        let v0 = config.chaincode_descriptor().unwrap();
        let v1 = config.upgrade_descriptor().unwrap().unwrap();
        assert_eq!(v0.version, "0");
        assert_eq!(v1.version, "1");
        assert_eq!(v1.name, v0.name);
        assert!(v1.policy.is_satisfied_by(&["Org1MSP", "Org2MSP"]));
    }

    #[test]
    #[serial]
    fn env_overrides_apply() {
        // SAFETY: #[serial]로 환경변수를 만지는 테스트를 직렬화합니다.
        unsafe {
            std::env::set_var("CONSORTIUM_NETWORK_CHANNEL_ID", "envchannel");
            std::env::set_var(
                "CONSORTIUM_ORGS_SECONDARY_PEERS",
                "peer0.org2.example.com:8051, peer1.org2.example.com:8151",
            );
            std::env::set_var("CONSORTIUM_RETRY_VALUE_MAX_ATTEMPTS", "8");
        }
        let mut config = ConsortiumConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("CONSORTIUM_NETWORK_CHANNEL_ID");
            std::env::remove_var("CONSORTIUM_ORGS_SECONDARY_PEERS");
            std::env::remove_var("CONSORTIUM_RETRY_VALUE_MAX_ATTEMPTS");
        }

        assert_eq!(config.network.channel_id, "envchannel");
        assert_eq!(
            config.orgs.secondary.peers,
            vec!["peer0.org2.example.com:8051", "peer1.org2.example.com:8151"]
        );
        assert_eq!(config.retry.value.max_attempts, 8);
    }

    #[test]
    #[serial]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = true;
        // SAFETY: #[serial]로 환경변수를 만지는 테스트를 직렬화합니다.
        unsafe { std::env::set_var("TEST_CONSORTIUM_BOOL_BAD", "not-a-bool") };
        override_bool(&mut val, "TEST_CONSORTIUM_BOOL_BAD");
        assert!(val);
        unsafe { std::env::remove_var("TEST_CONSORTIUM_BOOL_BAD") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_CONSORTIUM_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = ConsortiumConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = ConsortiumConfig::parse(&toml_str).unwrap();
        assert_eq!(config.network.channel_id, parsed.network.channel_id);
        assert_eq!(config.orgs.primary.peers, parsed.orgs.primary.peers);
        assert_eq!(config.retry.value, parsed.retry.value);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = ConsortiumConfig::from_file("/nonexistent/path/consortium.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConsortiumError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
