//! consortium.toml 통합 설정 테스트
//!
//! - consortium.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 파일 로딩 / 잘못된 형식 에러 테스트

use std::io::Write;

use consortium_core::config::ConsortiumConfig;
use consortium_core::error::{ConfigError, ConsortiumError};
use consortium_core::types::OrgRole;

const EXAMPLE: &str = include_str!("../../../consortium.toml.example");

// =============================================================================
// consortium.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = ConsortiumConfig::parse(EXAMPLE).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.network.channel_id, "orgchannel");
    assert_eq!(config.network.orderer_endpoint, "orderer.example.com:7050");
}

#[test]
fn example_config_passes_validation() {
    let config = ConsortiumConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_code_defaults() {
    let parsed = ConsortiumConfig::parse(EXAMPLE).expect("should parse");
    let defaults = ConsortiumConfig::default();

    assert_eq!(parsed.network.channel_id, defaults.network.channel_id);
    assert_eq!(parsed.orgs.primary.peers, defaults.orgs.primary.peers);
    assert_eq!(parsed.orgs.secondary.peers, defaults.orgs.secondary.peers);
    assert_eq!(parsed.chaincode.init_args, defaults.chaincode.init_args);
    assert_eq!(
        parsed.chaincode.upgrade.init_args,
        defaults.chaincode.upgrade.init_args
    );
    assert_eq!(parsed.retry.discovery, defaults.retry.discovery);
    assert_eq!(parsed.retry.config, defaults.retry.config);
    assert_eq!(parsed.retry.lifecycle, defaults.retry.lifecycle);
    assert_eq!(parsed.retry.value, defaults.retry.value);
    assert_eq!(parsed.sandbox.gossip_lag_ms, defaults.sandbox.gossip_lag_ms);
    assert_eq!(parsed.sandbox.commit_lag_ms, defaults.sandbox.commit_lag_ms);
}

#[test]
fn example_config_builds_two_organizations() {
    let config = ConsortiumConfig::parse(EXAMPLE).expect("should parse");

    let primary = config.organization(OrgRole::Primary);
    let secondary = config.organization(OrgRole::Secondary);
    assert_eq!(primary.msp_id(), "Org1MSP");
    assert_eq!(primary.expected_peers(), 2);
    assert_eq!(secondary.msp_id(), "Org2MSP");
    assert_eq!(secondary.expected_peers(), 1);
    assert_eq!(
        secondary.designated_peer().map(|p| p.url),
        Some("peer0.org2.example.com:8051".to_owned())
    );
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_chaincode_only() {
    let toml = r#"
[chaincode]
name = "marbles"
version = "2"

[chaincode.upgrade]
enabled = false
"#;
    let config = ConsortiumConfig::parse(toml).expect("should parse");
    assert_eq!(config.chaincode.name, "marbles");
    assert_eq!(config.chaincode.version, "2");
    // 지정하지 않은 필드는 기본값
    assert_eq!(config.chaincode.query_args, vec!["query", "b"]);
    assert!(!config.chaincode.upgrade.enabled);
    config.validate().expect("partial config should validate");
}

#[test]
fn partial_config_retry_only() {
    let toml = r#"
[retry.value]
max_attempts = 8
base_ms = 10
factor = 3
"#;
    let config = ConsortiumConfig::parse(toml).expect("should parse");
    assert_eq!(config.retry.value.max_attempts, 8);
    assert_eq!(config.retry.value.factor, 3);
    assert_eq!(config.retry.discovery.max_attempts, 10);
}

#[test]
fn fixed_retry_section_requires_both_fields() {
    let toml = r#"
[retry.discovery]
max_attempts = 3
"#;
    let err = ConsortiumConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        ConsortiumError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_is_parse_error() {
    let toml = r#"
[orgs.primary]
peers = "peer0.org1.example.com:7051"
"#;
    let err = ConsortiumConfig::parse(toml).unwrap_err();
    assert!(matches!(
        err,
        ConsortiumError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn policy_referencing_outside_org_fails_validation() {
    let toml = r#"
[chaincode]
policy = "OR('Org3MSP.member')"
"#;
    let config = ConsortiumConfig::parse(toml).expect("should parse");
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("Org3MSP"));
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("CONSORTIUM_GENERAL_LOG_LEVEL").ok();
    // SAFETY: #[serial]로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("CONSORTIUM_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = ConsortiumConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("CONSORTIUM_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("CONSORTIUM_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_bool_disables_upgrade() {
    let original = std::env::var("CONSORTIUM_CHAINCODE_UPGRADE_ENABLED").ok();
    // SAFETY: #[serial]로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("CONSORTIUM_CHAINCODE_UPGRADE_ENABLED", "false");
    }

    let mut config = ConsortiumConfig::default();
    config.apply_env_overrides();
    let enabled = config.chaincode.upgrade.enabled;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("CONSORTIUM_CHAINCODE_UPGRADE_ENABLED", val),
            None => std::env::remove_var("CONSORTIUM_CHAINCODE_UPGRADE_ENABLED"),
        }
    }

    assert!(!enabled);
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field_invalid_is_ignored() {
    let original = std::env::var("CONSORTIUM_RETRY_CONFIG_DELAY_MS").ok();
    // SAFETY: #[serial]로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("CONSORTIUM_RETRY_CONFIG_DELAY_MS", "two-seconds");
    }

    let mut config = ConsortiumConfig::default();
    config.apply_env_overrides();
    let delay = config.retry.config.delay_ms;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("CONSORTIUM_RETRY_CONFIG_DELAY_MS", val),
            None => std::env::remove_var("CONSORTIUM_RETRY_CONFIG_DELAY_MS"),
        }
    }

    assert_eq!(delay, 2000);
}

// =============================================================================
// 파일 로딩 테스트
// =============================================================================

#[tokio::test]
#[serial_test::serial]
async fn load_example_config_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(EXAMPLE.as_bytes()).expect("write");

    let config = ConsortiumConfig::load(file.path())
        .await
        .expect("loaded example should validate");
    assert_eq!(config.chaincode.name, "exampleCC");
}

#[tokio::test]
#[serial_test::serial]
async fn load_rejects_invalid_values() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(b"[general]\nlog_format = \"xml\"\n")
        .expect("write");

    let err = ConsortiumConfig::load(file.path()).await.unwrap_err();
    assert!(matches!(
        err,
        ConsortiumError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
async fn load_missing_file_reports_path() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("missing.toml");

    let err = ConsortiumConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("missing.toml"));
}
