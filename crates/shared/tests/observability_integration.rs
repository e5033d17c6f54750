//! 可观测性初始化集成测试
//!
//! 全局 subscriber 在同一进程内只能安装一次，因此初始化路径集中在一个测试中验证。

use tagger_shared::config::AppConfig;
use tagger_shared::observability::{self, ObservabilityConfig};

#[test]
fn test_init_once_then_rejects_second_subscriber() {
    let config = ObservabilityConfig {
        log_level: "debug".to_string(),
        json_logs: true,
        ..ObservabilityConfig::default()
    }
    .with_service_name("tag-rule-engine-test");

    assert!(observability::init(&config).is_ok());

    tracing::info!(rule_id = "high_hr", "日志管道可用");

    let err = observability::init(&config).unwrap_err();
    assert!(err.to_string().contains("tracing subscriber"));
}

#[test]
fn test_env_filter_falls_back_on_invalid_level() {
    let config = ObservabilityConfig {
        log_level: "[not-a-filter".to_string(),
        ..ObservabilityConfig::default()
    };

    // 非法级别不应导致 panic，回退到 info
    let _filter = observability::tracing::build_env_filter(&config);
}

#[test]
fn test_app_config_feeds_observability() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("default.toml"),
        "[observability]\nlog_level = \"warn\"\njson_logs = true\n",
    )
    .unwrap();

    let config: AppConfig = AppConfig::file_layers("tag-rule-engine", "development", dir.path())
        .unwrap()
        .build()
        .unwrap()
        .try_deserialize()
        .unwrap();

    assert_eq!(config.observability.log_level, "warn");
    assert!(config.observability.json_logs);
    assert_eq!(config.observability.service_name, "tag-rule-engine");
}
