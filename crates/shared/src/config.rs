//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use crate::observability::ObservabilityConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 规则来源配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// JSON 规则文件路径，未配置时以空规则集启动
    pub path: Option<String>,
}

/// 事件处理配置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 规则评估失败时是否降级输出（附加空标签），否则丢弃该事件
    pub degrade_on_error: bool,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub rules: RulesConfig,
    pub processing: ProcessingConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（TAGGER_ 前缀，双下划线分隔层级，如 TAGGER_RULES__PATH -> rules.path）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("TAGGER_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(service_name, &env, Path::new(&config_dir))
    }

    /// 从指定目录加载配置
    pub fn load_from(
        service_name: &str,
        env: &str,
        config_dir: &Path,
    ) -> Result<Self, ConfigError> {
        Self::file_layers(service_name, env, config_dir)?
            .add_source(
                Environment::with_prefix("TAGGER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// 仅由默认值与配置文件组成的分层构建器，不含环境变量覆盖
    pub fn file_layers(
        service_name: &str,
        env: &str,
        config_dir: &Path,
    ) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .set_default("observability.service_name", service_name)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join(format!("{}.toml", env))).required(false))
            .add_source(
                File::from(config_dir.join(format!("{}.toml", service_name))).required(false),
            ))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
