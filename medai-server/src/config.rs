//! 配置管理
//!
//! 分层加载：内置默认值 → 可选TOML配置文件 → `MEDAI_` 前缀
//! 环境变量（如 `MEDAI_SERVER__PORT=9000`），加载后统一校验。

use config::{Config, ConfigError, Environment, File};
use medai_core::{MedAiError, Result};
use medai_relay::RelayConfig;
use serde::Deserialize;

/// 服务完整配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// 监听配置
    pub server: ServerConfig,
    /// 外部进程中继配置
    pub relay: RelayConfig,
    /// 会话配置
    pub session: SessionConfig,
}

/// 监听配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 角色Cookie的有效期（小时）
    pub ttl_hours: i64,
}

impl AppConfig {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config = Self::build(path).map_err(|e| MedAiError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn build(path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080_i64)?
            .set_default("relay.program", "python3")?
            .set_default(
                "relay.script_args",
                vec!["fl-backend/server/cli.py".to_string()],
            )?
            .set_default("relay.storage_dir", "./data/uploads")?
            .set_default("relay.update_dir", "./data/updates")?
            .set_default("relay.timeout_secs", 120_i64)?
            .set_default("relay.max_concurrent", 4_i64)?
            .set_default("session.ttl_hours", 24_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        builder
            .add_source(
                Environment::with_prefix("MEDAI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    fn validate(&self) -> Result<()> {
        if self.relay.program.trim().is_empty() {
            return Err(MedAiError::Config(
                "relay.program must not be empty".to_string(),
            ));
        }
        if self.relay.timeout_secs == 0 {
            return Err(MedAiError::Config(
                "relay.timeout_secs must be positive".to_string(),
            ));
        }
        if self.relay.max_concurrent == 0 {
            return Err(MedAiError::Config(
                "relay.max_concurrent must be positive".to_string(),
            ));
        }
        if self.session.ttl_hours <= 0 {
            return Err(MedAiError::Config(
                "session.ttl_hours must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.relay.program, "python3");
        assert_eq!(config.relay.max_concurrent, 4);
        assert_eq!(config.session.ttl_hours, 24);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medai.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 9005

[relay]
program = "python"
timeout_secs = 30
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9005);
        assert_eq!(config.relay.program, "python");
        assert_eq!(config.relay.timeout_secs, 30);
        // 未覆盖的键保持默认值
        assert_eq!(config.relay.max_concurrent, 4);
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("medai.toml");
        std::fs::write(&path, "[relay]\ntimeout_secs = 0\n").unwrap();

        let result = AppConfig::load(Some(path.to_str().unwrap()));
        assert!(matches!(result, Err(MedAiError::Config(_))));
    }
}
