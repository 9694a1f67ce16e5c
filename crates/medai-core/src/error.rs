//! 错误定义模块

use thiserror::Error;

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum MedAiError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("未认证: {0}")]
    Unauthorized(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("外部进程错误: {0}")]
    External(String),

    #[error("外部输出解析错误: {0}")]
    Decode(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, MedAiError>;
