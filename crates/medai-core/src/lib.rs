//! # MedAI Core
//!
//! 影像审阅仪表盘的核心模块，提供基础数据结构、错误定义、
//! 数据仓库接口和通用工具。

pub mod error;
pub mod models;
pub mod repository;
pub mod utils;

pub use error::{MedAiError, Result};
pub use models::*;
pub use repository::{DashboardRepository, MockRepository};
