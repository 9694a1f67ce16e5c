//! # MedAI Web
//!
//! 仪表盘的Web层：axum 路由装配、会话Cookie、视图页面、
//! 视图数据API与外部进程中继端点。

pub mod handlers;
pub mod pages;
pub mod relay;
pub mod server;
pub mod session;

pub use server::{AppState, WebServer};
