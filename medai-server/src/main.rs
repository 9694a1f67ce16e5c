//! MedAI仪表盘服务主程序

use clap::Parser;
use medai_core::{DashboardRepository, MedAiError, MockRepository, Result};
use medai_relay::JobRunner;
use medai_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
use config::AppConfig;

/// 训练指标的刷新周期
const METRICS_REFRESH_SECS: u64 = 5;

/// MedAI仪表盘服务命令行参数
#[derive(Parser, Debug)]
#[command(name = "medai-server")]
#[command(about = "MedAI 医学影像审阅仪表盘服务")]
struct Args {
    /// 监听主机，覆盖配置文件
    #[arg(long)]
    host: Option<String>,

    /// 监听端口，覆盖配置文件
    #[arg(short, long)]
    port: Option<u16>,

    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    info!("启动MedAI仪表盘服务...");

    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    info!("服务配置:");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!(
        "  外部进程: {} {:?}",
        config.relay.program, config.relay.script_args
    );
    info!("  上传目录: {}", config.relay.storage_dir.display());
    info!("  调用超时: {}s", config.relay.timeout_secs);

    let relay = Arc::new(config.relay.clone());
    let repo = Arc::new(MockRepository::new());

    // 模拟指标的固定周期刷新任务
    tokio::spawn(
        Arc::clone(&repo).run_metrics_refresh(Duration::from_secs(METRICS_REFRESH_SECS)),
    );

    let repo: Arc<dyn DashboardRepository> = repo;
    let state = AppState {
        repo,
        runner: Arc::new(JobRunner::new(relay.clone())),
        relay,
        session_ttl_hours: config.session.ttl_hours,
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| MedAiError::Config(format!("Invalid listen address: {}", e)))?;

    WebServer::new(addr, state).run().await
}
