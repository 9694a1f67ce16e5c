//! 外部分析进程调用

use medai_core::{MedAiError, Modality, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// 外部进程配置
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub program: String,          // 解释器或可执行文件
    pub script_args: Vec<String>, // 固定前置参数，如脚本路径
    pub storage_dir: PathBuf,     // 上传影像目录
    pub update_dir: PathBuf,      // 模型更新暂存目录
    pub timeout_secs: u64,        // 单次调用超时
    pub max_concurrent: usize,    // 并发子进程上限
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            script_args: vec!["fl-backend/server/cli.py".to_string()],
            storage_dir: PathBuf::from("./data/uploads"),
            update_dir: PathBuf::from("./data/updates"),
            timeout_secs: 120,
            max_concurrent: 4,
        }
    }
}

impl RelayConfig {
    /// 单次子进程执行的超时
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// 请求侧等待作业的截止时长
    ///
    /// 留出排队等待加一次完整执行的余量。
    pub fn request_deadline(&self) -> Duration {
        self.timeout() * 2
    }
}

/// 推理调用的参数对
pub fn inference_args(image_path: &Path, modality: Modality, patient_id: &str) -> Vec<String> {
    vec![
        "--mode".to_string(),
        "inference".to_string(),
        "--image_path".to_string(),
        image_path.to_string_lossy().into_owned(),
        "--image_type".to_string(),
        modality.as_str().to_string(),
        "--patient_id".to_string(),
        patient_id.to_string(),
    ]
}

/// 训练动作的参数对
pub fn training_args(
    action: &str,
    client_id: Option<&str>,
    update_path: Option<&Path>,
) -> Vec<String> {
    let mut args = vec![
        "--mode".to_string(),
        "train".to_string(),
        "--action".to_string(),
        action.to_string(),
    ];
    if let Some(client_id) = client_id {
        args.push("--client_id".to_string());
        args.push(client_id.to_string());
    }
    if let Some(path) = update_path {
        args.push("--update_path".to_string());
        args.push(path.to_string_lossy().into_owned());
    }
    args
}

/// 状态查询的参数对
pub fn status_args() -> Vec<String> {
    vec!["--mode".to_string(), "status".to_string()]
}

/// 外部分析命令
///
/// 每次调用派生一个子进程，捕获标准输出与标准错误。
/// 非零退出码或任何标准错误输出都视为执行失败。
#[derive(Clone)]
pub struct AnalysisCommand {
    config: Arc<RelayConfig>,
}

impl AnalysisCommand {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self { config }
    }

    /// 运行外部进程并返回其标准输出
    pub async fn run(&self, args: &[String]) -> Result<String> {
        debug!(
            "Invoking analysis process: {} {:?} {:?}",
            self.config.program, self.config.script_args, args
        );

        let output = Command::new(&self.config.program)
            .args(&self.config.script_args)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                MedAiError::External(format!(
                    "Failed to spawn {}: {}",
                    self.config.program, e
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            warn!(
                "Analysis process exited with {:?}: {}",
                output.status.code(),
                stderr.trim()
            );
            return Err(MedAiError::External(format!(
                "Process exited with status {:?}",
                output.status.code()
            )));
        }
        if !stderr.trim().is_empty() {
            warn!("Analysis process wrote to stderr: {}", stderr.trim());
            return Err(MedAiError::External(
                "Process produced diagnostic output".to_string(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_config(payload: &str) -> Arc<RelayConfig> {
        Arc::new(RelayConfig {
            program: "echo".to_string(),
            script_args: vec![payload.to_string()],
            ..RelayConfig::default()
        })
    }

    #[test]
    fn test_inference_args_pairs() {
        let args = inference_args(Path::new("/tmp/42_x_scan.dcm"), Modality::Ct, "42");
        assert_eq!(
            args,
            vec![
                "--mode",
                "inference",
                "--image_path",
                "/tmp/42_x_scan.dcm",
                "--image_type",
                "ct",
                "--patient_id",
                "42",
            ]
        );
    }

    #[test]
    fn test_training_args_optional_parts() {
        let args = training_args("start_round", None, None);
        assert_eq!(args, vec!["--mode", "train", "--action", "start_round"]);

        let args = training_args(
            "submit_update",
            Some("7"),
            Some(Path::new("/tmp/7_update.bin")),
        );
        assert_eq!(
            args,
            vec![
                "--mode",
                "train",
                "--action",
                "submit_update",
                "--client_id",
                "7",
                "--update_path",
                "/tmp/7_update.bin",
            ]
        );
    }

    #[test]
    fn test_status_args() {
        assert_eq!(status_args(), vec!["--mode", "status"]);
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let cmd = AnalysisCommand::new(echo_config(r#"{"prediction":1,"confidence":0.93}"#));
        let stdout = cmd.run(&[]).await.unwrap();
        assert_eq!(stdout.trim(), r#"{"prediction":1,"confidence":0.93}"#);
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_external_error() {
        let config = Arc::new(RelayConfig {
            program: "false".to_string(),
            script_args: vec![],
            ..RelayConfig::default()
        });
        let cmd = AnalysisCommand::new(config);
        let result = cmd.run(&[]).await;
        assert!(matches!(result, Err(MedAiError::External(_))));
    }

    #[tokio::test]
    async fn test_run_missing_program_is_external_error() {
        let config = Arc::new(RelayConfig {
            program: "medai-no-such-binary".to_string(),
            script_args: vec![],
            ..RelayConfig::default()
        });
        let cmd = AnalysisCommand::new(config);
        let result = cmd.run(&[]).await;
        assert!(matches!(result, Err(MedAiError::External(_))));
    }

    #[tokio::test]
    async fn test_run_stderr_is_external_error() {
        let config = Arc::new(RelayConfig {
            program: "sh".to_string(),
            script_args: vec![
                "-c".to_string(),
                "echo '{}'; echo oops >&2".to_string(),
            ],
            ..RelayConfig::default()
        });
        let cmd = AnalysisCommand::new(config);
        let result = cmd.run(&[]).await;
        assert!(matches!(result, Err(MedAiError::External(_))));
    }
}
