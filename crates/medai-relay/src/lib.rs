//! # MedAI Relay
//!
//! 外部分析/训练进程的中继层：构造命令行参数、派生子进程、
//! 对其标准输出做模式校验解码，并通过作业运行器隔离请求与
//! 子进程挂起。

pub mod command;
pub mod jobs;
pub mod output;

pub use command::{inference_args, status_args, training_args, AnalysisCommand, RelayConfig};
pub use jobs::{JobHandle, JobKind, JobRecord, JobRequest, JobRunner, JobState};
pub use output::{decode_for_kind, InferenceOutput, StatusReport, TrainingOutput};
