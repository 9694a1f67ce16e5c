//! 作业运行器
//!
//! 把"在请求处理器里同步派生子进程并等待"替换为显式的作业提交
//! 接口：提交立即返回句柄，信号量限制并发子进程数，每次执行带
//! 超时，挂起的外部进程只会让对应作业失败而不会挂住请求。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use crate::command::{AnalysisCommand, RelayConfig};
use crate::output::decode_for_kind;

/// 终态作业在存储中保留的上限，超出后淘汰最旧的
const MAX_FINISHED_JOBS: usize = 256;

/// 作业类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Inference,
    Training,
    Status,
}

/// 作业状态
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Succeeded { result: Value },
    Failed { error: String },
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Succeeded { .. } | JobState::Failed { .. })
    }
}

/// 作业请求
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub kind: JobKind,
    pub args: Vec<String>,
}

/// 作业记录，轮询接口返回的形态
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub submitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: JobState,
}

/// 作业句柄
pub struct JobHandle {
    pub id: Uuid,
    rx: watch::Receiver<JobState>,
}

impl JobHandle {
    /// 等待作业进入终态，超过截止时长按失败处理
    pub async fn wait(mut self, deadline: Duration) -> JobState {
        let waited = tokio::time::timeout(deadline, async {
            loop {
                let current = self.rx.borrow().clone();
                if current.is_terminal() {
                    return current;
                }
                if self.rx.changed().await.is_err() {
                    let last = self.rx.borrow().clone();
                    if last.is_terminal() {
                        return last;
                    }
                    return JobState::Failed {
                        error: "job runner dropped".to_string(),
                    };
                }
            }
        })
        .await;

        match waited {
            Ok(state) => state,
            Err(_) => {
                warn!("Job {} wait deadline exceeded", self.id);
                JobState::Failed {
                    error: "job wait deadline exceeded".to_string(),
                }
            }
        }
    }
}

struct StoredJob {
    record: JobRecord,
    tx: watch::Sender<JobState>,
}

struct JobStore {
    jobs: HashMap<Uuid, StoredJob>,
    finished: VecDeque<Uuid>,
}

/// 作业运行器
pub struct JobRunner {
    command: AnalysisCommand,
    config: Arc<RelayConfig>,
    permits: Arc<Semaphore>,
    store: Arc<Mutex<JobStore>>,
}

impl JobRunner {
    pub fn new(config: Arc<RelayConfig>) -> Self {
        Self {
            command: AnalysisCommand::new(config.clone()),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
            store: Arc::new(Mutex::new(JobStore {
                jobs: HashMap::new(),
                finished: VecDeque::new(),
            })),
        }
    }

    /// 提交作业，立即返回句柄
    pub async fn submit(&self, request: JobRequest) -> JobHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(JobState::Queued);

        {
            let mut store = self.store.lock().await;
            store.jobs.insert(
                id,
                StoredJob {
                    record: JobRecord {
                        id,
                        kind: request.kind,
                        submitted_at: Utc::now(),
                        state: JobState::Queued,
                    },
                    tx,
                },
            );
        }
        info!("Job {} submitted ({:?})", id, request.kind);

        let command = self.command.clone();
        let config = self.config.clone();
        let permits = self.permits.clone();
        let store = self.store.clone();

        tokio::spawn(async move {
            let permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    Self::set_state(
                        &store,
                        id,
                        JobState::Failed {
                            error: "job queue closed".to_string(),
                        },
                    )
                    .await;
                    return;
                }
            };

            Self::set_state(&store, id, JobState::Running).await;

            // 超时后 output future 被丢弃，kill_on_drop 负责终止子进程
            let state =
                match tokio::time::timeout(config.timeout(), command.run(&request.args)).await {
                    Err(_) => JobState::Failed {
                        error: format!("process timed out after {}s", config.timeout_secs),
                    },
                    Ok(Err(e)) => JobState::Failed {
                        error: e.to_string(),
                    },
                    Ok(Ok(stdout)) => match decode_for_kind(request.kind, &stdout) {
                        Ok(result) => JobState::Succeeded { result },
                        Err(e) => JobState::Failed {
                            error: e.to_string(),
                        },
                    },
                };

            Self::set_state(&store, id, state).await;
            drop(permit);
        });

        JobHandle { id, rx }
    }

    /// 查询作业记录
    pub async fn status(&self, id: Uuid) -> Option<JobRecord> {
        self.store
            .lock()
            .await
            .jobs
            .get(&id)
            .map(|job| job.record.clone())
    }

    /// 请求侧等待作业的截止时长
    pub fn request_deadline(&self) -> Duration {
        self.config.request_deadline()
    }

    async fn set_state(store: &Arc<Mutex<JobStore>>, id: Uuid, state: JobState) {
        let mut store = store.lock().await;
        let terminal = state.is_terminal();

        if let Some(job) = store.jobs.get_mut(&id) {
            job.record.state = state.clone();
            let _ = job.tx.send(state);
        }

        if terminal {
            store.finished.push_back(id);
            while store.finished.len() > MAX_FINISHED_JOBS {
                if let Some(oldest) = store.finished.pop_front() {
                    store.jobs.remove(&oldest);
                }
            }
        }
    }
}
