//! 数据仓库接口
//!
//! 视图层只依赖 `DashboardRepository`，真实存储后端可以在不改动
//! 视图逻辑的前提下替换掉 `MockRepository`。

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{MedAiError, Result};
use crate::models::{
    Modality, ModalityMetrics, PatientReport, Sex, TrainingMetrics, UploadRecord, UploadStatus,
};

/// 仪表盘数据仓库
#[async_trait]
pub trait DashboardRepository: Send + Sync {
    /// 最近上传列表
    async fn list_uploads(&self) -> Result<Vec<UploadRecord>>;

    /// 按患者ID查询报告
    async fn get_patient_report(&self, patient_id: &str) -> Result<PatientReport>;

    /// 当前训练指标快照
    async fn get_metrics(&self) -> Result<TrainingMetrics>;
}

/// 内存模拟仓库
///
/// 上传与报告为每次调用重建的字面量数据；训练指标由固定周期的
/// 后台任务按确定性公式推进。
/// TODO: 接入真实存储后端后移除
pub struct MockRepository {
    metrics: RwLock<TrainingMetrics>,
}

impl MockRepository {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(metrics_at_round(1)),
        }
    }

    /// 推进一轮训练指标
    pub async fn advance_metrics(&self) {
        let mut metrics = self.metrics.write().await;
        let next = metrics.round + 1;
        *metrics = metrics_at_round(next);
        debug!("Training metrics advanced to round {}", next);
    }

    /// 固定周期刷新指标的后台任务
    pub async fn run_metrics_refresh(self: Arc<Self>, period: std::time::Duration) {
        let mut ticker = tokio::time::interval(period);
        // 第一次 tick 立即返回，跳过以免重复初始轮
        ticker.tick().await;
        loop {
            ticker.tick().await;
            self.advance_metrics().await;
        }
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DashboardRepository for MockRepository {
    async fn list_uploads(&self) -> Result<Vec<UploadRecord>> {
        Ok(mock_uploads())
    }

    async fn get_patient_report(&self, patient_id: &str) -> Result<PatientReport> {
        mock_reports()
            .into_iter()
            .find(|r| r.patient_id == patient_id)
            .ok_or_else(|| {
                MedAiError::NotFound(format!("No report for patient {}", patient_id))
            })
    }

    async fn get_metrics(&self) -> Result<TrainingMetrics> {
        Ok(self.metrics.read().await.clone())
    }
}

/// 按轮次计算指标
///
/// 准确率向平台值收敛、损失向下限衰减，叠加小幅正弦抖动，
/// 让界面上的曲线看起来在动。
fn metrics_at_round(round: u32) -> TrainingMetrics {
    let r = round as f64;

    let curve = |start: f64, plateau: f64, tau: f64, phase: f64| {
        let base = plateau - (plateau - start) * (-r / tau).exp();
        base + (r * 0.7 + phase).sin() * 0.004
    };
    let decay = |start: f64, floor: f64, tau: f64, phase: f64| {
        let base = floor + (start - floor) * (-r / tau).exp();
        base + ((r * 0.9 + phase).cos() * 0.003).abs()
    };

    TrainingMetrics {
        round,
        modalities: vec![
            ModalityMetrics {
                modality: Modality::Ct,
                accuracy: curve(0.72, 0.943, 25.0, 0.0),
                loss: decay(0.81, 0.142, 20.0, 0.0),
            },
            ModalityMetrics {
                modality: Modality::Mri,
                accuracy: curve(0.68, 0.921, 30.0, 1.3),
                loss: decay(0.92, 0.188, 24.0, 1.3),
            },
            ModalityMetrics {
                modality: Modality::Xray,
                accuracy: curve(0.75, 0.958, 22.0, 2.6),
                loss: decay(0.74, 0.117, 18.0, 2.6),
            },
        ],
        refreshed_at: Utc::now(),
    }
}

fn mock_uploads() -> Vec<UploadRecord> {
    let now = Utc::now();
    vec![
        UploadRecord {
            patient_id: "1".to_string(),
            patient_name: "Zhang Wei".to_string(),
            modality: Modality::Ct,
            uploaded_at: now - Duration::minutes(24),
            status: UploadStatus::Analyzed,
        },
        UploadRecord {
            patient_id: "2".to_string(),
            patient_name: "Li Na".to_string(),
            modality: Modality::Mri,
            uploaded_at: now - Duration::hours(2),
            status: UploadStatus::Analyzed,
        },
        UploadRecord {
            patient_id: "3".to_string(),
            patient_name: "Wang Fang".to_string(),
            modality: Modality::Xray,
            uploaded_at: now - Duration::hours(5),
            status: UploadStatus::Pending,
        },
        UploadRecord {
            patient_id: "4".to_string(),
            patient_name: "Chen Jie".to_string(),
            modality: Modality::Ct,
            uploaded_at: now - Duration::hours(26),
            status: UploadStatus::Analyzed,
        },
    ]
}

fn mock_reports() -> Vec<PatientReport> {
    let now = Utc::now();
    vec![
        PatientReport {
            patient_id: "1".to_string(),
            patient_name: "Zhang Wei".to_string(),
            age: 54,
            sex: Sex::Male,
            modality: Modality::Ct,
            uploaded_at: now - Duration::minutes(24),
            status: UploadStatus::Analyzed,
            diagnosis: "Low-density nodule in the right upper lobe, approximately 8mm. \
                        No mediastinal lymphadenopathy."
                .to_string(),
            recommendations: "Follow-up chest CT in 3 months. Consider PET-CT if the \
                              nodule enlarges."
                .to_string(),
            image_url: "/static/samples/ct_0001.png".to_string(),
        },
        PatientReport {
            patient_id: "2".to_string(),
            patient_name: "Li Na".to_string(),
            age: 43,
            sex: Sex::Female,
            modality: Modality::Mri,
            uploaded_at: now - Duration::hours(2),
            status: UploadStatus::Analyzed,
            diagnosis: "T2 hyperintense lesion in the left frontal white matter, \
                        non-enhancing. Likely chronic small vessel change."
                .to_string(),
            recommendations: "Clinical correlation advised. Repeat MRI in 6 months if \
                              symptoms progress."
                .to_string(),
            image_url: "/static/samples/mri_0002.png".to_string(),
        },
        PatientReport {
            patient_id: "3".to_string(),
            patient_name: "Wang Fang".to_string(),
            age: 67,
            sex: Sex::Female,
            modality: Modality::Xray,
            uploaded_at: now - Duration::hours(5),
            status: UploadStatus::Pending,
            diagnosis: "Analysis pending.".to_string(),
            recommendations: "Awaiting automated analysis result.".to_string(),
            image_url: "/static/samples/xr_0003.png".to_string(),
        },
    ]
}
