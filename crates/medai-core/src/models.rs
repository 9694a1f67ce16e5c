//! 核心数据模型定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MedAiError;

/// 用户角色
///
/// 会话 Cookie 中只允许这两个取值，其他字符串一律拒绝。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 医生 - 审阅报告
    Doctor,
    /// 放射科医生 - 上传影像与跟踪训练
    Radiologist,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Doctor => "doctor",
            Role::Radiologist => "radiologist",
        }
    }
}

impl FromStr for Role {
    type Err = MedAiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(Role::Doctor),
            "radiologist" => Ok(Role::Radiologist),
            other => Err(MedAiError::Validation(format!("Unknown role: {}", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 影像模态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Ct,
    Mri,
    Xray,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Ct => "ct",
            Modality::Mri => "mri",
            Modality::Xray => "xray",
        }
    }

    /// 界面展示用名称
    pub fn display_name(&self) -> &'static str {
        match self {
            Modality::Ct => "CT",
            Modality::Mri => "MRI",
            Modality::Xray => "X-ray",
        }
    }
}

impl FromStr for Modality {
    type Err = MedAiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ct" => Ok(Modality::Ct),
            "mri" => Ok(Modality::Mri),
            "xray" | "x-ray" => Ok(Modality::Xray),
            other => Err(MedAiError::Validation(format!(
                "Unknown image type: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Pending,
    Analyzed,
}

/// 上传记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub patient_id: String,
    pub patient_name: String,
    pub modality: Modality,
    pub uploaded_at: DateTime<Utc>,
    pub status: UploadStatus,
}

/// 患者性别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
}

/// 患者报告
///
/// 在上传记录之上附加诊断与建议的自由文本。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientReport {
    pub patient_id: String,
    pub patient_name: String,
    pub age: u8,
    pub sex: Sex,
    pub modality: Modality,
    pub uploaded_at: DateTime<Utc>,
    pub status: UploadStatus,
    pub diagnosis: String,
    pub recommendations: String,
    pub image_url: String,
}

/// 单模态训练指标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalityMetrics {
    pub modality: Modality,
    pub accuracy: f64,
    pub loss: f64,
}

/// 训练指标快照
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub round: u32,
    pub modalities: Vec<ModalityMetrics>,
    pub refreshed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trip() {
        assert_eq!("doctor".parse::<Role>().unwrap(), Role::Doctor);
        assert_eq!(
            "radiologist".parse::<Role>().unwrap(),
            Role::Radiologist
        );
        assert_eq!(Role::Doctor.as_str(), "doctor");
    }

    #[test]
    fn test_role_rejects_unknown() {
        assert!("admin".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
        assert!("Doctor".parse::<Role>().is_err());
    }

    #[test]
    fn test_modality_parse() {
        assert_eq!("ct".parse::<Modality>().unwrap(), Modality::Ct);
        assert_eq!("x-ray".parse::<Modality>().unwrap(), Modality::Xray);
        assert!("pet".parse::<Modality>().is_err());
    }

    #[test]
    fn test_modality_serde_wire_format() {
        let json = serde_json::to_string(&Modality::Xray).unwrap();
        assert_eq!(json, "\"xray\"");
    }
}
