//! 外部输出解码
//!
//! 外部进程的标准输出在边界处做模式校验：缺少关键字段或根本
//! 不是JSON时产生类型化的解码错误，而不是把未知内容原样透传。
//! 解码是宽松的，未知字段通过 flatten 保留并随响应一起转发。

use medai_core::{MedAiError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::jobs::JobKind;

/// 推理结果文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceOutput {
    pub prediction: i64,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 训练动作结果文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingOutput {
    pub status: String, // success | pending | error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 状态查询文档
///
/// 外部进程的状态模式没有权威的字段定义，全部字段可选。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

pub fn decode_inference(stdout: &str) -> Result<InferenceOutput> {
    serde_json::from_str(stdout)
        .map_err(|e| MedAiError::Decode(format!("Invalid inference output: {}", e)))
}

pub fn decode_training(stdout: &str) -> Result<TrainingOutput> {
    serde_json::from_str(stdout)
        .map_err(|e| MedAiError::Decode(format!("Invalid training output: {}", e)))
}

pub fn decode_status(stdout: &str) -> Result<StatusReport> {
    serde_json::from_str(stdout)
        .map_err(|e| MedAiError::Decode(format!("Invalid status output: {}", e)))
}

/// 按作业类型解码并还原为JSON文档
pub fn decode_for_kind(kind: JobKind, stdout: &str) -> Result<Value> {
    let value = match kind {
        JobKind::Inference => serde_json::to_value(decode_inference(stdout)?)?,
        JobKind::Training => serde_json::to_value(decode_training(stdout)?)?,
        JobKind::Status => serde_json::to_value(decode_status(stdout)?)?,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_inference_valid() {
        let out = decode_inference(r#"{"prediction":2,"confidence":0.87,"features":[[0.1,0.2]]}"#)
            .unwrap();
        assert_eq!(out.prediction, 2);
        assert!((out.confidence - 0.87).abs() < f64::EPSILON);
        assert!(out.features.is_some());
    }

    #[test]
    fn test_decode_inference_missing_field() {
        let result = decode_inference(r#"{"confidence":0.87}"#);
        assert!(matches!(result, Err(MedAiError::Decode(_))));
    }

    #[test]
    fn test_decode_inference_not_json() {
        let result = decode_inference("Traceback (most recent call last):");
        assert!(matches!(result, Err(MedAiError::Decode(_))));
    }

    #[test]
    fn test_decode_preserves_unknown_fields() {
        let raw = r#"{"prediction":1,"confidence":0.5,"model_version":"v3"}"#;
        let value = decode_for_kind(JobKind::Inference, raw).unwrap();
        assert_eq!(value["model_version"], "v3");
        assert_eq!(value["prediction"], 1);
    }

    #[test]
    fn test_decode_training() {
        let out =
            decode_training(r#"{"status":"pending","message":"waiting for more clients"}"#)
                .unwrap();
        assert_eq!(out.status, "pending");
        assert_eq!(out.round, None);
    }

    #[test]
    fn test_decode_status_all_optional() {
        let report = decode_status(r#"{"round":12,"connected_clients":3}"#).unwrap();
        assert_eq!(report.round, Some(12));
        assert_eq!(report.status, None);
    }
}
