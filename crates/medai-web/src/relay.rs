//! 中继端点处理器
//!
//! 推理与训练两个端点把请求转发给外部分析进程：请求形状错误在
//! 派生任何子进程之前以400拒绝；执行错误（派生失败、非零退出、
//! 超时、输出不合法）对调用方统一折叠成一条通用失败消息，细节
//! 只进日志。

use axum::{
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use medai_core::{utils::upload_file_name, MedAiError, Modality, Result};
use medai_relay::{inference_args, status_args, training_args, JobKind, JobRequest, JobState};
use serde::Serialize;
use serde_json::Value;
use std::path::Path as FsPath;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::handlers::{ApiError, ApiResult};
use crate::server::AppState;

const GENERIC_INFERENCE_ERROR: &str = "Image analysis failed";
const GENERIC_TRAINING_ERROR: &str = "Training operation failed";
const GENERIC_STATUS_ERROR: &str = "Failed to fetch training status";

/// 中继响应信封
#[derive(Debug, Serialize)]
pub struct RelayEnvelope {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayEnvelope {
    fn ok_result(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            status: None,
            error: None,
        }
    }

    fn ok_status(status: Value) -> Self {
        Self {
            success: true,
            result: None,
            status: Some(status),
            error: None,
        }
    }

    fn fail(message: &str) -> Self {
        Self {
            success: false,
            result: None,
            status: None,
            error: Some(message.to_string()),
        }
    }
}

fn envelope(status: StatusCode, envelope: RelayEnvelope) -> Response {
    (status, Json(envelope)).into_response()
}

/// 推理端点处理器
///
/// multipart 字段: image(二进制, 必填), type(模态, 必填),
/// patientName, patientId。
pub async fn analyze_image(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let form = match collect_inference_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Rejecting inference request: {}", e);
            return envelope(StatusCode::BAD_REQUEST, RelayEnvelope::fail(&e.to_string()));
        }
    };

    // 先落盘，再把文件路径交给外部进程
    let file_name = upload_file_name(&form.patient_id, &form.file_name, Utc::now());
    let path = state.relay.storage_dir.join(&file_name);
    if let Err(e) = persist(&state.relay.storage_dir, &path, &form.data).await {
        error!("Failed to persist upload {}: {}", path.display(), e);
        return envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayEnvelope::fail(GENERIC_INFERENCE_ERROR),
        );
    }
    info!(
        "Stored upload {} for patient {} ({} bytes)",
        path.display(),
        form.patient_id,
        form.data.len()
    );

    let handle = state
        .runner
        .submit(JobRequest {
            kind: JobKind::Inference,
            args: inference_args(&path, form.modality, &form.patient_id),
        })
        .await;

    match handle.wait(state.runner.request_deadline()).await {
        JobState::Succeeded { result } => envelope(StatusCode::OK, RelayEnvelope::ok_result(result)),
        JobState::Failed { error: detail } => {
            error!("Inference job failed: {}", detail);
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                RelayEnvelope::fail(GENERIC_INFERENCE_ERROR),
            )
        }
        _ => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayEnvelope::fail(GENERIC_INFERENCE_ERROR),
        ),
    }
}

/// 训练状态查询处理器
pub async fn training_status(State(state): State<AppState>) -> Response {
    let handle = state
        .runner
        .submit(JobRequest {
            kind: JobKind::Status,
            args: status_args(),
        })
        .await;

    match handle.wait(state.runner.request_deadline()).await {
        JobState::Succeeded { result } => envelope(StatusCode::OK, RelayEnvelope::ok_status(result)),
        JobState::Failed { error: detail } => {
            error!("Training status query failed: {}", detail);
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                RelayEnvelope::fail(GENERIC_STATUS_ERROR),
            )
        }
        _ => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayEnvelope::fail(GENERIC_STATUS_ERROR),
        ),
    }
}

/// 训练动作处理器
///
/// multipart 字段: action(必填), clientId, modelUpdate(二进制)。
/// 模型更新负载先写入暂存目录，以 `--update_path` 转发。
pub async fn training_action(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let form = match collect_training_form(&mut multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Rejecting training request: {}", e);
            return envelope(StatusCode::BAD_REQUEST, RelayEnvelope::fail(&e.to_string()));
        }
    };

    let update_path = match form.model_update {
        Some(ref data) => {
            let client = form.client_id.as_deref().unwrap_or("client");
            let file_name = upload_file_name(client, "update.bin", Utc::now());
            let path = state.relay.update_dir.join(&file_name);
            if let Err(e) = persist(&state.relay.update_dir, &path, data).await {
                error!("Failed to persist model update {}: {}", path.display(), e);
                return envelope(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    RelayEnvelope::fail(GENERIC_TRAINING_ERROR),
                );
            }
            info!("Stored model update {} ({} bytes)", path.display(), data.len());
            Some(path)
        }
        None => None,
    };

    let handle = state
        .runner
        .submit(JobRequest {
            kind: JobKind::Training,
            args: training_args(
                &form.action,
                form.client_id.as_deref(),
                update_path.as_deref(),
            ),
        })
        .await;

    match handle.wait(state.runner.request_deadline()).await {
        JobState::Succeeded { result } => envelope(StatusCode::OK, RelayEnvelope::ok_result(result)),
        JobState::Failed { error: detail } => {
            error!("Training action {} failed: {}", form.action, detail);
            envelope(
                StatusCode::INTERNAL_SERVER_ERROR,
                RelayEnvelope::fail(GENERIC_TRAINING_ERROR),
            )
        }
        _ => envelope(
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayEnvelope::fail(GENERIC_TRAINING_ERROR),
        ),
    }
}

/// 作业轮询处理器
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    match state.runner.status(id).await {
        Some(record) => Ok(Json(record)),
        None => Err(ApiError::from(MedAiError::NotFound(format!(
            "No job {}",
            id
        )))),
    }
}

struct InferenceForm {
    data: Bytes,
    file_name: String,
    modality: Modality,
    patient_id: String,
}

struct TrainingForm {
    action: String,
    client_id: Option<String>,
    model_update: Option<Bytes>,
}

async fn collect_inference_form(multipart: &mut Multipart) -> Result<InferenceForm> {
    let mut image: Option<(Bytes, String)> = None;
    let mut modality: Option<Modality> = None;
    let mut patient_id: Option<String> = None;

    while let Some(field) = next_field(multipart).await? {
        match field.name() {
            Some("image") => {
                let file_name = field
                    .file_name()
                    .unwrap_or("upload.bin")
                    .to_string();
                let data = read_field_bytes(field).await?;
                image = Some((data, file_name));
            }
            Some("type") => {
                modality = Some(read_field_text(field).await?.parse()?);
            }
            Some("patientId") => {
                patient_id = Some(read_field_text(field).await?);
            }
            // patientName 仅透传到日志，不参与调用
            Some("patientName") => {
                let name = read_field_text(field).await?;
                info!("Upload for patient name {}", name);
            }
            _ => {}
        }
    }

    let (data, file_name) =
        image.ok_or_else(|| MedAiError::Validation("Missing image file".to_string()))?;
    let modality =
        modality.ok_or_else(|| MedAiError::Validation("Missing image type".to_string()))?;

    Ok(InferenceForm {
        data,
        file_name,
        modality,
        patient_id: patient_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| "anonymous".to_string()),
    })
}

async fn collect_training_form(multipart: &mut Multipart) -> Result<TrainingForm> {
    let mut action: Option<String> = None;
    let mut client_id: Option<String> = None;
    let mut model_update: Option<Bytes> = None;

    while let Some(field) = next_field(multipart).await? {
        match field.name() {
            Some("action") => action = Some(read_field_text(field).await?),
            Some("clientId") => client_id = Some(read_field_text(field).await?),
            Some("modelUpdate") => model_update = Some(read_field_bytes(field).await?),
            _ => {}
        }
    }

    let action = action
        .filter(|a| !a.trim().is_empty())
        .ok_or_else(|| MedAiError::Validation("Missing action".to_string()))?;

    Ok(TrainingForm {
        action,
        client_id,
        model_update,
    })
}

async fn next_field<'a>(
    multipart: &'a mut Multipart,
) -> Result<Option<axum::extract::multipart::Field<'a>>> {
    multipart
        .next_field()
        .await
        .map_err(|e| MedAiError::Validation(format!("Malformed multipart body: {}", e)))
}

async fn read_field_text(field: axum::extract::multipart::Field<'_>) -> Result<String> {
    field
        .text()
        .await
        .map_err(|e| MedAiError::Validation(format!("Unreadable form field: {}", e)))
}

async fn read_field_bytes(field: axum::extract::multipart::Field<'_>) -> Result<Bytes> {
    field
        .bytes()
        .await
        .map_err(|e| MedAiError::Validation(format!("Unreadable form field: {}", e)))
}

async fn persist(dir: &FsPath, path: &FsPath, data: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(path, data).await?;
    Ok(())
}
