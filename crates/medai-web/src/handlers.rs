//! 视图数据API处理器

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use medai_core::{MedAiError, Role};
use serde_json::json;
use tracing::info;

use crate::server::AppState;
use crate::session::Session;

/// 侧边栏导航项
///
/// 每项带一个静态的角色允许列表，渲染和 `/api/nav` 都按它过滤。
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
    pub roles: &'static [Role],
}

pub const NAV_ITEMS: &[NavItem] = &[
    NavItem {
        label: "Dashboard",
        href: "/",
        roles: &[Role::Doctor, Role::Radiologist],
    },
    NavItem {
        label: "Upload Images",
        href: "/upload",
        roles: &[Role::Radiologist],
    },
    NavItem {
        label: "Recent Uploads",
        href: "/uploads",
        roles: &[Role::Doctor, Role::Radiologist],
    },
    NavItem {
        label: "Training Status",
        href: "/training",
        roles: &[Role::Radiologist],
    },
    NavItem {
        label: "Settings",
        href: "/settings",
        roles: &[Role::Doctor, Role::Radiologist],
    },
];

/// 某角色可见的导航项
pub fn nav_for_role(role: Role) -> impl Iterator<Item = &'static NavItem> {
    NAV_ITEMS.iter().filter(move |item| item.roles.contains(&role))
}

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "MedAI Dashboard API",
        "version": "1.0.0",
        "status": "running",
        "endpoints": {
            "health": "/health",
            "session": "/api/session",
            "uploads": "/api/uploads",
            "metrics": "/api/metrics",
            "inference": "/api/inference",
            "training": "/api/training"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": "1.0.0"
    }))
}

/// 导航查询处理器
pub async fn get_nav(session: Session) -> impl IntoResponse {
    let items: Vec<_> = nav_for_role(session.role)
        .map(|item| json!({ "label": item.label, "href": item.href }))
        .collect();
    Json(json!({ "role": session.role.as_str(), "items": items }))
}

/// 最近上传查询处理器
pub async fn get_uploads(
    State(state): State<AppState>,
    _session: Session,
) -> ApiResult<impl IntoResponse> {
    let uploads = state.repo.list_uploads().await?;
    let total = uploads.len();
    info!("Listing {} recent uploads", total);
    Ok(Json(json!({
        "uploads": uploads,
        "total": total
    })))
}

/// 患者报告查询处理器
pub async fn get_patient_report(
    State(state): State<AppState>,
    _session: Session,
    Path(patient_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let report = state.repo.get_patient_report(&patient_id).await?;
    Ok(Json(report))
}

/// 训练指标查询处理器
pub async fn get_metrics(
    State(state): State<AppState>,
    _session: Session,
) -> ApiResult<impl IntoResponse> {
    let metrics = state.repo.get_metrics().await?;
    Ok(Json(metrics))
}

/// API错误包装
///
/// 核心错误类型定义在 medai-core，孤儿规则不允许在这里直接为它
/// 实现 `IntoResponse`，用本地新类型转一层。
pub struct ApiError(pub MedAiError);

impl From<MedAiError> for ApiError {
    fn from(err: MedAiError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            MedAiError::Validation(_) => StatusCode::BAD_REQUEST,
            MedAiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            MedAiError::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": true,
            "message": self.0.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
