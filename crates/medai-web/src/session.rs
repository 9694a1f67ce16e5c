//! 会话与角色Cookie
//!
//! 角色保存在客户端Cookie中（doctor / radiologist，24小时过期），
//! 每个请求解析成类型化的 `Session` 再向下传递。没有身份库，
//! 登录只做角色合法性与凭据非空检查。

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use medai_core::{MedAiError, Role};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::handlers::{ApiError, ApiResult};
use crate::server::AppState;

/// 角色Cookie名
pub const ROLE_COOKIE: &str = "medai_role";

/// 从请求头解析角色Cookie
pub fn parse_role_cookie(headers: &HeaderMap) -> Option<Role> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        if name == ROLE_COOKIE {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// 构造角色Cookie串
pub fn role_cookie(role: Role, ttl_hours: i64) -> String {
    format!(
        "{}={}; Path=/; Max-Age={}; SameSite=Lax; HttpOnly",
        ROLE_COOKIE,
        role.as_str(),
        ttl_hours * 3600
    )
}

/// 请求范围内的会话
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub role: Role,
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = SessionRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parse_role_cookie(&parts.headers) {
            Some(role) => Ok(Session { role }),
            None => Err(SessionRejection),
        }
    }
}

/// 无有效会话时API返回401
pub struct SessionRejection;

impl IntoResponse for SessionRejection {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": true,
                "message": "Not authenticated",
                "status": 401
            })),
        )
            .into_response()
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub role: String,
    pub username: String,
    pub password: String,
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "Login attempt for user {} as {}",
        request.username, request.role
    );

    let role: Role = request.role.parse::<Role>().map_err(|e| {
        warn!("Login rejected: {}", e);
        ApiError::from(e)
    })?;

    if request.username.trim().is_empty() || request.password.is_empty() {
        return Err(MedAiError::Validation(
            "Username and password are required".to_string(),
        )
        .into());
    }

    Ok((
        [(
            header::SET_COOKIE,
            role_cookie(role, state.session_ttl_hours),
        )],
        Json(json!({ "success": true, "role": role.as_str() })),
    ))
}

/// 当前会话信息
pub async fn session_handler(session: Session) -> impl IntoResponse {
    Json(json!({ "role": session.role.as_str() }))
}
