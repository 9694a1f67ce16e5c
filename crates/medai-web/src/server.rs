//! Web服务器

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use medai_core::{DashboardRepository, MedAiError, Result};
use medai_relay::{JobRunner, RelayConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{handlers, pages, relay, session};

/// 每个请求可取到的共享状态
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn DashboardRepository>,
    pub runner: Arc<JobRunner>,
    pub relay: Arc<RelayConfig>,
    pub session_ttl_hours: i64,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| MedAiError::Internal(format!("Web server failed: {}", e)))?;

        Ok(())
    }
}

/// 装配路由
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // 页面
        .route("/login", get(pages::login_page))
        .route("/", get(pages::dashboard_page))
        .route("/upload", get(pages::upload_page))
        .route("/uploads", get(pages::uploads_page))
        .route("/patients/:id", get(pages::patient_page))
        .route("/training", get(pages::training_page))
        .route("/settings", get(pages::settings_page))
        .route("/static/style.css", get(pages::style_css))
        // 会话
        .route("/api/login", post(session::login_handler))
        .route("/api/session", get(session::session_handler))
        // 视图数据API
        .route("/api", get(handlers::api_root))
        .route("/health", get(handlers::health))
        .route("/api/nav", get(handlers::get_nav))
        .route("/api/uploads", get(handlers::get_uploads))
        .route("/api/patients/:id", get(handlers::get_patient_report))
        .route("/api/metrics", get(handlers::get_metrics))
        // 中继端点
        .route("/api/inference", post(relay::analyze_image))
        .route(
            "/api/training",
            get(relay::training_status).post(relay::training_action),
        )
        .route("/api/jobs/:id", get(relay::get_job))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use medai_core::MockRepository;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    const BOUNDARY: &str = "medai-test-boundary";

    fn test_state(program: &str, script_args: Vec<&str>, root: &std::path::Path) -> AppState {
        let relay = Arc::new(RelayConfig {
            program: program.to_string(),
            script_args: script_args.into_iter().map(String::from).collect(),
            storage_dir: root.join("uploads"),
            update_dir: root.join("updates"),
            timeout_secs: 10,
            max_concurrent: 2,
        });
        AppState {
            repo: Arc::new(MockRepository::new()),
            runner: Arc::new(JobRunner::new(relay.clone())),
            relay,
            session_ttl_hours: 24,
        }
    }

    fn multipart_request(uri: &str, fields: Vec<(&str, Option<&str>, Vec<u8>)>) -> Request<Body> {
        let mut body = Vec::new();
        for (name, filename, content) in fields {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(&content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_inference_missing_image_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = multipart_request(
            "/api/inference",
            vec![("type", None, b"ct".to_vec()), ("patientId", None, b"42".to_vec())],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_inference_missing_type_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = multipart_request(
            "/api/inference",
            vec![("image", Some("scan.dcm"), vec![1, 2, 3])],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_inference_success_envelope_and_persisted_name() {
        let dir = tempfile::tempdir().unwrap();
        // 外部进程替身：忽略传入参数，向标准输出打印固定JSON
        let app = create_app(test_state(
            "sh",
            vec!["-c", r#"echo '{"prediction":1,"confidence":0.93}'"#],
            dir.path(),
        ));

        let request = multipart_request(
            "/api/inference",
            vec![
                ("image", Some("scan.dcm"), vec![0u8; 16]),
                ("type", None, b"ct".to_vec()),
                ("patientName", None, b"Zhang Wei".to_vec()),
                ("patientId", None, b"42".to_vec()),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["prediction"], 1);
        assert_eq!(body["result"]["confidence"], 0.93);

        // 落盘文件名里患者ID在原始文件名之前
        let entries: Vec<String> = std::fs::read_dir(dir.path().join("uploads"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        let name = &entries[0];
        assert!(name.find("42_").unwrap() < name.find("scan.dcm").unwrap());
    }

    #[tokio::test]
    async fn test_inference_process_failure_is_500_generic() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("false", vec![], dir.path()));

        let request = multipart_request(
            "/api/inference",
            vec![
                ("image", Some("scan.dcm"), vec![0u8; 4]),
                ("type", None, b"mri".to_vec()),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Image analysis failed");
        assert!(body.get("result").is_none());
    }

    #[tokio::test]
    async fn test_training_status_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(
            "sh",
            vec!["-c", r#"echo '{"round":5,"connected_clients":2}'"#],
            dir.path(),
        ));

        let request = Request::builder()
            .uri("/api/training")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["status"]["round"], 5);
    }

    #[tokio::test]
    async fn test_training_post_missing_action_is_400() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request =
            multipart_request("/api/training", vec![("clientId", None, b"1".to_vec())]);
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_training_post_action_with_update() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(
            "sh",
            vec![
                "-c",
                r#"echo '{"status":"pending","message":"waiting for more clients"}'"#,
            ],
            dir.path(),
        ));

        let request = multipart_request(
            "/api/training",
            vec![
                ("action", None, b"submit_update".to_vec()),
                ("clientId", None, b"7".to_vec()),
                ("modelUpdate", Some("weights.bin"), vec![9u8; 32]),
            ],
        );
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["status"], "pending");

        // 模型更新负载应已写入暂存目录
        let entries: Vec<String> = std::fs::read_dir(dir.path().join("updates"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].starts_with("7_"));
    }

    #[tokio::test]
    async fn test_shell_redirects_without_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }

    #[tokio::test]
    async fn test_sidebar_filtered_by_role() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state("echo", vec!["{}"], dir.path());

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, "medai_role=doctor")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(!page.contains("Upload Images"));
        assert!(page.contains("Recent Uploads"));

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, "medai_role=radiologist")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let page = body_text(response).await;
        assert!(page.contains("Upload Images"));
    }

    #[tokio::test]
    async fn test_invalid_role_cookie_redirects() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = Request::builder()
            .uri("/")
            .header(header::COOKIE, "medai_role=admin")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn test_login_sets_role_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::to_vec(&json!({
                    "role": "doctor",
                    "username": "dr.chen",
                    "password": "secret"
                }))
                .unwrap(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string();
        assert!(cookie.starts_with("medai_role=doctor"));
        assert!(cookie.contains("Max-Age=86400"));
    }

    #[tokio::test]
    async fn test_login_rejects_unknown_role_and_empty_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state("echo", vec!["{}"], dir.path());

        for payload in [
            json!({ "role": "admin", "username": "a", "password": "b" }),
            json!({ "role": "doctor", "username": "", "password": "b" }),
            json!({ "role": "doctor", "username": "a", "password": "" }),
        ] {
            let request = Request::builder()
                .method("POST")
                .uri("/api/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                .unwrap();
            let response = create_app(state.clone()).oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn test_view_apis_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state("echo", vec!["{}"], dir.path());

        let request = Request::builder()
            .uri("/api/uploads")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/api/uploads")
            .header(header::COOKIE, "medai_role=doctor")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["total"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_patient_report_api() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state("echo", vec!["{}"], dir.path());

        let request = Request::builder()
            .uri("/api/patients/1")
            .header(header::COOKIE, "medai_role=doctor")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["patient_name"], "Zhang Wei");

        let request = Request::builder()
            .uri("/api/patients/999")
            .header(header::COOKIE, "medai_role=doctor")
            .body(Body::empty())
            .unwrap();
        let response = create_app(state).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = Request::builder()
            .uri(format!("/api/jobs/{}", uuid::Uuid::new_v4()))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state("echo", vec!["{}"], dir.path()));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "healthy");
    }
}
