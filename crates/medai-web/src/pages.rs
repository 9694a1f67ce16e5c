//! 视图页面
//!
//! 页面HTML内嵌在二进制里由处理器直接返回。外壳页面在服务端按
//! 角色渲染侧边栏；未认证的加载一律重定向到登录页。登出链接是
//! 摆设，会话只随Cookie过期结束。

use axum::{
    extract::Path,
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
};
use medai_core::Role;

use crate::handlers::nav_for_role;
use crate::session::Session;

/// 登录页，始终可达
pub async fn login_page() -> impl IntoResponse {
    Html(LOGIN_HTML)
}

/// 共享样式表
pub async fn style_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], STYLE_CSS)
}

pub async fn dashboard_page(session: Option<Session>) -> Response {
    shell_or_login(session, "/", "Dashboard", DASHBOARD_CONTENT)
}

pub async fn upload_page(session: Option<Session>) -> Response {
    shell_or_login(session, "/upload", "Upload Images", UPLOAD_CONTENT)
}

pub async fn uploads_page(session: Option<Session>) -> Response {
    shell_or_login(session, "/uploads", "Recent Uploads", UPLOADS_CONTENT)
}

pub async fn patient_page(session: Option<Session>, Path(patient_id): Path<String>) -> Response {
    let content = PATIENT_CONTENT.replace("%PATIENT_ID%", &html_escape(&patient_id));
    shell_or_login(session, "/uploads", "Patient Report", &content)
}

pub async fn training_page(session: Option<Session>) -> Response {
    shell_or_login(session, "/training", "Training Status", TRAINING_CONTENT)
}

pub async fn settings_page(session: Option<Session>) -> Response {
    shell_or_login(session, "/settings", "Settings", SETTINGS_CONTENT)
}

fn shell_or_login(session: Option<Session>, active: &str, title: &str, content: &str) -> Response {
    match session {
        None => Redirect::to("/login").into_response(),
        Some(session) => render_shell(session.role, active, title, content).into_response(),
    }
}

/// 渲染外壳页面，侧边栏按角色允许列表过滤
fn render_shell(role: Role, active: &str, title: &str, content: &str) -> Html<String> {
    let nav: String = nav_for_role(role)
        .map(|item| {
            let class = if item.href == active { " class=\"active\"" } else { "" };
            format!("<li{}><a href=\"{}\">{}</a></li>", class, item.href, item.label)
        })
        .collect();

    let page = SHELL_TEMPLATE
        .replace("<!--NAV-->", &nav)
        .replace("%ROLE%", role.as_str())
        .replace("%TITLE%", title)
        .replace("<!--CONTENT-->", content);
    Html(page)
}

fn html_escape(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '&' => "&amp;".to_string(),
            '<' => "&lt;".to_string(),
            '>' => "&gt;".to_string(),
            '"' => "&quot;".to_string(),
            '\'' => "&#39;".to_string(),
            c => c.to_string(),
        })
        .collect()
}

const SHELL_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>%TITLE% - MedAI Dashboard</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body>
    <div class="layout">
        <aside class="sidebar">
            <div class="brand">🏥 MedAI</div>
            <ul class="nav">
<!--NAV-->
            </ul>
            <div class="sidebar-footer">
                <span class="role-badge">%ROLE%</span>
                <a href="#" class="logout">Logout</a>
            </div>
        </aside>
        <main class="content">
            <h1>%TITLE%</h1>
<!--CONTENT-->
        </main>
    </div>
</body>
</html>"##;

const LOGIN_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Sign in - MedAI Dashboard</title>
    <link rel="stylesheet" href="/static/style.css">
</head>
<body class="login-body">
    <div class="login-card">
        <h1>🏥 MedAI Dashboard</h1>
        <p class="subtitle">Medical imaging review</p>
        <form id="login-form">
            <label>Role
                <select name="role">
                    <option value="doctor">Doctor</option>
                    <option value="radiologist">Radiologist</option>
                </select>
            </label>
            <label>Username
                <input name="username" type="text" autocomplete="username">
            </label>
            <label>Password
                <input name="password" type="password" autocomplete="current-password">
            </label>
            <button type="submit">Sign in</button>
            <p id="login-error" class="error hidden"></p>
        </form>
    </div>
    <script>
        document.getElementById('login-form').addEventListener('submit', async (e) => {
            e.preventDefault();
            const form = new FormData(e.target);
            const resp = await fetch('/api/login', {
                method: 'POST',
                headers: { 'Content-Type': 'application/json' },
                body: JSON.stringify({
                    role: form.get('role'),
                    username: form.get('username'),
                    password: form.get('password'),
                }),
            });
            if (resp.ok) {
                window.location.href = '/';
            } else {
                const err = document.getElementById('login-error');
                err.textContent = 'Sign in failed. Check your details and try again.';
                err.classList.remove('hidden');
            }
        });
    </script>
</body>
</html>"#;

const DASHBOARD_CONTENT: &str = r#"
            <div class="cards" id="summary-cards">
                <div class="card"><h2 id="card-total">–</h2><p>Recent uploads</p></div>
                <div class="card"><h2 id="card-pending">–</h2><p>Pending analysis</p></div>
                <div class="card"><h2 id="card-round">–</h2><p>Training round</p></div>
            </div>
            <section class="panel">
                <h3>Latest uploads</h3>
                <table id="latest-uploads">
                    <thead><tr><th>Patient</th><th>ID</th><th>Type</th><th>Status</th></tr></thead>
                    <tbody></tbody>
                </table>
            </section>
            <script>
                async function loadDashboard() {
                    const [uploadsResp, metricsResp] = await Promise.all([
                        fetch('/api/uploads'),
                        fetch('/api/metrics'),
                    ]);
                    if (!uploadsResp.ok || !metricsResp.ok) return;
                    const uploads = await uploadsResp.json();
                    const metrics = await metricsResp.json();

                    document.getElementById('card-total').textContent = uploads.total;
                    document.getElementById('card-pending').textContent =
                        uploads.uploads.filter(u => u.status === 'pending').length;
                    document.getElementById('card-round').textContent = metrics.round;

                    const tbody = document.querySelector('#latest-uploads tbody');
                    tbody.innerHTML = '';
                    for (const u of uploads.uploads.slice(0, 3)) {
                        const row = document.createElement('tr');
                        for (const text of [u.patient_name, u.patient_id, u.modality, u.status]) {
                            const cell = document.createElement('td');
                            cell.textContent = text;
                            row.appendChild(cell);
                        }
                        tbody.appendChild(row);
                    }
                }
                loadDashboard();
            </script>"#;

const UPLOAD_CONTENT: &str = r#"
            <section class="panel">
                <form id="upload-form">
                    <label>Image file <input name="image" type="file" required></label>
                    <label>Image type
                        <select name="type">
                            <option value="ct">CT</option>
                            <option value="mri">MRI</option>
                            <option value="xray">X-ray</option>
                        </select>
                    </label>
                    <label>Patient name <input name="patientName" type="text"></label>
                    <label>Patient ID <input name="patientId" type="text"></label>
                    <button type="submit">Upload &amp; analyze</button>
                </form>
                <div id="upload-result" class="hidden">
                    <h3>Analysis result</h3>
                    <pre id="result-json"></pre>
                </div>
                <p id="upload-error" class="error hidden"></p>
            </section>
            <script>
                document.getElementById('upload-form').addEventListener('submit', async (e) => {
                    e.preventDefault();
                    const errBox = document.getElementById('upload-error');
                    const resultBox = document.getElementById('upload-result');
                    errBox.classList.add('hidden');
                    resultBox.classList.add('hidden');

                    const resp = await fetch('/api/inference', {
                        method: 'POST',
                        body: new FormData(e.target),
                    });
                    const body = await resp.json();
                    if (body.success) {
                        document.getElementById('result-json').textContent =
                            JSON.stringify(body.result, null, 2);
                        resultBox.classList.remove('hidden');
                    } else {
                        errBox.textContent = body.error || 'Upload failed';
                        errBox.classList.remove('hidden');
                    }
                });
            </script>"#;

const UPLOADS_CONTENT: &str = r#"
            <section class="panel">
                <table id="uploads-table">
                    <thead><tr><th>Patient</th><th>ID</th><th>Type</th><th>Uploaded</th><th>Status</th></tr></thead>
                    <tbody></tbody>
                </table>
            </section>
            <script>
                async function loadUploads() {
                    const resp = await fetch('/api/uploads');
                    if (!resp.ok) return;
                    const body = await resp.json();
                    const tbody = document.querySelector('#uploads-table tbody');
                    tbody.innerHTML = '';
                    for (const u of body.uploads) {
                        const row = document.createElement('tr');

                        const name = document.createElement('td');
                        const link = document.createElement('a');
                        link.href = '/patients/' + encodeURIComponent(u.patient_id);
                        link.textContent = u.patient_name;
                        name.appendChild(link);
                        row.appendChild(name);

                        for (const text of [u.patient_id, u.modality,
                                            new Date(u.uploaded_at).toLocaleString(), u.status]) {
                            const cell = document.createElement('td');
                            cell.textContent = text;
                            row.appendChild(cell);
                        }
                        tbody.appendChild(row);
                    }
                }
                loadUploads();
            </script>"#;

const PATIENT_CONTENT: &str = r#"
            <section class="panel" id="report" data-patient="%PATIENT_ID%">
                <div id="report-body">Loading report…</div>
            </section>
            <script>
                async function loadReport() {
                    const pid = document.getElementById('report').dataset.patient;
                    const resp = await fetch('/api/patients/' + encodeURIComponent(pid));
                    const box = document.getElementById('report-body');
                    if (!resp.ok) {
                        box.textContent = 'No report found for this patient.';
                        return;
                    }
                    const r = await resp.json();
                    box.innerHTML = '';
                    const rows = [
                        ['Patient', r.patient_name + ' (#' + r.patient_id + ')'],
                        ['Age / Sex', r.age + ' / ' + r.sex],
                        ['Modality', r.modality],
                        ['Status', r.status],
                        ['Diagnosis', r.diagnosis],
                        ['Recommendations', r.recommendations],
                    ];
                    for (const [label, value] of rows) {
                        const dt = document.createElement('dt');
                        dt.textContent = label;
                        const dd = document.createElement('dd');
                        dd.textContent = value;
                        box.appendChild(dt);
                        box.appendChild(dd);
                    }
                    const img = document.createElement('img');
                    img.src = r.image_url;
                    img.alt = 'Study image';
                    img.className = 'study-image';
                    box.appendChild(img);
                }
                loadReport();
            </script>"#;

const TRAINING_CONTENT: &str = r#"
            <section class="panel">
                <h3>Model accuracy by modality</h3>
                <div id="metric-bars"></div>
                <p class="muted" id="metrics-meta"></p>
            </section>
            <section class="panel">
                <h3>Federated training</h3>
                <div id="fl-status" class="muted">Fetching status…</div>
                <form id="training-form">
                    <label>Client ID <input name="clientId" type="text" value="1"></label>
                    <label>Model update <input name="modelUpdate" type="file"></label>
                    <div class="actions">
                        <button type="button" data-action="start_round">Start round</button>
                        <button type="button" data-action="submit_update">Submit update</button>
                        <button type="button" data-action="get_model">Get model</button>
                    </div>
                </form>
                <pre id="training-result" class="hidden"></pre>
            </section>
            <script>
                async function loadMetrics() {
                    const resp = await fetch('/api/metrics');
                    if (!resp.ok) return;
                    const m = await resp.json();
                    const box = document.getElementById('metric-bars');
                    box.innerHTML = '';
                    for (const mod of m.modalities) {
                        const label = document.createElement('div');
                        label.textContent = mod.modality.toUpperCase() + ' — accuracy '
                            + (mod.accuracy * 100).toFixed(1) + '%, loss ' + mod.loss.toFixed(3);
                        const bar = document.createElement('div');
                        bar.className = 'bar';
                        const fill = document.createElement('div');
                        fill.className = 'bar-fill';
                        fill.style.width = (mod.accuracy * 100).toFixed(1) + '%';
                        bar.appendChild(fill);
                        box.appendChild(label);
                        box.appendChild(bar);
                    }
                    document.getElementById('metrics-meta').textContent =
                        'Round ' + m.round + ' · refreshed ' + new Date(m.refreshed_at).toLocaleTimeString();
                }

                async function loadStatus() {
                    const box = document.getElementById('fl-status');
                    const resp = await fetch('/api/training');
                    const body = await resp.json();
                    box.textContent = body.success
                        ? JSON.stringify(body.status)
                        : (body.error || 'Status unavailable');
                }

                document.querySelectorAll('#training-form button[data-action]').forEach(btn => {
                    btn.addEventListener('click', async () => {
                        const form = new FormData(document.getElementById('training-form'));
                        form.set('action', btn.dataset.action);
                        const file = form.get('modelUpdate');
                        if (file && file.size === 0) form.delete('modelUpdate');
                        const resp = await fetch('/api/training', { method: 'POST', body: form });
                        const body = await resp.json();
                        const out = document.getElementById('training-result');
                        out.textContent = JSON.stringify(body, null, 2);
                        out.classList.remove('hidden');
                    });
                });

                loadMetrics();
                loadStatus();
                const refreshTimer = setInterval(loadMetrics, 5000);
                window.addEventListener('beforeunload', () => clearInterval(refreshTimer));
            </script>"#;

const SETTINGS_CONTENT: &str = r#"
            <section class="panel">
                <form>
                    <label>Display name <input type="text" value="Reviewer"></label>
                    <label>Theme
                        <select>
                            <option>Light</option>
                            <option>Dark</option>
                        </select>
                    </label>
                    <label>Metrics refresh interval
                        <select>
                            <option>5 seconds</option>
                            <option>30 seconds</option>
                            <option>1 minute</option>
                        </select>
                    </label>
                    <label><input type="checkbox" checked> Email me when analysis completes</label>
                    <button type="button">Save</button>
                </form>
                <p class="muted">Settings are stored locally in this build.</p>
            </section>"#;

const STYLE_CSS: &str = r#"/* MedAI Dashboard */
* { margin: 0; padding: 0; box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    background: #f3f5f9;
    color: #333;
}
.layout { display: flex; min-height: 100vh; }
.sidebar {
    width: 220px;
    background: linear-gradient(180deg, #667eea 0%, #764ba2 100%);
    color: white;
    display: flex;
    flex-direction: column;
    padding: 20px 0;
}
.brand { font-size: 1.3rem; font-weight: bold; padding: 0 20px 20px; }
.nav { list-style: none; flex: 1; }
.nav li a {
    display: block;
    padding: 10px 20px;
    color: rgba(255,255,255,0.85);
    text-decoration: none;
}
.nav li a:hover, .nav li.active a { background: rgba(255,255,255,0.15); color: white; }
.sidebar-footer { padding: 10px 20px; display: flex; justify-content: space-between; align-items: center; }
.role-badge {
    background: rgba(255,255,255,0.2);
    border-radius: 10px;
    padding: 2px 10px;
    font-size: 0.8rem;
    text-transform: capitalize;
}
.logout { color: rgba(255,255,255,0.7); font-size: 0.85rem; text-decoration: none; }
.content { flex: 1; padding: 30px; }
.content h1 { margin-bottom: 20px; font-size: 1.6rem; }
.cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(180px, 1fr)); gap: 16px; margin-bottom: 24px; }
.card {
    background: white;
    border-radius: 10px;
    padding: 20px;
    box-shadow: 0 4px 14px rgba(0,0,0,0.06);
}
.card h2 { color: #667eea; font-size: 1.8rem; }
.panel {
    background: white;
    border-radius: 10px;
    padding: 24px;
    box-shadow: 0 4px 14px rgba(0,0,0,0.06);
    margin-bottom: 20px;
}
.panel h3 { margin-bottom: 14px; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #eee; }
th { color: #888; font-weight: 600; font-size: 0.85rem; }
form label { display: block; margin-bottom: 14px; color: #555; }
form input[type=text], form input[type=password], form select, form input[type=file] {
    display: block;
    width: 100%;
    max-width: 360px;
    margin-top: 4px;
    padding: 8px;
    border: 1px solid #ccc;
    border-radius: 6px;
}
button {
    background: #667eea;
    color: white;
    border: none;
    border-radius: 6px;
    padding: 10px 18px;
    cursor: pointer;
}
button:hover { background: #5568d8; }
.actions { display: flex; gap: 10px; margin-top: 10px; }
.error { color: #c0392b; margin-top: 10px; }
.muted { color: #888; font-size: 0.9rem; margin-top: 10px; }
.hidden { display: none; }
pre { background: #f8f9fa; border-radius: 6px; padding: 12px; overflow-x: auto; margin-top: 12px; }
.bar { background: #eee; border-radius: 6px; height: 10px; margin: 6px 0 14px; }
.bar-fill { background: #667eea; border-radius: 6px; height: 10px; }
.study-image { max-width: 100%; margin-top: 16px; border-radius: 6px; }
#report-body dt { font-weight: 600; color: #888; margin-top: 10px; }
#report-body dd { margin-left: 0; }
.login-body {
    display: flex;
    align-items: center;
    justify-content: center;
    min-height: 100vh;
    background: linear-gradient(135deg, #667eea 0%, #764ba2 100%);
}
.login-card {
    background: white;
    border-radius: 10px;
    padding: 40px;
    width: 360px;
    box-shadow: 0 10px 30px rgba(0,0,0,0.15);
}
.login-card h1 { font-size: 1.4rem; margin-bottom: 4px; }
.login-card .subtitle { color: #888; margin-bottom: 20px; }
.login-card button { width: 100%; margin-top: 6px; }
"#;
