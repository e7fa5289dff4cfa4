use crate::git;
use crate::hub::HubState;
use agentview_core::detect::{detect_content_type, detect_language};
use agentview_core::diff::{unified_diff, DiffMode};
use agentview_core::protocol::{
    CreateTabRequest, CreateTabResponse, ErrorResponse, StatusResponse, TabList,
};
use agentview_core::{DiffMeta, Tab, TabType};
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path as RoutePath, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Error reply with a JSON `{"error": ...}` body.
#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    message: String,
}

impl ApiFailure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "tab not found".to_string(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// A create request resolved into the tab to store, plus the file its
/// content was read from.
#[derive(Debug)]
pub struct NewTab {
    pub tab: Tab,
    pub source: Option<PathBuf>,
}

pub async fn prepare_tab(request: CreateTabRequest) -> Result<NewTab, ApiFailure> {
    let requested = request.parsed_type().map_err(ApiFailure::bad_request)?;
    let is_diff = requested == Some(TabType::Diff);
    let file = non_empty(request.file.as_deref());
    let path = non_empty(request.path.as_deref());
    let mut content = request.content.clone().unwrap_or_default();

    if is_diff && request.diff.is_none() && content.is_empty() && file.is_none() && path.is_none() {
        return Err(ApiFailure::bad_request(
            "diff type requires 'diff' object, 'content', 'file', or 'path' (for git diff)",
        ));
    }

    let mut source = None;
    if let Some(file) = file.filter(|_| content.is_empty()) {
        let (text, resolved) = read_file(file).await?;
        content = text;
        source = Some(resolved);
    }

    let mut title = request.title.trim().to_string();
    let mut diff_meta = None;
    if let Some(path) = path.filter(|_| is_diff && content.is_empty()) {
        let mode = DiffMode::resolve(request.diff_mode.as_deref().unwrap_or_default())
            .map_err(|err| ApiFailure::bad_request(err.to_string()))?;
        content = git::git_diff(path, &mode).await.map_err(|err| {
            warn!(event = "git_diff_failed", path = path, mode = %mode, error = %err);
            ApiFailure::bad_request(err.to_string())
        })?;
        diff_meta = Some(DiffMeta {
            left_label: Some(mode.left_label()),
            right_label: Some(mode.right_label()),
            language: detect_language(path).map(str::to_string),
        });
        if title.is_empty() {
            title = mode.title_for(path);
        }
    }

    if let Some(diff) = request.diff.as_ref().filter(|_| is_diff) {
        diff_meta = Some(DiffMeta {
            left_label: diff.left_label.clone(),
            right_label: diff.right_label.clone(),
            language: diff.language.clone(),
        });
        if let Some(unified) = non_empty(diff.unified.as_deref()) {
            content = unified.to_string();
        } else if let (Some(left), Some(right)) =
            (non_empty(diff.left.as_deref()), non_empty(diff.right.as_deref()))
        {
            content = compare_files(left, right).await?;
        }
    }

    let tab_type = requested.unwrap_or_else(|| detect_content_type(file, &content));
    let mut language = non_empty(request.language.as_deref()).map(str::to_string);
    if language.is_none() && tab_type == TabType::Code {
        language = file.and_then(detect_language).map(str::to_string);
    }
    if title.is_empty() {
        if let Some(name) = file.and_then(|file| Path::new(file).file_name()) {
            title = name.to_string_lossy().to_string();
        }
    }

    let mut tab = Tab::new(request.id.unwrap_or_default(), title, tab_type, content);
    tab.language = language;
    tab.diff = diff_meta;
    tab.source_path = source.as_ref().map(|path| path.display().to_string());
    Ok(NewTab { tab, source })
}

async fn read_file(file: &str) -> Result<(String, PathBuf), ApiFailure> {
    let path = tokio::fs::canonicalize(file)
        .await
        .map_err(|err| cannot_read(format!("{file}: {err}")))?;
    let meta = tokio::fs::metadata(&path).await.map_err(cannot_read)?;
    if !meta.is_file() {
        return Err(cannot_read(format!("not a regular file: {}", path.display())));
    }
    let text = tokio::fs::read_to_string(&path).await.map_err(cannot_read)?;
    Ok((text, path))
}

async fn compare_files(left: &str, right: &str) -> Result<String, ApiFailure> {
    let (left_text, _) = read_file(left)
        .await
        .map_err(|err| ApiFailure::bad_request(format!("left side: {}", err.message)))?;
    let (right_text, _) = read_file(right)
        .await
        .map_err(|err| ApiFailure::bad_request(format!("right side: {}", err.message)))?;
    Ok(unified_diff(left, right, &left_text, &right_text))
}

fn cannot_read(detail: impl std::fmt::Display) -> ApiFailure {
    ApiFailure::bad_request(format!("cannot read file: {detail}"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub async fn create_tab(
    State(hub): State<Arc<HubState>>,
    body: Bytes,
) -> Result<Json<CreateTabResponse>, ApiFailure> {
    let request: CreateTabRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(event = "create_invalid", error = %err);
        ApiFailure::bad_request("invalid JSON")
    })?;
    let prepared = prepare_tab(request).await?;
    let (tab, created) = hub
        .upsert_tab(prepared.tab, prepared.source.as_deref())
        .await;
    Ok(Json(CreateTabResponse {
        id: tab.id,
        title: tab.title,
        tab_type: tab.tab_type,
        created,
    }))
}

pub async fn list_tabs(State(hub): State<Arc<HubState>>) -> Json<TabList> {
    let tabs = hub.store().read().await.list();
    Json(TabList { tabs })
}

pub async fn get_tab(
    State(hub): State<Arc<HubState>>,
    RoutePath(id): RoutePath<String>,
) -> Result<Json<Tab>, ApiFailure> {
    hub.store()
        .read()
        .await
        .get(&id)
        .map(Json)
        .ok_or_else(ApiFailure::not_found)
}

pub async fn delete_tab(
    State(hub): State<Arc<HubState>>,
    RoutePath(id): RoutePath<String>,
) -> Result<StatusCode, ApiFailure> {
    if hub.delete_tab(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiFailure::not_found())
    }
}

pub async fn activate_tab(
    State(hub): State<Arc<HubState>>,
    RoutePath(id): RoutePath<String>,
) -> Result<StatusCode, ApiFailure> {
    if hub.activate_tab(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiFailure::not_found())
    }
}

pub async fn clear_tabs(State(hub): State<Arc<HubState>>) -> StatusCode {
    hub.clear_tabs().await;
    StatusCode::NO_CONTENT
}

pub async fn status(State(hub): State<Arc<HubState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        tabs: hub.store().read().await.count(),
        uptime: hub.uptime_secs(),
    })
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
) -> impl IntoResponse {
    if !addr.ip().is_loopback() {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| async move {
        hub.handle_socket(socket, addr).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use agentview_core::protocol::DiffRequest;

    fn hub() -> Arc<HubState> {
        Arc::new(HubState::new(HubConfig::default(), None))
    }

    fn request(tab_type: Option<&str>) -> CreateTabRequest {
        CreateTabRequest {
            tab_type: tab_type.map(str::to_string),
            ..CreateTabRequest::default()
        }
    }

    #[tokio::test]
    async fn rejects_bad_type_and_empty_diff() {
        let err = prepare_tab(request(Some("spreadsheet")))
            .await
            .expect_err("bad type");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.contains("spreadsheet"));

        let err = prepare_tab(request(Some("diff"))).await.expect_err("no data");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("diff type requires"));
    }

    #[tokio::test]
    async fn file_tabs_detect_type_language_and_title() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("main.rs");
        std::fs::write(&file, "fn main() {}\n").expect("write");

        let prepared = prepare_tab(CreateTabRequest {
            file: Some(file.to_string_lossy().to_string()),
            ..CreateTabRequest::default()
        })
        .await
        .expect("prepare");
        assert_eq!(prepared.tab.tab_type, TabType::Code);
        assert_eq!(prepared.tab.language.as_deref(), Some("rust"));
        assert_eq!(prepared.tab.title, "main.rs");
        assert_eq!(prepared.tab.content, "fn main() {}\n");
        let source = prepared.source.expect("source path");
        assert_eq!(prepared.tab.source_path, Some(source.display().to_string()));
    }

    #[tokio::test]
    async fn directories_and_missing_files_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = prepare_tab(CreateTabRequest {
            file: Some(dir.path().to_string_lossy().to_string()),
            ..CreateTabRequest::default()
        })
        .await
        .expect_err("directory");
        assert!(err.message.contains("not a regular file"));

        let err = prepare_tab(CreateTabRequest {
            file: Some(dir.path().join("nope.md").to_string_lossy().to_string()),
            ..CreateTabRequest::default()
        })
        .await
        .expect_err("missing");
        assert!(err.message.starts_with("cannot read file"));
    }

    #[tokio::test]
    async fn diff_object_supplies_labels_and_content() {
        let prepared = prepare_tab(CreateTabRequest {
            title: "review".to_string(),
            tab_type: Some("diff".to_string()),
            diff: Some(DiffRequest {
                unified: Some("@@ -1 +1 @@\n-a\n+b\n".to_string()),
                left_label: Some("before".to_string()),
                right_label: Some("after".to_string()),
                language: Some("go".to_string()),
                ..DiffRequest::default()
            }),
            ..CreateTabRequest::default()
        })
        .await
        .expect("prepare");
        assert_eq!(prepared.tab.tab_type, TabType::Diff);
        assert!(prepared.tab.content.starts_with("@@"));
        let meta = prepared.tab.diff.as_ref().expect("meta");
        assert_eq!(meta.left_label.as_deref(), Some("before"));
        assert_eq!(prepared.tab.language_hint(), Some("go"));
        assert!(prepared.source.is_none());
    }

    fn compare_request(left: &Path, right: &Path) -> CreateTabRequest {
        CreateTabRequest {
            tab_type: Some("diff".to_string()),
            diff: Some(DiffRequest {
                left: Some(left.to_string_lossy().to_string()),
                right: Some(right.to_string_lossy().to_string()),
                ..DiffRequest::default()
            }),
            ..CreateTabRequest::default()
        }
    }

    #[tokio::test]
    async fn two_files_are_compared_into_a_unified_diff() {
        let dir = tempfile::tempdir().expect("tempdir");
        let left = dir.path().join("old.rs");
        let right = dir.path().join("new.rs");
        std::fs::write(&left, "fn a() {}\nfn b() {}\n").expect("write left");
        std::fs::write(&right, "fn a() {}\nfn c() {}\n").expect("write right");

        let prepared = prepare_tab(compare_request(&left, &right))
            .await
            .expect("prepare");
        let content = &prepared.tab.content;
        assert!(content.starts_with(&format!("--- {}\n+++ {}\n", left.display(), right.display())));
        assert!(content.contains("\n-fn b() {}\n+fn c() {}\n"));
        assert!(prepared.source.is_none());
    }

    #[tokio::test]
    async fn unreadable_compare_side_is_named() {
        let dir = tempfile::tempdir().expect("tempdir");
        let left = dir.path().join("old.rs");
        std::fs::write(&left, "x\n").expect("write left");

        let err = prepare_tab(compare_request(&left, &dir.path().join("gone.rs")))
            .await
            .expect_err("missing right");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.message.starts_with("right side: cannot read file"));

        let err = prepare_tab(compare_request(dir.path(), &left))
            .await
            .expect_err("directory left");
        assert!(err.message.starts_with("left side:"));
        assert!(err.message.contains("not a regular file"));
    }

    #[tokio::test]
    async fn bad_diff_mode_is_reported_before_running_git() {
        let err = prepare_tab(CreateTabRequest {
            tab_type: Some("diff".to_string()),
            path: Some("src/lib.rs".to_string()),
            diff_mode: Some("commit:".to_string()),
            ..CreateTabRequest::default()
        })
        .await
        .expect_err("mode");
        assert_eq!(err.message, "commit mode requires a SHA: commit:<sha>");
    }

    #[tokio::test]
    async fn content_without_type_is_sniffed() {
        let prepared = prepare_tab(CreateTabRequest {
            content: Some("--- a/x\n+++ b/x\n".to_string()),
            ..CreateTabRequest::default()
        })
        .await
        .expect("prepare");
        assert_eq!(prepared.tab.tab_type, TabType::Diff);
        assert!(prepared.tab.diff.is_none());
    }

    #[tokio::test]
    async fn handlers_map_outcomes_to_status_codes() {
        let hub = hub();
        let err = create_tab(State(hub.clone()), Bytes::from_static(b"{"))
            .await
            .expect_err("invalid json");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "invalid JSON");

        let body = serde_json::json!({"id": "n1", "title": "Notes", "content": "# hi"});
        let Json(created) = create_tab(State(hub.clone()), Bytes::from(body.to_string()))
            .await
            .expect("create");
        assert!(created.created);
        assert_eq!(created.tab_type, TabType::Markdown);

        let Json(tab) = get_tab(State(hub.clone()), RoutePath("n1".to_string()))
            .await
            .expect("get");
        assert!(tab.active);
        let err = get_tab(State(hub.clone()), RoutePath("ghost".to_string()))
            .await
            .expect_err("missing");
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let activated = activate_tab(State(hub.clone()), RoutePath("ghost".to_string())).await;
        assert_eq!(activated.expect_err("missing").status, StatusCode::NOT_FOUND);

        let deleted = delete_tab(State(hub.clone()), RoutePath("n1".to_string()))
            .await
            .expect("delete");
        assert_eq!(deleted, StatusCode::NO_CONTENT);
        let Json(list) = list_tabs(State(hub.clone())).await;
        assert!(list.tabs.is_empty());

        let Json(status) = status(State(hub)).await;
        assert_eq!(status.tabs, 0);
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
    }
}
