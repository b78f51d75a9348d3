//! Task endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::info;

use autoflow_core::{ActionKind, ExecutionContext, TaskDraft, TaskId, TaskPatch};

use crate::http::responses::{
    Ack, ActionTypesResponse, ApiError, RunTaskRequest, TaskListResponse, TaskResponse,
    TaskStatusResponse, ToggleRequest,
};
use crate::poller::WatchKey;
use crate::state::AppState;

pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<TaskListResponse> {
    Json(TaskListResponse {
        success: true,
        tasks: state.registry.list().await,
    })
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TaskDraft>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Json(draft) = payload?;
    let task = state.registry.create(draft).await?;
    Ok(Json(TaskResponse {
        success: true,
        task,
    }))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state.registry.get(&TaskId::new(id)).await?;
    Ok(Json(TaskResponse {
        success: true,
        task,
    }))
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<TaskPatch>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Json(patch) = payload?;
    let task = state.registry.update(&TaskId::new(id), patch).await?;
    Ok(Json(TaskResponse {
        success: true,
        task,
    }))
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let id = TaskId::new(id);
    state.registry.delete(&id).await?;
    state.poller.stop(&WatchKey::Task(id)).await;
    Ok(Ack::ok())
}

pub async fn toggle_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ToggleRequest>, JsonRejection>,
) -> Result<Json<TaskResponse>, ApiError> {
    let Json(req) = payload?;
    let task = state.registry.toggle(&TaskId::new(id), req.disabled).await?;
    Ok(Json(TaskResponse {
        success: true,
        task,
    }))
}

/// Start a run and begin polling its status.
///
/// A request without a JSON body runs with no company context. A JSON
/// body that fails to parse is rejected.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<RunTaskRequest>, JsonRejection>,
) -> Result<Json<Ack>, ApiError> {
    let id = TaskId::new(id);
    let req = match payload {
        Ok(Json(req)) => req,
        Err(JsonRejection::MissingJsonContentType(_)) => RunTaskRequest::default(),
        Err(e) => return Err(e.into()),
    };
    let context = ExecutionContext {
        company_name: req.company_name.filter(|c| !c.trim().is_empty()),
    };

    let handle = state.coordinator.start(&id, context).await?;
    info!(task_id = %id, run_id = %handle.run_id, "Run requested over HTTP");
    state.poller.watch(WatchKey::Task(id)).await;
    Ok(Ack::ok())
}

pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let status = state.coordinator.status(&TaskId::new(id)).await?;
    Ok(Json(TaskStatusResponse {
        success: true,
        status,
    }))
}

/// Catalog of supported action types.
pub async fn list_action_types() -> Json<ActionTypesResponse> {
    Json(ActionTypesResponse {
        success: true,
        action_types: ActionKind::ALL.iter().map(|k| k.spec()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::FromRequest;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::json;

    use crate::config::Config;
    use crate::engine::testing::{draft, ScriptedEngine};

    fn state() -> (Arc<AppState>, Arc<ScriptedEngine>) {
        let engine = Arc::new(ScriptedEngine::new());
        (AppState::new(Config::default(), engine.clone()), engine)
    }

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    async fn run_body(
        content_type: Option<&str>,
        body: &'static str,
    ) -> Result<Json<RunTaskRequest>, JsonRejection> {
        let mut req = Request::builder().method("POST").uri("/api/tasks/a.json/run");
        if let Some(content_type) = content_type {
            req = req.header(header::CONTENT_TYPE, content_type);
        }
        Json::from_request(req.body(Body::from(body)).unwrap(), &()).await
    }

    #[tokio::test]
    async fn test_create_list_get() {
        let (state, _) = state();
        let Json(created) = create_task(State(state.clone()), Ok(Json(draft("a.json"))))
            .await
            .unwrap();
        assert!(created.success);

        let Json(list) = list_tasks(State(state.clone())).await;
        assert_eq!(list.tasks.len(), 1);

        let Json(got) = get_task(State(state.clone()), Path("a.json".into()))
            .await
            .unwrap();
        assert_eq!(got.task.name, "Task a.json");
    }

    #[tokio::test]
    async fn test_invalid_task_is_bad_request() {
        let (state, _) = state();
        let bad: TaskDraft = serde_json::from_value(json!({
            "_file": "a.json",
            "name": "A",
            "url": "https://example.com",
            "actions": [{"type": "input", "target": "#q"}]
        }))
        .unwrap();
        let err = create_task(State(state), Ok(Json(bad))).await.unwrap_err();
        assert_eq!(status_of(err), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let (state, _) = state();
        let err = get_task(State(state.clone()), Path("nope.json".into()))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);

        let err = task_status(State(state), Path("nope.json".into()))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_disabled_task_conflicts() {
        let (state, engine) = state();
        state.registry.create(draft("a.json")).await.unwrap();
        toggle_task(
            State(state.clone()),
            Path("a.json".into()),
            Ok(Json(ToggleRequest { disabled: true })),
        )
        .await
        .unwrap();

        let err = run_task(
            State(state.clone()),
            Path("a.json".into()),
            run_body(None, "").await,
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);
        assert!(engine.started().is_empty());
    }

    #[tokio::test]
    async fn test_run_registers_poller_and_conflicts_on_second_start() {
        let (state, engine) = state();
        state.registry.create(draft("a.json")).await.unwrap();
        engine.hold("a.json");

        let body = RunTaskRequest {
            company_name: Some("ACME".into()),
        };
        run_task(State(state.clone()), Path("a.json".into()), Ok(Json(body)))
            .await
            .unwrap();
        assert!(
            state
                .poller
                .is_watching(&WatchKey::Task(TaskId::new("a.json")))
                .await
        );

        let err = run_task(
            State(state.clone()),
            Path("a.json".into()),
            run_body(None, "").await,
        )
        .await
        .unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);

        let Json(status) = task_status(State(state.clone()), Path("a.json".into()))
            .await
            .unwrap();
        assert!(status.status.running);
        assert!(status.status.logs.iter().any(|l| l == "Company: ACME"));

        let err = delete_task(State(state.clone()), Path("a.json".into()))
            .await
            .unwrap_err();
        assert_eq!(status_of(err), StatusCode::CONFLICT);
        engine.release("a.json");
    }

    #[tokio::test]
    async fn test_run_without_body_has_no_context() {
        let (state, engine) = state();
        state.registry.create(draft("a.json")).await.unwrap();
        engine.hold("a.json");

        run_task(
            State(state.clone()),
            Path("a.json".into()),
            run_body(None, "").await,
        )
        .await
        .unwrap();

        let status = state.coordinator.status(&TaskId::new("a.json")).await.unwrap();
        assert!(status.running);
        assert!(!status.logs.iter().any(|l| l.starts_with("Company:")));
        engine.release("a.json");
    }

    #[tokio::test]
    async fn test_run_with_malformed_body_is_bad_request() {
        let (state, engine) = state();
        state.registry.create(draft("a.json")).await.unwrap();

        for body in [r#"{"company_name": 42}"#, "{not json", ""] {
            let err = run_task(
                State(state.clone()),
                Path("a.json".into()),
                run_body(Some("application/json"), body).await,
            )
            .await
            .unwrap_err();
            assert_eq!(status_of(err), StatusCode::BAD_REQUEST, "body {body:?}");
        }
        assert!(engine.started().is_empty());
        assert!(state.coordinator.status(&TaskId::new("a.json")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let (state, _) = state();
        state.registry.create(draft("a.json")).await.unwrap();

        let patch: TaskPatch = serde_json::from_value(json!({"description": "nightly"})).unwrap();
        let Json(updated) = update_task(State(state.clone()), Path("a.json".into()), Ok(Json(patch)))
            .await
            .unwrap();
        assert_eq!(updated.task.description, "nightly");

        delete_task(State(state.clone()), Path("a.json".into()))
            .await
            .unwrap();
        let Json(list) = list_tasks(State(state)).await;
        assert!(list.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_action_types_catalog() {
        let Json(catalog) = list_action_types().await;
        assert_eq!(catalog.action_types.len(), ActionKind::ALL.len());
        let value = serde_json::to_value(&catalog).unwrap();
        assert_eq!(value["action_types"][0]["type"], ActionKind::ALL[0].as_str());
    }
}
