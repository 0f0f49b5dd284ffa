//! services/api/src/web/diary.rs
//!
//! Handlers for the private diary: dated entries, free-form notes and the task list.

use crate::web::{
    protocol::{DiaryView, SessionView, TaskView, TextRequest},
    state::AppState,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

type HandlerResult<T> = Result<T, (StatusCode, String)>;

/// Get every diary entry, the notes and the tasks.
#[utoipa::path(
    get,
    path = "/diary",
    responses((status = 200, description = "The diary", body = DiaryView))
)]
pub async fn get_diary_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let session = app_state.session.lock().await;
    Json(DiaryView::of(&session))
}

#[utoipa::path(
    delete,
    path = "/diary",
    responses((status = 200, description = "The session state", body = SessionView))
)]
pub async fn close_diary_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.close_diary();
    Json(SessionView::from(session.snapshot()))
}

/// Write the entry for one day, replacing any previous text.
#[utoipa::path(
    put,
    path = "/diary/entries/{date}",
    params(("date" = String, Path, description = "ISO date, e.g. 2024-06-01")),
    request_body = TextRequest,
    responses(
        (status = 200, description = "The diary", body = DiaryView),
        (status = 400, description = "Malformed date")
    )
)]
pub async fn save_entry_handler(
    State(app_state): State<Arc<AppState>>,
    Path(date): Path<String>,
    Json(payload): Json<TextRequest>,
) -> HandlerResult<impl IntoResponse> {
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d")
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid date '{}': {}", date, e)))?;

    let mut session = app_state.session.lock().await;
    session.save_diary_entry(date, &payload.text);
    app_state.after_change(&mut session);
    Ok(Json(DiaryView::of(&session)))
}

#[utoipa::path(
    put,
    path = "/diary/notes",
    request_body = TextRequest,
    responses((status = 200, description = "The diary", body = DiaryView))
)]
pub async fn save_notes_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TextRequest>,
) -> impl IntoResponse {
    let mut session = app_state.session.lock().await;
    session.save_notes(&payload.text);
    app_state.after_change(&mut session);
    Json(DiaryView::of(&session))
}

#[utoipa::path(
    post,
    path = "/diary/tasks",
    request_body = TextRequest,
    responses(
        (status = 201, description = "Task added", body = TaskView),
        (status = 400, description = "Blank task")
    )
)]
pub async fn add_task_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<TextRequest>,
) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    let task = session
        .add_task(&payload.text)
        .ok_or_else(|| (StatusCode::BAD_REQUEST, "A task needs some text".to_string()))?;
    app_state.after_change(&mut session);
    Ok((StatusCode::CREATED, Json(TaskView::from(&task))))
}

#[utoipa::path(
    post,
    path = "/diary/tasks/{id}/toggle",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 200, description = "The updated task", body = TaskView),
        (status = 404, description = "No such task")
    )
)]
pub async fn toggle_task_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    let task = session
        .toggle_task(id)
        .map(TaskView::from)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Task {} not found", id)))?;
    app_state.after_change(&mut session);
    Ok(Json(task))
}

#[utoipa::path(
    delete,
    path = "/diary/tasks/{id}",
    params(("id" = Uuid, Path, description = "Task id")),
    responses(
        (status = 204, description = "Task removed"),
        (status = 404, description = "No such task")
    )
)]
pub async fn delete_task_handler(
    State(app_state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> HandlerResult<impl IntoResponse> {
    let mut session = app_state.session.lock().await;
    if !session.delete_task(id) {
        return Err((StatusCode::NOT_FOUND, format!("Task {} not found", id)));
    }
    app_state.after_change(&mut session);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::test_support::{app_state, FakeGeneration};

    #[tokio::test]
    async fn malformed_date_is_rejected() {
        let app_state = app_state(FakeGeneration::replying("ok"));
        let err = save_entry_handler(
            State(app_state),
            Path("01/06/2024".into()),
            Json(TextRequest { text: "Dia calmo.".into() }),
        )
        .await
        .err()
        .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tasks_can_be_toggled_and_removed() {
        let app_state = app_state(FakeGeneration::replying("ok"));
        add_task_handler(State(app_state.clone()), Json(TextRequest { text: " regar ".into() }))
            .await
            .ok()
            .unwrap();
        let id = app_state.session.lock().await.tasks()[0].id;

        toggle_task_handler(State(app_state.clone()), Path(id)).await.ok().unwrap();
        assert!(app_state.session.lock().await.tasks()[0].completed);

        delete_task_handler(State(app_state.clone()), Path(id)).await.ok().unwrap();
        let err = delete_task_handler(State(app_state.clone()), Path(id)).await.err().unwrap();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_task_is_rejected() {
        let app_state = app_state(FakeGeneration::replying("ok"));
        let err = add_task_handler(State(app_state), Json(TextRequest { text: "   ".into() }))
            .await
            .err()
            .unwrap();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }
}
